//! Minimal in-process sftp v3 server operating on the local filesystem.
//!
//! It follows openssh `sftp-server` where behaviour differs between servers:
//! `SSH_FXP_SYMLINK` takes the link target first, and the plain
//! `SSH_FXP_RENAME` refuses to replace an existing file.

use std::collections::{HashMap, VecDeque};
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::time::{Duration, SystemTime};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ssh_sftp_client_lowlevel::{constants::*, FileAttrs, OpenFlags};

const SSH_FX_OK: u32 = 0;
const SSH_FX_EOF: u32 = 1;
const SSH_FX_NO_SUCH_FILE: u32 = 2;
const SSH_FX_PERMISSION_DENIED: u32 = 3;
const SSH_FX_FAILURE: u32 = 4;
const SSH_FX_BAD_MESSAGE: u32 = 5;
const SSH_FX_OP_UNSUPPORTED: u32 = 8;

/// Number of entries returned by one `SSH_FXP_READDIR`.
const READDIR_BATCH: usize = 3;

/// Extensions advertised in `SSH_FXP_VERSION`.
#[derive(Debug, Copy, Clone)]
pub struct ServerExtensions {
    pub posix_rename: bool,
    pub fsync: bool,
    pub hardlink: bool,
}

impl Default for ServerExtensions {
    fn default() -> Self {
        Self {
            posix_rename: true,
            fsync: true,
            hardlink: true,
        }
    }
}

#[derive(Debug)]
enum OpenHandle {
    File(File),
    Dir(VecDeque<(Bytes, Bytes, FileAttrs)>),
}

struct Malformed;

type Reply = Result<(), Malformed>;

fn get_u32(buf: &mut Bytes) -> Result<u32, Malformed> {
    if buf.remaining() < 4 {
        return Err(Malformed);
    }
    Ok(buf.get_u32())
}

fn get_u64(buf: &mut Bytes) -> Result<u64, Malformed> {
    if buf.remaining() < 8 {
        return Err(Malformed);
    }
    Ok(buf.get_u64())
}

fn get_string(buf: &mut Bytes) -> Result<Bytes, Malformed> {
    let len = get_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(Malformed);
    }
    Ok(buf.split_to(len))
}

fn get_attrs(buf: &mut Bytes) -> Result<FileAttrs, Malformed> {
    let flags = get_u32(buf)?;
    let mut attrs = FileAttrs::new();

    if flags & SSH_FILEXFER_ATTR_SIZE != 0 {
        attrs.set_size(get_u64(buf)?);
    }
    if flags & SSH_FILEXFER_ATTR_UIDGID != 0 {
        let uid = get_u32(buf)?;
        attrs.set_id(uid, get_u32(buf)?);
    }
    if flags & SSH_FILEXFER_ATTR_PERMISSIONS != 0 {
        attrs.set_mode(get_u32(buf)?);
    }
    if flags & SSH_FILEXFER_ATTR_ACMODTIME != 0 {
        let atime = get_u32(buf)?;
        attrs.set_time(atime, get_u32(buf)?);
    }
    Ok(attrs)
}

fn put_string(buf: &mut BytesMut, s: &[u8]) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s);
}

fn put_attrs(buf: &mut BytesMut, attrs: &FileAttrs) {
    buf.put_u32(attrs.flags().bits());
    if let Some(size) = attrs.get_size() {
        buf.put_u64(size);
    }
    if let Some((uid, gid)) = attrs.get_id() {
        buf.put_u32(uid);
        buf.put_u32(gid);
    }
    if let Some(mode) = attrs.get_mode() {
        buf.put_u32(mode);
    }
    if let Some((atime, mtime)) = attrs.get_time() {
        buf.put_u32(atime);
        buf.put_u32(mtime);
    }
}

fn to_path(bytes: &[u8]) -> &Path {
    Path::new(OsStr::from_bytes(bytes))
}

fn attrs_from_metadata(metadata: &fs::Metadata) -> FileAttrs {
    let mut attrs = FileAttrs::new();
    attrs.set_size(metadata.size());
    attrs.set_id(metadata.uid(), metadata.gid());
    attrs.set_mode(metadata.mode());
    attrs.set_time(metadata.atime() as u32, metadata.mtime() as u32);
    attrs
}

fn io_status(err: &io::Error) -> u32 {
    match err.kind() {
        ErrorKind::NotFound => SSH_FX_NO_SUCH_FILE,
        ErrorKind::PermissionDenied => SSH_FX_PERMISSION_DENIED,
        _ => SSH_FX_FAILURE,
    }
}

#[derive(Copy, Clone)]
enum Target<'a> {
    Path(&'a Path),
    File(&'a File),
}

fn apply_attrs(target: Target<'_>, attrs: &FileAttrs) -> io::Result<()> {
    if let Some(size) = attrs.get_size() {
        match target {
            Target::File(file) => file.set_len(size)?,
            Target::Path(path) => OpenOptions::new().write(true).open(path)?.set_len(size)?,
        }
    }
    if let Some(mode) = attrs.get_mode() {
        let perm = fs::Permissions::from_mode(mode & 0o7777);
        match target {
            Target::File(file) => file.set_permissions(perm)?,
            Target::Path(path) => fs::set_permissions(path, perm)?,
        }
    }
    if let Some((uid, gid)) = attrs.get_id() {
        match target {
            Target::File(file) => std::os::unix::fs::fchown(file, Some(uid), Some(gid))?,
            Target::Path(path) => std::os::unix::fs::chown(path, Some(uid), Some(gid))?,
        }
    }
    if let Some((atime, mtime)) = attrs.get_time() {
        let time = |secs: u32| SystemTime::UNIX_EPOCH + Duration::from_secs(secs.into());
        let times = fs::FileTimes::new()
            .set_accessed(time(atime))
            .set_modified(time(mtime));

        match target {
            Target::File(file) => file.set_times(times)?,
            Target::Path(path) => File::open(path)?.set_times(times)?,
        }
    }
    Ok(())
}

/// Server side state of one sftp session.
#[derive(Debug, Default)]
pub struct MockServer {
    extensions: ServerExtensions,

    inbox: BytesMut,
    outbox: BytesMut,

    handles: HashMap<u32, OpenHandle>,
    next_handle: u32,

    injected_status: VecDeque<u32>,

    requests: usize,
    handles_closed: usize,
}

impl MockServer {
    pub fn new(extensions: ServerExtensions) -> Self {
        Self {
            extensions,
            ..Default::default()
        }
    }

    pub fn set_extensions(&mut self, extensions: ServerExtensions) {
        self.extensions = extensions;
    }

    /// Reply to the next requests with these statuses instead of
    /// executing them.
    pub fn inject_status(&mut self, code: u32) {
        self.injected_status.push_back(code);
    }

    /// Number of requests received, excluding `SSH_FXP_INIT`.
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Number of handles currently open.
    pub fn handles_open(&self) -> usize {
        self.handles.len()
    }

    /// Number of successful `SSH_FXP_CLOSE`.
    pub fn handles_closed(&self) -> usize {
        self.handles_closed
    }

    /// Forget every open handle and pending byte, as if a new sftp
    /// subsystem was started.
    pub fn restart(&mut self) {
        self.inbox.clear();
        self.outbox.clear();
        self.handles.clear();
        self.injected_status.clear();
    }

    pub fn has_output(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Move at most `buf.len()` bytes of pending responses into `buf`.
    pub fn read_output(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.outbox.len());
        buf[..n].copy_from_slice(&self.outbox[..n]);
        self.outbox.advance(n);
        n
    }

    /// Feed bytes sent by the client and process every complete packet.
    pub fn write_input(&mut self, data: &[u8]) {
        self.inbox.extend_from_slice(data);

        while self.inbox.len() >= 4 {
            let len = u32::from_be_bytes([self.inbox[0], self.inbox[1], self.inbox[2], self.inbox[3]])
                as usize;
            if self.inbox.len() < 4 + len {
                break;
            }

            self.inbox.advance(4);
            let packet = self.inbox.split_to(len).freeze();
            self.process(packet);
        }
    }

    fn process(&mut self, mut packet: Bytes) {
        if packet.is_empty() {
            return;
        }

        let packet_type = packet.get_u8();
        if packet_type == SSH_FXP_INIT {
            self.send_version();
            return;
        }

        let id = match get_u32(&mut packet) {
            Ok(id) => id,
            Err(Malformed) => return,
        };
        self.requests += 1;

        if let Some(code) = self.injected_status.pop_front() {
            self.send_status(id, code);
            return;
        }

        if self.handle_request(packet_type, id, packet).is_err() {
            self.send_status(id, SSH_FX_BAD_MESSAGE);
        }
    }

    fn send_packet(&mut self, packet_type: u8, id: u32, f: impl FnOnce(&mut BytesMut)) {
        let mut body = BytesMut::new();
        body.put_u8(packet_type);
        body.put_u32(id);
        f(&mut body);

        self.outbox.put_u32(body.len() as u32);
        self.outbox.extend_from_slice(&body);
    }

    fn send_version(&mut self) {
        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_VERSION);
        body.put_u32(SSH2_FILEXFER_VERSION);

        let ServerExtensions {
            posix_rename,
            fsync,
            hardlink,
        } = self.extensions;
        for (enabled, name) in [
            (posix_rename, EXT_NAME_POSIX_RENAME),
            (fsync, EXT_NAME_FSYNC),
            (hardlink, EXT_NAME_HARDLINK),
        ] {
            if enabled {
                put_string(&mut body, name.as_bytes());
                put_string(&mut body, b"1");
            }
        }

        self.outbox.put_u32(body.len() as u32);
        self.outbox.extend_from_slice(&body);
    }

    fn send_status(&mut self, id: u32, code: u32) {
        self.send_packet(SSH_FXP_STATUS, id, |buf| {
            buf.put_u32(code);
            put_string(buf, format!("status {code}").as_bytes());
            put_string(buf, b"");
        });
    }

    fn send_result(&mut self, id: u32, res: io::Result<()>) {
        let code = match res {
            Ok(()) => SSH_FX_OK,
            Err(err) => io_status(&err),
        };
        self.send_status(id, code);
    }

    fn send_handle(&mut self, id: u32, handle: OpenHandle) {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(raw, handle);

        self.send_packet(SSH_FXP_HANDLE, id, |buf| {
            put_string(buf, &raw.to_be_bytes());
        });
    }

    fn send_attrs(&mut self, id: u32, res: io::Result<fs::Metadata>) {
        match res {
            Ok(metadata) => self.send_packet(SSH_FXP_ATTRS, id, |buf| {
                put_attrs(buf, &attrs_from_metadata(&metadata))
            }),
            Err(err) => self.send_status(id, io_status(&err)),
        }
    }

    fn send_name(&mut self, id: u32, name: &[u8]) {
        self.send_packet(SSH_FXP_NAME, id, |buf| {
            buf.put_u32(1);
            put_string(buf, name);
            put_string(buf, name);
            put_attrs(buf, &FileAttrs::new());
        });
    }

    fn get_handle(body: &mut Bytes) -> Result<u32, Malformed> {
        let handle = get_string(body)?;
        let raw: [u8; 4] = handle[..].try_into().map_err(|_| Malformed)?;
        Ok(u32::from_be_bytes(raw))
    }

    fn file(&self, handle: u32) -> Option<&File> {
        match self.handles.get(&handle) {
            Some(OpenHandle::File(file)) => Some(file),
            _ => None,
        }
    }

    fn handle_request(&mut self, packet_type: u8, id: u32, mut body: Bytes) -> Reply {
        let body = &mut body;

        match packet_type {
            SSH_FXP_OPEN => {
                let path = get_string(body)?;
                let flags = OpenFlags::from_bits_retain(get_u32(body)?);
                let attrs = get_attrs(body)?;

                let mut options = OpenOptions::new();
                options
                    .read(flags.contains(OpenFlags::READ))
                    .write(flags.contains(OpenFlags::WRITE))
                    .append(flags.contains(OpenFlags::APPEND))
                    .truncate(flags.contains(OpenFlags::TRUNCATE))
                    .mode(attrs.get_mode().unwrap_or(0o666) & 0o7777);
                if flags.contains(OpenFlags::EXCLUSIVE) {
                    options.create_new(true);
                } else {
                    options.create(flags.contains(OpenFlags::CREATE));
                }

                match options.open(to_path(&path)) {
                    Ok(file) => self.send_handle(id, OpenHandle::File(file)),
                    Err(err) => self.send_status(id, io_status(&err)),
                }
            }
            SSH_FXP_OPENDIR => {
                let path = get_string(body)?;
                let path = to_path(&path);

                let res = fs::read_dir(path).and_then(|dir| {
                    let mut entries = dir
                        .map(|entry| {
                            let entry = entry?;
                            let metadata = entry.path().symlink_metadata()?;
                            let name = Bytes::copy_from_slice(entry.file_name().as_bytes());
                            let longname = format!(
                                "{:o} 1 {} {} {} {}",
                                metadata.mode(),
                                metadata.uid(),
                                metadata.gid(),
                                metadata.size(),
                                entry.file_name().to_string_lossy(),
                            );
                            Ok((name, Bytes::from(longname), attrs_from_metadata(&metadata)))
                        })
                        .collect::<io::Result<Vec<_>>>()?;
                    entries.sort_by(|x, y| x.0.cmp(&y.0));
                    Ok(entries)
                });

                match res {
                    Ok(entries) => self.send_handle(id, OpenHandle::Dir(entries.into())),
                    Err(err) => self.send_status(id, io_status(&err)),
                }
            }
            SSH_FXP_CLOSE => {
                let handle = Self::get_handle(body)?;
                if self.handles.remove(&handle).is_some() {
                    self.handles_closed += 1;
                    self.send_status(id, SSH_FX_OK);
                } else {
                    self.send_status(id, SSH_FX_FAILURE);
                }
            }
            SSH_FXP_READ => {
                let handle = Self::get_handle(body)?;
                let offset = get_u64(body)?;
                let len = get_u32(body)? as usize;

                let res = match self.file(handle) {
                    Some(file) => {
                        let mut buf = vec![0; len];
                        file.read_at(&mut buf, offset).map(|n| {
                            buf.truncate(n);
                            buf
                        })
                    }
                    None => Err(ErrorKind::Other.into()),
                };

                match res {
                    Ok(data) if data.is_empty() => self.send_status(id, SSH_FX_EOF),
                    Ok(data) => self.send_packet(SSH_FXP_DATA, id, |buf| put_string(buf, &data)),
                    Err(err) => self.send_status(id, io_status(&err)),
                }
            }
            SSH_FXP_WRITE => {
                let handle = Self::get_handle(body)?;
                let offset = get_u64(body)?;
                let data = get_string(body)?;

                let res = match self.file(handle) {
                    Some(file) => file.write_all_at(&data, offset),
                    None => Err(ErrorKind::Other.into()),
                };
                self.send_result(id, res);
            }
            SSH_FXP_STAT => {
                let path = get_string(body)?;
                self.send_attrs(id, fs::metadata(to_path(&path)));
            }
            SSH_FXP_LSTAT => {
                let path = get_string(body)?;
                self.send_attrs(id, fs::symlink_metadata(to_path(&path)));
            }
            SSH_FXP_FSTAT => {
                let handle = Self::get_handle(body)?;
                let res = match self.file(handle) {
                    Some(file) => file.metadata(),
                    None => Err(ErrorKind::Other.into()),
                };
                self.send_attrs(id, res);
            }
            SSH_FXP_SETSTAT => {
                let path = get_string(body)?;
                let attrs = get_attrs(body)?;
                self.send_result(id, apply_attrs(Target::Path(to_path(&path)), &attrs));
            }
            SSH_FXP_FSETSTAT => {
                let handle = Self::get_handle(body)?;
                let attrs = get_attrs(body)?;

                let res = match self.file(handle) {
                    Some(file) => apply_attrs(Target::File(file), &attrs),
                    None => Err(ErrorKind::Other.into()),
                };
                self.send_result(id, res);
            }
            SSH_FXP_READDIR => {
                let handle = Self::get_handle(body)?;

                let batch: Option<Vec<_>> = match self.handles.get_mut(&handle) {
                    Some(OpenHandle::Dir(entries)) => {
                        let n = entries.len().min(READDIR_BATCH);
                        Some(entries.drain(..n).collect())
                    }
                    _ => None,
                };

                match batch {
                    Some(batch) if batch.is_empty() => self.send_status(id, SSH_FX_EOF),
                    Some(batch) => self.send_packet(SSH_FXP_NAME, id, |buf| {
                        buf.put_u32(batch.len() as u32);
                        for (name, longname, attrs) in &batch {
                            put_string(buf, name);
                            put_string(buf, longname);
                            put_attrs(buf, attrs);
                        }
                    }),
                    None => self.send_status(id, SSH_FX_FAILURE),
                }
            }
            SSH_FXP_REMOVE => {
                let path = get_string(body)?;
                self.send_result(id, fs::remove_file(to_path(&path)));
            }
            SSH_FXP_MKDIR => {
                let path = get_string(body)?;
                let attrs = get_attrs(body)?;
                let res = fs::DirBuilder::new()
                    .mode(attrs.get_mode().unwrap_or(0o777) & 0o7777)
                    .create(to_path(&path));
                self.send_result(id, res);
            }
            SSH_FXP_RMDIR => {
                let path = get_string(body)?;
                self.send_result(id, fs::remove_dir(to_path(&path)));
            }
            SSH_FXP_REALPATH => {
                let path = get_string(body)?;
                match fs::canonicalize(to_path(&path)) {
                    Ok(resolved) => self.send_name(id, resolved.as_os_str().as_bytes()),
                    Err(err) => self.send_status(id, io_status(&err)),
                }
            }
            SSH_FXP_READLINK => {
                let path = get_string(body)?;
                match fs::read_link(to_path(&path)) {
                    Ok(target) => self.send_name(id, target.as_os_str().as_bytes()),
                    Err(err) => self.send_status(id, io_status(&err)),
                }
            }
            SSH_FXP_RENAME => {
                let oldpath = get_string(body)?;
                let newpath = get_string(body)?;

                let res = if fs::symlink_metadata(to_path(&newpath)).is_ok() {
                    Err(ErrorKind::AlreadyExists.into())
                } else {
                    fs::rename(to_path(&oldpath), to_path(&newpath))
                };
                self.send_result(id, res);
            }
            SSH_FXP_SYMLINK => {
                let target = get_string(body)?;
                let linkpath = get_string(body)?;
                let res = std::os::unix::fs::symlink(to_path(&target), to_path(&linkpath));
                self.send_result(id, res);
            }
            SSH_FXP_EXTENDED => {
                let name = get_string(body)?;
                self.handle_extended(id, &name, body)?;
            }
            _ => self.send_status(id, SSH_FX_OP_UNSUPPORTED),
        }

        Ok(())
    }

    fn handle_extended(&mut self, id: u32, name: &[u8], body: &mut Bytes) -> Reply {
        let ServerExtensions {
            posix_rename,
            fsync,
            hardlink,
        } = self.extensions;

        if posix_rename && name == EXT_NAME_POSIX_RENAME.as_bytes() {
            let oldpath = get_string(body)?;
            let newpath = get_string(body)?;
            self.send_result(id, fs::rename(to_path(&oldpath), to_path(&newpath)));
        } else if fsync && name == EXT_NAME_FSYNC.as_bytes() {
            let handle = Self::get_handle(body)?;
            let res = match self.file(handle) {
                Some(file) => file.sync_all(),
                None => Err(ErrorKind::Other.into()),
            };
            self.send_result(id, res);
        } else if hardlink && name == EXT_NAME_HARDLINK.as_bytes() {
            let oldpath = get_string(body)?;
            let newpath = get_string(body)?;
            self.send_result(id, fs::hard_link(to_path(&oldpath), to_path(&newpath)));
        } else {
            self.send_status(id, SSH_FX_OP_UNSUPPORTED);
        }

        Ok(())
    }
}
