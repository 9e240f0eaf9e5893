use super::{codec, constants, Error};

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

bitflags! {
    /// Presence bits of [`FileAttrs`] as sent on the wire.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct FileAttrsFlags: u32 {
        const SIZE = constants::SSH_FILEXFER_ATTR_SIZE;
        const UIDGID = constants::SSH_FILEXFER_ATTR_UIDGID;
        const PERMISSIONS = constants::SSH_FILEXFER_ATTR_PERMISSIONS;
        const ACMODTIME = constants::SSH_FILEXFER_ATTR_ACMODTIME;
        const EXTENDED = constants::SSH_FILEXFER_ATTR_EXTENDED;
    }
}

bitflags! {
    /// Permission bits of a file mode.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct Permissions: u32 {
        const SET_UID = 0o4000;
        const SET_GID = 0o2000;
        const SET_VTX = 0o1000;

        const READ_BY_OWNER = 0o400;
        const WRITE_BY_OWNER = 0o200;
        const EXECUTE_BY_OWNER = 0o100;

        const READ_BY_GROUP = 0o40;
        const WRITE_BY_GROUP = 0o20;
        const EXECUTE_BY_GROUP = 0o10;

        const READ_BY_OTHER = 0o4;
        const WRITE_BY_OTHER = 0o2;
        const EXECUTE_BY_OTHER = 0o1;
    }
}

const S_IFMT: u32 = 0o170000;

/// File type encoded in the `S_IFMT` bits of a file mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FileType {
    Socket,
    Symlink,
    RegularFile,
    BlockDevice,
    Directory,
    CharacterDevice,
    FIFO,
}

impl FileType {
    /// Return `None` if the type bits are absent or not recognized.
    pub const fn from_mode(mode: u32) -> Option<Self> {
        use FileType::*;

        Some(match mode & S_IFMT {
            0o140000 => Socket,
            0o120000 => Symlink,
            0o100000 => RegularFile,
            0o060000 => BlockDevice,
            0o040000 => Directory,
            0o020000 => CharacterDevice,
            0o010000 => FIFO,
            _ => return None,
        })
    }

    /// The `S_IFMT` bits of this type.
    pub const fn to_mode(self) -> u32 {
        use FileType::*;

        match self {
            Socket => 0o140000,
            Symlink => 0o120000,
            RegularFile => 0o100000,
            BlockDevice => 0o060000,
            Directory => 0o040000,
            CharacterDevice => 0o020000,
            FIFO => 0o010000,
        }
    }
}

/// Sparse sftp v3 file attributes.
///
/// Every field is independently present or absent; absent fields are
/// never encoded and are reported as `None`.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FileAttrs {
    size: Option<u64>,
    id: Option<(u32, u32)>,
    permissions: Option<u32>,
    time: Option<(u32, u32)>,
}

impl FileAttrs {
    pub const fn new() -> Self {
        Self {
            size: None,
            id: None,
            permissions: None,
            time: None,
        }
    }

    pub fn flags(&self) -> FileAttrsFlags {
        let mut flags = FileAttrsFlags::empty();
        flags.set(FileAttrsFlags::SIZE, self.size.is_some());
        flags.set(FileAttrsFlags::UIDGID, self.id.is_some());
        flags.set(FileAttrsFlags::PERMISSIONS, self.permissions.is_some());
        flags.set(FileAttrsFlags::ACMODTIME, self.time.is_some());
        flags
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = Some(size);
    }

    pub fn get_size(&self) -> Option<u64> {
        self.size
    }

    pub fn set_id(&mut self, uid: u32, gid: u32) {
        self.id = Some((uid, gid));
    }

    /// Return `(uid, gid)`.
    pub fn get_id(&self) -> Option<(u32, u32)> {
        self.id
    }

    /// Set the whole mode, including the file type bits.
    pub fn set_mode(&mut self, mode: u32) {
        self.permissions = Some(mode);
    }

    pub fn get_mode(&self) -> Option<u32> {
        self.permissions
    }

    /// Replace the permission bits, keeping any file type bits.
    pub fn set_permissions(&mut self, perm: Permissions) {
        let ty = self.permissions.unwrap_or(0) & S_IFMT;
        self.permissions = Some(ty | perm.bits());
    }

    pub fn get_permissions(&self) -> Option<Permissions> {
        self.permissions.map(Permissions::from_bits_truncate)
    }

    pub fn get_filetype(&self) -> Option<FileType> {
        self.permissions.and_then(FileType::from_mode)
    }

    pub fn set_time(&mut self, atime: u32, mtime: u32) {
        self.time = Some((atime, mtime));
    }

    /// Return `(atime, mtime)`.
    pub fn get_time(&self) -> Option<(u32, u32)> {
        self.time
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.flags().bits());

        if let Some(size) = self.size {
            buf.put_u64(size);
        }
        if let Some((uid, gid)) = self.id {
            buf.put_u32(uid);
            buf.put_u32(gid);
        }
        if let Some(permissions) = self.permissions {
            buf.put_u32(permissions);
        }
        if let Some((atime, mtime)) = self.time {
            buf.put_u32(atime);
            buf.put_u32(mtime);
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> Result<Self, Error> {
        let flags = FileAttrsFlags::from_bits_retain(codec::get_u32(buf)?);
        let mut attrs = FileAttrs::new();

        if flags.contains(FileAttrsFlags::SIZE) {
            attrs.size = Some(codec::get_u64(buf)?);
        }
        if flags.contains(FileAttrsFlags::UIDGID) {
            attrs.id = Some((codec::get_u32(buf)?, codec::get_u32(buf)?));
        }
        if flags.contains(FileAttrsFlags::PERMISSIONS) {
            attrs.permissions = Some(codec::get_u32(buf)?);
        }
        if flags.contains(FileAttrsFlags::ACMODTIME) {
            attrs.time = Some((codec::get_u32(buf)?, codec::get_u32(buf)?));
        }
        if flags.contains(FileAttrsFlags::EXTENDED) {
            // Extended attributes are not exposed, skip over them.
            let count = codec::get_u32(buf)?;
            for _ in 0..count {
                codec::get_string(buf)?;
                codec::get_string(buf)?;
            }
        }

        Ok(attrs)
    }
}
