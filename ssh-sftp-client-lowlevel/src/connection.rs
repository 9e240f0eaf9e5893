use super::{
    codec, constants, response::Response, Channel, Error, Extensions, FileAttrs, HandleOwned,
    NameEntry, OpenFlags, RenameFlags,
};

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::task::{ready, Poll};

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Request id.
///
/// Pass it to the matching `poll_*` function to retrieve the response,
/// or to [`Connection::discard`] if the response is not needed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Id(u32);

impl Id {
    pub fn into_raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
enum Slot {
    Waiting,
    Ready(Response),
    Discarded,
}

/// Sftp v3 protocol context over a non-blocking [`Channel`].
///
/// `send_*` functions only queue the request into the write buffer.
/// `poll_*` functions flush queued requests, read whatever the channel has
/// and return [`Poll::Pending`] when the channel would block. They never
/// register a waker: the caller is expected to wait for the transport to
/// become ready and then poll again.
#[derive(Debug)]
pub struct Connection<C> {
    channel: C,

    write_buf: BytesMut,
    read_buf: BytesMut,
    read_len: usize,

    next_id: u32,
    slots: HashMap<u32, Slot>,

    extensions: Option<Extensions>,
    last_status: u32,
}

fn would_block(err: &io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
}

fn status_error(code: u32, msg: &[u8]) -> Error {
    Error::from_status(code, String::from_utf8_lossy(msg))
        .unwrap_or(Error::InvalidResponse(&"Unexpected SSH_FX_OK status"))
}

fn unexpected(response: Response) -> Error {
    match response {
        Response::Status { code, msg } => status_error(code, &msg),
        _ => Error::InvalidResponse(&"Unexpected response type"),
    }
}

impl<C: Channel> Connection<C> {
    /// Create a connection and queue `SSH_FXP_INIT`.
    ///
    /// `read_len` is the number of bytes read from the channel at a time.
    pub fn new(channel: C, read_len: usize) -> Self {
        let mut write_buf = BytesMut::with_capacity(1024);

        // SSH_FXP_INIT carries the version instead of a request id.
        write_buf.put_u32(5);
        write_buf.put_u8(constants::SSH_FXP_INIT);
        write_buf.put_u32(constants::SSH2_FILEXFER_VERSION);

        Self {
            channel,
            write_buf,
            read_buf: BytesMut::new(),
            read_len: read_len.max(constants::MIN_CHANNEL_READ_LEN),
            next_id: 0,
            slots: HashMap::new(),
            extensions: None,
            last_status: 0,
        }
    }

    pub fn get_ref(&self) -> &C {
        &self.channel
    }

    pub fn get_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Extensions advertised by the server, empty before the handshake
    /// completes.
    pub fn extensions(&self) -> Extensions {
        self.extensions.unwrap_or_default()
    }

    /// Most recent raw status received from the server.
    pub fn last_status(&self) -> u32 {
        self.last_status
    }

    /// Number of requests whose response has not been consumed yet.
    pub fn pending_requests(&self) -> usize {
        self.slots.len()
    }

    /// Send `SSH_FXP_INIT` and wait for `SSH_FXP_VERSION`.
    pub fn poll_handshake(&mut self) -> Poll<Result<Extensions, Error>> {
        if let Some(extensions) = self.extensions {
            return Poll::Ready(Ok(extensions));
        }

        loop {
            if let Poll::Ready(Err(err)) = self.poll_flush() {
                return Poll::Ready(Err(err));
            }

            if let Some((packet_type, mut body)) = self.take_packet()? {
                if packet_type != constants::SSH_FXP_VERSION {
                    return Poll::Ready(Err(Error::InvalidResponse(
                        &"Expected SSH_FXP_VERSION as the first response",
                    )));
                }

                let version = codec::get_u32(&mut body)?;
                if version != constants::SSH2_FILEXFER_VERSION {
                    return Poll::Ready(Err(Error::UnsupportedSftpProtocol { version }));
                }

                let mut extensions = Extensions::default();
                while !body.is_empty() {
                    let name = codec::get_string(&mut body)?;
                    let data = codec::get_string(&mut body)?;
                    extensions.add(&name, &data);
                }

                self.extensions = Some(extensions);
                return Poll::Ready(Ok(extensions));
            }

            ready!(self.poll_fill())?;
        }
    }

    /// Write out every queued request.
    pub fn poll_flush(&mut self) -> Poll<Result<(), Error>> {
        while !self.write_buf.is_empty() {
            match self.channel.write(&self.write_buf) {
                Ok(0) => {
                    return Poll::Ready(Err(io::Error::new(
                        ErrorKind::WriteZero,
                        "sftp channel does not accept more data",
                    )
                    .into()))
                }
                Ok(n) => self.write_buf.advance(n),
                Err(err) if would_block(&err) => return Poll::Pending,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Poll::Ready(Err(err.into())),
            }
        }

        match self.channel.flush() {
            Ok(()) => Poll::Ready(Ok(())),
            Err(err) if would_block(&err) => Poll::Pending,
            Err(err) => Poll::Ready(Err(err.into())),
        }
    }

    /// Flush queued requests then close the channel.
    pub fn poll_shutdown(&mut self) -> Poll<Result<(), Error>> {
        ready!(self.poll_flush())?;

        match self.channel.close() {
            Ok(()) => Poll::Ready(Ok(())),
            Err(err) if would_block(&err) => Poll::Pending,
            Err(err) => Poll::Ready(Err(err.into())),
        }
    }

    /// Drop the response of `id` whenever it arrives.
    ///
    /// If the dropped response is a handle, it is closed.
    pub fn discard(&mut self, id: Id) {
        match self.slots.remove(&id.0) {
            Some(Slot::Waiting) => {
                self.slots.insert(id.0, Slot::Discarded);
            }
            Some(Slot::Ready(response)) => self.release(response),
            Some(Slot::Discarded) | None => (),
        }
    }

    fn release(&mut self, response: Response) {
        if let Response::Handle(handle) = response {
            if let Ok(id) = self.send_close_request(&handle) {
                self.discard(id);
            }
        }
    }

    fn poll_fill(&mut self) -> Poll<Result<(), Error>> {
        let start = self.read_buf.len();
        self.read_buf.resize(start + self.read_len, 0);

        let res = self.channel.read(&mut self.read_buf[start..]);
        let n = match &res {
            Ok(n) => *n,
            Err(_) => 0,
        };
        self.read_buf.truncate(start + n);

        match res {
            Ok(0) => Poll::Ready(Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "sftp channel closed by the server",
            )
            .into())),
            Ok(_) => Poll::Ready(Ok(())),
            Err(err) if would_block(&err) => Poll::Pending,
            Err(err) if err.kind() == ErrorKind::Interrupted => Poll::Ready(Ok(())),
            Err(err) => Poll::Ready(Err(err.into())),
        }
    }

    /// Split one complete packet off the read buffer.
    fn take_packet(&mut self) -> Result<Option<(u8, Bytes)>, Error> {
        if self.read_buf.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]);
        if len == 0 || len > constants::MAX_PACKET_LEN {
            return Err(Error::InvalidResponse(&"Invalid packet length"));
        }

        let len = len as usize;
        if self.read_buf.len() < 4 + len {
            return Ok(None);
        }

        self.read_buf.advance(4);
        let mut packet = self.read_buf.split_to(len).freeze();
        let packet_type = codec::get_u8(&mut packet)?;

        Ok(Some((packet_type, packet)))
    }

    /// Move every complete packet in the read buffer into its slot.
    fn dispatch(&mut self) -> Result<(), Error> {
        while let Some((packet_type, mut body)) = self.take_packet()? {
            let response_id = codec::get_u32(&mut body)?;
            let response = Response::decode(packet_type, body)?;

            if let Some(code) = response.status_code() {
                self.last_status = code;
            }

            match self.slots.remove(&response_id) {
                Some(Slot::Waiting) => {
                    self.slots.insert(response_id, Slot::Ready(response));
                }
                Some(Slot::Discarded) => self.release(response),
                Some(slot @ Slot::Ready(_)) => {
                    self.slots.insert(response_id, slot);
                    return Err(Error::InvalidResponseId { response_id });
                }
                None => return Err(Error::InvalidResponseId { response_id }),
            }
        }

        Ok(())
    }

    fn poll_response(&mut self, id: Id) -> Poll<Result<Response, Error>> {
        loop {
            match self.slots.remove(&id.0) {
                Some(Slot::Ready(response)) => return Poll::Ready(Ok(response)),
                Some(slot) => {
                    self.slots.insert(id.0, slot);
                }
                None => {
                    return Poll::Ready(Err(Error::InvalidResponseId {
                        response_id: id.0,
                    }))
                }
            }

            // Keep reading even if the flush would block, the server may be
            // waiting for us to drain its responses.
            if let Poll::Ready(Err(err)) = self.poll_flush() {
                return Poll::Ready(Err(err));
            }

            ready!(self.poll_fill())?;
            self.dispatch()?;
        }
    }

    /// Poll for a response that carries only a status.
    pub fn poll_status(&mut self, id: Id) -> Poll<Result<(), Error>> {
        Poll::Ready(match ready!(self.poll_response(id))? {
            Response::Status { code: 0, .. } => Ok(()),
            response => Err(unexpected(response)),
        })
    }

    pub fn poll_handle(&mut self, id: Id) -> Poll<Result<HandleOwned, Error>> {
        Poll::Ready(match ready!(self.poll_response(id))? {
            Response::Handle(handle) => Ok(handle),
            response => Err(unexpected(response)),
        })
    }

    /// Return `None` on end of file.
    pub fn poll_data(&mut self, id: Id) -> Poll<Result<Option<Bytes>, Error>> {
        Poll::Ready(match ready!(self.poll_response(id))? {
            Response::Data(data) => Ok(Some(data)),
            Response::Status { code: 1, .. } => Ok(None),
            response => Err(unexpected(response)),
        })
    }

    /// Return `None` once the directory has no more entries.
    pub fn poll_name_entries(&mut self, id: Id) -> Poll<Result<Option<Vec<NameEntry>>, Error>> {
        Poll::Ready(match ready!(self.poll_response(id))? {
            Response::Name(entries) => Ok(Some(entries)),
            Response::Status { code: 1, .. } => Ok(None),
            response => Err(unexpected(response)),
        })
    }

    /// Poll for the single name returned by realpath and readlink.
    pub fn poll_path(&mut self, id: Id) -> Poll<Result<Bytes, Error>> {
        Poll::Ready(match ready!(self.poll_response(id))? {
            Response::Name(mut entries) if entries.len() == 1 => {
                Ok(entries.pop().map(|entry| entry.filename).unwrap_or_default())
            }
            Response::Name(_) => Err(Error::InvalidResponse(&"Expected exactly one name")),
            response => Err(unexpected(response)),
        })
    }

    pub fn poll_attrs(&mut self, id: Id) -> Poll<Result<FileAttrs, Error>> {
        Poll::Ready(match ready!(self.poll_response(id))? {
            Response::Attrs(attrs) => Ok(attrs),
            response => Err(unexpected(response)),
        })
    }

    fn send_request<F>(&mut self, packet_type: u8, f: F) -> Result<Id, Error>
    where
        F: FnOnce(&mut BytesMut) -> Result<(), Error>,
    {
        let id = self.next_id;

        let start = codec::start_packet(&mut self.write_buf, packet_type);
        self.write_buf.put_u32(id);

        let res = f(&mut self.write_buf)
            .and_then(|()| codec::finish_packet(&mut self.write_buf, start));
        if let Err(err) = res {
            self.write_buf.truncate(start);
            return Err(err);
        }

        self.next_id = id.wrapping_add(1);
        self.slots.insert(id, Slot::Waiting);

        Ok(Id(id))
    }

    fn send_path_request(&mut self, packet_type: u8, path: &[u8]) -> Result<Id, Error> {
        self.send_request(packet_type, |buf| codec::put_string(buf, path))
    }

    fn send_extended_request<F>(&mut self, name: &str, f: F) -> Result<Id, Error>
    where
        F: FnOnce(&mut BytesMut) -> Result<(), Error>,
    {
        self.send_request(constants::SSH_FXP_EXTENDED, |buf| {
            codec::put_string(buf, name.as_bytes())?;
            f(buf)
        })
    }

    pub fn send_open_request(
        &mut self,
        path: &[u8],
        flags: OpenFlags,
        attrs: &FileAttrs,
    ) -> Result<Id, Error> {
        self.send_request(constants::SSH_FXP_OPEN, |buf| {
            codec::put_string(buf, path)?;
            buf.put_u32(flags.bits());
            attrs.encode(buf);
            Ok(())
        })
    }

    pub fn send_opendir_request(&mut self, path: &[u8]) -> Result<Id, Error> {
        self.send_path_request(constants::SSH_FXP_OPENDIR, path)
    }

    pub fn send_close_request(&mut self, handle: &[u8]) -> Result<Id, Error> {
        self.send_path_request(constants::SSH_FXP_CLOSE, handle)
    }

    pub fn send_read_request(&mut self, handle: &[u8], offset: u64, len: u32) -> Result<Id, Error> {
        self.send_request(constants::SSH_FXP_READ, |buf| {
            codec::put_string(buf, handle)?;
            buf.put_u64(offset);
            buf.put_u32(len);
            Ok(())
        })
    }

    pub fn send_write_request(
        &mut self,
        handle: &[u8],
        offset: u64,
        data: &[u8],
    ) -> Result<Id, Error> {
        self.send_request(constants::SSH_FXP_WRITE, |buf| {
            codec::put_string(buf, handle)?;
            buf.put_u64(offset);
            codec::put_string(buf, data)
        })
    }

    pub fn send_lstat_request(&mut self, path: &[u8]) -> Result<Id, Error> {
        self.send_path_request(constants::SSH_FXP_LSTAT, path)
    }

    pub fn send_stat_request(&mut self, path: &[u8]) -> Result<Id, Error> {
        self.send_path_request(constants::SSH_FXP_STAT, path)
    }

    pub fn send_fstat_request(&mut self, handle: &[u8]) -> Result<Id, Error> {
        self.send_path_request(constants::SSH_FXP_FSTAT, handle)
    }

    pub fn send_setstat_request(&mut self, path: &[u8], attrs: &FileAttrs) -> Result<Id, Error> {
        self.send_request(constants::SSH_FXP_SETSTAT, |buf| {
            codec::put_string(buf, path)?;
            attrs.encode(buf);
            Ok(())
        })
    }

    pub fn send_fsetstat_request(
        &mut self,
        handle: &[u8],
        attrs: &FileAttrs,
    ) -> Result<Id, Error> {
        self.send_request(constants::SSH_FXP_FSETSTAT, |buf| {
            codec::put_string(buf, handle)?;
            attrs.encode(buf);
            Ok(())
        })
    }

    pub fn send_readdir_request(&mut self, handle: &[u8]) -> Result<Id, Error> {
        self.send_path_request(constants::SSH_FXP_READDIR, handle)
    }

    pub fn send_remove_request(&mut self, path: &[u8]) -> Result<Id, Error> {
        self.send_path_request(constants::SSH_FXP_REMOVE, path)
    }

    pub fn send_mkdir_request(&mut self, path: &[u8], attrs: &FileAttrs) -> Result<Id, Error> {
        self.send_request(constants::SSH_FXP_MKDIR, |buf| {
            codec::put_string(buf, path)?;
            attrs.encode(buf);
            Ok(())
        })
    }

    pub fn send_rmdir_request(&mut self, path: &[u8]) -> Result<Id, Error> {
        self.send_path_request(constants::SSH_FXP_RMDIR, path)
    }

    pub fn send_realpath_request(&mut self, path: &[u8]) -> Result<Id, Error> {
        self.send_path_request(constants::SSH_FXP_REALPATH, path)
    }

    pub fn send_readlink_request(&mut self, path: &[u8]) -> Result<Id, Error> {
        self.send_path_request(constants::SSH_FXP_READLINK, path)
    }

    /// Rename `oldpath` to `newpath`.
    ///
    /// With [`RenameFlags::OVERWRITE`], `posix-rename@openssh.com` is used
    /// if the server supports it, otherwise the plain v3 rename is sent,
    /// which fails if `newpath` exists on most servers.
    pub fn send_rename_request(
        &mut self,
        oldpath: &[u8],
        newpath: &[u8],
        flags: RenameFlags,
    ) -> Result<Id, Error> {
        let f = |buf: &mut BytesMut| {
            codec::put_string(buf, oldpath)?;
            codec::put_string(buf, newpath)
        };

        if flags.contains(RenameFlags::OVERWRITE) && self.extensions().posix_rename {
            self.send_extended_request(constants::EXT_NAME_POSIX_RENAME, f)
        } else {
            self.send_request(constants::SSH_FXP_RENAME, f)
        }
    }

    /// Send `path` then `target`, in this order, as `SSH_FXP_SYMLINK`.
    pub fn send_symlink_request(&mut self, path: &[u8], target: &[u8]) -> Result<Id, Error> {
        self.send_request(constants::SSH_FXP_SYMLINK, |buf| {
            codec::put_string(buf, path)?;
            codec::put_string(buf, target)
        })
    }

    /// Requires `fsync@openssh.com`.
    pub fn send_fsync_request(&mut self, handle: &[u8]) -> Result<Id, Error> {
        if !self.extensions().fsync {
            return Err(Error::UnsupportedExtension(&constants::EXT_NAME_FSYNC));
        }

        self.send_extended_request(constants::EXT_NAME_FSYNC, |buf| {
            codec::put_string(buf, handle)
        })
    }

    /// Requires `hardlink@openssh.com`.
    pub fn send_hardlink_request(&mut self, oldpath: &[u8], newpath: &[u8]) -> Result<Id, Error> {
        if !self.extensions().hardlink {
            return Err(Error::UnsupportedExtension(&constants::EXT_NAME_HARDLINK));
        }

        self.send_extended_request(constants::EXT_NAME_HARDLINK, |buf| {
            codec::put_string(buf, oldpath)?;
            codec::put_string(buf, newpath)
        })
    }
}
