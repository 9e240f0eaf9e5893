use super::{
    lowlevel::{FileAttrs, HandleOwned, NameEntry, Permissions},
    open_mode::parse_open_mode,
    Error, MetaData, Session, Transport,
};

use std::collections::VecDeque;
use std::mem;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

mod read;
pub use read::{ReadMode, ReadOptions};

/// Default `perm` of [`Handle::open`].
pub const DEFAULT_OPEN_PERM: u32 = 0o644;

/// What an open [`Handle`] refers to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HandleKind {
    File,
    Directory,
}

/// Reference point of [`Handle::seek`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Whence {
    /// From the start of the file.
    #[default]
    Set,
    /// From the protocol cursor.
    Cur,
    /// From the end of the file, as reported by a fresh `fstat`.
    End,
}

#[derive(Debug)]
enum State {
    Unopened,
    Open {
        handle: HandleOwned,
        kind: HandleKind,
        /// Generation of the session connection the handle belongs to.
        generation: u64,
    },
    Closed,
}

/// A remote file or directory.
///
/// A handle starts unopened, is opened at most once with one of the
/// `open*` methods and is then closed, either explicitly with
/// [`Handle::close`] or on drop. A closed handle cannot be re-opened.
#[derive(Debug)]
pub struct Handle<'s, T: Transport> {
    session: &'s Session<T>,
    path: Bytes,
    state: State,

    /// Protocol cursor, including the bytes sitting in `buffer`.
    offset: u64,
    eof: bool,

    /// Read-ahead of file handles.
    buffer: BytesMut,
    /// Read-ahead of directory handles.
    entries: VecDeque<NameEntry>,
}

impl<'s, T: Transport> Handle<'s, T> {
    pub(super) fn new(session: &'s Session<T>, path: Bytes) -> Self {
        Self {
            session,
            path,
            state: State::Unopened,
            offset: 0,
            eof: false,
            buffer: BytesMut::new(),
            entries: VecDeque::new(),
        }
    }

    /// Return the underlying session.
    pub fn session(&self) -> &'s Session<T> {
        self.session
    }

    /// Path the handle was created for.
    pub fn path(&self) -> &[u8] {
        &self.path
    }

    /// `None` unless open.
    pub fn kind(&self) -> Option<HandleKind> {
        match &self.state {
            State::Open { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Return `true` if never opened, closed, or the session it was opened
    /// on is gone.
    pub fn closed(&self) -> bool {
        match &self.state {
            State::Open { generation, .. } => {
                self.session.closed() || self.session.generation() != Some(*generation)
            }
            _ => true,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed()
    }

    fn check_openable(&self) -> Result<bool, Error> {
        match self.state {
            State::Unopened => Ok(true),
            State::Open { .. } => Ok(false),
            State::Closed => Err(Error::HandleClosed),
        }
    }

    fn set_open(&mut self, handle: HandleOwned, kind: HandleKind, generation: u64) {
        self.state = State::Open {
            handle,
            kind,
            generation,
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(path = ?self.path, ?kind, "sftp handle opened");
    }

    /// Open the path as a directory.
    ///
    /// Does nothing if already open.
    pub async fn open_dir(&mut self) -> Result<(), Error> {
        if !self.check_openable()? {
            return Ok(());
        }

        let generation = self.session.generation().ok_or(Error::NotConnected)?;
        let path = &self.path;

        let handle = self
            .session
            .request(
                |conn| conn.send_opendir_request(path),
                |conn, id| conn.poll_handle(id),
            )
            .await?;

        self.set_open(handle, HandleKind::Directory, generation);
        Ok(())
    }

    /// Open the path as a file.
    ///
    /// `mode` is one of `"" "r" "r+" "w" "w+" "a" "a+"`, with the meaning
    /// they have for `fopen`. `create_mode` are the permissions of a newly
    /// created file, `0` leaves them to the server.
    ///
    /// Does nothing if already open.
    pub async fn open_file(&mut self, mode: &str, create_mode: u32) -> Result<(), Error> {
        if !self.check_openable()? {
            return Ok(());
        }

        let flags = parse_open_mode(mode)?;
        let generation = self.session.generation().ok_or(Error::NotConnected)?;

        let mut attrs = FileAttrs::new();
        if create_mode != 0 {
            attrs.set_permissions(Permissions::from_bits_truncate(create_mode));
        }

        let path = &self.path;
        let handle = self
            .session
            .request(
                |conn| conn.send_open_request(path, flags, &attrs),
                |conn, id| conn.poll_handle(id),
            )
            .await?;

        self.set_open(handle, HandleKind::File, generation);
        Ok(())
    }

    /// Stat the path, then open it as a directory or a file.
    ///
    /// Anything but directories and regular files is rejected with
    /// [`Error::NotAFile`].
    pub async fn open(&mut self, mode: &str, perm: u32) -> Result<(), Error> {
        if !self.check_openable()? {
            return Ok(());
        }

        match self.session.stat(&self.path).await?.file_type() {
            Some(ty) if ty.is_dir() => self.open_dir().await,
            Some(ty) if ty.is_file() => self.open_file(mode, perm).await,
            _ => Err(Error::NotAFile),
        }
    }

    fn opened(&self) -> Result<(HandleOwned, HandleKind), Error> {
        match &self.state {
            State::Open {
                handle,
                kind,
                generation,
            } => {
                if self.session.generation() != Some(*generation) {
                    Err(Error::NotConnected)
                } else {
                    Ok((handle.clone(), *kind))
                }
            }
            _ => Err(Error::HandleNotOpened),
        }
    }

    fn file_handle(&self) -> Result<HandleOwned, Error> {
        match self.opened()? {
            (handle, HandleKind::File) => Ok(handle),
            (_, HandleKind::Directory) => Err(Error::NotAFile),
        }
    }

    fn dir_handle(&self) -> Result<HandleOwned, Error> {
        match self.opened()? {
            (handle, HandleKind::Directory) => Ok(handle),
            (_, HandleKind::File) => Err(Error::NotADirectory),
        }
    }

    /// Put the read-ahead back, so that the protocol cursor is where the
    /// caller thinks it is.
    fn discard_buffer(&mut self) {
        self.offset -= self.buffer.len() as u64;
        self.buffer.clear();
    }

    /// Position consumed by the caller: the protocol cursor minus the
    /// read-ahead not handed out yet.
    pub fn tell(&self) -> Result<u64, Error> {
        self.opened()?;
        Ok(self.offset - self.buffer.len() as u64)
    }

    /// Same as [`Handle::tell`].
    pub fn pos(&self) -> Result<u64, Error> {
        self.tell()
    }

    /// Move the cursor and return the new position.
    ///
    /// [`Whence::Cur`] is relative to the protocol cursor, read-ahead
    /// included. Negative results are clamped to `0`.
    ///
    /// Clears the end of file flag and drops the read-ahead.
    pub async fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, Error> {
        let (handle, _kind) = self.opened()?;

        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.offset,
            Whence::End => self.session.fstat_raw(&handle).await?.get_size().unwrap_or(0),
        };

        let pos = i128::from(base) + i128::from(offset);
        self.offset = pos.clamp(0, u64::MAX.into()).try_into().unwrap_or(u64::MAX);

        self.eof = false;
        self.buffer.clear();
        self.entries.clear();

        Ok(self.offset)
    }

    /// Positions to the beginning of input.
    pub async fn rewind(&mut self) -> Result<(), Error> {
        self.seek(0, Whence::Set).await.map(drop)
    }

    /// Negative `pos` is relative to the end of the file.
    pub async fn set_pos(&mut self, pos: i64) -> Result<u64, Error> {
        let whence = if pos < 0 { Whence::End } else { Whence::Set };
        self.seek(pos, whence).await
    }

    /// Return `true` once a read hit the end of the file or directory.
    pub fn eof(&self) -> Result<bool, Error> {
        self.opened()?;
        Ok(self.eof)
    }

    /// Metadata of the open file or directory.
    pub async fn stat(&self) -> Result<MetaData, Error> {
        let (handle, _kind) = self.opened()?;
        self.session.fstat_raw(&handle).await.map(MetaData::new)
    }

    /// Apply the fields present in `metadata`.
    pub async fn setstat(&self, metadata: MetaData) -> Result<(), Error> {
        let (handle, _kind) = self.opened()?;
        let attrs = metadata.into_inner();

        self.session
            .request(
                |conn| conn.send_fsetstat_request(&handle, &attrs),
                |conn, id| conn.poll_status(id),
            )
            .await
    }

    /// Flush the remote file to disk.
    ///
    /// Requires `fsync@openssh.com`. Clears the end of file flag and
    /// drops the read-ahead.
    pub async fn sync(&mut self) -> Result<(), Error> {
        let handle = self.file_handle()?;

        self.session
            .request(
                |conn| conn.send_fsync_request(&handle),
                |conn, id| conn.poll_status(id),
            )
            .await?;

        self.discard_buffer();
        self.eof = false;

        Ok(())
    }

    /// Write `data` at the current position, splitting it into requests
    /// of at most `max_write_len` bytes.
    ///
    /// Return how far the position advanced.
    pub async fn write(&mut self, data: &[u8]) -> Result<u64, Error> {
        let handle = self.file_handle()?;
        let max_write_len = self.session.options().get_max_write_len() as usize;

        self.discard_buffer();
        let before = self.offset;

        for chunk in data.chunks(max_write_len) {
            let offset = self.offset;

            self.session
                .request(
                    |conn| conn.send_write_request(&handle, offset, chunk),
                    |conn, id| conn.poll_status(id),
                )
                .await?;

            self.offset += chunk.len() as u64;
        }

        Ok(self.offset - before)
    }

    /// Issue one read of up to `len` bytes at the protocol cursor.
    ///
    /// `None` on end of file.
    async fn read_chunk(&mut self, handle: &HandleOwned, len: u32) -> Result<Option<Bytes>, Error> {
        let offset = self.offset;

        let data = self
            .session
            .request(
                |conn| conn.send_read_request(handle, offset, len),
                |conn, id| conn.poll_data(id),
            )
            .await?;

        Ok(match data {
            Some(data) if !data.is_empty() => {
                self.offset += data.len() as u64;
                Some(data)
            }
            _ => None,
        })
    }

    /// Copy the whole remote file into `local_path`, truncating it.
    ///
    /// Return the number of bytes copied.
    pub async fn download(&mut self, local_path: impl AsRef<Path>) -> Result<u64, Error> {
        let handle = self.file_handle()?;
        let max_read_len = self.session.options().get_max_read_len();

        self.rewind().await?;

        let mut local = tokio::fs::File::create(local_path).await?;
        let mut copied = 0;

        while let Some(data) = self.read_chunk(&handle, max_read_len).await? {
            local.write_all(&data).await?;
            copied += data.len() as u64;
        }
        self.eof = true;

        local.flush().await?;

        Ok(copied)
    }

    /// Overwrite the remote file with the content of `local_path`, starting
    /// from its beginning. The remote file is truncated to the copied
    /// length.
    ///
    /// Return the number of bytes copied.
    pub async fn upload(&mut self, local_path: impl AsRef<Path>) -> Result<u64, Error> {
        let handle = self.file_handle()?;
        let max_write_len = self.session.options().get_max_write_len() as usize;

        self.rewind().await?;

        let mut local = tokio::fs::File::open(local_path).await?;
        let mut buffer = vec![0; max_write_len];
        let mut copied = 0;

        loop {
            let n = local.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            copied += self.write(&buffer[..n]).await?;
        }

        let mut attrs = FileAttrs::new();
        attrs.set_size(copied);

        self.session
            .request(
                |conn| conn.send_fsetstat_request(&handle, &attrs),
                |conn, id| conn.poll_status(id),
            )
            .await?;

        Ok(copied)
    }

    /// Release the remote handle.
    ///
    /// Calling it again, or on a handle never opened, does nothing. Nothing
    /// is sent if the session the handle was opened on is gone.
    pub async fn close(&mut self) -> Result<(), Error> {
        let state = mem::replace(&mut self.state, State::Closed);

        self.offset = 0;
        self.eof = false;
        self.buffer.clear();
        self.entries.clear();

        let State::Open {
            handle, generation, ..
        } = state
        else {
            return Ok(());
        };

        let transport = self.session.transport();
        if self.session.generation() != Some(generation)
            || !transport.is_alive()
            || !transport.initialized()
        {
            return Ok(());
        }

        self.session
            .request(
                |conn| conn.send_close_request(&handle),
                |conn, id| conn.poll_status(id),
            )
            .await
    }
}

impl<T: Transport> Drop for Handle<'_, T> {
    fn drop(&mut self) {
        if let State::Open {
            handle, generation, ..
        } = &self.state
        {
            self.session.release_handle(*generation, handle);
        }
    }
}

