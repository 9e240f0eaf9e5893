use super::{
    lowlevel::{Connection, Extensions, FileAttrs, HandleOwned, Id, Permissions, RenameFlags},
    Dir, Error, FileFactory, Handle, MetaData, SftpErrorKind, SftpOptions, Transport,
};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::task::Poll;

use bytes::Bytes;
use scopeguard::ScopeGuard;

type Conn<T> = Connection<<T as Transport>::Channel>;

/// Default mode of [`Session::mkdir`].
pub const DEFAULT_MKDIR_MODE: u32 = 0o733;

/// Sftp session over a [`Transport`].
///
/// The transport is shared, not owned: pass `&T`, `Rc<T>` or `Arc<T>` to
/// run several sessions over one ssh connection. The session is usable
/// only while the transport stays alive.
///
/// Requests are issued one at a time. A session and its handles are not
/// meant to be used from several tasks at once.
pub struct Session<T: Transport> {
    transport: T,
    options: SftpOptions,

    /// `Some` iff connected and not closed.
    conn: RefCell<Option<Conn<T>>>,

    /// Bumped on every successful connect, so that handles opened on a
    /// previous connection are never released through a new one.
    generation: Cell<u64>,
}

impl<T: Transport + fmt::Debug> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.transport)
            .field("options", &self.options)
            .field("connected", &self.is_connected())
            .field("generation", &self.generation.get())
            .finish()
    }
}

impl<T: Transport> Session<T> {
    /// Create an unconnected session.
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, SftpOptions::new())
    }

    pub fn with_options(transport: T, options: SftpOptions) -> Self {
        Self {
            transport,
            options,
            conn: RefCell::new(None),
            generation: Cell::new(0),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn options(&self) -> &SftpOptions {
        &self.options
    }

    /// Start the sftp subsystem.
    ///
    /// Does nothing if already connected.
    pub async fn connect(&self) -> Result<(), Error> {
        if self.is_connected() {
            return Ok(());
        }

        if !self.transport.is_alive() {
            return Err(Error::NotConnected);
        }
        if !self.transport.authenticated() {
            return Err(Error::NotAuthenticated);
        }

        let channel = loop {
            match self.transport.open_sftp_channel() {
                Ok(channel) => break channel,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.wait_until_ready().await?
                }
                Err(err) => return Err(self.transport_error(Some(err))),
            }
        };

        let mut conn = Connection::new(channel, self.options.get_channel_read_len());
        let _extensions = loop {
            match conn.poll_handshake() {
                Poll::Ready(res) => break res.map_err(|err| self.convert_error(err))?,
                Poll::Pending => self.wait_until_ready().await?,
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(extensions = ?_extensions, "sftp session established");

        // A concurrent connect may have won the race.
        let mut slot = self.conn.borrow_mut();
        if slot.is_none() {
            *slot = Some(conn);
            self.generation.set(self.generation.get().wrapping_add(1));
        }

        Ok(())
    }

    /// Shut the sftp subsystem down.
    ///
    /// Calling it again, or on a session that never connected, does
    /// nothing. If the transport is already gone, the channel went down
    /// with it and is not touched.
    pub async fn close(&self) -> Result<(), Error> {
        let Some(mut conn) = self.conn.borrow_mut().take() else {
            return Ok(());
        };

        loop {
            if !self.transport.is_alive() || !self.transport.initialized() {
                #[cfg(feature = "tracing")]
                tracing::debug!("transport is gone, skip closing the sftp channel");

                return Ok(());
            }

            match conn.poll_shutdown() {
                Poll::Ready(res) => return res.map_err(|err| self.convert_error(err)),
                Poll::Pending => self.wait_until_ready().await?,
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.conn
            .try_borrow()
            .map(|conn| conn.is_some())
            .unwrap_or(true)
    }

    /// Return `true` if never connected, closed, or the transport is gone.
    pub fn closed(&self) -> bool {
        !self.is_connected() || !self.transport.is_alive()
    }

    /// Most recent raw sftp status, `None` if not connected.
    pub fn last_error_code(&self) -> Option<u32> {
        self.conn
            .try_borrow()
            .ok()?
            .as_ref()
            .map(Connection::last_status)
    }

    /// Extensions supported by the server, `None` if not connected.
    pub fn extensions(&self) -> Option<Extensions> {
        self.conn
            .try_borrow()
            .ok()?
            .as_ref()
            .map(Connection::extensions)
    }

    pub(crate) fn generation(&self) -> Option<u64> {
        self.is_connected().then(|| self.generation.get())
    }

    fn transport_error(&self, source: Option<io::Error>) -> Error {
        Error::Transport {
            error: self.transport.last_error(),
            source,
        }
    }

    /// Channel failures are transport failures, report them with the
    /// transport's own description.
    fn convert_error(&self, err: Error) -> Error {
        match err {
            Error::IOError(err) => self.transport_error(Some(err)),
            err => err,
        }
    }

    async fn wait_until_ready(&self) -> Result<(), Error> {
        if self.transport.is_ready() {
            tokio::task::yield_now().await;
            Ok(())
        } else {
            self.transport
                .wait_until_ready()
                .await
                .map_err(|err| self.transport_error(Some(err)))
        }
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Conn<T>) -> Result<R, Error>,
    {
        if !self.transport.is_alive() {
            return Err(Error::NotConnected);
        }

        let mut conn = self.conn.borrow_mut();
        f(conn.as_mut().ok_or(Error::NotConnected)?)
    }

    fn discard(&self, id: Id) {
        if let Ok(mut conn) = self.conn.try_borrow_mut() {
            if let Some(conn) = conn.as_mut() {
                conn.discard(id);
            }
        }
    }

    /// Queue a request with `send`, then poll its response with `poll`,
    /// waiting for the transport whenever the channel would block.
    ///
    /// # Cancel Safety
    ///
    /// If the future is dropped, the response is discarded on arrival.
    pub(crate) async fn request<S, P, R>(&self, send: S, mut poll: P) -> Result<R, Error>
    where
        S: FnOnce(&mut Conn<T>) -> Result<Id, Error>,
        P: FnMut(&mut Conn<T>, Id) -> Poll<Result<R, Error>>,
    {
        let id = self.with_conn(send).map_err(|err| self.convert_error(err))?;
        let guard = scopeguard::guard(id, |id| self.discard(id));

        loop {
            match self.with_conn(|conn| Ok(poll(conn, *guard)))? {
                Poll::Ready(res) => {
                    ScopeGuard::into_inner(guard);
                    return res.map_err(|err| self.convert_error(err));
                }
                Poll::Pending => self.wait_until_ready().await?,
            }
        }
    }

    /// Queue `SSH_FXP_CLOSE` for a handle whose owner went away without
    /// closing it, and do not wait for the response.
    pub(crate) fn release_handle(&self, generation: u64, handle: &HandleOwned) {
        if self.generation() != Some(generation)
            || !self.transport.is_alive()
            || !self.transport.initialized()
        {
            return;
        }

        if let Ok(mut conn) = self.conn.try_borrow_mut() {
            if let Some(conn) = conn.as_mut() {
                match conn.send_close_request(handle) {
                    Ok(id) => {
                        conn.discard(id);
                        // Best effort, the rest goes out with the next request.
                        let _ = conn.poll_flush();
                    }
                    Err(_err) => {
                        #[cfg(feature = "tracing")]
                        tracing::error!(?_err, "failed to release sftp handle");
                    }
                }
            }
        }
    }

    /// Create an unopened [`Handle`] for `path`.
    pub fn handle(&self, path: impl AsRef<[u8]>) -> Handle<'_, T> {
        Handle::new(self, Bytes::copy_from_slice(path.as_ref()))
    }

    /// Return a factory opening remote files.
    pub fn file(&self) -> FileFactory<'_, T> {
        FileFactory::new(self)
    }

    /// Return a helper listing remote directories.
    pub fn dir(&self) -> Dir<'_, T> {
        Dir::new(self)
    }

    /// Return whether `path` exists.
    ///
    /// `Some(false)` if the server reports no such file, no such path or
    /// an invalid filename, `None` for any other status.
    pub async fn exist(&self, path: impl AsRef<[u8]>) -> Result<Option<bool>, Error> {
        match self.stat(path).await {
            Ok(_) => Ok(Some(true)),
            Err(Error::SftpError {
                kind: SftpErrorKind::Path(_),
                ..
            }) => Ok(Some(false)),
            Err(Error::SftpError { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Canonicalize `path`, resolving symlinks.
    pub async fn realpath(&self, path: impl AsRef<[u8]>) -> Result<Bytes, Error> {
        let path = path.as_ref();

        self.request(
            |conn| conn.send_realpath_request(path),
            |conn, id| conn.poll_path(id),
        )
        .await
    }

    /// Metadata of `path`, following symlinks.
    pub async fn stat(&self, path: impl AsRef<[u8]>) -> Result<MetaData, Error> {
        let path = path.as_ref();

        self.request(
            |conn| conn.send_stat_request(path),
            |conn, id| conn.poll_attrs(id),
        )
        .await
        .map(MetaData::new)
    }

    /// Metadata of `path` itself, without following symlinks.
    pub async fn lstat(&self, path: impl AsRef<[u8]>) -> Result<MetaData, Error> {
        let path = path.as_ref();

        self.request(
            |conn| conn.send_lstat_request(path),
            |conn, id| conn.poll_attrs(id),
        )
        .await
        .map(MetaData::new)
    }

    /// Metadata of an open handle.
    pub async fn fstat(&self, handle: &Handle<'_, T>) -> Result<MetaData, Error> {
        handle.stat().await
    }

    pub(crate) async fn fstat_raw(&self, handle: &HandleOwned) -> Result<FileAttrs, Error> {
        self.request(
            |conn| conn.send_fstat_request(handle),
            |conn, id| conn.poll_attrs(id),
        )
        .await
    }

    /// Apply the fields present in `metadata` to `path`.
    pub async fn setstat(&self, path: impl AsRef<[u8]>, metadata: MetaData) -> Result<(), Error> {
        let path = path.as_ref();
        let attrs = metadata.into_inner();

        self.request(
            |conn| conn.send_setstat_request(path, &attrs),
            |conn, id| conn.poll_status(id),
        )
        .await
    }

    /// Rename `src` to `dst`, overwriting `dst` if the server allows it.
    pub async fn rename(&self, src: impl AsRef<[u8]>, dst: impl AsRef<[u8]>) -> Result<(), Error> {
        self.rename_with_flags(src, dst, RenameFlags::default())
            .await
    }

    pub async fn rename_with_flags(
        &self,
        src: impl AsRef<[u8]>,
        dst: impl AsRef<[u8]>,
        flags: RenameFlags,
    ) -> Result<(), Error> {
        let (src, dst) = (src.as_ref(), dst.as_ref());

        self.request(
            |conn| conn.send_rename_request(src, dst, flags),
            |conn, id| conn.poll_status(id),
        )
        .await
    }

    /// Create a symlink at `target` pointing to `path`.
    pub async fn symlink(
        &self,
        path: impl AsRef<[u8]>,
        target: impl AsRef<[u8]>,
    ) -> Result<(), Error> {
        let (path, target) = (path.as_ref(), target.as_ref());

        self.request(
            |conn| conn.send_symlink_request(path, target),
            |conn, id| conn.poll_status(id),
        )
        .await
    }

    /// Read the target of a symlink.
    pub async fn readlink(&self, path: impl AsRef<[u8]>) -> Result<Bytes, Error> {
        let path = path.as_ref();

        self.request(
            |conn| conn.send_readlink_request(path),
            |conn, id| conn.poll_path(id),
        )
        .await
    }

    /// Create a hard link at `dst` to `src`.
    ///
    /// Requires `hardlink@openssh.com`.
    pub async fn hardlink(&self, src: impl AsRef<[u8]>, dst: impl AsRef<[u8]>) -> Result<(), Error> {
        let (src, dst) = (src.as_ref(), dst.as_ref());

        self.request(
            |conn| conn.send_hardlink_request(src, dst),
            |conn, id| conn.poll_status(id),
        )
        .await
    }

    /// Create a directory with [`DEFAULT_MKDIR_MODE`].
    pub async fn mkdir(&self, path: impl AsRef<[u8]>) -> Result<(), Error> {
        self.mkdir_with_mode(path, DEFAULT_MKDIR_MODE).await
    }

    pub async fn mkdir_with_mode(&self, path: impl AsRef<[u8]>, mode: u32) -> Result<(), Error> {
        let path = path.as_ref();

        let mut attrs = FileAttrs::new();
        attrs.set_permissions(Permissions::from_bits_truncate(mode));

        self.request(
            |conn| conn.send_mkdir_request(path, &attrs),
            |conn, id| conn.poll_status(id),
        )
        .await
    }

    pub async fn rmdir(&self, path: impl AsRef<[u8]>) -> Result<(), Error> {
        let path = path.as_ref();

        self.request(
            |conn| conn.send_rmdir_request(path),
            |conn, id| conn.poll_status(id),
        )
        .await
    }

    /// Remove a file.
    pub async fn delete(&self, path: impl AsRef<[u8]>) -> Result<(), Error> {
        let path = path.as_ref();

        self.request(
            |conn| conn.send_remove_request(path),
            |conn, id| conn.poll_status(id),
        )
        .await
    }

    /// Return whether `path` itself is a directory, without following
    /// symlinks. `None` if the server did not report the file type.
    pub async fn is_directory(&self, path: impl AsRef<[u8]>) -> Result<Option<bool>, Error> {
        self.lstat(path).await.map(|metadata| metadata.is_dir())
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.get_mut() else {
            return;
        };

        if !self.transport.is_alive() || !self.transport.initialized() {
            return;
        }

        // The channel is non-blocking, so this is a single attempt.
        if let Poll::Ready(Err(_err)) = conn.poll_shutdown() {
            #[cfg(feature = "tracing")]
            tracing::error!(?_err, "failed to close sftp channel");
        }
    }
}
