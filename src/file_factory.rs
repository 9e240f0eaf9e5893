use super::{Error, Handle, Session, Transport};

/// Opens remote files, created by [`Session::file`].
#[derive(Debug)]
pub struct FileFactory<'s, T: Transport>(&'s Session<T>);

impl<'s, T: Transport> FileFactory<'s, T> {
    pub(super) fn new(session: &'s Session<T>) -> Self {
        Self(session)
    }

    /// Open `path` as a file with [`Handle::open_file`].
    pub async fn open(
        &self,
        path: impl AsRef<[u8]>,
        mode: &str,
        create_mode: u32,
    ) -> Result<Handle<'s, T>, Error> {
        let mut handle = self.0.handle(path);
        handle.open_file(mode, create_mode).await?;
        Ok(handle)
    }

    /// Return whether `path` itself is a directory, symlinks are not
    /// followed.
    pub async fn is_directory(&self, path: impl AsRef<[u8]>) -> Result<Option<bool>, Error> {
        self.0.is_directory(path).await
    }
}
