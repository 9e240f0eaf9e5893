use super::{
    lowlevel::NameEntry,
    metadata::{FileType, MetaData},
    Error, Handle, Session, Transport,
};

use bytes::Bytes;

/// Entries returned by [`Handle::read_entry`] and [`Dir`].
#[repr(transparent)]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DirEntry(NameEntry);

impl DirEntry {
    pub(super) fn new(entry: NameEntry) -> Self {
        Self(entry)
    }

    /// Return filename of the dir entry.
    pub fn filename(&self) -> &Bytes {
        &self.0.filename
    }

    /// Return the `ls -l` style line the server sent for the entry.
    pub fn longname(&self) -> &Bytes {
        &self.0.longname
    }

    /// Return metadata for the dir entry.
    pub fn metadata(&self) -> MetaData {
        MetaData::new(self.0.attrs)
    }

    /// Return the file type for the dir entry.
    pub fn file_type(&self) -> Option<FileType> {
        self.metadata().file_type()
    }

    pub fn into_inner(self) -> NameEntry {
        self.0
    }
}

/// Lists remote directories, created by [`Session::dir`].
#[derive(Debug)]
pub struct Dir<'s, T: Transport>(&'s Session<T>);

impl<'s, T: Transport> Dir<'s, T> {
    pub(super) fn new(session: &'s Session<T>) -> Self {
        Self(session)
    }

    /// Call `f` with every entry of the directory at `path`, until it
    /// returns `false`.
    ///
    /// The directory is closed before returning, also on error.
    pub async fn foreach<F>(&self, path: impl AsRef<[u8]>, mut f: F) -> Result<(), Error>
    where
        F: FnMut(DirEntry) -> bool,
    {
        let mut handle = self.0.handle(path);
        handle.open_dir().await?;

        let res = visit(&mut handle, &mut f).await;
        let close_res = handle.close().await;

        res.and(close_res)
    }

    /// Collect every entry of the directory at `path`, `.` and `..`
    /// included if the server returns them.
    pub async fn entries(&self, path: impl AsRef<[u8]>) -> Result<Vec<DirEntry>, Error> {
        let mut entries = Vec::new();
        self.foreach(path, |entry| {
            entries.push(entry);
            true
        })
        .await?;
        Ok(entries)
    }
}

async fn visit<T, F>(handle: &mut Handle<'_, T>, f: &mut F) -> Result<(), Error>
where
    T: Transport,
    F: FnMut(DirEntry) -> bool,
{
    while let Some(entry) = handle.read_entry().await? {
        if !f(entry) {
            break;
        }
    }
    Ok(())
}
