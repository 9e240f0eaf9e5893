use super::{Handle, Transport};
use crate::{DirEntry, Error};

use bytes::Bytes;

/// What [`Handle::read`] stops at.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ReadMode<'a> {
    /// Up to and including the next `\n`.
    #[default]
    Line,

    /// Up to and including the next occurrence of the separator.
    ///
    /// An empty separator reads to the end of the file.
    Separator(&'a [u8]),

    /// Exactly that many bytes, fewer at the end of the file.
    Bytes(usize),

    /// Everything left in the file.
    ToEnd,
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ReadOptions {
    /// Strip one trailing separator from the result.
    ///
    /// Ignored unless reading up to a separator.
    pub chomp: bool,
}

impl ReadOptions {
    pub const fn new() -> Self {
        Self { chomp: false }
    }

    #[must_use]
    pub const fn chomp(mut self, chomp: bool) -> Self {
        self.chomp = chomp;
        self
    }
}

#[derive(Debug, Copy, Clone)]
enum Until<'a> {
    Separator(&'a [u8]),
    Len(usize),
    Eof,
}

impl<'a> From<ReadMode<'a>> for Until<'a> {
    fn from(mode: ReadMode<'a>) -> Self {
        match mode {
            ReadMode::Line => Until::Separator(b"\n"),
            ReadMode::Separator(sep) if sep.is_empty() => Until::Eof,
            ReadMode::Separator(sep) => Until::Separator(sep),
            ReadMode::Bytes(len) => Until::Len(len),
            ReadMode::ToEnd => Until::Eof,
        }
    }
}

/// Position of the first `needle` in `haystack` starting at or after `from`.
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

impl<T: Transport> Handle<'_, T> {
    /// Read from the file.
    ///
    /// Bytes fetched past what `mode` asks for are kept and served by the
    /// next read, without another round trip.
    ///
    /// Return `None` once nothing is left, so that an empty line can be
    /// told apart from the end of the file.
    pub async fn read(
        &mut self,
        mode: ReadMode<'_>,
        options: ReadOptions,
    ) -> Result<Option<Bytes>, Error> {
        let handle = self.file_handle()?;
        let until = Until::from(mode);

        let session_options = self.session.options();
        let max_read_len = session_options.get_max_read_len();
        let line_read_len = session_options.get_line_read_len();

        // The buffer before `searched` is known to not hold the separator.
        let mut searched = 0;

        let data = loop {
            match until {
                Until::Separator(sep) => match find(&self.buffer, sep, searched) {
                    Some(pos) => break self.buffer.split_to(pos + sep.len()).freeze(),
                    None => searched = (self.buffer.len() + 1).saturating_sub(sep.len()),
                },
                Until::Len(len) if self.buffer.len() >= len => {
                    break self.buffer.split_to(len).freeze()
                }
                _ => (),
            }

            let len = match until {
                Until::Separator(_) => line_read_len,
                Until::Len(len) => (len - self.buffer.len()).min(max_read_len as usize) as u32,
                Until::Eof => max_read_len,
            };

            match self.read_chunk(&handle, len).await? {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => {
                    self.eof = true;
                    break self.buffer.split().freeze();
                }
            }
        };

        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(match until {
            Until::Separator(sep) if options.chomp && data.ends_with(sep) => {
                data.slice(..data.len() - sep.len())
            }
            _ => data,
        }))
    }

    /// Read the next line, `\n` included.
    pub async fn gets(&mut self) -> Result<Option<Bytes>, Error> {
        self.read(ReadMode::Line, ReadOptions::new()).await
    }

    /// Read the next line, without its `\n`.
    pub async fn read_line(&mut self) -> Result<Option<Bytes>, Error> {
        self.read(ReadMode::Line, ReadOptions::new().chomp(true))
            .await
    }

    /// Like [`Handle::gets`], but fail with [`Error::UnexpectedEof`] at
    /// the end of the file.
    pub async fn readline(&mut self) -> Result<Bytes, Error> {
        self.gets().await?.ok_or(Error::UnexpectedEof)
    }

    /// Read up to and including the next `sep`.
    pub async fn gets_with(
        &mut self,
        sep: &[u8],
        options: ReadOptions,
    ) -> Result<Option<Bytes>, Error> {
        self.read(ReadMode::Separator(sep), options).await
    }

    /// Read every remaining line, `\n` included.
    pub async fn readlines(&mut self) -> Result<Vec<Bytes>, Error> {
        let mut lines = Vec::new();
        while let Some(line) = self.gets().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Read `len` bytes, fewer at the end of the file.
    pub async fn read_bytes(&mut self, len: usize) -> Result<Option<Bytes>, Error> {
        self.read(ReadMode::Bytes(len), ReadOptions::new()).await
    }

    /// Read a single byte.
    pub async fn getc(&mut self) -> Result<Option<u8>, Error> {
        Ok(self.read_bytes(1).await?.and_then(|byte| byte.first().copied()))
    }

    /// Read everything left, empty at the end of the file.
    pub async fn read_to_end(&mut self) -> Result<Bytes, Error> {
        Ok(self
            .read(ReadMode::ToEnd, ReadOptions::new())
            .await?
            .unwrap_or_default())
    }

    /// Read the next entry of a directory.
    ///
    /// Return `None` once every entry was returned.
    pub async fn read_entry(&mut self) -> Result<Option<DirEntry>, Error> {
        let handle = self.dir_handle()?;

        loop {
            if let Some(entry) = self.entries.pop_front() {
                return Ok(Some(DirEntry::new(entry)));
            }
            if self.eof {
                return Ok(None);
            }

            let entries = self
                .session
                .request(
                    |conn| conn.send_readdir_request(&handle),
                    |conn, id| conn.poll_name_entries(id),
                )
                .await?;

            match entries {
                Some(entries) => self.entries.extend(entries),
                None => self.eof = true,
            }
        }
    }
}
