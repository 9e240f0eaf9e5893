use super::lowlevel;

use std::num::NonZeroU32;

/// Options when creating [`super::Session`].
#[derive(Debug, Copy, Clone, Default)]
pub struct SftpOptions {
    max_read_len: Option<NonZeroU32>,
    max_write_len: Option<NonZeroU32>,
    line_read_len: Option<NonZeroU32>,
}

impl SftpOptions {
    /// Create a new [`SftpOptions`].
    pub const fn new() -> Self {
        Self {
            max_read_len: None,
            max_write_len: None,
            line_read_len: None,
        }
    }

    /// Set `max_read_len`, the largest amount of data requested by one
    /// read when downloading or reading to the end of a file.
    ///
    /// Default value is 20480.
    #[must_use]
    pub const fn max_read_len(mut self, max_read_len: NonZeroU32) -> Self {
        self.max_read_len = Some(max_read_len);
        self
    }

    pub(super) fn get_max_read_len(&self) -> u32 {
        self.max_read_len
            .map(NonZeroU32::get)
            .unwrap_or(lowlevel::OPENSSH_PORTABLE_DEFAULT_DOWNLOAD_BUFLEN as u32)
    }

    /// Set `max_write_len`, the largest amount of data sent by one write
    /// request. Larger writes are split.
    ///
    /// Default value is 20480.
    #[must_use]
    pub const fn max_write_len(mut self, max_write_len: NonZeroU32) -> Self {
        self.max_write_len = Some(max_write_len);
        self
    }

    pub(super) fn get_max_write_len(&self) -> u32 {
        self.max_write_len
            .map(NonZeroU32::get)
            .unwrap_or(lowlevel::OPENSSH_PORTABLE_DEFAULT_UPLOAD_BUFLEN as u32)
    }

    /// Set `line_read_len`, the amount of data requested at a time while
    /// looking for a separator.
    ///
    /// Default value is 512.
    #[must_use]
    pub const fn line_read_len(mut self, line_read_len: NonZeroU32) -> Self {
        self.line_read_len = Some(line_read_len);
        self
    }

    pub(super) fn get_line_read_len(&self) -> u32 {
        self.line_read_len
            .map(NonZeroU32::get)
            .unwrap_or(lowlevel::OPENSSH_PORTABLE_MIN_READ_SIZE as u32)
    }

    /// Bytes read from the channel at a time, enough for one full
    /// data response.
    pub(super) fn get_channel_read_len(&self) -> usize {
        self.get_max_read_len().max(self.get_line_read_len()) as usize + 1024
    }
}
