use std::io;

/// Byte channel carrying the sftp subsystem.
///
/// The channel is non-blocking: `read`, `write`, `flush` and `close`
/// return [`io::ErrorKind::WouldBlock`] when no progress can be made
/// yet, and the caller retries once the transport is ready again.
pub trait Channel: io::Read + io::Write {
    /// Send EOF and close the channel.
    fn close(&mut self) -> io::Result<()>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}
