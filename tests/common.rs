#![allow(dead_code)]

use ssh_sftp_client::{Session, SftpOptions, Transport, TransportError};

use std::cell::Cell;
use std::io;
use std::num::NonZeroU32;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::rc::Rc;
use std::task::{Context, Poll};

pub use sftp_test_common::{MockChannel, MockSftp};
pub use tempfile::TempDir;

pub const TRANSPORT_ERROR_CODE: i32 = -43;
pub const TRANSPORT_ERROR_MSG: &str = "Unable to startup channel";

/// Waits allowed per transport before a retry loop is considered stuck.
pub const MAX_READY_WAITS: usize = 100_000;

/// Transport over a [`MockSftp`], with every flag switchable from tests.
#[derive(Debug)]
pub struct MockTransport {
    pub sftp: MockSftp,

    alive: Cell<bool>,
    authenticated: Cell<bool>,
    initialized: Cell<bool>,

    /// Number of `open_sftp_channel` calls still failing with `WouldBlock`.
    channel_would_block: Cell<usize>,
    channel_error: Cell<bool>,

    ready_waits: Cell<usize>,
    channels_opened: Cell<usize>,
}

impl MockTransport {
    pub fn new(sftp: MockSftp) -> Self {
        Self {
            sftp,
            alive: Cell::new(true),
            authenticated: Cell::new(true),
            initialized: Cell::new(true),
            channel_would_block: Cell::new(0),
            channel_error: Cell::new(false),
            ready_waits: Cell::new(0),
            channels_opened: Cell::new(0),
        }
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.set(alive);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.set(authenticated);
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.set(initialized);
    }

    pub fn set_channel_would_block(&self, times: usize) {
        self.channel_would_block.set(times);
    }

    pub fn set_channel_error(&self, error: bool) {
        self.channel_error.set(error);
    }

    pub fn ready_waits(&self) -> usize {
        self.ready_waits.get()
    }

    pub fn channels_opened(&self) -> usize {
        self.channels_opened.get()
    }
}

impl Transport for MockTransport {
    type Channel = MockChannel;

    fn is_alive(&self) -> bool {
        self.alive.get()
    }

    fn initialized(&self) -> bool {
        self.initialized.get()
    }

    fn authenticated(&self) -> bool {
        self.authenticated.get()
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn poll_ready(&self, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let waits = self.ready_waits.get() + 1;
        assert!(
            waits <= MAX_READY_WAITS,
            "transport waited {waits} times, request never completed"
        );

        self.ready_waits.set(waits);
        Poll::Ready(Ok(()))
    }

    fn last_error(&self) -> TransportError {
        TransportError::new(TRANSPORT_ERROR_CODE, TRANSPORT_ERROR_MSG)
    }

    fn open_sftp_channel(&self) -> io::Result<MockChannel> {
        if self.channel_error.get() {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "channel request rejected",
            ));
        }

        let would_block = self.channel_would_block.get();
        if would_block > 0 {
            self.channel_would_block.set(would_block - 1);
            return Err(io::ErrorKind::WouldBlock.into());
        }

        self.channels_opened.set(self.channels_opened.get() + 1);
        Ok(self.sftp.channel())
    }
}

pub type TestSession = Session<Rc<MockTransport>>;

/// Unconnected session whose channel would block on every other call.
pub fn session() -> (Rc<MockTransport>, TestSession) {
    session_with(MockSftp::new(), SftpOptions::new())
}

pub fn session_with(sftp: MockSftp, options: SftpOptions) -> (Rc<MockTransport>, TestSession) {
    sftp.set_would_block(true);

    let transport = Rc::new(MockTransport::new(sftp));
    let session = Session::with_options(transport.clone(), options);
    (transport, session)
}

pub async fn connected() -> (Rc<MockTransport>, TestSession) {
    connected_with(SftpOptions::new()).await
}

pub async fn connected_with(options: SftpOptions) -> (Rc<MockTransport>, TestSession) {
    let (transport, session) = session_with(MockSftp::new(), options);
    session.connect().await.unwrap();
    (transport, session)
}

/// Options small enough for every read and write to take several
/// requests.
pub fn small_io() -> SftpOptions {
    SftpOptions::new()
        .max_read_len(NonZeroU32::new(5).unwrap())
        .max_write_len(NonZeroU32::new(7).unwrap())
        .line_read_len(NonZeroU32::new(3).unwrap())
}

pub fn bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_bytes()
}

pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}
