#![forbid(unsafe_code)]

mod server;
pub use server::{MockServer, ServerExtensions};

use std::cell::{RefCell, RefMut};
use std::io::{self, ErrorKind, Read, Write};
use std::rc::Rc;

use ssh_sftp_client_lowlevel::Channel;

/// Channel calls that would block independently of each other.
#[derive(Debug, Clone, Copy)]
enum Op {
    Read,
    Write,
    Flush,
    Close,
}

#[derive(Debug, Default)]
struct Shared {
    server: MockServer,

    would_block: bool,
    ticks: [u64; 4],
    max_io_len: Option<usize>,
    failure: Option<ErrorKind>,

    close_calls: usize,
    closed: bool,
}

impl Shared {
    /// Every other call of each kind would block when enabled, so a
    /// write followed by a read still makes progress on the next try.
    fn check(&mut self, op: Op) -> io::Result<()> {
        if let Some(kind) = self.failure {
            return Err(io::Error::new(kind, "injected channel failure"));
        }

        if self.would_block {
            let tick = &mut self.ticks[op as usize];
            *tick += 1;
            if *tick % 2 == 1 {
                return Err(ErrorKind::WouldBlock.into());
            }
        }

        Ok(())
    }

    fn io_len(&self, len: usize) -> usize {
        self.max_io_len.map_or(len, |max| len.min(max))
    }
}

/// Controls an in-process sftp server and the channels connected to it.
#[derive(Debug, Clone, Default)]
pub struct MockSftp(Rc<RefCell<Shared>>);

impl MockSftp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions(extensions: ServerExtensions) -> Self {
        let mock = Self::default();
        mock.server().set_extensions(extensions);
        mock
    }

    /// Open a channel to a freshly started sftp subsystem.
    pub fn channel(&self) -> MockChannel {
        let mut shared = self.0.borrow_mut();
        shared.server.restart();
        shared.closed = false;

        MockChannel(self.0.clone())
    }

    /// Make every other read, write, flush and close fail with
    /// [`ErrorKind::WouldBlock`].
    pub fn set_would_block(&self, would_block: bool) {
        self.0.borrow_mut().would_block = would_block;
    }

    /// Limit the number of bytes moved by one read or write.
    pub fn set_max_io_len(&self, max_io_len: Option<usize>) {
        self.0.borrow_mut().max_io_len = max_io_len;
    }

    /// Make every channel call fail with `kind`.
    pub fn set_failure(&self, kind: Option<ErrorKind>) {
        self.0.borrow_mut().failure = kind;
    }

    pub fn server(&self) -> RefMut<'_, MockServer> {
        RefMut::map(self.0.borrow_mut(), |shared| &mut shared.server)
    }

    /// Number of successful [`Channel::close`].
    pub fn close_calls(&self) -> usize {
        self.0.borrow().close_calls
    }

    pub fn is_closed(&self) -> bool {
        self.0.borrow().closed
    }
}

/// Non-blocking channel to the server of a [`MockSftp`].
#[derive(Debug)]
pub struct MockChannel(Rc<RefCell<Shared>>);

impl Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.0.borrow_mut();
        shared.check(Op::Read)?;

        if shared.closed {
            return Ok(0);
        }
        if !shared.server.has_output() {
            return Err(ErrorKind::WouldBlock.into());
        }

        let len = shared.io_len(buf.len());
        Ok(shared.server.read_output(&mut buf[..len]))
    }
}

impl Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared = self.0.borrow_mut();
        shared.check(Op::Write)?;

        if shared.closed {
            return Err(ErrorKind::BrokenPipe.into());
        }

        let len = shared.io_len(buf.len());
        shared.server.write_input(&buf[..len]);
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().check(Op::Flush)
    }
}

impl Channel for MockChannel {
    fn close(&mut self) -> io::Result<()> {
        let mut shared = self.0.borrow_mut();
        shared.check(Op::Close)?;

        shared.close_calls += 1;
        shared.closed = true;
        Ok(())
    }
}
