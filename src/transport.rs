use super::{lowlevel, TransportError};

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Authenticated ssh connection the sftp subsystem runs on.
///
/// Establishing and authenticating the connection is up to the
/// implementation; [`super::Session`] only consumes it.
pub trait Transport {
    /// Channel carrying the sftp subsystem.
    type Channel: lowlevel::Channel;

    /// Return `false` once the connection is gone.
    ///
    /// Nothing is ever sent through a dead transport, including the
    /// release of handles and of the sftp channel.
    fn is_alive(&self) -> bool;

    /// Process-wide flag of the underlying ssh library.
    ///
    /// No teardown is attempted once the library is shut down.
    fn initialized(&self) -> bool {
        true
    }

    fn authenticated(&self) -> bool;

    /// Return `true` if the socket is readable or writable right now.
    fn is_ready(&self) -> bool;

    /// Wait until the socket becomes readable or writable.
    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>>;

    /// Code and description of the last transport level failure.
    fn last_error(&self) -> TransportError;

    /// Start the sftp subsystem on a new channel.
    ///
    /// [`io::ErrorKind::WouldBlock`] means try again once ready.
    fn open_sftp_channel(&self) -> io::Result<Self::Channel>;

    fn wait_until_ready(&self) -> WaitUntilReady<'_, Self> {
        WaitUntilReady(self)
    }
}

/// Future returned by [`Transport::wait_until_ready`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct WaitUntilReady<'a, T: ?Sized>(&'a T);

impl<T: Transport + ?Sized> Future for WaitUntilReady<'_, T> {
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.poll_ready(cx)
    }
}

macro_rules! impl_transport_for_pointer {
    ($( $ptr:ty ),*) => {
        $(
            impl<T: Transport + ?Sized> Transport for $ptr {
                type Channel = T::Channel;

                fn is_alive(&self) -> bool {
                    (**self).is_alive()
                }

                fn initialized(&self) -> bool {
                    (**self).initialized()
                }

                fn authenticated(&self) -> bool {
                    (**self).authenticated()
                }

                fn is_ready(&self) -> bool {
                    (**self).is_ready()
                }

                fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
                    (**self).poll_ready(cx)
                }

                fn last_error(&self) -> TransportError {
                    (**self).last_error()
                }

                fn open_sftp_channel(&self) -> io::Result<Self::Channel> {
                    (**self).open_sftp_channel()
                }
            }
        )*
    };
}

impl_transport_for_pointer!(&T, Rc<T>, Arc<T>);
