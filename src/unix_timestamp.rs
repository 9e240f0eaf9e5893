use std::time::{Duration, SystemTime};

/// Default value is 1970-01-01 00:00:00 UTC.
///
/// UnixTimeStamp stores number of seconds elapsed since 1970-01-01 00:00:00 UTC
/// as `u32`, the resolution of sftp v3.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct UnixTimeStamp(u32);

impl UnixTimeStamp {
    /// Create new unix timestamp from `system_time`.
    ///
    /// Return `None` if `system_time` is before the epoch or too far in the
    /// future to fit in `u32`.
    pub fn new(system_time: SystemTime) -> Option<Self> {
        let elapsed = system_time.duration_since(SystemTime::UNIX_EPOCH).ok()?;
        elapsed.as_secs().try_into().ok().map(Self)
    }

    /// Return unix epoch, same as [`UnixTimeStamp::default`]
    pub const fn unix_epoch() -> Self {
        Self(0)
    }

    pub const fn from_raw(elapsed: u32) -> Self {
        Self(elapsed)
    }

    /// Into `u32` which is used to internally store the timestamp in seconds.
    pub const fn into_raw(self) -> u32 {
        self.0
    }

    /// Convert timestamp to [`Duration`].
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0.into())
    }

    /// Convert timestamp back to [`SystemTime`].
    pub fn as_system_time(self) -> SystemTime {
        SystemTime::UNIX_EPOCH + self.as_duration()
    }
}
