use super::constants;

/// Extensions advertised by the server in its version packet.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub struct Extensions {
    pub posix_rename: bool,
    pub fsync: bool,
    pub hardlink: bool,
}

impl Extensions {
    pub(crate) fn add(&mut self, name: &[u8], data: &[u8]) {
        // All supported extensions are at version "1".
        if data != b"1" {
            return;
        }

        if name == constants::EXT_NAME_POSIX_RENAME.as_bytes() {
            self.posix_rename = true;
        } else if name == constants::EXT_NAME_FSYNC.as_bytes() {
            self.fsync = true;
        } else if name == constants::EXT_NAME_HARDLINK.as_bytes() {
            self.hardlink = true;
        }
    }
}
