macro_rules! def_constants {
    ( $name:ident, $val:literal ) => {
        pub const $name: u8 = $val;
    };
}

// version
pub const SSH2_FILEXFER_VERSION: u32 = 3;

// client to server
def_constants!(SSH_FXP_INIT, 1);
def_constants!(SSH_FXP_OPEN, 3);
def_constants!(SSH_FXP_CLOSE, 4);
def_constants!(SSH_FXP_READ, 5);
def_constants!(SSH_FXP_WRITE, 6);
def_constants!(SSH_FXP_LSTAT, 7);
def_constants!(SSH_FXP_FSTAT, 8);
def_constants!(SSH_FXP_SETSTAT, 9);
def_constants!(SSH_FXP_FSETSTAT, 10);
def_constants!(SSH_FXP_OPENDIR, 11);
def_constants!(SSH_FXP_READDIR, 12);
def_constants!(SSH_FXP_REMOVE, 13);
def_constants!(SSH_FXP_MKDIR, 14);
def_constants!(SSH_FXP_RMDIR, 15);
def_constants!(SSH_FXP_REALPATH, 16);
def_constants!(SSH_FXP_STAT, 17);
def_constants!(SSH_FXP_RENAME, 18);
def_constants!(SSH_FXP_READLINK, 19);
def_constants!(SSH_FXP_SYMLINK, 20);

// server to client
def_constants!(SSH_FXP_VERSION, 2);
def_constants!(SSH_FXP_STATUS, 101);
def_constants!(SSH_FXP_HANDLE, 102);
def_constants!(SSH_FXP_DATA, 103);
def_constants!(SSH_FXP_NAME, 104);
def_constants!(SSH_FXP_ATTRS, 105);

def_constants!(SSH_FXP_EXTENDED, 200);
def_constants!(SSH_FXP_EXTENDED_REPLY, 201);

// attributes
pub const SSH_FILEXFER_ATTR_SIZE: u32 = 0x00000001;
pub const SSH_FILEXFER_ATTR_UIDGID: u32 = 0x00000002;
pub const SSH_FILEXFER_ATTR_PERMISSIONS: u32 = 0x00000004;
pub const SSH_FILEXFER_ATTR_ACMODTIME: u32 = 0x00000008;
pub const SSH_FILEXFER_ATTR_EXTENDED: u32 = 0x80000000;

// extensions
pub const EXT_NAME_POSIX_RENAME: &str = "posix-rename@openssh.com";
pub const EXT_NAME_FSYNC: &str = "fsync@openssh.com";
pub const EXT_NAME_HARDLINK: &str = "hardlink@openssh.com";

/// Maximum length of a handle in sftp v3.
pub const MAX_HANDLE_LEN: usize = 256;

/// Largest packet accepted from the server.
pub const MAX_PACKET_LEN: u32 = 256 * 1024;

/// Smallest chunk read from the channel at a time.
pub const MIN_CHANNEL_READ_LEN: usize = 4096;
