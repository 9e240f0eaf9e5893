use bitflags::bitflags;

bitflags! {
    /// `pflags` of `SSH_FXP_OPEN`.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct OpenFlags: u32 {
        const READ = 0x00000001;
        const WRITE = 0x00000002;
        const APPEND = 0x00000004;
        const CREATE = 0x00000008;
        const TRUNCATE = 0x00000010;
        const EXCLUSIVE = 0x00000020;
    }
}

bitflags! {
    /// Options for rename.
    ///
    /// Sftp v3 `SSH_FXP_RENAME` carries no flags, so only `OVERWRITE` changes
    /// what is sent: it selects `posix-rename@openssh.com` when the server
    /// supports it.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct RenameFlags: u32 {
        const OVERWRITE = 0x00000001;
        const ATOMIC = 0x00000002;
        const NATIVE = 0x00000004;
    }
}

impl Default for RenameFlags {
    fn default() -> Self {
        RenameFlags::all()
    }
}
