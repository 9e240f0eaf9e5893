use super::{
    lowlevel::{FileAttrs, FileType as SftpFileType, Permissions as SftpPermissions},
    UnixTimeStamp,
};

use std::collections::BTreeMap;

/// Builder of [`MetaData`].
#[derive(Debug, Default, Copy, Clone)]
pub struct MetaDataBuilder(FileAttrs);

impl MetaDataBuilder {
    /// Create a builder.
    pub const fn new() -> Self {
        Self(FileAttrs::new())
    }

    /// Reset builder back to default.
    pub fn reset(&mut self) -> &mut Self {
        self.0 = FileAttrs::new();
        self
    }

    /// Set id of the metadata to be built.
    pub fn id(&mut self, (uid, gid): (u32, u32)) -> &mut Self {
        self.0.set_id(uid, gid);
        self
    }

    /// Set permissions of the metadata to be built.
    pub fn permissions(&mut self, perm: Permissions) -> &mut Self {
        self.0.set_permissions(perm.0);
        self
    }

    /// Set the raw mode, file type bits included.
    pub fn mode(&mut self, mode: u32) -> &mut Self {
        self.0.set_mode(mode);
        self
    }

    /// Set size of the metadata to built.
    pub fn len(&mut self, len: u64) -> &mut Self {
        self.0.set_size(len);
        self
    }

    /// Set accessed and modified time of the metadata to be built.
    pub fn time(&mut self, accessed: UnixTimeStamp, modified: UnixTimeStamp) -> &mut Self {
        self.0.set_time(accessed.into_raw(), modified.into_raw());
        self
    }

    /// Create a [`MetaData`].
    pub fn create(&self) -> MetaData {
        MetaData::new(self.0)
    }
}

/// Metadata information about a file.
///
/// Fields the server did not send are reported as `None`, never as zero.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct MetaData(FileAttrs);

#[allow(clippy::len_without_is_empty)]
impl MetaData {
    pub(super) fn new(attrs: FileAttrs) -> Self {
        Self(attrs)
    }

    pub(super) fn into_inner(self) -> FileAttrs {
        self.0
    }

    /// Build from a map with keys `atime`, `mtime`, `size`, `uid`, `gid`
    /// and `mode`. Other keys are ignored.
    ///
    /// `atime`/`mtime` and `uid`/`gid` are sent in pairs: if only one half
    /// of a pair is given, the other half is set to 0.
    ///
    /// Times, ids and `mode` are 32 bits wide in sftp v3. A value that does
    /// not fit is skipped as if its key were absent.
    pub fn from_map<'a, I>(map: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut atime = None;
        let mut mtime = None;
        let mut uid = None;
        let mut gid = None;
        let mut attrs = FileAttrs::new();

        for (key, value) in map {
            if key == "size" {
                attrs.set_size(value);
                continue;
            }

            let Ok(narrow) = u32::try_from(value) else {
                continue;
            };

            match key {
                "atime" => atime = Some(narrow),
                "mtime" => mtime = Some(narrow),
                "uid" => uid = Some(narrow),
                "gid" => gid = Some(narrow),
                "mode" => attrs.set_mode(narrow),
                _ => (),
            }
        }

        if atime.is_some() || mtime.is_some() {
            attrs.set_time(atime.unwrap_or(0), mtime.unwrap_or(0));
        }
        if uid.is_some() || gid.is_some() {
            attrs.set_id(uid.unwrap_or(0), gid.unwrap_or(0));
        }

        Self(attrs)
    }

    /// Convert into a map containing only the fields that are present.
    pub fn to_map(&self) -> BTreeMap<&'static str, u64> {
        let mut map = BTreeMap::new();

        if let Some((atime, mtime)) = self.0.get_time() {
            map.insert("atime", atime.into());
            map.insert("mtime", mtime.into());
        }
        if let Some(size) = self.0.get_size() {
            map.insert("size", size);
        }
        if let Some((uid, gid)) = self.0.get_id() {
            map.insert("uid", uid.into());
            map.insert("gid", gid.into());
        }
        if let Some(mode) = self.0.get_mode() {
            map.insert("mode", mode.into());
        }

        map
    }

    /// Returns the size of the file in bytes.
    ///
    /// Return `None` if the server did not return
    /// the size.
    pub fn len(&self) -> Option<u64> {
        self.0.get_size()
    }

    /// Returns `true` if the size is unknown or 0.
    pub fn is_zero(&self) -> bool {
        self.len().unwrap_or(0) == 0
    }

    /// Returns the user ID of the owner.
    ///
    /// Return `None` if the server did not return
    /// the uid.
    pub fn uid(&self) -> Option<u32> {
        self.0.get_id().map(|(uid, _gid)| uid)
    }

    /// Returns the group ID of the owner.
    ///
    /// Return `None` if the server did not return
    /// the gid.
    pub fn gid(&self) -> Option<u32> {
        self.0.get_id().map(|(_uid, gid)| gid)
    }

    /// Returns the raw mode, including the file type bits.
    pub fn mode(&self) -> Option<u32> {
        self.0.get_mode()
    }

    /// Returns the permissions.
    ///
    /// Return `None` if the server did not return
    /// the permissions.
    pub fn permissions(&self) -> Option<Permissions> {
        self.0.get_permissions().map(Permissions)
    }

    /// Returns the file type.
    ///
    /// Return `None` if the server did not return
    /// the file type.
    pub fn file_type(&self) -> Option<FileType> {
        self.0.get_filetype().map(FileType)
    }

    /// `None` if the file type is unknown.
    pub fn is_dir(&self) -> Option<bool> {
        self.file_type().map(|file_type| file_type.is_dir())
    }

    /// `None` if the file type is unknown.
    pub fn is_file(&self) -> Option<bool> {
        self.file_type().map(|file_type| file_type.is_file())
    }

    /// `None` if the file type is unknown.
    pub fn is_symlink(&self) -> Option<bool> {
        self.file_type().map(|file_type| file_type.is_symlink())
    }

    /// Returns the last access time.
    ///
    /// Return `None` if the server did not return
    /// the last access time.
    pub fn accessed(&self) -> Option<UnixTimeStamp> {
        self.0
            .get_time()
            .map(|(atime, _mtime)| UnixTimeStamp::from_raw(atime))
    }

    /// Returns the last modification time.
    ///
    /// Return `None` if the server did not return
    /// the last modification time.
    pub fn modified(&self) -> Option<UnixTimeStamp> {
        self.0
            .get_time()
            .map(|(_atime, mtime)| UnixTimeStamp::from_raw(mtime))
    }
}

/// A structure representing a type of file with accessors for each file type.
/// It is returned by [`MetaData::file_type`] method.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FileType(SftpFileType);

impl FileType {
    /// Tests whether this file type represents a directory.
    pub fn is_dir(&self) -> bool {
        self.0 == SftpFileType::Directory
    }

    /// Tests whether this file type represents a regular file.
    pub fn is_file(&self) -> bool {
        self.0 == SftpFileType::RegularFile
    }

    /// Tests whether this file type represents a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.0 == SftpFileType::Symlink
    }

    /// Tests whether this file type represents a fifo.
    pub fn is_fifo(&self) -> bool {
        self.0 == SftpFileType::FIFO
    }

    /// Tests whether this file type represents a socket.
    pub fn is_socket(&self) -> bool {
        self.0 == SftpFileType::Socket
    }

    /// Tests whether this file type represents a block device.
    pub fn is_block_device(&self) -> bool {
        self.0 == SftpFileType::BlockDevice
    }

    /// Tests whether this file type represents a character device.
    pub fn is_char_device(&self) -> bool {
        self.0 == SftpFileType::CharacterDevice
    }
}

/// Representation of the various permissions on a file.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Permissions(SftpPermissions);

macro_rules! impl_getter_setter {
    ($getter_name:ident, $setter_name:ident, $variant:ident, $variant_name:expr) => {
        #[doc = "Tests whether "]
        #[doc = $variant_name]
        #[doc = " bit is set."]
        pub fn $getter_name(&self) -> bool {
            self.0.intersects(SftpPermissions::$variant)
        }

        #[doc = "Modify the "]
        #[doc = $variant_name]
        #[doc = " bit."]
        pub fn $setter_name(&mut self, value: bool) -> &mut Self {
            self.0.set(SftpPermissions::$variant, value);
            self
        }
    };
}

impl Permissions {
    /// Create a new permissions object with zero permissions
    /// set.
    pub const fn new() -> Self {
        Self(SftpPermissions::empty())
    }

    impl_getter_setter!(suid, set_suid, SET_UID, "set-user-id");
    impl_getter_setter!(sgid, set_sgid, SET_GID, "set-group-id");
    impl_getter_setter!(svtx, set_vtx, SET_VTX, "set-sticky-bit");

    impl_getter_setter!(
        read_by_owner,
        set_read_by_owner,
        READ_BY_OWNER,
        "read by owner"
    );
    impl_getter_setter!(
        write_by_owner,
        set_write_by_owner,
        WRITE_BY_OWNER,
        "write by owner"
    );
    impl_getter_setter!(
        execute_by_owner,
        set_execute_by_owner,
        EXECUTE_BY_OWNER,
        "execute by owner"
    );

    impl_getter_setter!(
        read_by_group,
        set_read_by_group,
        READ_BY_GROUP,
        "read by group"
    );
    impl_getter_setter!(
        write_by_group,
        set_write_by_group,
        WRITE_BY_GROUP,
        "write by group"
    );
    impl_getter_setter!(
        execute_by_group,
        set_execute_by_group,
        EXECUTE_BY_GROUP,
        "execute by group"
    );

    impl_getter_setter!(
        read_by_other,
        set_read_by_other,
        READ_BY_OTHER,
        "read by other"
    );
    impl_getter_setter!(
        write_by_other,
        set_write_by_other,
        WRITE_BY_OTHER,
        "write by other"
    );
    impl_getter_setter!(
        execute_by_other,
        set_execute_by_other,
        EXECUTE_BY_OTHER,
        "execute by other"
    );

    /// Returns `true` if anyone can read.
    pub fn readable(&self) -> bool {
        self.read_by_owner() || self.read_by_group() || self.read_by_other()
    }

    /// Returns `true` if anyone can write.
    pub fn writable(&self) -> bool {
        self.write_by_owner() || self.write_by_group() || self.write_by_other()
    }

    /// Returns `true` if anyone can execute.
    pub fn executable(&self) -> bool {
        self.execute_by_owner() || self.execute_by_group() || self.execute_by_other()
    }

    /// Returns `true` if these permissions describe an unwritable file
    /// that no one can write to.
    pub fn readonly(&self) -> bool {
        !self.writable()
    }

    /// Modifies the readonly flag for this set of permissions.
    ///
    /// If the readonly argument is true, it will remove write permissions
    /// from all parties.
    ///
    /// Conversely, if it's false, it will permit writing from all parties.
    ///
    /// This operation does not modify the remote file.
    pub fn set_readonly(&mut self, readonly: bool) {
        let writable = !readonly;

        self.set_write_by_owner(writable);
        self.set_write_by_group(writable);
        self.set_write_by_other(writable);
    }

    /// Octal permission bits, e.g. `0o644`.
    pub fn octal(&self) -> u32 {
        self.0.bits()
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u32> for Permissions {
    /// Converts numeric file mode bits permission into a [`Permissions`] object.
    ///
    /// File type bits are ignored.
    fn from(mode: u32) -> Self {
        Self(SftpPermissions::from_bits_truncate(mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn absent_fields_are_unknown() {
        let metadata = MetaData::default();

        assert_eq!(metadata.len(), None);
        assert_eq!(metadata.uid(), None);
        assert_eq!(metadata.accessed(), None);
        assert_eq!(metadata.permissions(), None);
        assert_eq!(metadata.is_dir(), None);
        assert_eq!(metadata.is_file(), None);
        assert_eq!(metadata.is_symlink(), None);
        assert!(metadata.is_zero());
        assert!(metadata.to_map().is_empty());
    }

    #[test]
    fn pairs_are_completed_with_zero() {
        let metadata = MetaData::from_map([("mtime", 100), ("gid", 5), ("unknown", 1)]);

        assert_eq!(metadata.accessed(), Some(UnixTimeStamp::from_raw(0)));
        assert_eq!(metadata.modified(), Some(UnixTimeStamp::from_raw(100)));
        assert_eq!(metadata.uid(), Some(0));
        assert_eq!(metadata.gid(), Some(5));
        assert_eq!(metadata.len(), None);
        assert_eq!(metadata.mode(), None);
    }

    #[test]
    fn values_wider_than_32_bits_are_skipped() {
        let too_wide = u64::from(u32::MAX) + 1;
        let metadata = MetaData::from_map([
            ("atime", too_wide),
            ("mtime", 7),
            ("uid", too_wide),
            ("gid", too_wide),
            ("mode", too_wide),
            ("size", too_wide),
        ]);

        assert_eq!(metadata.accessed(), Some(UnixTimeStamp::from_raw(0)));
        assert_eq!(metadata.modified(), Some(UnixTimeStamp::from_raw(7)));
        assert_eq!(metadata.uid(), None);
        assert_eq!(metadata.gid(), None);
        assert_eq!(metadata.mode(), None);
        assert_eq!(metadata.len(), Some(too_wide));
    }

    #[test]
    fn map_roundtrip() {
        let metadata = MetaData::from_map([
            ("atime", 1),
            ("mtime", 2),
            ("size", 3),
            ("uid", 4),
            ("gid", 5),
            ("mode", 0o100644),
        ]);
        let map = metadata.to_map();

        assert_eq!(map.len(), 6);
        assert_eq!(map["mode"], 0o100644);
        assert_eq!(MetaData::from_map(map), metadata);
    }

    #[test]
    fn file_type_and_permissions() {
        let metadata = MetaData::from_map([("mode", 0o040750)]);

        assert_eq!(metadata.is_dir(), Some(true));
        assert_eq!(metadata.is_file(), Some(false));
        assert_eq!(metadata.is_symlink(), Some(false));

        let perm = metadata.permissions().unwrap();
        assert_eq!(perm.octal(), 0o750);
        assert!(perm.readable());
        assert!(perm.writable());
        assert!(perm.executable());
        assert!(!perm.read_by_other());

        let perm = Permissions::from(0o444);
        assert!(perm.readonly());
        assert!(!perm.executable());

        // Unknown type bits.
        assert_eq!(MetaData::from_map([("mode", 0o644)]).is_file(), None);
    }

    #[test]
    fn builder() {
        let mut builder = MetaDataBuilder::new();
        builder
            .len(10)
            .id((1, 2))
            .permissions(Permissions::from(0o600));
        let metadata = builder.create();

        assert_eq!(metadata.len(), Some(10));
        assert_eq!(metadata.gid(), Some(2));
        assert_eq!(metadata.permissions().unwrap().octal(), 0o600);
        assert_eq!(metadata.accessed(), None);
    }
}
