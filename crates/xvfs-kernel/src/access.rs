//! Access masks and file attribute bits.
//!
//! Both use the NT layout the guest passes through `NtCreateFile` and
//! reads back from `NtQueryInformationFile`.

use bitflags::bitflags;

bitflags! {
    /// Desired access mask for opening a file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileAccess: u32 {
        const READ_DATA = 0x0000_0001;
        const WRITE_DATA = 0x0000_0002;
        const APPEND_DATA = 0x0000_0004;
        const READ_EA = 0x0000_0008;
        const WRITE_EA = 0x0000_0010;
        const EXECUTE = 0x0000_0020;
        const READ_ATTRIBUTES = 0x0000_0080;
        const WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE = 0x0001_0000;
        const READ_CONTROL = 0x0002_0000;
        const WRITE_DAC = 0x0004_0000;
        const WRITE_OWNER = 0x0008_0000;
        const SYNCHRONIZE = 0x0010_0000;
        const GENERIC_ALL = 0x1000_0000;
        const GENERIC_EXECUTE = 0x2000_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ = 0x8000_0000;

        /// Every bit that asks to modify the file or its metadata.
        const WRITE_CLASS = Self::WRITE_DATA.bits()
            | Self::APPEND_DATA.bits()
            | Self::WRITE_EA.bits()
            | Self::WRITE_ATTRIBUTES.bits()
            | Self::DELETE.bits()
            | Self::WRITE_DAC.bits()
            | Self::WRITE_OWNER.bits()
            | Self::GENERIC_WRITE.bits()
            | Self::GENERIC_ALL.bits();
    }
}

impl FileAccess {
    /// Plain read access as most titles request it.
    pub fn read() -> Self {
        Self::GENERIC_READ | Self::SYNCHRONIZE
    }

    /// Returns true if any bit would need a writable backing store.
    pub fn requests_write(&self) -> bool {
        self.intersects(Self::WRITE_CLASS)
    }
}

bitflags! {
    /// Guest file attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttributes: u32 {
        const READ_ONLY = 0x0001;
        const HIDDEN = 0x0002;
        const SYSTEM = 0x0004;
        const DIRECTORY = 0x0010;
        const ARCHIVE = 0x0020;
        const NORMAL = 0x0080;
    }
}

impl FileAttributes {
    pub fn is_directory(&self) -> bool {
        self.contains(Self::DIRECTORY)
    }
}
