//! Guest-visible status codes.
//!
//! The filesystem only ever reports one of a closed set of NT status
//! values back to the guest. Everything richer stays on the host side in
//! the VFS error type and is folded into one of these at the boundary.

use std::fmt;

/// Status code returned to guest syscalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XStatus {
    /// `STATUS_SUCCESS`.
    Success,
    /// `STATUS_ACCESS_DENIED`: write or append requested on read-only media.
    AccessDenied,
    /// `STATUS_OBJECT_NAME_NOT_FOUND`: path resolution failed.
    NotFound,
    /// `STATUS_INVALID_PARAMETER`: bad offset/length, malformed request.
    InvalidParameter,
}

impl XStatus {
    pub const SUCCESS_CODE: u32 = 0x0000_0000;
    pub const ACCESS_DENIED_CODE: u32 = 0xC000_0022;
    pub const NOT_FOUND_CODE: u32 = 0xC000_0034;
    pub const INVALID_PARAMETER_CODE: u32 = 0xC000_000D;

    /// Raw 32-bit status value as the guest sees it.
    pub fn code(self) -> u32 {
        match self {
            XStatus::Success => Self::SUCCESS_CODE,
            XStatus::AccessDenied => Self::ACCESS_DENIED_CODE,
            XStatus::NotFound => Self::NOT_FOUND_CODE,
            XStatus::InvalidParameter => Self::INVALID_PARAMETER_CODE,
        }
    }

    /// Map a raw status value back to the closed set.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            Self::SUCCESS_CODE => Some(XStatus::Success),
            Self::ACCESS_DENIED_CODE => Some(XStatus::AccessDenied),
            Self::NOT_FOUND_CODE => Some(XStatus::NotFound),
            Self::INVALID_PARAMETER_CODE => Some(XStatus::InvalidParameter),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, XStatus::Success)
    }

    /// True for the error severity range (high bits `0b11`).
    pub fn is_error(self) -> bool {
        self.code() >> 30 == 0b11
    }
}

impl fmt::Display for XStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            XStatus::Success => "STATUS_SUCCESS",
            XStatus::AccessDenied => "STATUS_ACCESS_DENIED",
            XStatus::NotFound => "STATUS_OBJECT_NAME_NOT_FOUND",
            XStatus::InvalidParameter => "STATUS_INVALID_PARAMETER",
        };
        write!(f, "{} ({:#010X})", name, self.code())
    }
}

impl std::error::Error for XStatus {}

/// Result of a guest-facing operation. The error side is never `Success`.
pub type XResult<T> = Result<T, XStatus>;
