// Consistent exit codes for the gridsync CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   12 = conflict (file changed since it was read)
//   13 = validation failed

use gridsync_common::address::AddressError;
use gridsync_engine::StoreError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Conflict = 12,
    Invalid = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(store_err) = cause.downcast_ref::<StoreError>() {
                return Self::from_store_code(store_err.code());
            }
            if cause.downcast_ref::<AddressError>().is_some() {
                return Self::Usage;
            }
        }
        Self::Error
    }

    /// Map a store error code string to an exit code.
    pub fn from_store_code(code: &str) -> Self {
        match code {
            "FILE_NOT_FOUND" | "SHEET_NOT_FOUND" | "INVALID_RANGE" => Self::Usage,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}
