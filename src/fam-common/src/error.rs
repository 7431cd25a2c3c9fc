use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-stable mirror of [`FamError`]'s discriminant, carried on every RPC
/// response alongside a free-form message. A zero-valued `Success` is never
/// constructed by a failing call; callers should treat `Result<T, FamError>`
/// as the source of truth and use `ErrorCode` only at the RPC boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    AlreadyExists,
    NotFound,
    NoPermission,
    OutOfRange,
    NoSpace,
    NullPointer,
    Unimplemented,
    AtlQueueFull,
    AtlQueueInsert,
    AtlNotEnabled,
    Fabric,
    NotPowerOfTwo,
    Metadata,
    NameTooLong,
    Memory,
    Resource,
}

/// The full error taxonomy from the error-handling design (see SPEC_FULL.md
/// §7). Every fallible operation in `fam-mds`, `fam-ms` and `fam-cis` returns
/// `Result<T, FamError>`; the RPC dispatch layer is the only place that
/// converts this into an `(ErrorCode, String)` wire pair.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum FamError {
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    NoPermission(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("no space: {0}")]
    NoSpace(String),
    #[error("null pointer: {0}")]
    NullPointer(String),
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    #[error("async queue full: {0}")]
    AtlQueueFull(String),
    #[error("async queue insert failed: {0}")]
    AtlQueueInsert(String),
    #[error("async queue not enabled: {0}")]
    AtlNotEnabled(String),
    #[error("fabric error: {0}")]
    Fabric(String),
    #[error("not a power of two: {0}")]
    NotPowerOfTwo(String),
    #[error("metadata store error: {0}")]
    Metadata(String),
    #[error("name too long: {0}")]
    NameTooLong(String),
    #[error("memory service error: {0}")]
    Memory(String),
    #[error("resource error: {0}")]
    Resource(String),
}

impl FamError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FamError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            FamError::NotFound(_) => ErrorCode::NotFound,
            FamError::NoPermission(_) => ErrorCode::NoPermission,
            FamError::OutOfRange(_) => ErrorCode::OutOfRange,
            FamError::NoSpace(_) => ErrorCode::NoSpace,
            FamError::NullPointer(_) => ErrorCode::NullPointer,
            FamError::Unimplemented(_) => ErrorCode::Unimplemented,
            FamError::AtlQueueFull(_) => ErrorCode::AtlQueueFull,
            FamError::AtlQueueInsert(_) => ErrorCode::AtlQueueInsert,
            FamError::AtlNotEnabled(_) => ErrorCode::AtlNotEnabled,
            FamError::Fabric(_) => ErrorCode::Fabric,
            FamError::NotPowerOfTwo(_) => ErrorCode::NotPowerOfTwo,
            FamError::Metadata(_) => ErrorCode::Metadata,
            FamError::NameTooLong(_) => ErrorCode::NameTooLong,
            FamError::Memory(_) => ErrorCode::Memory,
            FamError::Resource(_) => ErrorCode::Resource,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Splits an error into the wire pair carried on every RPC response.
    pub fn into_wire(self) -> (ErrorCode, String) {
        let code = self.code();
        (code, self.message())
    }

    /// Reconstructs an error from a wire pair, for callers (the CIS) that
    /// relay another service's RPC failure as their own. `Success` should
    /// never reach this path; it maps to `Resource` rather than panicking.
    pub fn from_wire(code: ErrorCode, message: String) -> FamError {
        match code {
            ErrorCode::AlreadyExists => FamError::AlreadyExists(message),
            ErrorCode::NotFound => FamError::NotFound(message),
            ErrorCode::NoPermission => FamError::NoPermission(message),
            ErrorCode::OutOfRange => FamError::OutOfRange(message),
            ErrorCode::NoSpace => FamError::NoSpace(message),
            ErrorCode::NullPointer => FamError::NullPointer(message),
            ErrorCode::Unimplemented => FamError::Unimplemented(message),
            ErrorCode::AtlQueueFull => FamError::AtlQueueFull(message),
            ErrorCode::AtlQueueInsert => FamError::AtlQueueInsert(message),
            ErrorCode::AtlNotEnabled => FamError::AtlNotEnabled(message),
            ErrorCode::Fabric => FamError::Fabric(message),
            ErrorCode::NotPowerOfTwo => FamError::NotPowerOfTwo(message),
            ErrorCode::Metadata => FamError::Metadata(message),
            ErrorCode::NameTooLong => FamError::NameTooLong(message),
            ErrorCode::Memory => FamError::Memory(message),
            ErrorCode::Resource | ErrorCode::Success => FamError::Resource(message),
        }
    }
}

pub type FamResult<T> = Result<T, FamError>;
