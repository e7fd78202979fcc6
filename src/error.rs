use std::fmt;

/// Crate-wide error type. Mirrors the result-code taxonomy callers need to
/// branch on programmatically (`Busy`, `UnknownSearchView`, ...) rather than
/// a bag of strings.
#[derive(Debug, thiserror::Error)]
pub enum FsearchError {
    /// The store mutex is held; only returned from the non-blocking
    /// `try_get_*` read methods.
    #[error("store is busy")]
    Busy,
    /// `view_id` is not registered with the engine.
    #[error("unknown search view {0}")]
    UnknownSearchView(u32),
    /// A positional index was out of range for the container/view queried.
    #[error("entry not found")]
    EntryNotFound,
    /// Snapshot file I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Snapshot decode or validation failed (bad magic, version, short read).
    #[error("decode error: {0}")]
    Decode(String),
    /// Snapshot encode failed (e.g. a name exceeds the wire format's
    /// 255-byte field width).
    #[error("encode error: {0}")]
    Encode(String),
    /// A cooperative cancellation token tripped mid-operation.
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, FsearchError>;

/// Coarse result code surfaced across the work-queue boundary (spec §6).
/// `Success` has no payload; everything else maps from [`FsearchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    Failed,
    Busy,
    UnknownSearchView,
    EntryNotFound,
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultCode::Success => "Success",
            ResultCode::Failed => "Failed",
            ResultCode::Busy => "Busy",
            ResultCode::UnknownSearchView => "UnknownSearchView",
            ResultCode::EntryNotFound => "EntryNotFound",
        };
        f.write_str(s)
    }
}

impl From<&FsearchError> for ResultCode {
    fn from(e: &FsearchError) -> Self {
        match e {
            FsearchError::Busy => ResultCode::Busy,
            FsearchError::UnknownSearchView(_) => ResultCode::UnknownSearchView,
            FsearchError::EntryNotFound => ResultCode::EntryNotFound,
            FsearchError::Io(_)
            | FsearchError::Decode(_)
            | FsearchError::Encode(_)
            | FsearchError::Cancelled => ResultCode::Failed,
        }
    }
}

impl From<FsearchError> for ResultCode {
    fn from(e: FsearchError) -> Self {
        ResultCode::from(&e)
    }
}
