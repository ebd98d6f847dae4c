/// Errors that can occur while decoding a frame.
///
/// Encoding never fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The blob is shorter than the 9-byte header.
    #[error("frame truncated ({available} bytes, header needs {needed})")]
    Truncated { available: usize, needed: usize },

    /// The header announces more payload than the blob carries.
    #[error("frame incomplete (header announces {expected} payload bytes, {available} present)")]
    Incomplete { expected: u64, available: usize },

    /// Bytes remain after the announced payload.
    #[error("frame has {extra} trailing bytes after a {expected}-byte payload")]
    TrailingData { expected: u64, extra: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
