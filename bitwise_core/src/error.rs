use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors raised by stream operations.
///
/// Boundary violations are reported at the call that caused them and leave the
/// stream untouched. Running out of data is not an error: reads report how much
/// they actually produced.
#[derive(Error, Debug)]
pub enum StreamError {
    /// A value that must be non-negative (or otherwise in range) was not.
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument {
        name: &'static str,
        reason: &'static str,
    },

    /// A seek resolved to a position before bit 0.
    #[error("An attempt was made to move the position before the beginning of the stream")]
    InvalidSeek,

    /// A slice asked for more bits than remain after the cursor.
    #[error("Cannot slice {requested} bits, only {available} remain after the cursor")]
    SliceOutOfRange { requested: u64, available: u64 },

    /// Bit-level I/O is limited to what fits in a `u64`.
    #[error("Bit count {0} is out of range, expected 0..=64")]
    BitCount(usize),

    /// The stream is a read-only view (e.g. a slice of a composite).
    #[error("Stream is read-only")]
    ReadOnly,

    /// The shared resource behind a window failed.
    #[error("Stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    pub(crate) fn negative(name: &'static str) -> Self {
        StreamError::InvalidArgument {
            name,
            reason: "non-negative number required",
        }
    }
}
