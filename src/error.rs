use std::io;
use thiserror::Error;

//===========================================================================//

/// The ways in which loading, building, or saving an ICO frame can fail.
#[derive(Debug, Error)]
pub enum IcoError {
    /// The data isn't a BMP, PNG, or ICO at all, or is truncated.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// The data is structurally valid but uses a field value this codec
    /// doesn't handle (e.g. an unusual bit count or header size).
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// A bitmap with fewer than 32 bits per pixel was supplied without a
    /// transparency mask.
    #[error("a mask image is required for bitmaps below 32 bits per pixel")]
    MissingMask,
    /// An output buffer doesn't have exactly the required length.
    #[error("buffer has wrong length (was {actual}, but must be {expected})")]
    LengthMismatch {
        /// The length the operation requires.
        expected: usize,
        /// The length of the buffer that was supplied.
        actual: usize,
    },
    /// A dimension, count, or position is outside its permitted range.
    #[error("argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// An ICO file can't be saved without any frames.
    #[error("an ICO file must contain at least one frame")]
    EmptyInput,
    /// The ICONDIR header has the wrong reserved or type field.
    #[error("invalid icon directory: {0}")]
    InvalidDirectory(String),
    /// Reading from or writing to a stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A specialized `Result` type for ICO codec operations.
pub type Result<T> = std::result::Result<T, IcoError>;

//===========================================================================//

pub(crate) fn check_length(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(IcoError::LengthMismatch { expected, actual });
    }
    Ok(())
}

//===========================================================================//


//===========================================================================//
