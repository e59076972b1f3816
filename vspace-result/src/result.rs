use crate::error::Error;

/// Result type alias used throughout vspace.
pub type Result<T> = std::result::Result<T, Error>;
