//! Decode errors

use thiserror::Error;

/// Tag decoding errors, surfaced to the caller of `translate`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The identifier header byte matches no known scheme
    #[error("unknown scheme header: {0:#04x}")]
    UnknownScheme(u8),

    /// Fewer bytes than the scheme's layout requires
    #[error("truncated identifier: needed {needed} bits, got {got}")]
    Truncated { needed: usize, got: usize },

    /// A 6-bit code decodes outside the printable range
    #[error("invalid 6-bit character code: {0:#04x}")]
    InvalidChar(u8),

    /// The partition field selects no table row
    #[error("invalid partition value: {0}")]
    InvalidPartition(u8),
}
