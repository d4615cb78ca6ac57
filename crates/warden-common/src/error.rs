//! Error types for Warden

use thiserror::Error;

/// Warden error type
#[derive(Error, Debug)]
pub enum WardenError {
    /// A map reached its configured capacity
    #[error("{map} map full ({capacity} entries)")]
    MapFull {
        /// Which map refused the entry
        map: &'static str,
        /// Its configured capacity
        capacity: usize,
    },

    /// Declared match length exceeds the key width
    #[error("match length {bits} exceeds key width of {max} bits")]
    InvalidMatchLength {
        /// Requested length in bits
        bits: u32,
        /// Widest length the key supports
        max: u32,
    },

    /// CIDR parse error
    #[error("invalid CIDR: {0}")]
    InvalidCidr(#[from] ipnetwork::IpNetworkError),
}

/// Result type for Warden
pub type WardenResult<T> = Result<T, WardenError>;
