//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent malformed input data.
/// These are independent of where the data came from (file, flag, env var).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid CIDR block: {input}: {reason}")]
    InvalidCidr { input: String, reason: String },

    #[error("{input} has host bits set (network is {network})")]
    HostBitsSet { input: String, network: String },

    #[error("invalid registry row {line}: {message}")]
    InvalidRegistryRow { line: u64, message: String },

    #[error("invalid delegation record at line {line}: {message}")]
    InvalidDelegation { line: usize, message: String },

    #[error("invalid entry at line {line}")]
    InvalidListEntry {
        line: usize,
        #[source]
        source: Box<DomainError>,
    },
}
