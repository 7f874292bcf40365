//! Domain layer: prefix trees and exclusion logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod cidr;
pub mod error;
pub mod exclusion;
pub mod reserved;
pub mod sources;
pub mod tree_display;

pub use arena::{PrefixForest, PrefixNode};
pub use cidr::{address_exclude, parse_cidr, AddressFamily, ByFamily};
pub use error::DomainError;
pub use exclusion::{subtract_prefixes, ExclusionEngine, Outcome, PassStats, SupersetPolicy};
pub use sources::DelegationFilter;
