//! Routes for the address space outside China.
//!
//! The IPv4 forest starts from the IANA registry, the IPv6 forest from `2000::/3`.
//! Country delegations, CIDR lists and special-use blocks are cut out of both,
//! and every remaining leaf becomes one RouterOS route.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
