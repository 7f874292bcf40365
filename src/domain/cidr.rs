//! CIDR primitives: address family, strict parsing and address exclusion.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net};

use crate::domain::error::DomainError;

/// Address family of a CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub const ALL: [AddressFamily; 2] = [AddressFamily::V4, AddressFamily::V6];

    pub fn of(net: &IpNet) -> Self {
        match net {
            IpNet::V4(_) => AddressFamily::V4,
            IpNet::V6(_) => AddressFamily::V6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// Parse a CIDR block strictly.
///
/// - `a.b.c.d/len` and `x::/len` must name a network address (no host bits).
/// - A bare address is a single-host block (`/32` or `/128`).
pub fn parse_cidr(input: &str) -> Result<IpNet, DomainError> {
    let trimmed = input.trim();
    if !trimmed.contains('/') {
        let addr = IpAddr::from_str(trimmed).map_err(|e| DomainError::InvalidCidr {
            input: trimmed.to_string(),
            reason: e.to_string(),
        })?;
        return Ok(IpNet::from(addr));
    }

    let net = IpNet::from_str(trimmed).map_err(|e| DomainError::InvalidCidr {
        input: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    ensure_network(trimmed, net)
}

/// Reject blocks whose address is not the network address.
pub(crate) fn ensure_network(input: &str, net: IpNet) -> Result<IpNet, DomainError> {
    let network = net.trunc();
    if network != net {
        return Err(DomainError::HostBitsSet {
            input: input.to_string(),
            network: network.to_string(),
        });
    }
    Ok(net)
}

/// Split `net` into its lower and upper halves.
fn halves(net: IpNet) -> Option<(IpNet, IpNet)> {
    let mut subnets = net.subnets(net.prefix_len().checked_add(1)?).ok()?;
    Some((subnets.next()?, subnets.next()?))
}

/// Minimal disjoint set of blocks covering `net` minus `hole`.
///
/// Blocks come out largest first, in the order the bisection walks towards `hole`.
/// `hole == net` yields nothing; a `hole` outside `net` yields `net` unchanged.
pub fn address_exclude(net: IpNet, hole: IpNet) -> Vec<IpNet> {
    if net == hole {
        return Vec::new();
    }
    if !net.contains(&hole) {
        return vec![net];
    }

    let mut rest = Vec::with_capacity(usize::from(hole.prefix_len() - net.prefix_len()));
    let mut current = net;
    while current != hole {
        let Some((lower, upper)) = halves(current) else {
            break;
        };
        if lower.contains(&hole) {
            rest.push(upper);
            current = lower;
        } else {
            rest.push(lower);
            current = upper;
        }
    }
    rest
}

/// Minimal CIDR cover of the IPv4 range `[start, start + count)`.
///
/// Aligned power-of-two counts give one block of length `32 - log2(count)`.
pub fn ipv4_range_to_cidrs(start: Ipv4Addr, count: u64) -> Result<Vec<IpNet>, String> {
    let first = u64::from(u32::from(start));
    let end = first
        .checked_add(count)
        .filter(|&end| count > 0 && end <= 1u64 << 32)
        .ok_or_else(|| format!("{count} addresses from {start} do not fit the IPv4 space"))?;

    let mut blocks = Vec::new();
    let mut cursor = first;
    while cursor < end {
        let mut size_bits = if cursor == 0 {
            32
        } else {
            cursor.trailing_zeros().min(32)
        };
        while (1u64 << size_bits) > end - cursor {
            size_bits -= 1;
        }
        // size_bits <= 32, so the prefix length fits and the address is aligned
        let addr = Ipv4Addr::from(cursor as u32);
        let net = Ipv4Net::new(addr, (32 - size_bits) as u8).map_err(|e| e.to_string())?;
        blocks.push(IpNet::V4(net));
        cursor += 1u64 << size_bits;
    }
    Ok(blocks)
}

/// Prefixes split by address family, each list keeping input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByFamily {
    pub v4: Vec<IpNet>,
    pub v6: Vec<IpNet>,
}

impl ByFamily {
    pub fn classify(prefixes: impl IntoIterator<Item = IpNet>) -> Self {
        let mut split = Self::default();
        split.extend(prefixes);
        split
    }

    pub fn push(&mut self, net: IpNet) {
        match AddressFamily::of(&net) {
            AddressFamily::V4 => self.v4.push(net),
            AddressFamily::V6 => self.v6.push(net),
        }
    }

    pub fn extend(&mut self, prefixes: impl IntoIterator<Item = IpNet>) {
        for net in prefixes {
            self.push(net);
        }
    }

    pub fn get(&self, family: AddressFamily) -> &[IpNet] {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}
