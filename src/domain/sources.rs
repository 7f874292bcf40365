//! Parsers for the input datasets.
//!
//! All functions take file content, never paths: reading is the caller's job.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use tracing::{debug, trace};

use crate::domain::cidr::{ensure_network, ipv4_range_to_cidrs, parse_cidr, ByFamily};
use crate::domain::error::DomainError;

/// Registry statuses that make a block part of the modeled address space.
pub const ROUTED_STATUSES: [&str; 2] = ["ALLOCATED", "LEGACY"];

const REGISTRY_PREFIX_COLUMN: usize = 0;
const REGISTRY_STATUS_COLUMN: usize = 5;

/// Parse the IANA IPv4 address-space registry (CSV with a header row).
///
/// Each ALLOCATED or LEGACY row yields one root block: `001/8` → `1.0.0.0/8`.
pub fn parse_registry(content: &str) -> Result<Vec<IpNet>, DomainError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut roots = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DomainError::InvalidRegistryRow {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            message: e.to_string(),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let status = record.get(REGISTRY_STATUS_COLUMN).unwrap_or("").trim();
        if !ROUTED_STATUSES.contains(&status) {
            continue;
        }

        let prefix = record
            .get(REGISTRY_PREFIX_COLUMN)
            .ok_or_else(|| DomainError::InvalidRegistryRow {
                line,
                message: "missing prefix column".to_string(),
            })?;
        let root = parse_registry_prefix(prefix).map_err(|message| {
            DomainError::InvalidRegistryRow { line, message }
        })?;
        trace!("registry line {}: {} ({})", line, root, status);
        roots.push(root);
    }
    debug!("registry: {} routed blocks", roots.len());
    Ok(roots)
}

/// `001/8` → `1.0.0.0/8`
fn parse_registry_prefix(prefix: &str) -> Result<IpNet, String> {
    let prefix = prefix.trim();
    let (octet, len) = prefix
        .split_once('/')
        .ok_or_else(|| format!("prefix {prefix:?} has no length"))?;
    let octet = u8::from_str(octet).map_err(|e| format!("prefix {prefix:?}: {e}"))?;
    let len = u8::from_str(len).map_err(|e| format!("prefix {prefix:?}: {e}"))?;
    let net = Ipv4Net::new(Ipv4Addr::new(octet, 0, 0, 0), len)
        .map_err(|e| format!("prefix {prefix:?}: {e}"))?;
    ensure_network(prefix, IpNet::V4(net)).map_err(|e| e.to_string())
}

/// Selects records of one registry and country from a delegation feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationFilter {
    pub registry: String,
    pub country: String,
}

impl DelegationFilter {
    pub fn new(registry: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            country: country.into(),
        }
    }
}

/// Parse an RIR delegation feed (`registry|cc|type|start|value|date|status`).
///
/// IPv4 records carry an address count, IPv6 records a prefix length. Records of
/// other registries, countries or types are skipped, as are comments, the
/// version header and summary lines.
pub fn parse_delegation(content: &str, filter: &DelegationFilter) -> Result<ByFamily, DomainError> {
    let mut delegated = ByFamily::default();

    for (number, raw) in content.lines().enumerate() {
        let line = number + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split('|').collect();
        if fields.len() < 5 || fields[0] != filter.registry || fields[1] != filter.country {
            continue;
        }

        let invalid = |message: String| DomainError::InvalidDelegation { line, message };
        match fields[2] {
            "ipv4" => {
                let start = Ipv4Addr::from_str(fields[3])
                    .map_err(|e| invalid(format!("start {:?}: {e}", fields[3])))?;
                let count = u64::from_str(fields[4])
                    .map_err(|e| invalid(format!("count {:?}: {e}", fields[4])))?;
                let blocks = ipv4_range_to_cidrs(start, count).map_err(invalid)?;
                if blocks.len() > 1 {
                    debug!(
                        "line {}: {} addresses from {} cover {} blocks",
                        line,
                        count,
                        start,
                        blocks.len()
                    );
                }
                delegated.extend(blocks);
            }
            "ipv6" => {
                let start = Ipv6Addr::from_str(fields[3])
                    .map_err(|e| invalid(format!("start {:?}: {e}", fields[3])))?;
                let len = u8::from_str(fields[4])
                    .map_err(|e| invalid(format!("prefix length {:?}: {e}", fields[4])))?;
                let net = Ipv6Net::new(start, len)
                    .map_err(|e| invalid(format!("{}/{}: {e}", fields[3], fields[4])))?;
                let input = format!("{}/{}", fields[3], fields[4]);
                let net = ensure_network(&input, IpNet::V6(net))
                    .map_err(|e| invalid(e.to_string()))?;
                delegated.push(net);
            }
            _ => continue,
        }
    }

    debug!(
        "delegation {}|{}: {} IPv4 and {} IPv6 blocks",
        filter.registry,
        filter.country,
        delegated.v4.len(),
        delegated.v6.len()
    );
    Ok(delegated)
}

/// Parse a plain CIDR list: one block per line, blank lines and `#` comments skipped.
pub fn parse_cidr_list(content: &str) -> Result<Vec<IpNet>, DomainError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, raw)| {
            let trimmed = raw.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(number, raw)| {
            parse_cidr(raw).map_err(|e| DomainError::InvalidListEntry {
                line: number + 1,
                source: Box::new(e),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    const REGISTRY: &str = r#"Prefix,Designation,Date,WHOIS,RDAP,Status [1],Note
000/8,IANA - Local Identification,1981-09,,,RESERVED,[2]
001/8,APNIC,2010-01,whois.apnic.net,https://rdap.apnic.net/,ALLOCATED,
003/8,Administered by ARIN,1994-05,whois.arin.net,"https://rdap.arin.net/registry
http://rdap.arin.net/registry",LEGACY,
010/8,IANA - Private Use,1995-06,,,RESERVED,[4]
224/8,Multicast,1981-09,,,RESERVED,[11]
"#;

    #[test]
    fn given_registry_when_parsing_then_keeps_allocated_and_legacy_rows() {
        let roots = parse_registry(REGISTRY).unwrap();
        assert_eq!(roots, vec![net("1.0.0.0/8"), net("3.0.0.0/8")]);
    }

    #[test]
    fn given_malformed_prefix_when_parsing_registry_then_fails() {
        let content = "Prefix,Designation,Date,WHOIS,RDAP,Status [1],Note\nabc/8,X,,,,ALLOCATED,\n";
        let err = parse_registry(content).unwrap_err();
        assert!(matches!(err, DomainError::InvalidRegistryRow { line: 2, .. }));
    }

    #[test]
    fn given_delegation_feed_when_parsing_then_selects_country_records() {
        let content = "\
2|apnic|20240101|3|19830613|20231231|+1000
# comment
apnic|*|ipv4|*|3|summary
apnic|CN|ipv4|1.0.1.0|256|20110414|allocated
apnic|JP|ipv4|1.0.16.0|4096|20110412|allocated
apnic|CN|ipv4|1.0.2.0|512|20110414|allocated
apnic|CN|asn|4134|1|20020101|allocated
apnic|CN|ipv6|2001:250::|35|20000426|allocated
";
        let filter = DelegationFilter::new("apnic", "CN");
        let delegated = parse_delegation(content, &filter).unwrap();

        assert_eq!(delegated.v4, vec![net("1.0.1.0/24"), net("1.0.2.0/23")]);
        assert_eq!(delegated.v6, vec![net("2001:250::/35")]);
    }

    #[test]
    fn given_bad_count_when_parsing_delegation_then_reports_line() {
        let content = "apnic|CN|ipv4|1.0.1.0|many|20110414|allocated\n";
        let err = parse_delegation(content, &DelegationFilter::new("apnic", "CN")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidDelegation { line: 1, .. }));
    }

    #[test]
    fn given_ipv6_record_with_host_bits_when_parsing_delegation_then_fails() {
        let content = "apnic|CN|ipv6|2001:250::1|35|20000426|allocated\n";
        assert!(parse_delegation(content, &DelegationFilter::new("apnic", "CN")).is_err());
    }

    #[test]
    fn given_list_with_comments_when_parsing_then_skips_them() {
        let content = "# china\n\n1.0.1.0/24\n  \n# more\n2001:250::/35\n";
        let prefixes = parse_cidr_list(content).unwrap();
        assert_eq!(prefixes, vec![net("1.0.1.0/24"), net("2001:250::/35")]);
    }

    #[test]
    fn given_bad_entry_when_parsing_list_then_reports_line() {
        let err = parse_cidr_list("1.0.1.0/24\n1.0.2.1/23\n").unwrap_err();
        assert!(matches!(err, DomainError::InvalidListEntry { line: 2, .. }));
    }
}
