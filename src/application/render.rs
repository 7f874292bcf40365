//! RouterOS script rendering
//!
//! One block per address family: a loop removing every route of the routing
//! table, then one `add` per active leaf in traversal order.

use std::fmt;

use ipnet::IpNet;

use crate::config::RouteConfig;
use crate::domain::AddressFamily;

/// RouterOS menu holding the routes of a family.
pub fn route_api_path(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::V4 => "/ip/route",
        AddressFamily::V6 => "/ipv6/route",
    }
}

/// Complete script for all families.
#[derive(Debug)]
pub struct RouteScript<'a> {
    route: &'a RouteConfig,
    families: Vec<(AddressFamily, &'a [IpNet])>,
}

impl<'a> RouteScript<'a> {
    pub fn new(route: &'a RouteConfig) -> Self {
        Self {
            route,
            families: Vec::new(),
        }
    }

    /// Append the block of one family; blocks render in the order added.
    pub fn family(mut self, family: AddressFamily, leaves: &'a [IpNet]) -> Self {
        self.families.push((family, leaves));
        self
    }

    fn write_reset(&self, f: &mut fmt::Formatter<'_>, api: &str) -> fmt::Result {
        writeln!(
            f,
            ":foreach routeId in=[{api}/find where routing-table=\"{}\"] do={{",
            self.route.routing_table
        )?;
        writeln!(f, "{api}/remove ($routeId)")?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for RouteScript<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &(family, leaves) in &self.families {
            let api = route_api_path(family);
            let gateway = self.route.next_hop_for(family);
            self.write_reset(f, api)?;
            for leaf in leaves {
                writeln!(
                    f,
                    "{api}/add distance={} dst-address={} gateway={} routing-table={}",
                    self.route.distance, leaf, gateway, self.route.routing_table
                )?;
            }
        }
        Ok(())
    }
}

/// Plain block list, one CIDR per line.
#[derive(Debug)]
pub struct LeafList<'a>(pub &'a [IpNet]);

impl fmt::Display for LeafList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for leaf in self.0 {
            writeln!(f, "{leaf}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn given_leaves_when_rendering_then_reset_precedes_adds() {
        let route = RouteConfig::default();
        let v4 = [net("1.0.0.0/24"), net("1.0.4.0/22")];
        let script = RouteScript::new(&route)
            .family(AddressFamily::V4, &v4)
            .to_string();

        let expected = "\
:foreach routeId in=[/ip/route/find where routing-table=\"noncn\"] do={
/ip/route/remove ($routeId)
}
/ip/route/add distance=10 dst-address=1.0.0.0/24 gateway=%ether1 routing-table=noncn
/ip/route/add distance=10 dst-address=1.0.4.0/22 gateway=%ether1 routing-table=noncn
";
        assert_eq!(script, expected);
    }

    #[test]
    fn given_v6_override_when_rendering_then_v6_block_uses_it() {
        let route = RouteConfig {
            next_hop_v6: Some("%wg0".into()),
            ..RouteConfig::default()
        };
        let v4 = [net("1.0.0.0/24")];
        let v6 = [net("2400::/12")];
        let script = RouteScript::new(&route)
            .family(AddressFamily::V4, &v4)
            .family(AddressFamily::V6, &v6)
            .to_string();

        assert!(script.contains("/ip/route/add distance=10 dst-address=1.0.0.0/24 gateway=%ether1"));
        assert!(script.contains("[/ipv6/route/find where routing-table=\"noncn\"]"));
        assert!(script.contains("/ipv6/route/add distance=10 dst-address=2400::/12 gateway=%wg0"));
        assert!(script.find("/ip/route/remove").unwrap() < script.find("/ipv6/route/remove").unwrap());
    }

    #[test]
    fn given_no_leaves_when_rendering_then_reset_block_only() {
        let route = RouteConfig::default();
        let script = RouteScript::new(&route)
            .family(AddressFamily::V6, &[])
            .to_string();
        assert_eq!(script.lines().count(), 3);
    }

    #[test]
    fn given_leaves_when_listing_then_one_per_line() {
        let leaves = [net("1.0.0.0/24"), net("2400::/12")];
        assert_eq!(LeafList(&leaves).to_string(), "1.0.0.0/24\n2400::/12\n");
    }
}
