//! Integration tests for RouteService: datasets on disk to RouterOS script.
//!
//! Fixture (see `noncn::util::testing`):
//! - registry roots: 1.0.0.0/8, 36.0.0.0/8, 223.0.0.0/8 (010/8 is RESERVED)
//! - delegation CN: 1.0.1.0/24, 36.0.0.0/16, 2400:da00::/32
//! - china list: 223.5.0.0/16, 36.0.0.0/16 (again), 2408:8000::/20

use std::fs;
use std::sync::Arc;

use ipnet::IpNet;

use noncn::application::services::{PassKind, RouteService};
use noncn::application::ApplicationError;
use noncn::domain::{AddressFamily, DomainError};
use noncn::infrastructure::traits::RealFileSystem;
use noncn::util::testing::Fixture;

fn net(s: &str) -> IpNet {
    s.parse().unwrap()
}

fn service() -> RouteService {
    RouteService::new(Arc::new(RealFileSystem))
}

fn size(net: &IpNet) -> u128 {
    1u128 << (net.max_prefix_len() - net.prefix_len())
}

fn total_size(nets: &[IpNet]) -> u128 {
    nets.iter().map(size).sum()
}

fn assert_disjoint(leaves: &[IpNet]) {
    let mut sorted = leaves.to_vec();
    sorted.sort();
    for pair in sorted.windows(2) {
        assert!(
            !pair[0].contains(&pair[1]) && !pair[1].contains(&pair[0]),
            "{} and {} overlap",
            pair[0],
            pair[1]
        );
    }
}

// ============================================================
// Generation
// ============================================================

#[test]
fn given_fixture_when_generating_then_script_starts_with_v4_reset_and_largest_block() {
    // Arrange
    let fixture = Fixture::new();
    let settings = fixture.settings();

    // Act
    let generated = service().generate(&settings).expect("generate");

    // Assert
    let lines: Vec<&str> = generated.script.lines().collect();
    assert_eq!(
        lines[0],
        ":foreach routeId in=[/ip/route/find where routing-table=\"noncn\"] do={"
    );
    assert_eq!(lines[1], "/ip/route/remove ($routeId)");
    assert_eq!(lines[2], "}");
    assert_eq!(
        lines[3],
        "/ip/route/add distance=10 dst-address=1.128.0.0/9 gateway=%ether1 routing-table=noncn"
    );
    assert_eq!(generated.v4_routes, 16 + 8 + 8);
}

#[test]
fn given_fixture_when_generating_then_v6_block_follows_v4_block() {
    let fixture = Fixture::new();
    let settings = fixture.settings();

    let generated = service().generate(&settings).expect("generate");

    let v4_reset = generated.script.find("[/ip/route/find").unwrap();
    let v6_reset = generated.script.find("[/ipv6/route/find").unwrap();
    let last_v4_add = generated.script.rfind("/ip/route/add").unwrap();
    assert!(v4_reset < last_v4_add);
    assert!(last_v4_add < v6_reset);
    assert!(generated.v6_routes > 0);
}

#[test]
fn given_fixture_when_generating_then_every_leaf_is_emitted_once() {
    let fixture = Fixture::new();
    let settings = fixture.settings();
    let service = service();

    let forests = service.build(&settings).expect("build");
    let generated = service.render(&forests, &settings);

    let adds: Vec<&str> = generated
        .script
        .lines()
        .filter(|l| l.contains("/add "))
        .collect();
    let leaves: Vec<IpNet> = AddressFamily::ALL
        .iter()
        .flat_map(|&f| forests.get(f).active_leaves())
        .collect();
    assert_eq!(adds.len(), leaves.len());
    for (line, leaf) in adds.iter().zip(&leaves) {
        assert!(
            line.contains(&format!(" dst-address={} ", leaf)),
            "{line} does not route {leaf}"
        );
    }
}

#[test]
fn given_same_inputs_when_generating_twice_then_output_is_identical() {
    let fixture = Fixture::new();
    let settings = fixture.settings();

    let first = service().generate(&settings).expect("first run");
    let second = service().generate(&settings).expect("second run");

    assert_eq!(first, second);
}

#[test]
fn given_v6_next_hop_when_generating_then_only_v6_routes_use_it() {
    let fixture = Fixture::new();
    let mut settings = fixture.settings();
    settings.route.next_hop_v6 = Some("%wg0".into());

    let generated = service().generate(&settings).expect("generate");

    for line in generated.script.lines() {
        if line.starts_with("/ip/route/add") {
            assert!(line.contains("gateway=%ether1"), "{line}");
        }
        if line.starts_with("/ipv6/route/add") {
            assert!(line.contains("gateway=%wg0"), "{line}");
        }
    }
}

#[test]
fn given_custom_table_and_distance_when_generating_then_every_line_uses_them() {
    let fixture = Fixture::new();
    let mut settings = fixture.settings();
    settings.route.routing_table = "overseas".into();
    settings.route.distance = 20;

    let generated = service().generate(&settings).expect("generate");

    assert!(!generated.script.contains("noncn"));
    assert!(generated
        .script
        .lines()
        .filter(|l| l.contains("/add "))
        .all(|l| l.contains("distance=20") && l.ends_with("routing-table=overseas")));
}

// ============================================================
// Partition invariant
// ============================================================

#[test]
fn given_fixture_when_building_then_v4_leaves_partition_roots_minus_exclusions() {
    let fixture = Fixture::new();
    let settings = fixture.settings();

    let forests = service().build(&settings).expect("build");
    let leaves = forests.v4.active_leaves();

    let roots = [net("1.0.0.0/8"), net("36.0.0.0/8"), net("223.0.0.0/8")];
    let excluded = [net("1.0.1.0/24"), net("36.0.0.0/16"), net("223.5.0.0/16")];
    assert_disjoint(&leaves);
    assert_eq!(total_size(&leaves), total_size(&roots) - total_size(&excluded));
    for leaf in &leaves {
        assert!(roots.iter().any(|r| r.contains(leaf)), "{leaf} outside roots");
        assert!(
            !excluded.iter().any(|e| e.contains(leaf) || leaf.contains(e)),
            "{leaf} overlaps an exclusion"
        );
    }
}

#[test]
fn given_fixture_when_building_then_v6_leaves_partition_global_unicast() {
    let fixture = Fixture::new();
    let settings = fixture.settings();

    let forests = service().build(&settings).expect("build");
    let leaves = forests.v6.active_leaves();

    // delegation, china list, then the special-use blocks inside 2000::/3
    let excluded = [
        net("2400:da00::/32"),
        net("2408:8000::/20"),
        net("2001::/23"),
        net("2001:db8::/32"),
        net("2002::/16"),
        net("3fff::/20"),
    ];
    assert_disjoint(&leaves);
    assert_eq!(
        total_size(&leaves),
        size(&net("2000::/3")) - total_size(&excluded)
    );
}

#[test]
fn given_list_repeating_delegated_block_when_building_then_block_stays_excluded() {
    let fixture = Fixture::new();
    let settings = fixture.settings();

    let forests = service().build(&settings).expect("build");

    let list_pass = forests
        .passes
        .iter()
        .find(|p| matches!(p.kind, PassKind::List(_)) && p.family == AddressFamily::V4)
        .expect("list pass");
    assert_eq!(list_pass.exclusions, 2);
    assert_eq!(list_pass.stats.split, 1);
    // 36.0.0.0/16 is a hole under 36.0.0.0/8, not a node
    assert_eq!(list_pass.stats.ignored, 1);
    assert!(!forests
        .v4
        .active_leaves()
        .iter()
        .any(|l| l.contains(&net("36.0.0.0/16"))));
}

#[test]
fn given_fixture_when_building_then_passes_run_in_order_per_family() {
    let fixture = Fixture::new();
    let settings = fixture.settings();

    let forests = service().build(&settings).expect("build");

    let kinds: Vec<(String, AddressFamily)> = forests
        .passes
        .iter()
        .map(|p| (p.kind.to_string(), p.family))
        .collect();
    let list = format!("list {}", fixture.join("china.txt").display());
    assert_eq!(
        kinds,
        vec![
            ("delegation".to_string(), AddressFamily::V4),
            ("delegation".to_string(), AddressFamily::V6),
            (list.clone(), AddressFamily::V4),
            (list, AddressFamily::V6),
            ("reserved".to_string(), AddressFamily::V4),
            ("reserved".to_string(), AddressFamily::V6),
        ]
    );
}

#[test]
fn given_same_list_twice_when_building_then_applied_once() {
    let fixture = Fixture::new();
    let mut settings = fixture.settings();
    settings.sources.china_lists = vec![fixture.join("china.txt"), fixture.join("china.txt")];

    let forests = service().build(&settings).expect("build");

    let list_passes = forests
        .passes
        .iter()
        .filter(|p| matches!(p.kind, PassKind::List(_)))
        .count();
    assert_eq!(list_passes, 2, "one pass per family");
}

// ============================================================
// Extra excludes and superset policy
// ============================================================

#[test]
fn given_extra_exclude_when_generating_then_block_is_cut_out() {
    let fixture = Fixture::new();
    let mut settings = fixture.settings();
    settings.exclude = vec!["1.2.0.0/16".into()];

    let generated = service().generate(&settings).expect("generate");

    assert!(generated.script.contains("dst-address=1.3.0.0/16 "));
    assert!(!generated.script.contains("dst-address=1.2.0.0/15 "));
    assert_eq!(generated.v4_routes, 32);
}

#[test]
fn given_v6_only_excludes_when_building_then_v4_forest_is_untouched() {
    let fixture = Fixture::new();
    let baseline = service().build(&fixture.settings()).expect("baseline");
    let mut settings = fixture.settings();
    settings.exclude = vec!["3000::/4".into(), "2c00::/6".into()];

    let forests = service().build(&settings).expect("build");

    assert_eq!(forests.v4.active_leaves(), baseline.v4.active_leaves());
    assert_ne!(forests.v6.active_leaves(), baseline.v6.active_leaves());
}

#[test]
fn given_superset_exclude_when_ignoring_then_root_survives() {
    let fixture = Fixture::new();
    let mut settings = fixture.settings();
    settings.exclude = vec!["36.0.0.0/7".into()];

    let forests = service().build(&settings).expect("build");

    assert!(forests
        .v4
        .active_leaves()
        .iter()
        .any(|l| net("36.0.0.0/8").contains(l)));
}

#[test]
fn given_superset_exclude_when_cascading_then_covered_root_dies() {
    let fixture = Fixture::new();
    let mut settings = fixture.settings();
    settings.exclude = vec!["36.0.0.0/7".into()];
    settings.cascade_supersets = true;

    let generated = service().generate(&settings).expect("generate");

    assert!(!generated.script.contains("dst-address=36."));
    assert_eq!(generated.v4_routes, 16 + 8);
}

// ============================================================
// Failures
// ============================================================

#[test]
fn given_missing_delegation_when_building_then_input_not_found() {
    let fixture = Fixture::new();
    let mut settings = fixture.settings();
    settings.sources.delegation = fixture.join("missing.txt");

    let err = service().build(&settings).unwrap_err();

    assert!(
        matches!(&err, ApplicationError::InputNotFound(p) if p == &fixture.join("missing.txt")),
        "unexpected error: {err:?}"
    );
}

#[test]
fn given_malformed_list_entry_when_generating_then_parse_error_and_no_output() {
    let fixture = Fixture::new();
    let bad = fixture.write("bad.txt", "1.0.0.0/24\n1.2.3.4/33\n");
    let mut settings = fixture.settings();
    settings.sources.china_lists = vec![bad.clone()];
    let service = service();

    let err = service.generate(&settings).unwrap_err();

    match err {
        ApplicationError::Parse { path, source } => {
            assert_eq!(path, bad);
            assert!(matches!(source, DomainError::InvalidListEntry { line: 2, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!settings.output.exists());
}

#[test]
fn given_host_bits_in_list_when_building_then_rejected() {
    let fixture = Fixture::new();
    let bad = fixture.write("hosts.txt", "223.5.5.5/16\n");
    let mut settings = fixture.settings();
    settings.sources.china_lists = vec![bad];

    let err = service().build(&settings).unwrap_err();

    match err {
        ApplicationError::Parse {
            source: DomainError::InvalidListEntry { source, .. },
            ..
        } => assert!(matches!(*source, DomainError::HostBitsSet { .. })),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn given_malformed_extra_exclude_when_building_then_domain_error() {
    let fixture = Fixture::new();
    let mut settings = fixture.settings();
    settings.exclude = vec!["not-a-cidr".into()];

    let err = service().build(&settings).unwrap_err();

    assert!(matches!(err, ApplicationError::Domain(DomainError::InvalidCidr { .. })));
}

// ============================================================
// Writing
// ============================================================

#[test]
fn given_existing_output_when_writing_then_replaced_completely() {
    let fixture = Fixture::new();
    let settings = fixture.settings();
    fs::write(&settings.output, "stale\n").unwrap();
    let service = service();

    let generated = service.generate(&settings).expect("generate");
    service
        .write_script(&settings.output, &generated.script)
        .expect("write");

    assert_eq!(fs::read_to_string(&settings.output).unwrap(), generated.script);
}

#[test]
fn given_missing_output_directory_when_writing_then_output_failed() {
    let fixture = Fixture::new();
    let target = fixture.join("nope").join("noncn.rsc");

    let err = service().write_script(&target, "x\n").unwrap_err();

    assert!(matches!(err, ApplicationError::OutputFailed { path, .. } if path == target));
}
