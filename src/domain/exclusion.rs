//! Prefix exclusion over an arena forest.
//!
//! Rules, applied per exclusion block `e`, level by level starting at the roots:
//! - the first node equal to or containing `e` is the match; later siblings are not looked at
//! - equal: the node is marked dead, whatever children it already has
//! - containing, already split: `e` descends into the existing children
//! - containing, leaf: the node is split into the blocks of `node \ e`; `e` itself gets no node
//! - nothing contains `e`: no effect, unless the superset policy says to cascade

use std::fmt;

use generational_arena::Index;
use ipnet::IpNet;
use tracing::{debug, instrument, trace};

use crate::domain::arena::PrefixForest;
use crate::domain::cidr::address_exclude;

/// What to do with an exclusion that is broader than the nodes at its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupersetPolicy {
    /// Leave the forest untouched.
    #[default]
    Ignore,
    /// Mark every node at that level which the exclusion covers as dead.
    Cascade,
}

/// Effect of one exclusion block on a forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exact match, node marked dead.
    Killed,
    /// Node split around the exclusion.
    Split,
    /// Match falls on or inside a node that was already dead.
    AlreadyExcluded,
    /// Covered nodes marked dead under [`SupersetPolicy::Cascade`].
    Cascaded(usize),
    /// No node equals or contains the exclusion.
    Ignored,
}

/// Outcome plus how many levels of existing children were descended to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subtraction {
    pub outcome: Outcome,
    pub depth: usize,
}

/// Counters for one exclusion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub killed: usize,
    pub split: usize,
    pub routed: usize,
    pub already_excluded: usize,
    pub cascaded: usize,
    pub ignored: usize,
}

impl PassStats {
    pub fn record(&mut self, subtraction: Subtraction) {
        if subtraction.depth > 0 {
            self.routed += 1;
        }
        match subtraction.outcome {
            Outcome::Killed => self.killed += 1,
            Outcome::Split => self.split += 1,
            Outcome::AlreadyExcluded => self.already_excluded += 1,
            Outcome::Cascaded(n) => self.cascaded += n,
            Outcome::Ignored => self.ignored += 1,
        }
    }

    pub fn merge(&mut self, other: &PassStats) {
        self.killed += other.killed;
        self.split += other.split;
        self.routed += other.routed;
        self.already_excluded += other.already_excluded;
        self.cascaded += other.cascaded;
        self.ignored += other.ignored;
    }
}

impl fmt::Display for PassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "killed={} split={} routed={} already_excluded={} cascaded={} ignored={}",
            self.killed, self.split, self.routed, self.already_excluded, self.cascaded, self.ignored
        )
    }
}

/// Applies exclusion blocks to a [`PrefixForest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExclusionEngine {
    policy: SupersetPolicy,
}

impl ExclusionEngine {
    pub fn new(policy: SupersetPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SupersetPolicy {
        self.policy
    }

    /// Apply `exclusions` in order. Blocks of the other family never match.
    #[instrument(level = "debug", skip(self, forest, exclusions), fields(family = %forest.family(), count = exclusions.len()))]
    pub fn subtract_prefixes(&self, forest: &mut PrefixForest, exclusions: &[IpNet]) -> PassStats {
        let mut stats = PassStats::default();
        for &exclusion in exclusions {
            let subtraction = self.subtract(forest, exclusion);
            if subtraction.outcome == Outcome::Ignored {
                debug!("no node covers {}, ignored", exclusion);
            }
            stats.record(subtraction);
        }
        stats
    }

    /// Apply a single exclusion block.
    pub fn subtract(&self, forest: &mut PrefixForest, exclusion: IpNet) -> Subtraction {
        let mut level: Vec<Index> = forest.roots().to_vec();
        let mut depth = 0;

        loop {
            let hit = level.iter().copied().find(|&idx| {
                forest
                    .get_node(idx)
                    .is_some_and(|n| n.prefix == exclusion || n.prefix.contains(&exclusion))
            });

            let Some(idx) = hit else {
                let outcome = match self.policy {
                    SupersetPolicy::Ignore => Outcome::Ignored,
                    SupersetPolicy::Cascade => match self.cascade(forest, &level, exclusion) {
                        0 => Outcome::Ignored,
                        n => Outcome::Cascaded(n),
                    },
                };
                return Subtraction { outcome, depth };
            };

            let Some(node) = forest.get_node(idx) else {
                return Subtraction {
                    outcome: Outcome::Ignored,
                    depth,
                };
            };

            if node.dead {
                trace!("{} falls on dead node {}", exclusion, node.prefix);
                return Subtraction {
                    outcome: Outcome::AlreadyExcluded,
                    depth,
                };
            }

            if node.prefix == exclusion {
                trace!("{} matches node exactly, marking dead", exclusion);
                forest.mark_dead(idx);
                return Subtraction {
                    outcome: Outcome::Killed,
                    depth,
                };
            }

            if !node.children.is_empty() {
                // split once; later exclusions go through the existing children
                level = node.children.clone();
                depth += 1;
                continue;
            }

            let blocks = address_exclude(node.prefix, exclusion);
            trace!(
                "splitting {} around {} into {} blocks at depth {}",
                node.prefix,
                exclusion,
                blocks.len(),
                forest.ancestors(idx).count()
            );
            forest.split(idx, &blocks);
            return Subtraction {
                outcome: Outcome::Split,
                depth,
            };
        }
    }

    fn cascade(&self, forest: &mut PrefixForest, level: &[Index], exclusion: IpNet) -> usize {
        let covered: Vec<Index> = level
            .iter()
            .copied()
            .filter(|&idx| {
                forest
                    .get_node(idx)
                    .is_some_and(|n| !n.dead && exclusion.contains(&n.prefix))
            })
            .collect();
        for &idx in &covered {
            forest.mark_dead(idx);
        }
        if !covered.is_empty() {
            debug!("{} covers {} nodes, marked dead", exclusion, covered.len());
        }
        covered.len()
    }
}

/// Apply `exclusions` to `forest` with the default policy.
pub fn subtract_prefixes(forest: &mut PrefixForest, exclusions: &[IpNet]) -> PassStats {
    ExclusionEngine::default().subtract_prefixes(forest, exclusions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cidr::AddressFamily;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    fn forest_v4(roots: &[&str]) -> PrefixForest {
        PrefixForest::with_roots(AddressFamily::V4, roots.iter().map(|s| net(s))).unwrap()
    }

    #[test]
    fn given_exact_match_when_subtracting_then_node_dies() {
        let mut forest = forest_v4(&["1.0.0.0/8", "2.0.0.0/8"]);
        let stats = subtract_prefixes(&mut forest, &[net("1.0.0.0/8")]);

        assert_eq!(stats.killed, 1);
        assert_eq!(forest.active_leaves(), vec![net("2.0.0.0/8")]);
    }

    #[test]
    fn given_second_exclusion_inside_split_node_when_subtracting_then_routes_into_children() {
        let mut forest = forest_v4(&["10.0.0.0/8"]);
        subtract_prefixes(&mut forest, &[net("10.1.0.0/16")]);
        let root = forest.roots()[0];
        let children_before = forest.get_node(root).unwrap().children.clone();

        let subtraction = ExclusionEngine::default().subtract(&mut forest, net("10.200.0.0/16"));

        assert_eq!(subtraction.outcome, Outcome::Split);
        assert_eq!(subtraction.depth, 1);
        assert_eq!(forest.get_node(root).unwrap().children, children_before);
        assert!(!forest.active_leaves().contains(&net("10.200.0.0/16")));
    }

    #[test]
    fn given_exclusion_inside_hole_when_subtracting_then_ignored() {
        let mut forest = forest_v4(&["10.0.0.0/8"]);
        subtract_prefixes(&mut forest, &[net("10.1.0.0/16")]);
        let before = forest.active_leaves();

        let stats = subtract_prefixes(&mut forest, &[net("10.1.2.0/24")]);

        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.routed, 1);
        assert_eq!(forest.active_leaves(), before);
    }

    #[test]
    fn given_exclusion_inside_dead_node_when_subtracting_then_dead_node_is_not_split() {
        let mut forest = forest_v4(&["1.0.0.0/8"]);
        subtract_prefixes(&mut forest, &[net("1.0.0.0/8")]);

        let stats = subtract_prefixes(&mut forest, &[net("1.2.0.0/16"), net("1.0.0.0/8")]);

        assert_eq!(stats.already_excluded, 2);
        assert_eq!(forest.len(), 1);
    }

    #[test]
    fn given_superset_exclusion_with_ignore_policy_when_subtracting_then_no_effect() {
        let mut forest = forest_v4(&["1.0.0.0/8", "2.0.0.0/8"]);
        let stats = subtract_prefixes(&mut forest, &[net("0.0.0.0/6")]);

        assert_eq!(stats.ignored, 1);
        assert_eq!(forest.active_leaves().len(), 2);
    }

    #[test]
    fn given_superset_exclusion_with_cascade_policy_when_subtracting_then_covered_nodes_die() {
        let mut forest = forest_v4(&["1.0.0.0/8", "2.0.0.0/8", "8.0.0.0/8"]);
        let engine = ExclusionEngine::new(SupersetPolicy::Cascade);

        let stats = engine.subtract_prefixes(&mut forest, &[net("0.0.0.0/6")]);

        assert_eq!(stats.cascaded, 2);
        assert_eq!(forest.active_leaves(), vec![net("8.0.0.0/8")]);
    }

    #[test]
    fn given_cascade_inside_split_node_when_subtracting_then_only_covered_children_die() {
        let mut forest = forest_v4(&["10.0.0.0/8"]);
        let engine = ExclusionEngine::new(SupersetPolicy::Cascade);
        engine.subtract_prefixes(&mut forest, &[net("10.1.0.0/16")]);

        // 10.0.0.0/14 holds the /15 and /16 children next to the hole
        let stats = engine.subtract_prefixes(&mut forest, &[net("10.0.0.0/14")]);

        assert_eq!(stats.cascaded, 2);
        let leaves = forest.active_leaves();
        assert!(leaves.iter().all(|l| !net("10.0.0.0/14").contains(l)));
        assert!(leaves.contains(&net("10.4.0.0/14")));
    }

    #[test]
    fn given_ipv6_exclusion_when_subtracting_v4_forest_then_ignored() {
        let mut forest = forest_v4(&["1.0.0.0/8"]);
        let stats = subtract_prefixes(&mut forest, &[net("2000::/3")]);
        assert_eq!(stats.ignored, 1);
        assert_eq!(forest.active_leaves(), vec![net("1.0.0.0/8")]);
    }
}
