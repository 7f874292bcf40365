//! Route generation service
//!
//! Builds the IPv4 and IPv6 forests from the input datasets, runs the exclusion
//! passes in order and renders the surviving leaves.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ipnet::IpNet;
use tracing::{debug, info, instrument};

use crate::application::render::RouteScript;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt, ParseResultExt};
use crate::config::Settings;
use crate::domain::reserved::{reserved_blocks, IPV6_GLOBAL_UNICAST};
use crate::domain::sources::{parse_cidr_list, parse_delegation, parse_registry};
use crate::domain::{
    parse_cidr, AddressFamily, ByFamily, ExclusionEngine, PassStats, PrefixForest,
};
use crate::infrastructure::traits::FileSystem;
use crate::util::path::dedup_paths;

/// Which input an exclusion pass came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassKind {
    /// Country records of the delegation feed
    Delegation,
    /// One user-supplied CIDR list
    List(PathBuf),
    /// Special-use blocks plus extra excludes
    Reserved,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassKind::Delegation => write!(f, "delegation"),
            PassKind::List(path) => write!(f, "list {}", path.display()),
            PassKind::Reserved => write!(f, "reserved"),
        }
    }
}

/// Result of one exclusion pass over one family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub kind: PassKind,
    pub family: AddressFamily,
    /// Number of exclusion blocks applied
    pub exclusions: usize,
    pub stats: PassStats,
}

/// Both forests after all passes.
#[derive(Debug)]
pub struct RouteForests {
    pub v4: PrefixForest,
    pub v6: PrefixForest,
    /// Passes in the order they ran
    pub passes: Vec<PassReport>,
}

impl RouteForests {
    pub fn get(&self, family: AddressFamily) -> &PrefixForest {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }

    fn get_mut(&mut self, family: AddressFamily) -> &mut PrefixForest {
        match family {
            AddressFamily::V4 => &mut self.v4,
            AddressFamily::V6 => &mut self.v6,
        }
    }

    /// Run one pass: each family's blocks go to that family's forest only.
    pub fn apply(&mut self, engine: &ExclusionEngine, kind: PassKind, exclusions: &ByFamily) {
        for family in AddressFamily::ALL {
            let blocks = exclusions.get(family);
            let stats = engine.subtract_prefixes(self.get_mut(family), blocks);
            info!("{} pass on {}: {} blocks, {}", kind, family, blocks.len(), stats);
            self.passes.push(PassReport {
                kind: kind.clone(),
                family,
                exclusions: blocks.len(),
                stats,
            });
        }
    }

    /// Counters of all passes over one family.
    pub fn totals(&self, family: AddressFamily) -> PassStats {
        let mut total = PassStats::default();
        for pass in self.passes.iter().filter(|p| p.family == family) {
            total.merge(&pass.stats);
        }
        total
    }
}

/// Rendered script with per-family route counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub script: String,
    pub v4_routes: usize,
    pub v6_routes: usize,
}

/// Service turning the input datasets into routes.
pub struct RouteService {
    fs: Arc<dyn FileSystem>,
}

impl RouteService {
    /// Create a new route service.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Read one input file completely.
    fn read_input(&self, path: &Path) -> ApplicationResult<String> {
        if !self.fs.exists(path) {
            return Err(ApplicationError::InputNotFound(path.to_path_buf()));
        }
        self.fs.read_to_string(path).with_path_context("read input", path)
    }

    /// Build both forests and run every exclusion pass.
    ///
    /// Pass order: delegation feed, each CIDR list (deduplicated, first-seen order),
    /// then reserved blocks followed by `settings.exclude`.
    #[instrument(level = "debug", skip(self, settings))]
    pub fn build(&self, settings: &Settings) -> ApplicationResult<RouteForests> {
        let sources = &settings.sources;

        let extra = settings
            .exclude
            .iter()
            .map(|s| parse_cidr(s))
            .collect::<Result<Vec<IpNet>, _>>()?;
        let extra = ByFamily::classify(extra);
        if !extra.is_empty() {
            debug!("{} extra excludes", extra.len());
        }

        let roots = {
            let content = self.read_input(&sources.registry)?;
            parse_registry(&content).in_file(&sources.registry)?
        };
        debug!("{} IPv4 roots from {}", roots.len(), sources.registry.display());

        let mut forests = RouteForests {
            v4: PrefixForest::with_roots(AddressFamily::V4, roots)?,
            v6: PrefixForest::with_roots(AddressFamily::V6, [IpNet::V6(IPV6_GLOBAL_UNICAST)])?,
            passes: Vec::new(),
        };
        let engine = ExclusionEngine::new(settings.superset_policy());
        debug!("superset policy: {:?}", engine.policy());

        let delegated = {
            let content = self.read_input(&sources.delegation)?;
            parse_delegation(&content, &sources.delegation_filter()).in_file(&sources.delegation)?
        };
        debug!(
            "{} delegated blocks from {}",
            delegated.len(),
            sources.delegation.display()
        );
        forests.apply(&engine, PassKind::Delegation, &delegated);

        for path in dedup_paths(&sources.china_lists) {
            let listed = {
                let content = self.read_input(&path)?;
                parse_cidr_list(&content).in_file(&path)?
            };
            forests.apply(&engine, PassKind::List(path), &ByFamily::classify(listed));
        }

        let mut reserved = ByFamily::default();
        for family in AddressFamily::ALL {
            reserved.extend(reserved_blocks(family));
        }
        reserved.extend(extra.v4);
        reserved.extend(extra.v6);
        forests.apply(&engine, PassKind::Reserved, &reserved);

        Ok(forests)
    }

    /// Render the script for already built forests.
    pub fn render(&self, forests: &RouteForests, settings: &Settings) -> Generated {
        let v4 = forests.v4.active_leaves();
        let v6 = forests.v6.active_leaves();
        let script = RouteScript::new(&settings.route)
            .family(AddressFamily::V4, &v4)
            .family(AddressFamily::V6, &v6)
            .to_string();
        Generated {
            script,
            v4_routes: v4.len(),
            v6_routes: v6.len(),
        }
    }

    /// Build, exclude and render in one go.
    #[instrument(level = "debug", skip(self, settings))]
    pub fn generate(&self, settings: &Settings) -> ApplicationResult<Generated> {
        let forests = self.build(settings)?;
        let generated = self.render(&forests, settings);
        info!(
            "rendered {} IPv4 and {} IPv6 routes",
            generated.v4_routes, generated.v6_routes
        );
        Ok(generated)
    }

    /// Write the script; on failure the previous file is left untouched.
    #[instrument(level = "debug", skip(self, script))]
    pub fn write_script(&self, path: &Path, script: &str) -> ApplicationResult<()> {
        self.fs
            .write_atomic(path, script)
            .map_err(|source| ApplicationError::OutputFailed {
                path: path.to_path_buf(),
                source,
            })
    }
}
