//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/noncn/noncn.toml`
//! 3. Local config: `<project_dir>/noncn.toml`
//! 4. Environment variables: `NONCN_*` prefix
//! 5. Command line flags (see [`SettingsOverrides`])

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::{AddressFamily, DelegationFilter, SupersetPolicy};

/// Name of the project-local config file.
pub const LOCAL_CONFIG_FILE: &str = "noncn.toml";

/// Input datasets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceConfig {
    /// IANA IPv4 address-space registry (CSV)
    pub registry: PathBuf,
    /// RIR delegation feed
    pub delegation: PathBuf,
    /// Plain CIDR lists of the country's address space, applied in order
    pub china_lists: Vec<PathBuf>,
    /// Registry column value selecting delegation records
    pub registry_name: String,
    /// Country code selecting delegation records
    pub country: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            registry: PathBuf::from("dependency/ipv4-address-space.csv"),
            delegation: PathBuf::from("dependency/delegated-apnic-latest"),
            china_lists: vec![
                PathBuf::from("dependency/china_ip_list.txt"),
                PathBuf::from("dependency/china.txt"),
                PathBuf::from("dependency/chnroutes.txt"),
            ],
            registry_name: "apnic".into(),
            country: "CN".into(),
        }
    }
}

impl SourceConfig {
    pub fn delegation_filter(&self) -> DelegationFilter {
        DelegationFilter::new(self.registry_name.clone(), self.country.clone())
    }
}

/// Emitted route parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouteConfig {
    /// Gateway for routes, interface (`%ether1`) or address
    pub next_hop: String,
    /// IPv6 gateway; falls back to `next_hop`
    pub next_hop_v6: Option<String>,
    /// Routing table the routes are installed into
    pub routing_table: String,
    /// Administrative distance of every route
    pub distance: u8,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            next_hop: "%ether1".into(),
            next_hop_v6: None,
            routing_table: "noncn".into(),
            distance: 10,
        }
    }
}

impl RouteConfig {
    /// Gateway for one family: the family override if set, else the shared one.
    pub fn next_hop_for(&self, family: AddressFamily) -> &str {
        match family {
            AddressFamily::V4 => &self.next_hop,
            AddressFamily::V6 => self.next_hop_v6.as_deref().unwrap_or(&self.next_hop),
        }
    }
}

/// Unified configuration for noncn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Script destination, `-` for stdout
    pub output: PathBuf,
    /// Extra blocks to exclude (IPv4 and IPv6 mixed)
    pub exclude: Vec<String>,
    /// Exclusions broader than the nodes they cover mark those nodes dead
    pub cascade_supersets: bool,
    pub sources: SourceConfig,
    pub route: RouteConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output: PathBuf::from("noncn.rsc"),
            exclude: Vec::new(),
            cascade_supersets: false,
            sources: SourceConfig::default(),
            route: RouteConfig::default(),
        }
    }
}

/// Raw source config for intermediate parsing (all fields optional).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSourceConfig {
    pub registry: Option<PathBuf>,
    pub delegation: Option<PathBuf>,
    pub china_lists: Option<Vec<PathBuf>>,
    pub registry_name: Option<String>,
    pub country: Option<String>,
}

/// Raw route config for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawRouteConfig {
    pub next_hop: Option<String>,
    pub next_hop_v6: Option<String>,
    pub routing_table: Option<String>,
    pub distance: Option<u8>,
}

/// Raw settings for intermediate parsing.
///
/// `None` means "not specified, inherit".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub output: Option<PathBuf>,
    pub exclude: Option<Vec<String>>,
    pub cascade_supersets: Option<bool>,
    pub sources: RawSourceConfig,
    pub route: RawRouteConfig,
}

/// Values given on the command line; `None`/empty leaves the loaded value alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub registry: Option<PathBuf>,
    pub delegation: Option<PathBuf>,
    pub china_lists: Option<Vec<PathBuf>>,
    pub exclude: Vec<String>,
    pub next_hop: Option<String>,
    pub next_hop_v6: Option<String>,
    pub routing_table: Option<String>,
    pub distance: Option<u8>,
    pub output: Option<PathBuf>,
    pub cascade_supersets: bool,
}

/// Merge list items with union semantics, keeping first-seen order.
///
/// Items prefixed with `!` remove the corresponding item.
///
/// # Examples
/// ```ignore
/// merge_array(&["a", "b"], &["c"])       // → ["a", "b", "c"]
/// merge_array(&["a", "b"], &["!a", "c"]) // → ["b", "c"]
/// ```
pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
    let mut result: Vec<String> = Vec::with_capacity(base.len() + overlay.len());
    for item in base {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    for item in overlay {
        if let Some(negated) = item.strip_prefix('!') {
            result.retain(|existing| existing != negated);
        } else if !result.contains(item) {
            result.push(item.clone());
        }
    }
    result
}

/// Get the XDG config directory for noncn.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "noncn").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("noncn.toml"))
}

/// Get the path to the local config file in a project directory.
pub fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(LOCAL_CONFIG_FILE)
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

/// Expand `~`, `$VAR` and `${VAR}`; unknown variables leave the input unchanged.
fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_vars(path.to_string_lossy().as_ref()))
}

impl Settings {
    /// Superset handling for the exclusion engine.
    pub fn superset_policy(&self) -> SupersetPolicy {
        if self.cascade_supersets {
            SupersetPolicy::Cascade
        } else {
            SupersetPolicy::Ignore
        }
    }

    /// True when the script goes to stdout instead of a file.
    pub fn writes_to_stdout(&self) -> bool {
        self.output.as_os_str() == "-"
    }

    /// Merge overlay config onto self (base).
    ///
    /// - Scalars: overlay wins if Some
    /// - `exclude`: union with `!` negation
    /// - `china_lists`: replaced, list order is pass order
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        let sources = &overlay.sources;
        let route = &overlay.route;
        Self {
            output: overlay.output.clone().unwrap_or_else(|| self.output.clone()),
            exclude: overlay
                .exclude
                .as_ref()
                .map(|o| merge_array(&self.exclude, o))
                .unwrap_or_else(|| self.exclude.clone()),
            cascade_supersets: overlay.cascade_supersets.unwrap_or(self.cascade_supersets),
            sources: SourceConfig {
                registry: sources
                    .registry
                    .clone()
                    .unwrap_or_else(|| self.sources.registry.clone()),
                delegation: sources
                    .delegation
                    .clone()
                    .unwrap_or_else(|| self.sources.delegation.clone()),
                china_lists: sources
                    .china_lists
                    .clone()
                    .unwrap_or_else(|| self.sources.china_lists.clone()),
                registry_name: sources
                    .registry_name
                    .clone()
                    .unwrap_or_else(|| self.sources.registry_name.clone()),
                country: sources
                    .country
                    .clone()
                    .unwrap_or_else(|| self.sources.country.clone()),
            },
            route: RouteConfig {
                next_hop: route
                    .next_hop
                    .clone()
                    .unwrap_or_else(|| self.route.next_hop.clone()),
                next_hop_v6: route
                    .next_hop_v6
                    .clone()
                    .or_else(|| self.route.next_hop_v6.clone()),
                routing_table: route
                    .routing_table
                    .clone()
                    .unwrap_or_else(|| self.route.routing_table.clone()),
                distance: route.distance.unwrap_or(self.route.distance),
            },
        }
    }

    /// Load settings with layered precedence (defaults, global, local, env).
    ///
    /// Paths stay as written; call [`Settings::resolve_paths`] once command line
    /// overrides are applied.
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw);
            }
        }

        if let Some(dir) = project_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        Ok(current)
    }

    /// Apply NONCN_* environment variables as explicit overrides.
    ///
    /// Env vars replace values (not merge), lists included.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("NONCN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("exclude")
                .with_list_parse_key("sources.china_lists"),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("output") {
            settings.output = PathBuf::from(val);
        }
        if let Ok(val) = config.get::<Vec<String>>("exclude") {
            settings.exclude = val;
        }
        if let Ok(val) = config.get_bool("cascade_supersets") {
            settings.cascade_supersets = val;
        }
        if let Ok(val) = config.get_string("sources.registry") {
            settings.sources.registry = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("sources.delegation") {
            settings.sources.delegation = PathBuf::from(val);
        }
        if let Ok(val) = config.get::<Vec<String>>("sources.china_lists") {
            settings.sources.china_lists = val.into_iter().map(PathBuf::from).collect();
        }
        if let Ok(val) = config.get_string("sources.registry_name") {
            settings.sources.registry_name = val;
        }
        if let Ok(val) = config.get_string("sources.country") {
            settings.sources.country = val;
        }
        if let Ok(val) = config.get_string("route.next_hop") {
            settings.route.next_hop = val;
        }
        if let Ok(val) = config.get_string("route.next_hop_v6") {
            settings.route.next_hop_v6 = Some(val);
        }
        if let Ok(val) = config.get_string("route.routing_table") {
            settings.route.routing_table = val;
        }
        if let Ok(val) = config.get_int("route.distance") {
            settings.route.distance = u8::try_from(val).map_err(|_| ApplicationError::Config {
                message: format!("NONCN_ROUTE__DISTANCE out of range: {val}"),
            })?;
        }

        Ok(settings)
    }

    /// Apply command line values on top of the loaded layers.
    pub fn apply_overrides(&mut self, overrides: SettingsOverrides) {
        if let Some(registry) = overrides.registry {
            self.sources.registry = registry;
        }
        if let Some(delegation) = overrides.delegation {
            self.sources.delegation = delegation;
        }
        if let Some(lists) = overrides.china_lists {
            self.sources.china_lists = lists;
        }
        if !overrides.exclude.is_empty() {
            self.exclude = merge_array(&self.exclude, &overrides.exclude);
        }
        if let Some(next_hop) = overrides.next_hop {
            self.route.next_hop = next_hop;
        }
        if let Some(next_hop_v6) = overrides.next_hop_v6 {
            self.route.next_hop_v6 = Some(next_hop_v6);
        }
        if let Some(table) = overrides.routing_table {
            self.route.routing_table = table;
        }
        if let Some(distance) = overrides.distance {
            self.route.distance = distance;
        }
        if let Some(output) = overrides.output {
            self.output = output;
        }
        if overrides.cascade_supersets {
            self.cascade_supersets = true;
        }
    }

    /// Expand `~`/`$VAR` in path fields and anchor relative ones at `project_dir`.
    pub fn resolve_paths(&mut self, project_dir: &Path) {
        let resolve = |path: &Path| {
            let expanded = expand_path(path);
            if expanded.is_absolute() {
                expanded
            } else {
                project_dir.join(expanded)
            }
        };
        self.sources.registry = resolve(&self.sources.registry);
        self.sources.delegation = resolve(&self.sources.delegation);
        self.sources.china_lists = self
            .sources
            .china_lists
            .iter()
            .map(|p| resolve(p))
            .collect();
        if !self.writes_to_stdout() {
            self.output = resolve(&self.output);
        }
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# noncn configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/noncn/noncn.toml
#   Local:  <project_dir>/noncn.toml
#   Env:    NONCN_* environment variables (NONCN_ROUTE__NEXT_HOP=...)
#   Flags:  command line
#
# `exclude` lists are merged across layers; "!cidr" removes an inherited entry.
# `china_lists` replaces the inherited list.

# Script destination ("-" for stdout)
# output = "noncn.rsc"

# Extra blocks to exclude, IPv4 and IPv6 mixed
# exclude = ["203.0.113.0/24", "2001:db8::/32"]

# Exclusions broader than existing nodes mark those nodes dead
# cascade_supersets = false

[sources]
# registry = "dependency/ipv4-address-space.csv"
# delegation = "dependency/delegated-apnic-latest"
# china_lists = ["dependency/china_ip_list.txt", "dependency/china.txt", "dependency/chnroutes.txt"]
# registry_name = "apnic"
# country = "CN"

[route]
# next_hop = "%ether1"
# next_hop_v6 = "%wg0"
# routing_table = "noncn"
# distance = 10
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
