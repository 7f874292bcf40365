//! Test support: logging setup and on-disk input fixtures.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tempfile::TempDir;
use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::Settings;

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "trace");
        }
        // global logging subscriber, used by all tracing log macros
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");

    // config crate logs every source lookup at trace
    let noisy_modules = ["config::"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

/// Small IANA registry: three allocated /8s and one reserved /8.
pub const SAMPLE_REGISTRY: &str = "\
Prefix,Designation,Date,WHOIS,RDAP,Status [1],Note
001/8,APNIC,2010-01,whois.apnic.net,https://rdap.apnic.net/,ALLOCATED,
010/8,IANA - Private Use,1995-06,,,RESERVED,
036/8,APNIC,2010-10,whois.apnic.net,https://rdap.apnic.net/,ALLOCATED,
223/8,APNIC,2010-04,whois.apnic.net,https://rdap.apnic.net/,ALLOCATED,
";

/// Delegation feed with one CN record per family plus noise.
pub const SAMPLE_DELEGATION: &str = "\
2|apnic|20241017|3|19830613|20241016|+1000
apnic|*|ipv4|*|2|summary
apnic|*|ipv6|*|1|summary
apnic|CN|ipv4|1.0.1.0|256|20110414|allocated
apnic|JP|ipv4|1.0.16.0|4096|20110412|allocated
apnic|CN|ipv4|36.0.0.0|65536|20100825|allocated
apnic|CN|ipv6|2400:da00::|32|20101202|allocated
";

/// China list with one new block and one already delegated.
pub const SAMPLE_CHINA_LIST: &str = "\
# extra china blocks
223.5.0.0/16
36.0.0.0/16

2408:8000::/20
";

/// Input files in a temporary project directory.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    /// Project directory holding the sample registry, delegation and one china list.
    pub fn new() -> Self {
        init_test_setup();
        let fixture = Self::empty();
        fixture.write("registry.csv", SAMPLE_REGISTRY);
        fixture.write("delegated.txt", SAMPLE_DELEGATION);
        fixture.write("china.txt", SAMPLE_CHINA_LIST);
        fixture
    }

    pub fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create fixture directory");
        }
        fs::write(&path, content).expect("Failed to write fixture");
        path
    }

    /// Default settings pointing at the fixture inputs.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.sources.registry = self.join("registry.csv");
        settings.sources.delegation = self.join("delegated.txt");
        settings.sources.china_lists = vec![self.join("china.txt")];
        settings.output = self.join("noncn.rsc");
        settings
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
