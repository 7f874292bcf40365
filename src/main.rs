use std::error::Error;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

use noncn::cli::commands::execute_command;
use noncn::cli::{output, Cli, CliError};
use noncn::exitcode;

// config crate traces every environment lookup
const QUIET_TARGETS: [&str; 1] = ["config::"];

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    let code = match execute_command(&cli) {
        Ok(()) => exitcode::OK,
        Err(e) => report(&e),
    };
    std::process::exit(code);
}

/// Print the error with its cause chain and pick the exit code.
fn report(e: &CliError) -> i32 {
    output::error(e);
    let mut next = e.source();
    while let Some(cause) = next {
        output::cause(cause);
        next = cause.source();
    }
    e.exit_code()
}

fn verbosity_filter(count: u8) -> LevelFilter {
    match count {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        3 => LevelFilter::TRACE,
        _ => {
            eprintln!("-ddd is the most verbose level");
            LevelFilter::TRACE
        }
    }
}

fn setup_logging(count: u8) {
    let level = verbosity_filter(count);
    let quiet = filter_fn(|metadata| {
        !QUIET_TARGETS
            .iter()
            .any(|target| metadata.target().starts_with(target))
    });

    // stdout carries the script, logs go to stderr
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(level)
        .with_filter(quiet);
    tracing_subscriber::registry().with(layer).init();

    if level >= LevelFilter::DEBUG {
        debug!("log level: {}", level);
    } else {
        info!("log level: {}", level);
    }
}
