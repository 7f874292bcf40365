//! Command dispatch

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use tracing::{debug, instrument};

use crate::application::services::RouteForests;
use crate::application::LeafList;
use crate::cli::args::{
    selected_families, Cli, Commands, ConfigCommands, FamilyArg, RouteArgs, SourceArgs,
};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, local_config_path, Settings, SettingsOverrides};
use crate::domain::tree_display::TreeNodeConvert;
use crate::domain::AddressFamily;
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;
use crate::util::path::display_relative;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Commands::Generate {
            sources,
            route,
            output,
        } => cmd_generate(cli, sources, route, output.as_deref()),
        Commands::Tree { sources, family } => cmd_tree(cli, sources, *family),
        Commands::Leaves { sources, family } => cmd_leaves(cli, sources, *family),
        Commands::Config { command } => cmd_config(cli, command),
        Commands::Completion { shell } => cmd_completion(*shell),
    }
}

fn project_dir(cli: &Cli) -> CliResult<PathBuf> {
    match &cli.project_dir {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir()
            .map_err(|e| CliError::Infra(InfraError::io("current directory", e))),
    }
}

fn source_overrides(sources: &SourceArgs) -> SettingsOverrides {
    SettingsOverrides {
        registry: sources.registry.clone(),
        delegation: sources.delegation.clone(),
        china_lists: sources.chn_list.clone(),
        exclude: sources.exclude.clone(),
        cascade_supersets: sources.cascade_supersets,
        ..SettingsOverrides::default()
    }
}

/// Layered settings with command line overrides and resolved paths.
fn load_settings(project_dir: &Path, overrides: SettingsOverrides) -> CliResult<Settings> {
    let mut settings = Settings::load(Some(project_dir))?;
    settings.apply_overrides(overrides);
    settings.resolve_paths(project_dir);
    debug!("settings: {:?}", settings);
    Ok(settings)
}

fn write_stdout(content: &str) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(content.as_bytes())
        .and_then(|_| stdout.flush())
        .map_err(|e| CliError::Infra(InfraError::io("write stdout", e)))
}

#[instrument(skip(cli))]
fn cmd_generate(
    cli: &Cli,
    sources: &SourceArgs,
    route: &RouteArgs,
    output_path: Option<&Path>,
) -> CliResult<()> {
    let dir = project_dir(cli)?;
    let overrides = SettingsOverrides {
        next_hop: route.next.clone(),
        next_hop_v6: route.next6.clone(),
        routing_table: route.table.clone(),
        distance: route.distance,
        output: output_path.map(Path::to_path_buf),
        ..source_overrides(sources)
    };
    let container = ServiceContainer::new(load_settings(&dir, overrides)?);
    let settings = &container.settings;

    let generated = container.routes.generate(settings)?;

    if settings.writes_to_stdout() {
        return write_stdout(&generated.script);
    }

    container
        .routes
        .write_script(&settings.output, &generated.script)?;
    output::success(&format!(
        "wrote {} ({} IPv4 routes, {} IPv6 routes)",
        display_relative(&settings.output, &dir),
        generated.v4_routes,
        generated.v6_routes
    ));
    Ok(())
}

#[instrument(skip(cli))]
fn cmd_tree(cli: &Cli, sources: &SourceArgs, family: Option<FamilyArg>) -> CliResult<()> {
    let dir = project_dir(cli)?;
    let container = ServiceContainer::new(load_settings(&dir, source_overrides(sources))?);
    let forests = container.routes.build(&container.settings)?;

    for family in selected_families(family) {
        output::header(&tree_header(&forests, family));
        output::info(&forests.get(family).to_tree_string());
    }
    Ok(())
}

/// `IPv4: 58 nodes, depth 17, 3 dead blocks, killed=1 split=...`
fn tree_header(forests: &RouteForests, family: AddressFamily) -> String {
    let forest = forests.get(family);
    format!(
        "{}: {} nodes, depth {}, {} dead blocks, {}",
        family,
        forest.len(),
        forest.depth(),
        forest.dead_blocks().len(),
        forests.totals(family)
    )
}

#[instrument(skip(cli))]
fn cmd_leaves(cli: &Cli, sources: &SourceArgs, family: Option<FamilyArg>) -> CliResult<()> {
    let dir = project_dir(cli)?;
    let container = ServiceContainer::new(load_settings(&dir, source_overrides(sources))?);
    let forests = container.routes.build(&container.settings)?;

    for family in selected_families(family) {
        let leaves = forests.get(family).active_leaves();
        write_stdout(&LeafList(&leaves).to_string())?;
    }
    Ok(())
}

#[instrument(skip(cli))]
fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    let dir = project_dir(cli)?;
    match command {
        ConfigCommands::Show => {
            let settings = load_settings(&dir, SettingsOverrides::default())?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Path => {
            let local = local_config_path(&dir);
            match global_config_path() {
                Some(global) => show_config_path("global", &global),
                None => output::failure("global: no config directory on this platform"),
            }
            show_config_path("local", &local);
        }
        ConfigCommands::Init { global, force } => {
            let path = if *global {
                global_config_path().ok_or_else(|| {
                    CliError::Usage("no global config directory on this platform".into())
                })?
            } else {
                local_config_path(&dir)
            };
            if path.exists() && !force {
                return Err(CliError::Usage(format!(
                    "config already exists: {} (use --force to overwrite)",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CliError::Infra(InfraError::io(format!("create {}", parent.display()), e))
                })?;
            }
            std::fs::write(&path, Settings::template()).map_err(|e| {
                CliError::Infra(InfraError::io(format!("write {}", path.display()), e))
            })?;
            output::action("Created", &path.display());
        }
    }
    Ok(())
}

fn show_config_path(label: &str, path: &Path) {
    let msg = format!("{}: {}", label, path.display());
    if path.exists() {
        output::success_detail(&msg);
    } else {
        output::failure(&format!("{} (not found)", msg));
    }
}

fn cmd_completion(shell: Shell) -> CliResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}
