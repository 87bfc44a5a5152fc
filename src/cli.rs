use crate::{
    catalog,
    config::default_data_dir,
    engine::{Engine, EngineEvent},
    lifecycle::{BatchReport, ToggleOutcome, MOD_PACKS},
    loader::LoaderState,
    transport,
    update::UpdateStatus,
};
use anyhow::{bail, Result};
use serde::Serialize;
use std::{thread, time::Duration};

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

enum CliCommand {
    ListAvailable,
    ListInstalled,
    Install(Vec<String>),
    Import(String),
    Enable(Vec<String>),
    Disable(Vec<String>),
    Uninstall(Vec<String>),
    PackList,
    PackApply(String),
    UpdateCheck,
    UpdateApply,
    LoaderStatus,
    LoaderInstall,
    LoaderToggle,
    LoaderUninstall,
    Absorb,
    ConfigShow,
    ConfigGamePath(String),
    ConfigAutoUpdate(bool),
    Paths,
    CleanTemp,
    Watch,
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (format, tokens) = parse_global_options(&args);
    let command = parse_command(&tokens)?;

    match command {
        CliCommand::Help => {
            print_help();
            return Ok(());
        }
        CliCommand::Version => {
            println!("tacklebox v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let engine = Engine::open(default_data_dir()?)?;
    run_command(&engine, command, format)
}

fn parse_global_options(args: &[String]) -> (OutputFormat, Vec<String>) {
    let mut format = OutputFormat::Text;
    let mut tokens = Vec::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            if let Some(parsed) = OutputFormat::parse(value) {
                format = parsed;
            }
            continue;
        }
        if arg == "--format" {
            if let Some(value) = iter.next() {
                if let Some(parsed) = OutputFormat::parse(value) {
                    format = parsed;
                }
            }
            continue;
        }
        tokens.push(arg.to_string());
    }
    (format, tokens)
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = &tokens[1..];
    let command = match head.as_str() {
        "--help" | "-h" | "help" => CliCommand::Help,
        "--version" | "-V" | "version" => CliCommand::Version,
        "list" => match rest.first().map(|s| s.as_str()) {
            Some("available") | None => CliCommand::ListAvailable,
            Some("installed") => CliCommand::ListInstalled,
            Some(other) => bail!("unknown list target: {other} (use 'available' or 'installed')"),
        },
        "install" => {
            if rest.is_empty() {
                bail!("install requires at least one mod title");
            }
            CliCommand::Install(rest.to_vec())
        }
        "import" => {
            let Some(path) = rest.first() else {
                bail!("import requires a path to a zip archive");
            };
            CliCommand::Import(path.to_string())
        }
        "enable" => {
            if rest.is_empty() {
                bail!("enable requires at least one mod id");
            }
            CliCommand::Enable(rest.to_vec())
        }
        "disable" => {
            if rest.is_empty() {
                bail!("disable requires at least one mod id");
            }
            CliCommand::Disable(rest.to_vec())
        }
        "uninstall" => {
            if rest.is_empty() {
                bail!("uninstall requires at least one mod id");
            }
            CliCommand::Uninstall(rest.to_vec())
        }
        "pack" => match rest.first().map(|s| s.as_str()) {
            Some("list") | None => CliCommand::PackList,
            Some("apply") => {
                let name = rest.get(1..).unwrap_or(&[]).join(" ");
                if name.is_empty() {
                    bail!("pack apply requires a pack name");
                }
                CliCommand::PackApply(name)
            }
            Some(other) => bail!("unknown pack command: {other} (use 'list' or 'apply')"),
        },
        "update" => match rest.first().map(|s| s.as_str()) {
            Some("check") | None => CliCommand::UpdateCheck,
            Some("apply") => CliCommand::UpdateApply,
            Some(other) => bail!("unknown update command: {other} (use 'check' or 'apply')"),
        },
        "loader" => match rest.first().map(|s| s.as_str()) {
            Some("status") | None => CliCommand::LoaderStatus,
            Some("install") | Some("update") => CliCommand::LoaderInstall,
            Some("toggle") => CliCommand::LoaderToggle,
            Some("uninstall") => CliCommand::LoaderUninstall,
            Some(other) => bail!("unknown loader command: {other}"),
        },
        "absorb" => CliCommand::Absorb,
        "config" => match rest.first().map(|s| s.as_str()) {
            Some("show") | None => CliCommand::ConfigShow,
            Some("game-path") => {
                let Some(path) = rest.get(1) else {
                    bail!("config game-path requires a path");
                };
                CliCommand::ConfigGamePath(path.to_string())
            }
            Some("auto-update") => match rest.get(1).map(|s| s.as_str()) {
                Some("on") => CliCommand::ConfigAutoUpdate(true),
                Some("off") => CliCommand::ConfigAutoUpdate(false),
                _ => bail!("config auto-update requires 'on' or 'off'"),
            },
            Some(other) => bail!("unknown config command: {other}"),
        },
        "paths" => CliCommand::Paths,
        "clean-temp" => CliCommand::CleanTemp,
        "watch" => CliCommand::Watch,
        other => bail!("unknown command: {other} (try 'tacklebox help')"),
    };
    Ok(command)
}

#[derive(Serialize)]
struct AvailableRow {
    title: String,
    category: &'static str,
    author: Option<String>,
    download: String,
}

#[derive(Serialize)]
struct InstalledRow {
    id: String,
    title: String,
    version: String,
    enabled: bool,
    third_party: bool,
}

#[derive(Serialize)]
struct UpdateRow {
    id: String,
    title: String,
    installed: String,
    status: String,
    latest: Option<String>,
}

fn run_command(engine: &Engine, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::ListAvailable => {
            let count = engine.refresh_catalog()?;
            tracing::debug!(count, "catalog refreshed");
            let rows: Vec<AvailableRow> = catalog::available_mods(&engine.catalog())
                .into_iter()
                .map(|available| AvailableRow {
                    title: available.entry.title,
                    category: available.category,
                    author: available.entry.author,
                    download: available.entry.download,
                })
                .collect();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Text => {
                    let mut current = "";
                    for row in &rows {
                        if row.category != current {
                            current = row.category;
                            println!("-- {current} --");
                        }
                        println!("  {}", row.title);
                    }
                }
            }
        }
        CliCommand::ListInstalled => {
            if let Ok(absorbed) = engine.absorb() {
                for descriptor in &absorbed {
                    println!("absorbed pre-existing mod: {}", descriptor.title);
                }
            }
            let rows: Vec<InstalledRow> = engine
                .installed()
                .into_iter()
                .map(|descriptor| InstalledRow {
                    id: descriptor.id,
                    title: descriptor.title,
                    version: descriptor.version,
                    enabled: descriptor.enabled,
                    third_party: descriptor.third_party,
                })
                .collect();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Text => {
                    for row in &rows {
                        let state = if row.enabled { "enabled " } else { "disabled" };
                        let origin = if row.third_party { " [3rd]" } else { "" };
                        println!("{state}  {} {}{origin}  ({})", row.title, row.version, row.id);
                    }
                }
            }
        }
        CliCommand::Install(titles) => {
            engine.refresh_catalog()?;
            let report = engine.install_titles(&titles)?;
            print_batch(&report, "installed");
        }
        CliCommand::Import(path) => {
            let descriptor = engine.import(path.as_ref())?;
            println!("imported {} ({})", descriptor.title, descriptor.id);
        }
        CliCommand::Enable(ids) => {
            let mut report = BatchReport::default();
            for id in &ids {
                match engine.enable(id) {
                    Ok(ToggleOutcome::Changed) => report.succeeded.push(id.clone()),
                    Ok(ToggleOutcome::NoOp) => println!("{id} is already enabled"),
                    Err(err) => report.failed.push((id.clone(), err.to_string())),
                }
            }
            print_batch(&report, "enabled");
        }
        CliCommand::Disable(ids) => {
            let mut report = BatchReport::default();
            for id in &ids {
                match engine.disable(id) {
                    Ok(ToggleOutcome::Changed) => report.succeeded.push(id.clone()),
                    Ok(ToggleOutcome::NoOp) => println!("{id} is already disabled"),
                    Err(err) => report.failed.push((id.clone(), err.to_string())),
                }
            }
            print_batch(&report, "disabled");
        }
        CliCommand::Uninstall(ids) => {
            let mut report = BatchReport::default();
            for id in &ids {
                report.record(id, engine.uninstall(id));
            }
            print_batch(&report, "uninstalled");
        }
        CliCommand::PackList => {
            for (name, titles) in MOD_PACKS {
                println!("{name}: {}", titles.join(", "));
            }
        }
        CliCommand::PackApply(name) => {
            engine.refresh_catalog()?;
            let report = engine.apply_pack(&name)?;
            println!(
                "pack '{}': disabled {} mod(s), enabled {} member(s)",
                report.pack,
                report.disabled,
                report.members.succeeded.len()
            );
            for (member, reason) in &report.members.failed {
                println!("  failed {member}: {reason}");
            }
        }
        CliCommand::UpdateCheck => {
            engine.refresh_catalog()?;
            let rows: Vec<UpdateRow> = engine
                .check_updates()
                .into_iter()
                .map(|check| {
                    let (status, latest) = match check.status {
                        UpdateStatus::UpToDate => ("up-to-date".to_string(), None),
                        UpdateStatus::Available { version } => {
                            ("update-available".to_string(), Some(version))
                        }
                        UpdateStatus::Unknown => ("unknown".to_string(), None),
                        UpdateStatus::NotInCatalog => ("not-in-catalog".to_string(), None),
                    };
                    UpdateRow {
                        id: check.id,
                        title: check.title,
                        installed: check.installed_version,
                        status,
                        latest,
                    }
                })
                .collect();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Text => {
                    for row in &rows {
                        match &row.latest {
                            Some(latest) => {
                                println!("{}: {} -> {latest}", row.title, row.installed)
                            }
                            None => println!("{}: {} ({})", row.title, row.installed, row.status),
                        }
                    }
                }
            }
        }
        CliCommand::UpdateApply => {
            engine.refresh_catalog()?;
            let report = engine.apply_updates()?;
            if report.succeeded.is_empty() && report.failed.is_empty() {
                println!("everything is up to date");
            } else {
                print_batch(&report, "updated");
            }
        }
        CliCommand::LoaderStatus => {
            let state = engine.loader_state()?;
            let recorded = engine
                .settings()
                .gdweave_version
                .unwrap_or_else(|| "unrecorded".to_string());
            let label = match state {
                LoaderState::Enabled => "enabled",
                LoaderState::Disabled => "disabled",
                LoaderState::NotInstalled => "not installed",
            };
            println!("GDWeave: {label} (recorded version: {recorded})");
        }
        CliCommand::LoaderInstall => {
            let version = engine.loader_install()?;
            println!("GDWeave {version} installed");
        }
        CliCommand::LoaderToggle => {
            let state = engine.loader_toggle()?;
            let label = match state {
                LoaderState::Enabled => "enabled",
                LoaderState::Disabled => "disabled",
                LoaderState::NotInstalled => "not installed",
            };
            println!("GDWeave is now {label}");
        }
        CliCommand::LoaderUninstall => {
            engine.loader_uninstall()?;
            println!("GDWeave uninstalled");
        }
        CliCommand::Absorb => {
            let absorbed = engine.absorb()?;
            if absorbed.is_empty() {
                println!("no unmanaged mods found");
            } else {
                for descriptor in &absorbed {
                    println!("absorbed {} ({})", descriptor.title, descriptor.id);
                }
            }
        }
        CliCommand::ConfigShow => {
            let settings = engine.settings();
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        CliCommand::ConfigGamePath(path) => {
            engine.update_settings(|settings| settings.game_path = Some(path.clone().into()))?;
            println!("game path set to {path}");
        }
        CliCommand::ConfigAutoUpdate(enabled) => {
            engine.update_settings(|settings| settings.auto_update = enabled)?;
            println!("auto-update {}", if enabled { "on" } else { "off" });
        }
        CliCommand::Paths => {
            println!("data dir: {}", engine.data_dir().display());
            let settings = engine.settings();
            match settings.game_path {
                Some(path) => println!("game path: {}", path.display()),
                None => println!("game path: (unset)"),
            }
        }
        CliCommand::CleanTemp => {
            let removed = transport::delete_temp_files(engine.data_dir())?;
            println!("removed {removed} temp entr{}", if removed == 1 { "y" } else { "ies" });
        }
        CliCommand::Watch => {
            engine.refresh_catalog_async();
            engine.start_periodic_sweep();
            println!("watching for updates (hourly sweep); press Ctrl+C to stop");
            loop {
                for event in engine.drain_events() {
                    match event {
                        EngineEvent::Status(message) => println!("{message}"),
                        EngineEvent::CatalogLoaded(entries) => {
                            println!("catalog loaded: {} mods", entries.len())
                        }
                        EngineEvent::InstallFinished { title, outcome } => match outcome {
                            Ok(id) => println!("installed {title} ({id})"),
                            Err(reason) => println!("install of {title} failed: {reason}"),
                        },
                        EngineEvent::SweepFinished { checks, installed } => {
                            let stale = checks
                                .iter()
                                .filter(|check| {
                                    matches!(check.status, UpdateStatus::Available { .. })
                                })
                                .count();
                            println!(
                                "sweep finished: {stale} update(s) found, {} installed",
                                installed.len()
                            );
                        }
                    }
                }
                thread::sleep(Duration::from_secs(1));
            }
        }
        CliCommand::Help | CliCommand::Version => unreachable!("handled before engine startup"),
    }
    Ok(())
}

fn print_batch(report: &BatchReport, verb: &str) {
    for name in &report.succeeded {
        println!("{verb} {name}");
    }
    for (name, reason) in &report.failed {
        println!("failed {name}: {reason}");
    }
}

fn print_help() {
    println!("tacklebox - WEBFISHING mod manager");
    println!();
    println!("Usage: tacklebox [--format text|json] <command>");
    println!();
    println!("Commands:");
    println!("  list available          List catalog mods grouped by category");
    println!("  list installed          List installed mods from both stores");
    println!("  install <title>...      Install mods from the catalog");
    println!("  import <zip>            Import a third-party mod package");
    println!("  enable <id>...          Enable installed mods");
    println!("  disable <id>...         Disable installed mods");
    println!("  uninstall <id>...       Remove installed mods");
    println!("  pack list               List curated mod packs");
    println!("  pack apply <name>       Apply a curated pack");
    println!("  update check            Check mods and loader for updates");
    println!("  update apply            Install all available mod updates");
    println!("  loader status           Show GDWeave state");
    println!("  loader install          Install or update GDWeave");
    println!("  loader toggle           Enable/disable GDWeave");
    println!("  loader uninstall        Remove GDWeave");
    println!("  absorb                  Register unmanaged plugin-directory mods");
    println!("  config show             Print settings");
    println!("  config game-path <dir>  Set the game installation path");
    println!("  config auto-update on|off");
    println!("  paths                   Show data and game paths");
    println!("  clean-temp              Delete leftover staging directories");
    println!("  watch                   Run with the hourly silent update sweep");
}
