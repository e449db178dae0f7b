//! Entry point for the **deskplan** command-line tool.
//!
//! Loads the application config from `$XDG_CONFIG_HOME/deskplan/config.json`
//! (falling back to compiled-in defaults), then runs one subcommand against
//! the X11 backend.

use clap::{Parser, Subcommand};
use deskplan::config::{load_layout, Config, ConfigError};
use deskplan::expr::ExprError;
use deskplan::layout::{LayoutError, LayoutExecutor};
use deskplan::locator::Locator;
use deskplan::process::{ParseError, ProcessForest};
use deskplan::query::search;
use deskplan::retry::RetryPolicy;
use deskplan::shortcut::{applications_dir, Shortcut, ShortcutError};
use deskplan::traits::ProcessHost;
use deskplan::x11::{SystemHost, X11Error, X11Wm};
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "deskplan")]
#[command(about = "Arrange application windows across monitors from a YAML layout")]
struct Cli {
    /// Keep raw tool output in listings (overrides the config file)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every entry of a layout file
    Layout {
        config: PathBuf,
        /// Stop at the first failing entry
        #[arg(long)]
        fail_fast: bool,
    },
    /// Print the current process tree as JSON
    Pstree,
    /// Show what each locator of a layout file currently matches
    TestLocators { config: PathBuf },
    /// Write a desktop launcher that applies a layout file
    CreateShortcut {
        config: PathBuf,
        /// Theme icon name or image path
        #[arg(long)]
        icon: Option<String>,
        /// Where to put the launcher (default: $XDG_DATA_HOME/applications)
        #[arg(long)]
        applications_dir: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    X11(#[from] X11Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Shortcut(#[from] ShortcutError),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{failed} layout entries failed, {skipped} skipped")]
    EntriesFailed { failed: usize, skipped: usize },
}

/// Resolve the config directory (`$XDG_CONFIG_HOME/deskplan`).
fn config_dir() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        format!("{}/.config", home)
    });
    PathBuf::from(base).join("deskplan")
}

/// Try to load the config from `$XDG_CONFIG_HOME/deskplan/config.json`,
/// falling back to compiled-in defaults.
fn load_config() -> Config {
    let path = config_dir().join("config.json");
    match Config::load(&path) {
        Ok(cfg) => {
            info!("loaded config from {}", path.display());
            cfg
        }
        Err(e) => {
            info!("no config file ({}), using defaults", e);
            Config::default()
        }
    }
}

//  Main

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = load_config();
    config.debug |= cli.debug;

    let result = match cli.command {
        Commands::Layout { config: path, fail_fast } => {
            config.fail_fast |= fail_fast;
            run_layout(&config, path)
        }
        Commands::Pstree => print_pstree(),
        Commands::TestLocators { config: path } => test_locators(&config, path),
        Commands::CreateShortcut {
            config: path,
            icon,
            applications_dir: dir,
        } => create_shortcut(path, icon, dir),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

//  Subcommands

fn executor(config: &Config) -> Result<LayoutExecutor<X11Wm, SystemHost>, CliError> {
    let wm = X11Wm::new(config.debug)?;
    Ok(LayoutExecutor::new(
        wm,
        SystemHost::new(),
        RetryPolicy::from(&config.retry),
    )?)
}

fn run_layout(config: &Config, path: PathBuf) -> Result<(), CliError> {
    let specs = load_layout(&path)?;
    let executor = executor(config)?;
    let report = executor.run(&specs, config.fail_fast);

    for outcome in &report.outcomes {
        if let Ok(placement) = &outcome.result {
            info!(
                "{}: {} placed at {},{} {}x{}",
                outcome.command,
                placement.window.id,
                placement.rect.x,
                placement.rect.y,
                placement.rect.width,
                placement.rect.height
            );
        }
    }
    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::EntriesFailed {
            failed: report.failures().count(),
            skipped: report.skipped,
        })
    }
}

fn print_pstree() -> Result<(), CliError> {
    let forest = ProcessForest::parse(SystemHost::new().process_snapshot()?)?;
    println!("{}", serde_json::to_string_pretty(&forest.to_tree())?);
    Ok(())
}

fn test_locators(config: &Config, path: PathBuf) -> Result<(), CliError> {
    let specs = load_layout(&path)?;
    let executor = executor(config)?;

    for spec in &specs {
        println!("Testing locator: {}", spec.window_locator);
        let found = match &spec.window_locator {
            Locator::ProcessTree(criteria) => {
                let forest = executor.process_forest()?;
                let first = search(&forest, criteria).next().transpose()?;
                match first.and_then(|node| forest.id_of(node.pid)) {
                    Some(id) => serde_json::to_value(forest.subtree(id, Some(0)))?,
                    None => serde_json::Value::Null,
                }
            }
            Locator::TitleRegex(_) => serde_json::to_value(executor.locate(spec)?)?,
        };
        println!("{}", serde_json::to_string_pretty(&found)?);
    }
    Ok(())
}

fn create_shortcut(
    config: PathBuf,
    icon: Option<String>,
    dir: Option<PathBuf>,
) -> Result<(), CliError> {
    let program = std::env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "deskplan".into());
    let shortcut = Shortcut::for_layout(&program, &config, icon.as_deref())?;
    let path = shortcut.write(&dir.unwrap_or_else(applications_dir))?;
    println!("Wrote {}", path.display());
    Ok(())
}
