//! hackshell entry point.
//!
//! Resolves the configuration, installs the starting machines on first run,
//! logs the player in and runs the read-eval-print loop until the outermost
//! session exits or input closes.

mod console;
mod setup;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::console::style;

use hackshell_terminal::{CommandRegistry, Prompt, Shell, auth, providers};
use hackshell_types::config::ShellConfig;
use hackshell_vfs::password::migrate_passwords;
use hackshell_vfs::{DiskStore, MachineStore};

use console::ConsolePrompt;

/// Config file looked up in the working directory.
const CONFIG_FILE: &str = "hackshell.toml";

#[derive(Debug, Parser)]
#[command(name = "hackshell", version, about = "A simulated hacking shell")]
struct Args {
    /// Machine to start on (defaults to `default_machine` from the config).
    #[arg(long, env = "HACKSHELL_MACHINE")]
    machine: Option<String>,

    /// Directory holding one subdirectory per machine.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Configuration file (falls back to HACKSHELL_CONFIG, then ./hackshell.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reinstall the starting machines even if they exist.
    #[arg(long, conflicts_with = "skip_setup")]
    setup: bool,

    /// Never run first-run setup.
    #[arg(long)]
    skip_setup: bool,

    /// Hash every plaintext password in the store, then continue.
    #[arg(long)]
    migrate_passwords: bool,
}

fn load_config(explicit: Option<&Path>) -> Result<ShellConfig> {
    let from_env = std::env::var_os("HACKSHELL_CONFIG").map(PathBuf::from);
    let config = match explicit.map(Path::to_path_buf).or(from_env) {
        Some(path) => ShellConfig::load(&path)?,
        None => ShellConfig::load_or_default(Path::new(CONFIG_FILE))?,
    };
    Ok(config)
}

/// Rewrite plaintext passwords on every machine. Returns the number changed.
fn migrate_store(store: &dyn MachineStore) -> Result<usize> {
    let mut total = 0;
    for id in store.list_machines() {
        let mut machine = store
            .try_load(&id)
            .with_context(|| format!("loading {id}"))?;
        let changed = migrate_passwords(&mut machine);
        if changed > 0 {
            store.save(&id, &machine)?;
            log::info!("{id}: migrated {changed} passwords");
        }
        total += changed;
    }
    Ok(total)
}

fn repl(shell: &mut Shell) {
    let mut input = ConsolePrompt;
    loop {
        let prompt = shell.session().prompt();
        let Some(line) = input.read_line(&prompt) else {
            break;
        };
        let out = shell.execute(&line);
        for error in &out.errors {
            eprintln!("{}", style(error).red());
        }
        if !out.text.is_empty() {
            println!("{}", out.text);
        }
        if out.exit {
            break;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    let machine_id = args
        .machine
        .unwrap_or_else(|| config.default_machine.clone());
    log::info!(
        "starting on {machine_id} (data in {})",
        config.data_dir.display()
    );

    let store = DiskStore::new(config.data_dir.clone());
    let registry = CommandRegistry::with_providers(providers());

    if args.setup || (!args.skip_setup && !store.exists(&machine_id)) {
        let names: Vec<&str> = registry
            .list_commands()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        setup::install(&store, &machine_id, &names)
            .with_context(|| format!("setting up {machine_id}"))?;
        println!(
            "Installed {machine_id} and {} in {}",
            setup::TARGET_IP,
            config.data_dir.display()
        );
    }
    if args.migrate_passwords {
        let changed = migrate_store(&store)?;
        println!("Migrated {changed} passwords");
    }

    println!("{}", style("hackshell").bold().green());
    let mut prompt = ConsolePrompt;
    let session = auth::login(&store, &config, &machine_id, &mut prompt)?;
    println!(
        "Welcome to {}, {}. Type 'help' to get started.",
        session.host(),
        session.user
    );

    let mut shell = Shell::new(registry, session, Box::new(store), config, Box::new(prompt));
    repl(&mut shell);
    Ok(())
}
