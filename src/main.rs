use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use fleetkeeper_lib::id::{new_setup_password, new_uuid_v7};
use fleetkeeper_lib::store::{list_backups, prune_backups, restore_backup};
use fleetkeeper_lib::{FleetConfig, InstancePatch, InstanceRecord, InstanceRegistry, InstanceStatus};

const NOT_FOUND_EXIT_CODE: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "fleetkeeper",
    about = "Inspect and edit the fleet instance registry",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("FLEET_GIT_HASH"), ")")
)]
struct Cli {
    /// Data directory holding fleet.json (defaults to $DATA_DIR, then /data).
    #[arg(long, value_name = "PATH", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print every instance record.
    List,
    /// Print one instance record.
    Get { id: String },
    /// Add an instance record.
    Create {
        #[arg(long)]
        name: String,
        /// Instance id; a UUIDv7 is generated when omitted.
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "needs-setup")]
        status: InstanceStatus,
        #[arg(long)]
        domain: Option<String>,
        /// Setup credential; a random one is generated when omitted.
        #[arg(long)]
        setup_password: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Fail instead of replacing an existing instance with the same id.
        #[arg(long)]
        unique: bool,
    },
    /// Apply a partial update given as a JSON object.
    Patch {
        id: String,
        #[arg(long, value_name = "OBJECT")]
        json: String,
    },
    /// Delete an instance record and print its last value.
    Remove { id: String },
    /// Backup housekeeping.
    #[command(subcommand)]
    Backups(BackupsCommand),
}

#[derive(Debug, Subcommand)]
enum BackupsCommand {
    /// List backups, newest first.
    List,
    /// Delete all but the newest backups.
    Prune {
        #[arg(long)]
        keep: usize,
    },
    /// Make a backup the live document again.
    Restore { path: PathBuf },
}

fn main() {
    fleetkeeper_lib::init_logging();

    let cli = Cli::parse();
    match handle_cli(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{serialized}");
    Ok(())
}

fn print_found<T: Serialize>(value: Option<T>, id: &str) -> Result<i32> {
    match value {
        Some(value) => {
            print_json(&value)?;
            Ok(0)
        }
        None => {
            eprintln!("Instance {id} not found");
            Ok(NOT_FOUND_EXIT_CODE)
        }
    }
}

fn handle_cli(cli: Cli) -> Result<i32> {
    let mut config = FleetConfig::from_env();
    if let Some(data_dir) = cli.data_dir {
        config = config.with_data_dir(data_dir);
    }
    let registry = InstanceRegistry::from_config(&config);

    match cli.command {
        Commands::List => {
            print_json(&json!({ "instances": registry.list() }))?;
            Ok(0)
        }
        Commands::Get { id } => print_found(registry.get(&id), &id),
        Commands::Create {
            name,
            id,
            status,
            domain,
            setup_password,
            notes,
            unique,
        } => {
            let mut record = InstanceRecord::new(id.unwrap_or_else(new_uuid_v7), name, status);
            record.domain = domain;
            record.setup_password = Some(setup_password.unwrap_or_else(new_setup_password));
            record.notes = notes;

            let created = if unique {
                registry.create_unique(record)
            } else {
                registry.create(record)
            }
            .context("create instance")?;
            print_json(&created)?;
            Ok(0)
        }
        Commands::Patch { id, json } => {
            let patch: InstancePatch =
                serde_json::from_str(&json).context("parse patch object")?;
            let updated = registry.patch(&id, patch).context("patch instance")?;
            print_found(updated, &id)
        }
        Commands::Remove { id } => {
            let removed = registry.remove(&id).context("remove instance")?;
            print_found(removed, &id)
        }
        Commands::Backups(command) => handle_backups(&registry, command),
    }
}

fn handle_backups(registry: &InstanceRegistry, command: BackupsCommand) -> Result<i32> {
    let store = registry.store();
    match command {
        BackupsCommand::List => {
            let backups = list_backups(store).context("list backups")?;
            print_json(&json!({ "backups": backups }))?;
        }
        BackupsCommand::Prune { keep } => {
            let removed = prune_backups(store, keep).context("prune backups")?;
            let removed: Vec<String> = removed
                .iter()
                .map(|path| path.display().to_string())
                .collect();
            print_json(&json!({ "removed": removed }))?;
        }
        BackupsCommand::Restore { path } => {
            let doc = restore_backup(store, &path)
                .with_context(|| format!("restore backup {}", path.display()))?;
            print_json(&json!({ "restored": path.display().to_string(), "instances": doc.len() }))?;
        }
    }
    Ok(0)
}
