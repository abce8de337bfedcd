//! pass-engine - command-line front end for the password store engine
//!
//! Usage:
//!   pass-engine init <key-id>...            - Create a store for the given recipients
//!   pass-engine insert <path>               - Add an entry, plaintext read from stdin
//!   pass-engine show <path>                 - Decrypt an entry to stdout
//!   pass-engine mv <source> <dest>          - Move, re-encrypting when recipients change
//!   pass-engine recipients <folder> <id>... - Declare recipients and re-encrypt

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pass_engine::{
    config::Config,
    crypto::{Plaintext, RecipientSet},
    error::{Error, PathError},
    store::{NodeKind, Outcome},
    StoreEngine,
};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "pass-engine")]
#[command(author = "pass-engine Contributors")]
#[command(version)]
#[command(about = "Native engine for pass-compatible password stores")]
struct Cli {
    /// Configuration file path (JSON or YAML)
    #[arg(short, long, default_value = "~/.config/pass-engine/config.yaml")]
    config: PathBuf,

    /// Password store directory, overrides the configuration
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store for the given recipients
    Init {
        /// Recipient key ids
        #[arg(required = true)]
        recipients: Vec<String>,

        /// Declare for a subfolder instead of the store root
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Add an entry; plaintext is read from stdin
    Insert {
        path: String,

        /// Overwrite an existing entry
        #[arg(short, long)]
        force: bool,

        /// Keep every line of stdin instead of only the first
        #[arg(short, long)]
        multiline: bool,
    },

    /// Replace an entry's content with stdin
    Edit { path: String },

    /// Decrypt an entry to stdout
    Show { path: String },

    /// List entries and folders
    Ls { folder: Option<String> },

    /// Remove an entry or folder
    Rm {
        path: String,

        /// Remove a folder with everything in it
        #[arg(short, long)]
        recursive: bool,
    },

    /// Move an entry or folder
    Mv {
        source: String,
        dest: String,

        #[arg(short, long)]
        force: bool,
    },

    /// Copy an entry or folder
    Cp {
        source: String,
        dest: String,

        #[arg(short, long)]
        force: bool,
    },

    /// Rename an entry or folder within its folder
    Rename {
        path: String,
        new_name: String,

        #[arg(short, long)]
        force: bool,
    },

    /// Show or declare the recipients of a folder
    Recipients {
        folder: String,

        /// New recipient key ids; omit to show the effective ones
        ids: Vec<String>,
    },

    /// Remove a folder's own declaration so it inherits from its parent
    UnsetRecipients { folder: String },

    /// Re-encrypt a folder for its effective recipients
    Reencrypt {
        #[arg(default_value = ".")]
        folder: String,
    },

    /// Pull changes from the remote repository
    Pull,

    /// Push changes to the remote repository
    Push,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    let config_path = expand_tilde(&cli.config);

    if let Err(e) = run(cli.command, &config_path, cli.store) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(config_path: &Path, store: Option<PathBuf>) -> Result<Config> {
    let mut config = if config_path.exists() {
        Config::load(config_path)
            .with_context(|| format!("loading configuration from {:?}", config_path))?
    } else {
        debug!("No configuration at {:?}, using defaults", config_path);
        Config::from_env()?
    };
    if let Some(store) = store {
        config.store.root = expand_tilde(&store);
    }
    Ok(config)
}

fn run(command: Commands, config_path: &Path, store: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, store)?;
    if let Commands::Init { .. } = &command {
        config.ensure_directories()?;
    }
    let engine = StoreEngine::from_config(&config)?.with_progress(Box::new(|p| {
        debug!(
            "{}: {}/{} entries ({}%)",
            p.folder,
            p.processed_entries,
            p.total_entries,
            p.progress_percent()
        )
    }));

    match command {
        Commands::Init { recipients, path } => {
            let recipients = RecipientSet::from_ids(&recipients);
            let outcome = match path {
                Some(path) => engine.set_recipients(&path, &recipients)?,
                None => engine.init(&recipients)?,
            };
            info!("Password store initialized for {}", recipients);
            report(&outcome);
        }

        Commands::Insert {
            path,
            force,
            multiline,
        } => {
            let plaintext = read_stdin(multiline)?;
            report(&engine.add_entry(&path, &plaintext, force)?);
        }

        Commands::Edit { path } => {
            let plaintext = read_stdin(true)?;
            report(&engine.edit_entry(&path, &plaintext)?);
        }

        Commands::Show { path } => {
            let plaintext = engine.show_entry(&path)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&plaintext)?;
            stdout.flush()?;
        }

        Commands::Ls { folder } => {
            for item in engine.list(folder.as_deref())? {
                let depth = item.path.depth().saturating_sub(1);
                let name = item.path.name().unwrap_or_default();
                match item.kind {
                    NodeKind::Folder => println!("{}{}/", "  ".repeat(depth), name),
                    NodeKind::Entry => println!("{}{}", "  ".repeat(depth), name),
                }
            }
        }

        Commands::Rm { path, recursive } => {
            let outcome = if recursive {
                engine.delete_folder(&path, true)?
            } else {
                match engine.delete_entry(&path) {
                    Err(Error::Path(PathError::NotInStore { .. })) => {
                        engine.delete_folder(&path, false)?
                    }
                    other => other?,
                }
            };
            report(&outcome);
        }

        Commands::Mv {
            source,
            dest,
            force,
        } => report(&engine.move_path(&source, &dest, force)?),

        Commands::Cp {
            source,
            dest,
            force,
        } => report(&engine.copy_path(&source, &dest, force)?),

        Commands::Rename {
            path,
            new_name,
            force,
        } => report(&engine.rename(&path, &new_name, force)?),

        Commands::Recipients { folder, ids } => {
            if ids.is_empty() {
                let resolved = engine.effective_recipients(&folder)?;
                println!("{} (declared at {})", resolved.recipients, resolved.declared_at);
            } else {
                let recipients = RecipientSet::from_ids(&ids);
                report(&engine.set_recipients(&folder, &recipients)?);
            }
        }

        Commands::UnsetRecipients { folder } => report(&engine.clear_recipients(&folder)?),

        Commands::Reencrypt { folder } => report(&engine.reencrypt(&folder)?),

        Commands::Pull => engine.pull().context("pull failed")?,

        Commands::Push => engine.push().context("push failed")?,
    }

    Ok(())
}

/// Print warnings and cascade results of a mutation
fn report(outcome: &Outcome) {
    for path in &outcome.changed {
        debug!("Changed {}", path);
    }
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
    if let Some(cascade) = &outcome.cascade {
        if !cascade.reencrypted.is_empty() {
            println!(
                "Re-encrypted {} entries under {} for {}",
                cascade.reencrypted.len(),
                cascade.folder,
                cascade.recipients
            );
        }
        for failure in &cascade.failed {
            eprintln!("failed: {}: {}", failure.path, failure.reason);
        }
        if cascade.cancelled {
            eprintln!(
                "cancelled: {} entries not visited; run `pass-engine reencrypt {}` to finish",
                cascade.not_visited.len(),
                cascade.folder
            );
        } else if !cascade.failed.is_empty() {
            eprintln!(
                "run `pass-engine reencrypt {}` to retry the failed entries",
                cascade.folder
            );
        }
    }
}

fn read_stdin(multiline: bool) -> Result<Plaintext> {
    read_plaintext(std::io::stdin().lock(), multiline)
}

/// Read plaintext into a buffer that is wiped on drop
fn read_plaintext(mut reader: impl Read, multiline: bool) -> Result<Plaintext> {
    let mut input = Plaintext::new(Vec::new());
    reader
        .read_to_end(&mut input)
        .context("reading plaintext from stdin")?;
    if !multiline {
        if let Some(end) = input.iter().position(|b| *b == b'\n') {
            input.truncate(end);
        }
        if input.last() == Some(&b'\r') {
            input.pop();
        }
    }
    Ok(input)
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
