//! Shardkeep CLI - custody operations on an encrypted shard
//!
//! Passphrases are read from an environment variable when set, otherwise
//! from an interactive terminal prompt.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shardkeep_core::{
    storage, BiometricPrompt, BootStatus, CredentialError, CustodyConfig, ShardCustodian,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "shardkeep")]
#[command(about = "Encrypted-at-rest custody for local shard state", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, env = "SHARDKEEP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(short, long, env = "SHARDKEEP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Environment variable holding the passphrase
    #[arg(long, default_value = "SHARDKEEP_PASSPHRASE")]
    passphrase_env: String,

    /// Never prompt on the terminal, even when the configuration enables it
    #[arg(long)]
    no_prompt: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate legacy plaintext and restore the shard
    Boot,

    /// Encrypt a file as the new shard state
    Seal {
        /// Input file, or "-" for stdin
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Decrypt the shard
    Open {
        /// Output file; omit to write to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-seal the shard under a new passphrase
    Rotate {
        /// Environment variable holding the new passphrase
        #[arg(long)]
        new_passphrase_env: Option<String>,
    },

    /// Show custody status
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Irreversibly destroy the shard
    Destroy {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Write the effective configuration to a file
    InitConfig {
        /// Destination path
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Terminal passphrase entry used as the last-resort credential
struct TerminalPrompt;

impl BiometricPrompt for TerminalPrompt {
    fn prompt(&self) -> Result<Option<Zeroizing<String>>, CredentialError> {
        match rpassword::prompt_password("Shard passphrase: ") {
            Ok(entered) if entered.is_empty() => Ok(None),
            Ok(entered) => Ok(Some(Zeroizing::new(entered))),
            // No terminal attached
            Err(_) => Ok(None),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shardkeep_core=info,shardkeep=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::InitConfig { output } => {
            config.save(output)?;
            println!("Configuration written to {}", output.display());
            Ok(())
        }
        Commands::Boot => cmd_boot(&cli, config),
        Commands::Seal { input } => cmd_seal(&cli, config, input),
        Commands::Open { output } => cmd_open(&cli, config, output.as_deref()),
        Commands::Rotate { new_passphrase_env } => {
            cmd_rotate(&cli, config, new_passphrase_env.as_deref())
        }
        Commands::Status { json } => cmd_status(config, *json),
        Commands::Destroy { yes } => cmd_destroy(config, *yes),
    }
}

fn load_config(cli: &Cli) -> Result<CustodyConfig> {
    let mut config = match &cli.config {
        Some(path) => CustodyConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CustodyConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    Ok(config)
}

/// The terminal prompt stands in for the platform biometric prompt and is
/// attached only when `biometric_enabled` is set in the configuration
fn open_custodian(cli: &Cli, config: CustodyConfig) -> Result<ShardCustodian> {
    let prompt = prompt_enabled(cli, &config);
    let custodian = ShardCustodian::new(config).context("Failed to open custodian")?;
    if !prompt {
        return Ok(custodian);
    }
    Ok(custodian.with_biometric_prompt(Box::new(TerminalPrompt)))
}

fn prompt_enabled(cli: &Cli, config: &CustodyConfig) -> bool {
    config.biometric_enabled && !cli.no_prompt
}

fn passphrase_from_env(var: &str) -> Option<Zeroizing<String>> {
    std::env::var(var)
        .ok()
        .filter(|p| !p.is_empty())
        .map(Zeroizing::new)
}

fn cmd_boot(cli: &Cli, config: CustodyConfig) -> Result<()> {
    let passphrase = passphrase_from_env(&cli.passphrase_env);
    let mut custodian = open_custodian(cli, config)?;

    let report = custodian.secure_boot(passphrase.as_deref().map(String::as_str))?;
    println!("{}", report);

    match report.status {
        BootStatus::Restored(state) => {
            info!(bytes = state.len(), "shard state available");
            Ok(())
        }
        BootStatus::Empty => Ok(()),
        BootStatus::Rejected { .. } => bail!("credential rejected"),
        BootStatus::Wiped => bail!("shard wiped"),
    }
}

fn cmd_seal(cli: &Cli, config: CustodyConfig, input: &Path) -> Result<()> {
    let data = Zeroizing::new(if input.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?
    });

    let passphrase = passphrase_from_env(&cli.passphrase_env);
    let mut custodian = open_custodian(cli, config)?;
    custodian.encrypt_state(&data, passphrase.as_deref().map(String::as_str))?;

    println!("Sealed {} bytes", data.len());
    Ok(())
}

fn cmd_open(cli: &Cli, config: CustodyConfig, output: Option<&Path>) -> Result<()> {
    let passphrase = passphrase_from_env(&cli.passphrase_env);
    let mut custodian = open_custodian(cli, config)?;
    let state = custodian.decrypt_state(passphrase.as_deref().map(String::as_str))?;

    match output {
        Some(path) => {
            storage::write_atomic(path, &state)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {} bytes to {}", state.len(), path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&state)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn cmd_rotate(cli: &Cli, config: CustodyConfig, new_env: Option<&str>) -> Result<()> {
    let current = match passphrase_from_env(&cli.passphrase_env) {
        Some(p) => p,
        None => Zeroizing::new(rpassword::prompt_password("Current passphrase: ")?),
    };
    let new = match new_env.and_then(passphrase_from_env) {
        Some(p) => p,
        None => {
            let first = Zeroizing::new(rpassword::prompt_password("New passphrase: ")?);
            let second = Zeroizing::new(rpassword::prompt_password("Confirm new passphrase: ")?);
            if first != second {
                bail!("passphrases do not match");
            }
            first
        }
    };

    let mut custodian = open_custodian(cli, config)?;
    custodian.rotate_passphrase(&current, &new)?;
    println!("Passphrase rotated");
    Ok(())
}

fn cmd_status(config: CustodyConfig, json: bool) -> Result<()> {
    let custodian = ShardCustodian::new(config)?;
    let status = custodian.status()?;

    if json {
        let value = serde_json::json!({
            "data_dir": custodian.config().data_dir,
            "state": status.state.to_string(),
            "sealing": status.sealing,
            "salt_fingerprint": status.salt_fingerprint,
            "attempts_remaining": status.attempts_remaining,
            "hardware_backend": status.hardware_backend,
            "legacy_pending": status.legacy_pending,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Shard Custody Status");
    println!("====================");
    println!("Data dir:           {}", custodian.config().data_dir.display());
    println!("State:              {}", status.state);
    println!("Sealing:            {}", status.sealing.unwrap_or("-"));
    println!(
        "Salt fingerprint:   {}",
        status.salt_fingerprint.as_deref().unwrap_or("-")
    );
    println!("Attempts remaining: {}", status.attempts_remaining);
    println!("Hardware backend:   {}", status.hardware_backend);
    if status.legacy_pending {
        println!("Legacy plaintext pending migration - run `shardkeep boot`");
    }
    Ok(())
}

fn cmd_destroy(config: CustodyConfig, yes: bool) -> Result<()> {
    if !yes {
        eprint!("Destroy the shard in {}? Type 'destroy' to confirm: ", config.data_dir.display());
        io::stderr().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if answer.trim() != "destroy" {
            bail!("aborted");
        }
    }

    let mut custodian = ShardCustodian::new(config)?;
    custodian.destroy_shard()?;
    println!("Shard destroyed");
    Ok(())
}
