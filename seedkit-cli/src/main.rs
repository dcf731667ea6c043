//! `seedkit`: developer CLI for the `SeedKit` identity workflow.
//!
//! ```bash
//! seedkit validate "one two three"
//! seedkit derive "abandon abandon ... about"
//! seedkit recover --name main        # phrase and PIN from stdin
//! seedkit list
//! seedkit show <identity-id> --reveal
//! seedkit forget <identity-id>
//! ```

mod storage;
mod terminal;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{bail, eyre, OptionExt, WrapErr};
use secrecy::ExposeSecret;
use seedkit_core::{
    validation::validate_phrase, AddressDeriver, Bip39AddressDeriver, Collaborators,
    ConfirmOutcome, FlowConfig, IdentityController, IdentityId, Mode, SeedPhrase,
    SeedRefStore,
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::storage::FileIdentityStorage;
use crate::terminal::{TerminalAlerts, TerminalNavigator, TerminalPinPrompt};

#[derive(Parser)]
#[command(name = "seedkit", version, about = "SeedKit identity workflow CLI")]
struct Cli {
    /// Directory holding sealed identities.
    #[arg(long, global = true, env = "SEEDKIT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// JSON file with flow configuration overrides.
    #[arg(long, global = true, env = "SEEDKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a seed phrase.
    Validate {
        /// The phrase, quoted.
        phrase: String,
    },
    /// Derive the address a seed phrase controls.
    Derive {
        /// The phrase, quoted.
        phrase: String,
    },
    /// Recover an identity; the phrase and PIN are read from stdin.
    Recover {
        /// Display name for the identity.
        #[arg(long)]
        name: String,
    },
    /// List stored identities.
    List,
    /// Unlock a stored identity and print its details.
    Show {
        /// Identity id, as printed by `recover`.
        id: String,
        /// Also print the seed phrase.
        #[arg(long)]
        reveal: bool,
    },
    /// Delete a stored identity. Requires its PIN.
    Forget {
        /// Identity id, as printed by `recover`.
        id: String,
    },
}

fn init_tracing() {
    // `try_init` also installs the `log` bridge, so seedkit-core records show up.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("seedkit=info,seedkit_core=info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn load_config(path: Option<&Path>) -> eyre::Result<FlowConfig> {
    let Some(path) = path else {
        return Ok(FlowConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    FlowConfig::from_json(&json).wrap_err_with(|| format!("parsing config {}", path.display()))
}

fn data_dir(explicit: Option<PathBuf>) -> eyre::Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => dirs::data_dir()
            .map(|dir| dir.join("seedkit"))
            .ok_or_eyre("no data directory on this platform, pass --data-dir"),
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Validate { phrase } => validate(SeedPhrase::new(phrase), &config, cli.json).await,
        Command::Derive { phrase } => derive(SeedPhrase::new(phrase), cli.json).await,
        Command::Recover { name } => {
            let (_, store) = open_store(cli.data_dir, &config)?;
            recover(name, store, config, cli.json).await
        }
        Command::List => {
            let (storage, store) = open_store(cli.data_dir, &config)?;
            list(&storage, &store, cli.json).await
        }
        Command::Show { id, reveal } => {
            let (_, store) = open_store(cli.data_dir, &config)?;
            show(&IdentityId::parse(&id)?, &store, reveal, cli.json).await
        }
        Command::Forget { id } => {
            let (_, store) = open_store(cli.data_dir, &config)?;
            forget(&IdentityId::parse(&id)?, &store).await
        }
    }
}

fn open_store(
    explicit_dir: Option<PathBuf>,
    config: &FlowConfig,
) -> eyre::Result<(Arc<FileIdentityStorage>, SeedRefStore)> {
    let dir = data_dir(explicit_dir)?;
    let storage = Arc::new(FileIdentityStorage::open(&dir)?);
    tracing::debug!(dir = %dir.display(), "opened identity storage");
    let store = SeedRefStore::new(storage.clone(), config.kdf);
    Ok((storage, store))
}

async fn validate(phrase: SeedPhrase, config: &FlowConfig, json: bool) -> eyre::Result<()> {
    let is_bip39 = if phrase.is_blank() {
        false
    } else {
        Bip39AddressDeriver::default()
            .derive_address(&phrase)
            .await?
            .is_bip39
    };
    let verdict = validate_phrase(phrase.expose_secret(), is_bip39, config.min_word_count);
    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else if verdict.is_valid {
        println!("valid BIP39 recovery phrase");
    } else {
        let override_note = if verdict.allows_recovery_override {
            "usable after accepting the risk"
        } else {
            "not usable"
        };
        println!("{} ({override_note})", verdict.reason);
    }
    Ok(())
}

async fn derive(phrase: SeedPhrase, json: bool) -> eyre::Result<()> {
    let derived = Bip39AddressDeriver::default().derive_address(&phrase).await?;
    if json {
        println!(
            "{}",
            json!({ "address": derived.address, "is_bip39": derived.is_bip39 })
        );
    } else {
        let kind = if derived.is_bip39 { "bip39" } else { "legacy" };
        println!("{} ({kind})", derived.address);
    }
    Ok(())
}

async fn recover(
    name: String,
    store: SeedRefStore,
    config: FlowConfig,
    json: bool,
) -> eyre::Result<()> {
    let collaborators = Collaborators {
        navigator: Arc::new(TerminalNavigator),
        pin_prompt: Arc::new(TerminalPinPrompt),
        alerts: Arc::new(TerminalAlerts),
    };
    let mut controller = IdentityController::new(
        collaborators,
        store,
        Arc::new(Bip39AddressDeriver::default()),
        config,
        Mode::Recover,
    );
    controller.set_name(name)?;

    let Some(phrase) = terminal::prompt_line("Seed phrase: ").await? else {
        bail!("no seed phrase given");
    };
    controller.on_seed_input(SeedPhrase::new(phrase))?;
    controller.wait_for_derivation().await;
    if let Some(derived) = controller.address() {
        eprintln!("address: {}", derived.address);
    }

    loop {
        match controller.confirm_recover().await? {
            ConfirmOutcome::Committed(id) => {
                if json {
                    println!("{}", json!({ "id": id.as_str() }));
                } else {
                    println!("{id}");
                }
                return Ok(());
            }
            ConfirmOutcome::CommitFailed(_) => {
                if !terminal::confirm("Retry? [y/N] ").await {
                    bail!("identity not stored");
                }
            }
            ConfirmOutcome::RiskDeclined => bail!("risk not accepted, identity not stored"),
            ConfirmOutcome::Rejected => bail!("seed phrase rejected"),
            ConfirmOutcome::PinCancelled => bail!("pin entry cancelled"),
        }
    }
}

async fn list(storage: &FileIdentityStorage, store: &SeedRefStore, json: bool) -> eyre::Result<()> {
    let mut entries = Vec::new();
    for key in storage.keys()? {
        let id = IdentityId::parse(&key)?;
        let metadata = store.metadata(&id).await?;
        entries.push((id, metadata));
    }
    if json {
        let rows: Vec<_> = entries
            .iter()
            .map(|(id, metadata)| {
                json!({
                    "id": id.as_str(),
                    "name": metadata.name,
                    "address": metadata.address,
                    "seed_kind": metadata.seed_kind,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for (id, metadata) in &entries {
            println!(
                "{id}  {}  {}",
                metadata.name,
                metadata.address.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn show(id: &IdentityId, store: &SeedRefStore, reveal: bool, json: bool) -> eyre::Result<()> {
    let pin = terminal::read_pin("PIN: ")
        .await
        .map_err(|_| eyre!("pin entry cancelled"))?;
    let unlocked = store.open(id, pin).await?;
    let derived = Bip39AddressDeriver::default()
        .derive_address(&unlocked.seed)
        .await?;
    let seed = reveal.then(|| unlocked.seed.expose_secret().to_string());

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "id": id.as_str(),
                "name": unlocked.metadata.name,
                "seed_kind": unlocked.metadata.seed_kind,
                "address": derived.address,
                "seed": seed,
            }))?
        );
    } else {
        println!("name:    {}", unlocked.metadata.name);
        println!("kind:    {:?}", unlocked.metadata.seed_kind);
        println!("address: {}", derived.address);
        if let Some(seed) = seed {
            println!("seed:    {seed}");
        }
    }
    if let Some(stored) = unlocked.metadata.address.as_deref() {
        if stored != derived.address {
            tracing::warn!(%stored, derived = %derived.address, "stored address differs from derived address");
        }
    }
    Ok(())
}

async fn forget(id: &IdentityId, store: &SeedRefStore) -> eyre::Result<()> {
    let pin = terminal::read_pin("PIN: ")
        .await
        .map_err(|_| eyre!("pin entry cancelled"))?;
    store.remove_identity(id, pin).await?;
    println!("removed {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), FlowConfig::default());
    }

    #[test]
    fn test_config_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(&path, r#"{"settle_delay_ms": 10}"#).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().settle_delay_ms, 10);

        std::fs::write(&path, r#"{"min_word_count": 0}"#).unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
