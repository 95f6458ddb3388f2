//! shield: command-line front end for cybershield keys and messages.
//!
//! Offline commands (`keygen`, `fingerprint`, `encrypt`, `decrypt`) work on
//! PEM files and the local vault. `provision`, `send` and `history` talk to
//! the shared store at `DATABASE_URL`; `send` and `history` keep working from
//! the local log when it is down. All output is JSON on stdout; logs go to
//! stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::warn;

use shield_client::{FileMessageLog, FileVault, KeyStore, MessageExchange};
use shield_core::logging::init_tracing;
use shield_core::{Identity, KeyCodec, LocalKeyVault, PrivateKeyPem, PublicKeyPem, ShieldConfig};
use shield_db::{log_pool_metrics, Database, PoolConfig};
use shield_ledger::{HttpLedgerGateway, NotarizationClient};

#[derive(Parser)]
#[command(name = "shield")]
#[command(author, version, about = "End-to-end encrypted messaging keys for cybershield")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair, keep the private half in the local vault
    Keygen {
        /// Also write the public key to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replace a private key already in the vault
        #[arg(long)]
        force: bool,
    },

    /// Show the SHA-256 fingerprint of a public key
    Fingerprint {
        /// Path to a public key PEM file
        #[arg(short, long)]
        public_key: PathBuf,
    },

    /// Encrypt a message for the holder of a public key
    Encrypt {
        /// Path to the recipient's public key PEM file
        #[arg(short, long)]
        public_key: PathBuf,

        /// Message text
        #[arg(short, long)]
        message: String,
    },

    /// Decrypt a base64 ciphertext
    Decrypt {
        /// Base64 ciphertext
        #[arg(short, long)]
        ciphertext: String,

        /// Private key PEM file (default: the local vault)
        #[arg(short, long)]
        key: Option<PathBuf>,
    },

    /// Make sure an identity has a published key
    Provision {
        /// Identity (email) to provision
        #[arg(short, long)]
        identity: String,
    },

    /// Encrypt and send a message
    Send {
        #[arg(short, long)]
        from: String,

        #[arg(short, long)]
        to: String,

        /// Message text
        #[arg(short, long)]
        message: String,
    },

    /// List messages sent and received by an identity
    History {
        #[arg(short, long)]
        identity: String,

        /// Decrypt received messages with the local vault key
        #[arg(short, long)]
        decrypt: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // LOG_* settings may come from .env, so load it before tracing starts.
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing("warn");
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ShieldConfig::from_env().context("loading configuration")?;

    let output = match cli.command {
        Commands::Keygen { output, force } => {
            cmd_keygen(&config, output.as_deref(), force).await?
        }
        Commands::Fingerprint { public_key } => cmd_fingerprint(&public_key).await?,
        Commands::Encrypt {
            public_key,
            message,
        } => cmd_encrypt(&config, &public_key, &message).await?,
        Commands::Decrypt { ciphertext, key } => {
            cmd_decrypt(&config, &ciphertext, key.as_deref()).await?
        }
        Commands::Provision { identity } => {
            let identity: Identity = identity.parse()?;
            let connected = connect(&config).await?;
            let keys = &connected.keys;
            let outcome = keys.ensure_key_exists(&identity).await?;
            let published = keys.get_public_key(&identity).await?;
            let row = connected.db.keys.get_row(&identity).await?;
            serde_json::json!({
                "identity": identity,
                "outcome": outcome,
                "fingerprint": published.map(|k| k.fingerprint()),
                "published_at": row.map(|r| r.created_at),
                "local_key_authoritative": keys.local_key_is_authoritative(&identity).await?,
            })
        }
        Commands::Send { from, to, message } => {
            let sender: Identity = from.parse()?;
            let recipient: Identity = to.parse()?;
            let exchange = connect(&config).await?.exchange;
            let sent = exchange.send(&sender, &recipient, &message).await?;
            serde_json::to_value(&sent)?
        }
        Commands::History { identity, decrypt } => {
            let identity: Identity = identity.parse()?;
            let exchange = connect(&config).await?.exchange;
            let history = exchange.fetch_history(&identity).await?;
            let mut value = serde_json::to_value(&history)?;
            if decrypt {
                let mut plaintexts = Vec::with_capacity(history.received.len());
                for message in &history.received {
                    plaintexts.push(match exchange.open(message).await {
                        Ok(text) => serde_json::json!({ "id": message.id, "plaintext": text }),
                        Err(e) => serde_json::json!({ "id": message.id, "error": e.to_string() }),
                    });
                }
                value["decrypted"] = serde_json::Value::Array(plaintexts);
            }
            value
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_keygen(
    config: &ShieldConfig,
    output: Option<&Path>,
    force: bool,
) -> anyhow::Result<serde_json::Value> {
    let vault = FileVault::new(config.vault_path());
    check_vault_replaceable(&vault, force).await?;

    let codec = KeyCodec::new(config.key_size);
    let pair = tokio::task::spawn_blocking(move || codec.generate_key_pair()).await??;
    vault.set(&pair.private).await?;
    if let Some(path) = output {
        tokio::fs::write(path, pair.public.as_str())
            .await
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(serde_json::json!({
        "fingerprint": pair.public.fingerprint(),
        "key_bits": codec.key_size().bits(),
        "public_key": pair.public.as_str(),
        "vault_path": vault.path().to_string_lossy(),
    }))
}

/// The vault may hold the only copy of a published key's private half.
async fn check_vault_replaceable(vault: &FileVault, force: bool) -> anyhow::Result<()> {
    if force {
        return Ok(());
    }
    if let Some(existing) = vault.get().await? {
        anyhow::bail!(
            "local vault already holds a key ({}); pass --force to replace it",
            existing.public_key()?.fingerprint()
        );
    }
    Ok(())
}

async fn cmd_fingerprint(path: &Path) -> anyhow::Result<serde_json::Value> {
    let public_key = load_public_key(path).await?;
    Ok(serde_json::json!({
        "fingerprint": public_key.fingerprint(),
        "key_bits": public_key.modulus_bits()?,
    }))
}

async fn cmd_encrypt(
    config: &ShieldConfig,
    path: &Path,
    message: &str,
) -> anyhow::Result<serde_json::Value> {
    let public_key = load_public_key(path).await?;
    let ciphertext = KeyCodec::new(config.key_size).encrypt(message, &public_key)?;
    Ok(serde_json::json!({
        "ciphertext": ciphertext,
        "recipient_fingerprint": public_key.fingerprint(),
    }))
}

async fn cmd_decrypt(
    config: &ShieldConfig,
    ciphertext: &str,
    key_path: Option<&Path>,
) -> anyhow::Result<serde_json::Value> {
    let private_key = match key_path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            PrivateKeyPem::parse(&text)?
        }
        None => FileVault::new(config.vault_path())
            .get()
            .await?
            .ok_or_else(|| {
                anyhow!("local vault is empty; run `shield keygen` or `shield provision`")
            })?,
    };
    let plaintext = KeyCodec::new(config.key_size).decrypt(ciphertext, &private_key)?;
    Ok(serde_json::json!({ "plaintext": plaintext }))
}

async fn load_public_key(path: &Path) -> anyhow::Result<PublicKeyPem> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(PublicKeyPem::parse(&text)?)
}

struct Connected {
    db: Database,
    keys: Arc<KeyStore>,
    exchange: MessageExchange,
}

/// Wire up store, vault and local log. Never fails because the store is
/// down; commands that need it fail on first use instead.
async fn connect(config: &ShieldConfig) -> anyhow::Result<Connected> {
    let pool_config = PoolConfig::new().acquire_timeout(config.retry.timeout);
    let db = Database::open(&config.database_url, &pool_config)
        .context("invalid DATABASE_URL")?;
    match db.migrate().await {
        Ok(()) => log_pool_metrics(db.pool()),
        Err(e) => warn!(error = %e, "Shared store unreachable, migrations not applied"),
    }

    let keys = Arc::new(KeyStore::new(
        Arc::new(db.keys.clone()),
        Arc::new(FileVault::new(config.vault_path())),
        KeyCodec::new(config.key_size),
        config.retry.clone(),
        config.key_cache_capacity,
    ));
    let mut exchange = MessageExchange::new(
        keys.clone(),
        Arc::new(db.messages.clone()),
        Arc::new(FileMessageLog::new(config.local_log_path())),
    );

    if let Some(ledger) = &config.ledger {
        let notary = NotarizationClient::new(Arc::new(HttpLedgerGateway::new(ledger.clone())));
        match notary.connect().await {
            Ok(()) => exchange = exchange.with_notarization(Arc::new(notary)),
            Err(e) => warn!(error = %e, "Notarization gateway unavailable, continuing without it"),
        }
    }

    Ok(Connected { db, keys, exchange })
}
