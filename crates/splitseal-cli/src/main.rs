//! splitseal: split-key record protection CLI
//!
//! Local commands (fragments as files in a directory):
//!   protect <record.json> <out-dir>   - protect a record into fragment files
//!   unprotect <dir>                   - recover the record from fragment files
//!   verify <dir>                      - check the commitment without keys
//!
//! Vault commands (fragments in configured storage, anchors in the ledger):
//!   seal <owner> <record.json>        - protect, store fragment A, anchor fragment B
//!   open <owner>                      - recover the latest sealed record
//!   check <owner>                     - integrity report for the latest anchor
//!   status                            - storage health
//!
//! Key management:
//!   fingerprint                       - fingerprint of key A + key B
//!   derive-keys                       - derive key A / key B from hardware seed material
//!   config show                       - display current configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};

use splitseal_core::config::SplitsealConfig;
use splitseal_core::{ProtectOptions, ProtectedRecord, ProtectionMetadata};
use splitseal_crypto::{HardwareKeys, KeySeed, SecurityCore, KEY_SIZE};
use splitseal_storage::{FragmentVault, S3Credentials};

const FRAGMENT_A_FILE: &str = "fragment_a.bin";
const FRAGMENT_B_FILE: &str = "fragment_b.hex";
const COMMITMENT_FILE: &str = "commitment.txt";
const METADATA_FILE: &str = "metadata.json";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "splitseal",
    version,
    about = "Split-key record protection",
    long_about = "splitseal: protect structured records under two hardware-bound keys, \
                  split into a bulk fragment and a ledger-anchored binding fragment"
)]
struct Cli {
    /// Path to splitseal.toml configuration file
    #[arg(long, short = 'c', env = "SPLITSEAL_CONFIG", default_value = "/etc/splitseal/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Hex-encoded hardware keys. Prefer the environment over the command line.
#[derive(Args)]
struct KeyArgs {
    /// Key A (card-bound), 64 hex characters
    #[arg(long = "key-a", env = "SPLITSEAL_KEY_A", hide_env_values = true, value_parser = parse_secret)]
    key_a: SecretString,
    /// Key B (phone-bound), 64 hex characters
    #[arg(long = "key-b", env = "SPLITSEAL_KEY_B", hide_env_values = true, value_parser = parse_secret)]
    key_b: SecretString,
}

fn parse_secret(value: &str) -> Result<SecretString, std::convert::Infallible> {
    Ok(SecretString::from(value))
}

impl std::fmt::Debug for KeyArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyArgs")
            .field("key_a", &"[REDACTED]")
            .field("key_b", &"[REDACTED]")
            .finish()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Protect a JSON record into fragment files in <out-dir>
    Protect {
        /// JSON object to protect
        input: PathBuf,
        /// Directory for fragment_a.bin, fragment_b.hex, commitment.txt, metadata.json
        out_dir: PathBuf,
        #[command(flatten)]
        keys: KeyArgs,
        /// Skip canary injection
        #[arg(long)]
        no_anti_tampering: bool,
    },

    /// Recover a record from fragment files
    Unprotect {
        /// Directory written by `protect`
        dir: PathBuf,
        #[command(flatten)]
        keys: KeyArgs,
        /// Write the record here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Verify fragment integrity without keys or decryption
    Verify {
        /// Directory written by `protect`
        dir: PathBuf,
        /// Print the full integrity report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Protect a record and store it in the vault under <owner>
    Seal {
        owner: String,
        input: PathBuf,
        #[command(flatten)]
        keys: KeyArgs,
        #[arg(long)]
        no_anti_tampering: bool,
    },

    /// Recover the latest record sealed for <owner>
    Open {
        owner: String,
        #[command(flatten)]
        keys: KeyArgs,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Integrity report for <owner>'s stored fragments against the latest anchor
    Check { owner: String },

    /// Show storage backend health
    Status,

    /// Print the fingerprint of key A + key B
    Fingerprint {
        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Derive key A and key B from hardware seed material
    ///
    /// Without --sealed-secret the keys depend only on the public material and
    /// identity given here.
    #[command(name = "derive-keys")]
    DeriveKeys {
        /// Card public material (hex)
        #[arg(long)]
        card: String,
        /// Phone public material (hex)
        #[arg(long)]
        phone: String,
        /// Owner identity (e.g. a DID)
        #[arg(long)]
        identity: String,
        /// Hardware-sealed secret, 64 hex characters
        #[arg(long, env = "SPLITSEAL_SEALED_SECRET", hide_env_values = true, value_parser = parse_secret)]
        sealed_secret: Option<SecretString>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SplitsealConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    init_logging(&config.logging.level, &config.logging.format);
    tracing::debug!(config = %cli.config.display(), backend = %config.storage.backend, "configuration loaded");

    match cli.command {
        Commands::Protect { input, out_dir, keys, no_anti_tampering } => {
            cmd_protect(&config, &input, &out_dir, &keys, !no_anti_tampering).await
        }
        Commands::Unprotect { dir, keys, output } => {
            cmd_unprotect(&config, &dir, &keys, output.as_deref()).await
        }
        Commands::Verify { dir, json } => cmd_verify(&config, &dir, json).await,
        Commands::Seal { owner, input, keys, no_anti_tampering } => {
            cmd_seal(&config, &owner, &input, &keys, !no_anti_tampering).await
        }
        Commands::Open { owner, keys, output } => {
            cmd_open(&config, &owner, &keys, output.as_deref()).await
        }
        Commands::Check { owner } => cmd_check(&config, &owner).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Fingerprint { keys } => cmd_fingerprint(&keys),
        Commands::DeriveKeys { card, phone, identity, sealed_secret } => {
            cmd_derive_keys(&card, &phone, &identity, sealed_secret)
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // logs go to stderr so record output on stdout stays machine-readable
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Key and record helpers ────────────────────────────────────────────────────

fn decode_key(label: &str, hex_key: &SecretString) -> Result<[u8; KEY_SIZE]> {
    let bytes = hex::decode(hex_key.expose_secret().trim())
        .with_context(|| format!("{label} is not valid hex"))?;
    <[u8; KEY_SIZE]>::try_from(bytes.as_slice())
        .map_err(|_| anyhow::anyhow!("{label} must be {KEY_SIZE} bytes ({} hex chars), got {}", KEY_SIZE * 2, bytes.len()))
}

fn load_keys(args: &KeyArgs) -> Result<HardwareKeys> {
    Ok(HardwareKeys::from_bytes(
        decode_key("key A", &args.key_a)?,
        decode_key("key B", &args.key_b)?,
    ))
}

async fn read_record(path: &Path) -> Result<ProtectedRecord> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading record: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_slice(&content)
        .with_context(|| format!("parsing record JSON: {}", path.display()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} must contain a JSON object", path.display()),
    }
}

async fn write_record(record: &ProtectedRecord, output: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(record).context("rendering record")?;
    match output {
        Some(path) => tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("writing record: {}", path.display())),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}

fn options(config: &SplitsealConfig, anti_tampering: bool) -> ProtectOptions {
    ProtectOptions {
        anti_tampering: anti_tampering && config.protection.anti_tampering,
        nonce: None,
    }
}

/// Fragment files as written by `protect`
struct FragmentFiles {
    fragment_a: Vec<u8>,
    fragment_b: Vec<u8>,
    commitment: String,
    metadata: ProtectionMetadata,
}

async fn read_fragment_files(dir: &Path) -> Result<FragmentFiles> {
    let read = |name: &str| {
        let path = dir.join(name);
        async move {
            tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))
        }
    };

    let fragment_a = read(FRAGMENT_A_FILE).await?;
    let fragment_b_hex = String::from_utf8(read(FRAGMENT_B_FILE).await?)
        .context("fragment B file is not UTF-8")?;
    let fragment_b = hex::decode(fragment_b_hex.trim()).context("fragment B is not valid hex")?;
    let commitment = String::from_utf8(read(COMMITMENT_FILE).await?)
        .context("commitment file is not UTF-8")?
        .trim()
        .to_string();
    let metadata = ProtectionMetadata::from_bytes(&read(METADATA_FILE).await?)
        .context("parsing metadata.json")?;

    Ok(FragmentFiles {
        fragment_a,
        fragment_b,
        commitment,
        metadata,
    })
}

// ── Storage operator from config and environment credentials ─────────────────

/// Build the vault over the configured backend.
///
/// S3 credentials come from AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY (or the
/// SPLITSEAL_ prefixed variants).
fn build_vault(config: &SplitsealConfig) -> Result<FragmentVault> {
    let op = build_operator_from_env(config)?;
    Ok(FragmentVault::from_operator(
        op,
        &config.storage.prefix,
        config.protection.clone(),
    )?)
}

fn build_operator_from_env(config: &SplitsealConfig) -> Result<opendal::Operator> {
    let credentials = if config.storage.backend == "s3" {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("SPLITSEAL_ACCESS_KEY_ID"))
            .context(
                "S3 credentials not set\n\
                 Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.",
            )?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("SPLITSEAL_SECRET_ACCESS_KEY"))
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        Some(S3Credentials {
            access_key_id,
            secret_access_key,
        })
    } else {
        None
    };

    splitseal_storage::build_operator(&config.storage, credentials.as_ref())
        .context("building storage operator")
}

// ── `splitseal protect` ───────────────────────────────────────────────────────

async fn cmd_protect(
    config: &SplitsealConfig,
    input: &Path,
    out_dir: &Path,
    keys: &KeyArgs,
    anti_tampering: bool,
) -> Result<()> {
    let record = read_record(input).await?;
    let keys = load_keys(keys)?;
    let core = SecurityCore::new(config.protection.clone())?;

    let out = core.protect(&record, &keys, &options(config, anti_tampering))?;

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let metadata_bytes = out.metadata.to_bytes()?;
    for (name, bytes) in [
        (FRAGMENT_A_FILE, out.fragment_a.clone()),
        (FRAGMENT_B_FILE, hex::encode(out.fragment_b).into_bytes()),
        (COMMITMENT_FILE, out.commitment.clone().into_bytes()),
        (METADATA_FILE, metadata_bytes),
    ] {
        let path = out_dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
    }

    println!("protected:   {}", input.display());
    println!("fragment A:  {} ({})", out_dir.join(FRAGMENT_A_FILE).display(), fmt_bytes(out.fragment_a.len() as u64));
    println!("fragment B:  {}", hex::encode(out.fragment_b));
    println!("commitment:  {}", out.commitment);
    println!();
    println!("{}", out.metadata.summary());
    Ok(())
}

// ── `splitseal unprotect` ─────────────────────────────────────────────────────

async fn cmd_unprotect(
    config: &SplitsealConfig,
    dir: &Path,
    keys: &KeyArgs,
    output: Option<&Path>,
) -> Result<()> {
    let files = read_fragment_files(dir).await?;
    let keys = load_keys(keys)?;
    let core = SecurityCore::new(config.protection.clone())?;

    let record = core
        .unprotect(&files.fragment_a, &files.fragment_b, &keys, &files.metadata)
        .with_context(|| format!("unprotecting {}", dir.display()))?;
    write_record(&record, output).await
}

// ── `splitseal verify` ────────────────────────────────────────────────────────

async fn cmd_verify(config: &SplitsealConfig, dir: &Path, json: bool) -> Result<()> {
    let files = read_fragment_files(dir).await?;
    let core = SecurityCore::new(config.protection.clone())?;

    let ok = core.verify_integrity(&files.fragment_a, &files.fragment_b, &files.commitment, &files.metadata);
    if json {
        let mut report = splitseal_crypto::integrity_report(&files.fragment_a, &files.fragment_b, &files.commitment);
        report.commitment_valid = ok;
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("fingerprint: {}", files.metadata.fingerprint);
        println!("integrity:   {}", if ok { "OK" } else { "FAILED" });
    }

    if !ok {
        anyhow::bail!("integrity check failed for {}", dir.display());
    }
    Ok(())
}

// ── `splitseal seal` / `open` / `check` ───────────────────────────────────────

async fn cmd_seal(
    config: &SplitsealConfig,
    owner: &str,
    input: &Path,
    keys: &KeyArgs,
    anti_tampering: bool,
) -> Result<()> {
    let record = read_record(input).await?;
    let keys = load_keys(keys)?;
    let vault = build_vault(config)?;

    let receipt = vault
        .seal(owner, &record, &keys, &options(config, anti_tampering))
        .await
        .with_context(|| format!("sealing record for {owner}"))?;

    println!("owner:       {owner}");
    println!("sequence:    {}", receipt.anchor.sequence);
    println!("commitment:  {}", receipt.anchor.commitment);
    println!();
    println!("{}", receipt.metadata.summary());
    Ok(())
}

async fn cmd_open(
    config: &SplitsealConfig,
    owner: &str,
    keys: &KeyArgs,
    output: Option<&Path>,
) -> Result<()> {
    let keys = load_keys(keys)?;
    let vault = build_vault(config)?;
    let record = vault
        .open(owner, &keys)
        .await
        .with_context(|| format!("opening record for {owner}"))?;
    write_record(&record, output).await
}

async fn cmd_check(config: &SplitsealConfig, owner: &str) -> Result<()> {
    let vault = build_vault(config)?;
    let report = vault.check(owner).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.commitment_valid {
        anyhow::bail!("integrity check failed for {owner}");
    }
    Ok(())
}

// ── `splitseal status` ────────────────────────────────────────────────────────

async fn cmd_status(config: &SplitsealConfig) -> Result<()> {
    println!("backend:  {}", config.storage.backend);
    match config.storage.backend.as_str() {
        "s3" => println!("endpoint: {} (bucket {})", config.storage.endpoint, config.storage.bucket),
        "fs" => println!("root:     {}", config.storage.root.display()),
        _ => {}
    }
    println!("prefix:   {}", config.storage.prefix);

    let op = build_operator_from_env(config)?;
    match splitseal_storage::check_health(&op, &config.storage.prefix).await {
        Ok(()) => println!("health:   OK"),
        Err(e) => {
            println!("health:   UNREACHABLE");
            return Err(e);
        }
    }
    Ok(())
}

// ── `splitseal fingerprint` / `derive-keys` ───────────────────────────────────

fn cmd_fingerprint(keys: &KeyArgs) -> Result<()> {
    let keys = load_keys(keys)?;
    println!("{}", keys.fingerprint());
    Ok(())
}

fn cmd_derive_keys(
    card: &str,
    phone: &str,
    identity: &str,
    sealed_secret: Option<SecretString>,
) -> Result<()> {
    let card = hex::decode(card.trim()).context("--card is not valid hex")?;
    let phone = hex::decode(phone.trim()).context("--phone is not valid hex")?;

    let mut seed = KeySeed::new(card, phone, identity);
    if let Some(secret) = sealed_secret {
        seed = seed.with_sealed_secret(decode_key("sealed secret", &secret)?);
    }

    let keys = splitseal_crypto::derive_hardware_keys(&seed)?;
    println!("SPLITSEAL_KEY_A={}", hex::encode(keys.key_a()));
    println!("SPLITSEAL_KEY_B={}", hex::encode(keys.key_b()));
    println!("# fingerprint: {}", keys.fingerprint());
    if !seed.is_sealed() {
        println!("# warning: derived from public material only");
    }
    Ok(())
}

// ── `splitseal config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &SplitsealConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
