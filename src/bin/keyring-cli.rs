//! keyring-cli: mnemonic tooling over the HD keyring.
//!
//! The mnemonic is read from `--mnemonic-file`, then `KEYRING_MNEMONIC`, then
//! the first line of stdin.

use anyhow::{bail, Context, Result};
use bip39::{Language, Mnemonic};
use clap::{Args, Parser, Subcommand};
use rand::rngs::OsRng;
use rand::RngCore;
use sol_keyring::core::config::{KeyringConfig, ENV_LOG};
use sol_keyring::keyring::{Keyring, KeyringFactory, TransactionSigner};
use sol_keyring::logging::init_logging;
use sol_keyring::{DerivationPath, WalletDescriptor};
use std::io::{self, BufRead};
use std::path::PathBuf;
use tracing::{debug, info};
use zeroize::Zeroizing;

const ENV_MNEMONIC: &str = "KEYRING_MNEMONIC";

#[derive(Debug, Parser)]
#[command(name = "keyring-cli", about = "Solana keyring tooling", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print a fresh English mnemonic
    GenerateMnemonic {
        /// 12 or 24
        #[arg(long, default_value_t = 12)]
        words: usize,
    },
    /// Print the accounts a mnemonic derives
    Derive(DeriveArgs),
    /// Sign a UTF-8 message with one derived account
    SignMessage {
        #[command(flatten)]
        source: DeriveArgs,
        /// Account index to sign with; must be among --accounts
        #[arg(long)]
        account: u32,
        #[arg(long)]
        message: String,
    },
    /// Print the persisted keyring JSON (contains the seed)
    Export(DeriveArgs),
}

#[derive(Debug, Args)]
struct DeriveArgs {
    /// bip44, bip44-change or sollet-deprecated
    #[arg(long)]
    path: Option<DerivationPath>,

    #[arg(long, value_delimiter = ',', default_value = "0")]
    accounts: Vec<u32>,

    #[arg(long)]
    mnemonic_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => KeyringConfig::from_file(path)?,
        None => KeyringConfig::default(),
    }
    .apply_env_overrides()?;

    let filter = std::env::var(ENV_LOG).unwrap_or_else(|_| config.log_filter.clone());
    init_logging(&filter);
    debug!("Loaded configuration: {:?}", config);

    let factory = KeyringFactory::new(config);

    match cli.command {
        Commands::GenerateMnemonic { words } => {
            let mnemonic = generate_mnemonic(words)?;
            println!("{}", mnemonic.as_str());
        }
        Commands::Derive(args) => {
            let keyring = load_keyring(&factory, &args)?;
            let descriptors: Vec<WalletDescriptor> = keyring
                .accounts()
                .iter()
                .map(|a| WalletDescriptor::new(a.keypair.public_key(), keyring.derivation_path(), a.account_index))
                .collect();
            println!("{}", serde_json::to_string_pretty(&descriptors)?);
        }
        Commands::SignMessage { source, account, message } => {
            let keyring = load_keyring(&factory, &source)?;
            let address = keyring
                .get_public_key(account)
                .with_context(|| format!("account {} was not derived; add it to --accounts", account))?;
            let signature = keyring.sign_message(message.as_bytes(), &address).await?;
            info!("Signed {} bytes with {}", message.len(), address);
            println!("{}", signature);
        }
        Commands::Export(args) => {
            let keyring = load_keyring(&factory, &args)?;
            println!("{}", keyring.to_json().to_json_string()?);
        }
    }

    Ok(())
}

fn generate_mnemonic(words: usize) -> Result<Zeroizing<String>> {
    let entropy_len = match words {
        12 => 16,
        24 => 32,
        other => bail!("unsupported word count {}; use 12 or 24", other),
    };
    let mut entropy = Zeroizing::new(vec![0u8; entropy_len]);
    OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy).context("entropy rejected")?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

fn load_keyring(factory: &KeyringFactory, args: &DeriveArgs) -> Result<sol_keyring::HdKeyring> {
    let mnemonic = read_mnemonic(args.mnemonic_file.as_ref())?;
    Ok(factory.hd_from_mnemonic(mnemonic.trim(), args.path, &args.accounts)?)
}

fn read_mnemonic(file: Option<&PathBuf>) -> Result<Zeroizing<String>> {
    if let Some(path) = file {
        let raw = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        return Ok(Zeroizing::new(raw));
    }
    if let Ok(raw) = std::env::var(ENV_MNEMONIC) {
        return Ok(Zeroizing::new(raw));
    }
    let mut line = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut line).context("cannot read mnemonic from stdin")?;
    if line.trim().is_empty() {
        bail!("no mnemonic given; use --mnemonic-file, {} or stdin", ENV_MNEMONIC);
    }
    Ok(line)
}
