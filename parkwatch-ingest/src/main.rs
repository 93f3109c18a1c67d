//! parkwatch - privacy-preserving parking presence tracker
//!
//! Ingests photographic batches of a site, derives parking sessions, and
//! guarantees plate confidentiality at rest: the ledger only ever holds a
//! non-reversible fingerprint and an RSA-OAEP ciphertext. The `reveal`
//! subcommand is the custodian's path back to plate text.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parkwatch_common::config::Config;
use parkwatch_ingest::db::vehicles;
use parkwatch_ingest::services::{pipeline, vault, HttpRecognizer, Pipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "parkwatch", version, about = "Parking presence tracking with plate confidentiality at rest")]
struct Cli {
    /// TOML config file (default: ./parkwatch.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a directory of photos as one batch
    Ingest {
        /// Source directory of images
        #[arg(long)]
        input_dir: PathBuf,
        /// Destination root for anonymized, per-vehicle photo folders
        #[arg(long)]
        output_dir: PathBuf,
        /// Recognition gateway credential
        #[arg(long, env = "PARKWATCH_API_KEY")]
        api_key: String,
    },
    /// Generate the encryption keypair (interactive)
    MakeKeys,
    /// Decrypt stored plates with the custodian's private key
    Reveal {
        /// Path to the private key file (on its separate media)
        #[arg(long)]
        private_key: PathBuf,
        /// Private key password; prompted when omitted
        #[arg(long)]
        password: Option<String>,
        /// Vehicle id; all vehicles when omitted
        #[arg(long)]
        vehicle: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Ingest {
            input_dir,
            output_dir,
            api_key,
        } => ingest(&config, &input_dir, &output_dir, api_key).await,
        Command::MakeKeys => make_keys(&config),
        Command::Reveal {
            private_key,
            password,
            vehicle,
        } => reveal(&config, &private_key, password, vehicle).await,
    }
}

async fn ingest(
    config: &Config,
    input_dir: &std::path::Path,
    output_dir: &std::path::Path,
    api_key: String,
) -> Result<()> {
    // Fatal before any batch exists: custody separation + public key check
    let public_key_pem = pipeline::preflight(config)?;

    let db = pipeline::open_ledger(config).await?;
    let recognizer = HttpRecognizer::new(
        config.gateway_url.clone(),
        api_key,
        config.gateway_timeout_secs,
    )
    .map_err(|e| anyhow::anyhow!("gateway client: {}", e))?;

    let pipeline = Pipeline::new(
        db,
        Arc::new(recognizer),
        public_key_pem,
        output_dir.to_path_buf(),
    );

    let report = pipeline.run(input_dir).await?;

    match report.batch_id {
        None => println!("No photos to process."),
        Some(batch_id) => {
            println!(
                "Batch {}: {} photos processed, {} vehicles seen.",
                batch_id, report.processed, report.vehicles_seen
            );
            if let Some(reconciliation) = &report.reconciliation {
                println!(
                    "Sessions: {} opened, {} closed.",
                    reconciliation.opened, reconciliation.closed
                );
                for fault in &reconciliation.faults {
                    println!("CONSISTENCY FAULT: {}", fault);
                }
            }
            if !report.quarantined.is_empty() {
                println!("Quarantined {} photo(s):", report.quarantined.len());
                for (path, reason) in &report.quarantined {
                    println!("  {}: {}", path.display(), reason);
                }
            }
        }
    }

    Ok(())
}

fn make_keys(config: &Config) -> Result<()> {
    if config.public_key_path.exists() || config.private_key_path.exists() {
        bail!(
            "encryption keys already exist ({} / {}); keep them if data has already been \
             processed, replacing them breaks fingerprint continuity",
            config.public_key_path.display(),
            config.private_key_path.display()
        );
    }

    let password = rpassword::prompt_password("Choose a password for the private key: ")
        .context("password prompt")?;
    let verify = rpassword::prompt_password("Retype the password to confirm: ")
        .context("password prompt")?;

    if password.trim().len() < 10 {
        bail!("please choose a password of at least 10 characters");
    }
    if password != verify {
        bail!("the two entries do not match");
    }

    let (public_pem, private_pem) =
        vault::generate_keypair(password.trim()).map_err(|e| anyhow::anyhow!("{}", e))?;

    vault::save_key(&public_pem, &config.public_key_path)?;
    vault::save_key(&private_pem, &config.private_key_path)?;

    info!(
        public = %config.public_key_path.display(),
        private = %config.private_key_path.display(),
        "Keypair written"
    );
    println!(
        "Keys created. Move the private key to separate media (e.g. a removable drive); \
         it is only needed when plates must be revealed."
    );

    Ok(())
}

async fn reveal(
    config: &Config,
    private_key_path: &std::path::Path,
    password: Option<String>,
    vehicle_id: Option<Uuid>,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => rpassword::prompt_password("Private key password: ").context("password prompt")?,
    };

    let private_pem = vault::load_private_key(private_key_path, Some(&password))
        .map_err(|e| parkwatch_common::Error::Crypto(e.to_string()))?;

    let db = pipeline::open_ledger(config).await?;

    let targets = match vehicle_id {
        Some(id) => {
            let vehicle = vehicles::load(&db, id)
                .await?
                .ok_or_else(|| parkwatch_common::Error::NotFound(format!("vehicle {}", id)))?;
            vec![vehicle]
        }
        None => vehicles::load_all(&db).await?,
    };

    // Printed to the operator only, never persisted
    for vehicle in targets {
        let plate = vault::decrypt_plate(&vehicle.encrypted_plate, &private_pem, Some(&password))
            .map_err(|e| parkwatch_common::Error::Crypto(e.to_string()))?;
        println!("Vehicle {}: plate {}", vehicle.id, plate);
    }

    Ok(())
}
