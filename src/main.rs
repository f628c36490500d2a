//! ots - multi-calendar OpenTimestamps client

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ots_quorum::calendar::{signing, CalendarEndpoint, HttpCalendar};
use ots_quorum::files::{create_proof, original_path, ots_path, CreateOutcome};
use ots_quorum::ots::info;
use ots_quorum::verify::EsploraHeaderSource;
use ots_quorum::{
    multistamp, upgrade_file, DetachedTimestampFile, OtsConfig, OtsError, OtsResult,
    QuorumStamper, StampParams, UpgradeManager, Verification, VerifyManager,
};

#[derive(Parser, Debug)]
#[command(name = "ots")]
#[command(version, about = "Timestamp files against several OpenTimestamps calendars")]
struct Args {
    /// Log level
    #[arg(long, global = true, env = "OTS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Timeout per calendar request in seconds
    #[arg(long, global = true, env = "OTS_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show information on a timestamp proof
    Info { file_ots: PathBuf },

    /// Create a timestamp proof for a file
    Stamp {
        file: PathBuf,
        #[command(flatten)]
        calendars: CalendarArgs,
    },

    /// Create timestamp proofs for several files
    Multistamp {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        calendars: CalendarArgs,
    },

    /// Verify a timestamp proof against its file
    Verify { file_ots: PathBuf },

    /// Complete a pending timestamp proof
    Upgrade { file_ots: PathBuf },
}

#[derive(ClapArgs, Debug)]
struct CalendarArgs {
    /// Calendar URL (repeatable); defaults to the configured calendars
    #[arg(short = 'c', long = "calendar")]
    calendar: Vec<String>,

    /// Calendars that must answer (M of N)
    #[arg(short = 'm', long = "quorum")]
    quorum: Option<usize>,

    /// Private calendar key file (`<url> <hex ed25519 seed>` per line)
    #[arg(short = 'k', long = "key")]
    key_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = OtsConfig::from_env();
    if let Some(secs) = args.timeout_secs {
        config.timeout_secs = secs;
    }

    let ok = match args.command {
        Command::Info { file_ots } => report(info_cmd(&file_ots).await),
        Command::Stamp { file, calendars } => report(stamp_cmd(&config, vec![file], &calendars).await),
        Command::Multistamp { files, calendars } => report(stamp_cmd(&config, files, &calendars).await),
        Command::Verify { file_ots } => report(verify_cmd(&config, &file_ots).await),
        Command::Upgrade { file_ots } => report(upgrade_cmd(&config, &file_ots).await),
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Print a top-level error; `Ok(false)` means failures were already printed
fn report(result: anyhow::Result<bool>) -> bool {
    match result {
        Ok(ok) => ok,
        Err(e) => {
            println!("Error: {e:#}");
            false
        }
    }
}

async fn read_proof(path: &Path) -> OtsResult<DetachedTimestampFile> {
    let bytes = tokio::fs::read(path).await?;
    Ok(DetachedTimestampFile::from_bytes(&bytes)?)
}

async fn info_cmd(path: &Path) -> anyhow::Result<bool> {
    let proof = read_proof(path).await?;
    println!("{}", info::render(&proof));
    Ok(true)
}

/// Calendars for a stamp: `-c` URLs (or the configured ones) plus keyed
/// private calendars, which take precedence for the same URL
async fn endpoints(config: &OtsConfig, args: &CalendarArgs) -> OtsResult<Vec<CalendarEndpoint>> {
    let mut endpoints: Vec<CalendarEndpoint> = if args.calendar.is_empty() {
        config.public_endpoints()
    } else {
        args.calendar.iter().map(|u| CalendarEndpoint::public(u.as_str())).collect()
    };

    if let Some(key_file) = &args.key_file {
        for private in signing::load_key_file(key_file).await? {
            endpoints.retain(|e| e.url() != private.url());
            endpoints.push(private);
        }
    }
    Ok(endpoints)
}

async fn stamp_cmd(config: &OtsConfig, files: Vec<PathBuf>, args: &CalendarArgs) -> anyhow::Result<bool> {
    let endpoints = endpoints(config, args).await?;
    let params = StampParams::from_config(config, endpoints, args.quorum)?;
    let stamper = QuorumStamper::new(Arc::new(HttpCalendar::new(config.timeout())?));

    let mut inputs = Vec::with_capacity(files.len());
    for path in &files {
        let contents = tokio::fs::read(path).await.map_err(OtsError::from);
        inputs.push((path.display().to_string(), contents));
    }

    let outcomes = multistamp(&stamper, inputs, &params, config.max_concurrent_files).await;

    let mut all_ok = true;
    for (path, outcome) in files.iter().zip(outcomes) {
        let proof = match outcome.result {
            Ok(proof) => proof,
            Err(e) => {
                println!("Error: {}: {}", outcome.name, e);
                all_ok = false;
                continue;
            }
        };

        let target = ots_path(path);
        match create_proof(&target, &proof.to_bytes()?).await {
            Ok(CreateOutcome::Created) => {
                println!("The timestamp proof '{}' has been created!", target.display())
            }
            Ok(CreateOutcome::AlreadyExists) => {
                println!("The timestamp proof '{}' already exists", target.display())
            }
            Err(e) => {
                println!("Error: {}: {}", target.display(), e);
                all_ok = false;
            }
        }
    }
    Ok(all_ok)
}

async fn verify_cmd(config: &OtsConfig, path: &Path) -> anyhow::Result<bool> {
    let proof = read_proof(path).await?;
    let original = original_path(path)
        .ok_or_else(|| OtsError::Config(format!("'{}' is not a .ots file", path.display())))?;
    let file = tokio::fs::read(&original).await?;

    let manager = VerifyManager::new(Arc::new(EsploraHeaderSource::new(config.bitcoin_timeout())?));
    match manager.verify(&proof, &file).await {
        Ok(Verification::Settled(attestation)) => {
            let when = chrono::DateTime::from_timestamp(attestation.time as i64, 0)
                .map(|t| t.to_rfc2822())
                .unwrap_or_else(|| attestation.time.to_string());
            println!(
                "Success! {} attests data existed as of {}",
                attestation.chain, when
            );
            Ok(true)
        }
        Ok(Verification::Pending { calendars }) => {
            tracing::info!(calendars = ?calendars, "Proof still pending");
            println!("Pending or Bad attestation");
            Ok(false)
        }
        Err(e @ OtsError::DigestMismatch { .. }) => Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, "Verification failed");
            println!("Pending or Bad attestation");
            Ok(false)
        }
    }
}

async fn upgrade_cmd(config: &OtsConfig, path: &Path) -> anyhow::Result<bool> {
    let calendar = Arc::new(HttpCalendar::new(config.timeout())?);
    let whitelist = config
        .whitelist
        .clone()
        .with_urls(config.calendar_urls.iter().map(String::as_str));
    let manager = UpgradeManager::new(calendar, whitelist, config.timeout());

    let outcome = upgrade_file(&manager, path).await?;
    if outcome.changed {
        println!("Timestamp has been successfully upgraded!");
    } else {
        println!("Timestamp not changed");
    }
    Ok(true)
}
