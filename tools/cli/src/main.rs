//! BucketBridge CLI - move files between Google Drive and S3.
//!
//! AWS access is obtained by federating the signed-in Google identity
//! through a Cognito identity pool; no static AWS keys are used.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use bucketbridge_common::{Error, FileRef, TokenSet};
use bucketbridge_storage::{BucketListing, TokenRefresher};
use bucketbridge_transfer::{
    read_token_file, write_token_file, BridgeConfig, ItemStatus, Session, TransferResult,
};

#[derive(Parser)]
#[command(name = "bucketbridge")]
#[command(about = "BucketBridge - Google Drive and S3 transfers")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file (values may also come from the environment).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Token file holding the signed-in session.
    #[arg(short, long, global = true, default_value = "bucketbridge-tokens.json")]
    tokens: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Google sign-in URL.
    LoginUrl,

    /// Exchange the stored refresh token for new tokens.
    Refresh,

    /// List S3 buckets.
    Buckets,

    /// List objects in a bucket.
    Objects {
        /// Bucket name.
        #[arg(short, long)]
        bucket: String,
    },

    /// List Drive files owned by the signed-in user.
    DriveFiles,

    /// Copy bucket objects into the Drive upload folder.
    ToDrive {
        /// Source bucket.
        #[arg(short, long)]
        bucket: String,

        /// Object keys to copy.
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Copy Drive files into a bucket.
    ToS3 {
        /// Destination bucket (created if missing).
        #[arg(short, long)]
        bucket: String,

        /// Copy every owned file.
        #[arg(long, conflicts_with = "file_ids")]
        all: bool,

        /// Drive file IDs to copy.
        #[arg(required_unless_present = "all")]
        file_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = BridgeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::LoginUrl => cmd_login_url(&config),

        Commands::Refresh => cmd_refresh(config, &cli.tokens).await,

        Commands::Buckets => {
            let session = open_session(config, &cli.tokens).await?;
            cmd_buckets(&session).await
        }

        Commands::Objects { bucket } => {
            let session = open_session(config, &cli.tokens).await?;
            cmd_objects(&session, &bucket).await
        }

        Commands::DriveFiles => {
            let session = open_session(config, &cli.tokens).await?;
            cmd_drive_files(&session).await
        }

        Commands::ToDrive { bucket, keys } => {
            let session = open_session(config, &cli.tokens).await?;
            cmd_to_drive(&session, &bucket, &keys).await
        }

        Commands::ToS3 {
            bucket,
            all,
            file_ids,
        } => {
            let session = open_session(config, &cli.tokens).await?;
            cmd_to_s3(&session, &bucket, all, &file_ids).await
        }
    }
}

/// Open a session from the token file, persisting tokens refreshed on the way.
async fn open_session(config: BridgeConfig, tokens_path: &Path) -> Result<Session> {
    let tokens = match read_token_file(tokens_path) {
        Ok(tokens) => tokens,
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(not_signed_in(&config));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", tokens_path.display()))
        }
    };

    let session = match Session::new(config.clone(), tokens.clone()).await {
        Ok(session) => session,
        Err(Error::Unauthorized(_)) => return Err(not_signed_in(&config)),
        Err(e) => return Err(e).context("Failed to open session"),
    };

    let current = session.tokens().await;
    if current != tokens {
        write_token_file(tokens_path, &current).context("Failed to save tokens")?;
        info!("Saved refreshed tokens");
    }

    Ok(session)
}

fn not_signed_in(config: &BridgeConfig) -> anyhow::Error {
    match config.google.consent_url() {
        Ok((url, _)) => anyhow::anyhow!("Not signed in. Sign in first at:\n  {}", url),
        Err(e) => anyhow::anyhow!("Not signed in ({})", e),
    }
}

/// Print the sign-in URL.
fn cmd_login_url(config: &BridgeConfig) -> Result<()> {
    let (url, csrf) = config
        .google
        .consent_url()
        .context("Failed to build sign-in URL")?;

    println!("Visit this URL to sign in:");
    println!("  {}", url);
    println!("  State: {}", csrf);

    Ok(())
}

/// Force a token refresh.
async fn cmd_refresh(config: BridgeConfig, tokens_path: &Path) -> Result<()> {
    let tokens = read_token_file(tokens_path)
        .with_context(|| format!("Failed to read {}", tokens_path.display()))?;

    let refresher = TokenRefresher::new(config.google).context("Failed to create refresher")?;
    let refreshed: TokenSet = refresher
        .refresh(&tokens)
        .await
        .context("Token refresh failed")?;

    write_token_file(tokens_path, &refreshed).context("Failed to save tokens")?;

    println!("Tokens refreshed.");
    if let Some(expires_at) = refreshed.expires_at() {
        println!("  Access token expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}

/// List buckets.
async fn cmd_buckets(session: &Session) -> Result<()> {
    match session.list_buckets().await {
        BucketListing::Buckets(buckets) => {
            println!("Buckets:");
            for bucket in buckets {
                match bucket.created_at {
                    Some(created) => {
                        println!("  {} (created {})", bucket.name, created.format("%Y-%m-%d"))
                    }
                    None => println!("  {}", bucket.name),
                }
            }
        }
        BucketListing::Message(message) => println!("{}", message),
    }

    Ok(())
}

/// List objects in a bucket.
async fn cmd_objects(session: &Session, bucket: &str) -> Result<()> {
    let objects = session
        .list_objects(bucket)
        .await
        .with_context(|| format!("Failed to list objects in {}", bucket))?;

    if objects.is_empty() {
        println!("(empty bucket)");
        return Ok(());
    }

    println!("Objects in {}:", bucket);
    for object in objects {
        println!("  {:>12}  {}", object.size, object.key);
    }

    Ok(())
}

/// List owned Drive files.
async fn cmd_drive_files(session: &Session) -> Result<()> {
    let files = session
        .list_drive_files()
        .await
        .context("Failed to list Drive files")?;

    if files.is_empty() {
        println!("(no files)");
        return Ok(());
    }

    println!("Drive files:");
    for file in files {
        println!("  {}  {}  [{}]", file.id, file.name, file.mime_type);
    }

    Ok(())
}

/// Copy objects to Drive.
async fn cmd_to_drive(session: &Session, bucket: &str, keys: &[String]) -> Result<()> {
    let result = session
        .to_drive(bucket, keys)
        .await
        .context("Transfer to Drive failed")?;

    report(&result)
}

/// Copy Drive files to a bucket.
async fn cmd_to_s3(session: &Session, bucket: &str, all: bool, file_ids: &[String]) -> Result<()> {
    let owned = session
        .list_drive_files()
        .await
        .context("Failed to list Drive files")?;

    let files: Vec<FileRef> = if all {
        owned
    } else {
        for id in file_ids {
            if !owned.iter().any(|f| &f.id == id) {
                warn!(file_id = %id, "Not an owned Drive file, ignoring");
            }
        }
        owned
            .into_iter()
            .filter(|f| file_ids.contains(&f.id))
            .collect()
    };

    if files.is_empty() {
        println!("Nothing to transfer.");
        return Ok(());
    }

    let result = session
        .to_s3(bucket, &files)
        .await
        .context("Transfer to S3 failed")?;

    report(&result)
}

fn report(result: &TransferResult) -> Result<()> {
    for outcome in &result.outcomes {
        match &outcome.status {
            ItemStatus::Transferred(destination) => {
                println!("  ok       {} -> {}", outcome.item, destination)
            }
            ItemStatus::Failed(reason) => println!("  failed   {} ({})", outcome.item, reason),
            ItemStatus::Skipped(reason) => println!("  skipped  {} ({})", outcome.item, reason),
        }
    }

    println!(
        "{}: {} of {} transferred",
        result.direction,
        result.transferred(),
        result.outcomes.len()
    );

    if result.any_errored() {
        anyhow::bail!("Transfer completed with errors");
    }

    Ok(())
}
