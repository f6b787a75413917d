//! Import Tagger CLI - enqueue import-tag requests and inspect queue depth

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};

use import_tagger_core::application::decode;
use import_tagger_core::domain::{ImportTagRequest, Tag};
use import_tagger_core::port::time_provider::SystemTimeProvider;
use import_tagger_infra_sqlite::{create_pool, run_migrations, SqliteQueue};

const DEFAULT_DATA_DIR: &str = "~/.import-tagger";

#[derive(Parser)]
#[command(name = "import-tagger-cli")]
#[command(about = "Import Tagger queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the queue stores
    #[arg(long, env = "QUEUE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: String,

    /// Queue account (store file name)
    #[arg(long, env = "STORAGE_ACCOUNT_NAME")]
    account: String,

    /// Queue name
    #[arg(long, env = "STORAGE_QUEUE_NAME")]
    queue: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue an import-tag request
    Enqueue {
        /// Imported target name (e.g., acme/payments)
        #[arg(long, required_unless_present = "payload")]
        target_name: Option<String>,

        /// Branch the import ran against
        #[arg(long, required_unless_present = "payload")]
        branch: Option<String>,

        /// Organization owning the imported projects
        #[arg(long, required_unless_present = "payload")]
        org_id: Option<String>,

        /// Import job reference (URL or REST path)
        #[arg(long, required_unless_present = "payload")]
        import_job_url: Option<String>,

        /// Tag to apply, as key=value (repeatable)
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<Tag>,

        /// Raw message body as JSON, instead of the flags above
        #[arg(long, conflicts_with_all = ["target_name", "branch", "org_id", "import_job_url", "tags"])]
        payload: Option<String>,
    },

    /// Show visible and leased message counts
    Depth,
}

#[derive(Tabled)]
struct EnqueueResult {
    message_id: String,
    queue: String,
    target_name: String,
    tags: usize,
}

#[derive(Tabled)]
struct DepthRow {
    queue: String,
    visible: i64,
    leased: i64,
}

fn parse_tag(raw: &str) -> std::result::Result<Tag, String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok(Tag::new(key.trim(), value)),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

/// Builds and validates the message body exactly as the worker will decode it
fn build_message(
    payload: Option<String>,
    target_name: Option<String>,
    branch: Option<String>,
    org_id: Option<String>,
    import_job_url: Option<String>,
    tags: Vec<Tag>,
) -> Result<(String, ImportTagRequest)> {
    let body = match payload {
        Some(payload) => payload,
        None => ImportTagRequest {
            target_name: target_name.unwrap_or_default(),
            branch: branch.unwrap_or_default(),
            tags,
            org_id: org_id.unwrap_or_default(),
            import_job_reference: import_job_url.unwrap_or_default(),
        }
        .to_wire()
        .context("Failed to encode message")?,
    };

    let request = decode(body.as_bytes()).context("Message would be rejected as malformed")?;
    Ok((body, request))
}

async fn open_queue(cli: &Cli) -> Result<SqliteQueue> {
    let data_dir = PathBuf::from(shellexpand::tilde(&cli.data_dir).into_owned());
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let db_path = data_dir.join(format!("{}.db", cli.account));

    let pool = create_pool(&db_path.to_string_lossy())
        .await
        .context("Failed to open queue store")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // Visibility timeout only matters for dequeue, which the CLI never does
    Ok(SqliteQueue::new(
        pool,
        cli.queue.clone(),
        Duration::from_secs(30),
        Arc::new(SystemTimeProvider),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let queue = open_queue(&cli).await?;

    match cli.command {
        Commands::Enqueue {
            target_name,
            branch,
            org_id,
            import_job_url,
            tags,
            payload,
        } => {
            let (body, request) =
                build_message(payload, target_name, branch, org_id, import_job_url, tags)?;

            let message_id = queue
                .enqueue(body.as_bytes())
                .await
                .context("Failed to enqueue message")?;

            println!("{}", "✓ Message enqueued successfully".green().bold());
            println!();

            let table = Table::new(vec![EnqueueResult {
                message_id,
                queue: cli.queue.clone(),
                target_name: request.target_name,
                tags: request.tags.len(),
            }])
            .to_string();
            println!("{}", table);
        }

        Commands::Depth => {
            let depth = queue.depth().await.context("Failed to read queue depth")?;

            println!("{}", "Queue Depth".cyan().bold());
            println!();

            let table = Table::new(vec![DepthRow {
                queue: cli.queue.clone(),
                visible: depth.visible,
                leased: depth.leased,
            }])
            .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
