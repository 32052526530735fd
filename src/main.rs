use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use geocam_uploader::config::{load_config, load_config_from, GeoCamConfig};
use geocam_uploader::content_store::{DirectoryContentStore, PhotoMetadata};
use geocam_uploader::lifecycle::LifecycleTracker;
use geocam_uploader::logging::{init_logging, read_recent_logs};
use geocam_uploader::service::{ServiceSettings, UploadService};
use geocam_uploader::upload_queue::upload::HttpTransport;
use geocam_uploader::upload_queue::{load_queue_file, QueueItem};

#[derive(Parser, Debug)]
#[command(name = "geocam-uploader", about = "Durable upload queue for GeoCam photos")]
struct Cli {
    /// Config file (defaults to ~/.geocam/config.json)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the upload service, enqueue ITEMS, and run until Ctrl-C
    Run {
        /// Photo file names inside the photos directory
        items: Vec<String>,
    },
    /// Print the persisted upload queue
    Queue,
    /// Print recent log entries, newest first
    Logs {
        #[arg(short, long, default_value_t = 50)]
        max: usize,
    },
    /// Write the metadata sidecar for a photo
    Annotate(AnnotateArgs),
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// Photo file name inside the photos directory
    photo: String,

    #[arg(long, allow_hyphen_values = true)]
    latitude: f64,

    #[arg(long, allow_hyphen_values = true)]
    longitude: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    roll: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pitch: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    yaw: f64,

    #[arg(long, default_value = "")]
    note: String,

    #[arg(long)]
    tag: Option<String>,

    /// Capture time in milliseconds since the epoch (defaults to now)
    #[arg(long, value_name = "MILLIS")]
    time: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    let logs_dir = config.logs_dir_path()?;
    if let Err(e) = init_logging(&logs_dir) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Run { items } => run(&config, items).await,
        Commands::Queue => print_queue(&config),
        Commands::Logs { max } => print_logs(&config, max),
        Commands::Annotate(args) => annotate(&config, args),
    }
}

async fn run(config: &GeoCamConfig, items: Vec<String>) -> Result<()> {
    let settings = ServiceSettings::from_config(config).context("Invalid upload settings")?;
    let store = Arc::new(DirectoryContentStore::new(config.photos_dir_path()?));
    let transport = Arc::new(HttpTransport::new()?);

    let service = UploadService::start(settings, store, transport)?;
    let handle = service.handle();

    let mut tracker = LifecycleTracker::new("cli");
    tracker.foreground(&handle).await?;

    for item in items {
        let queue_length = handle.add_to_upload_queue(item).await?;
        println!("Queued ({} pending)", queue_length);
    }

    let mut notifications = handle.notifications();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let interval = handle.polling_interval().await?;
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping upload service");
                break;
            }
            changed = notifications.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", *notifications.borrow_and_update());
            }
            _ = tokio::time::sleep(interval) => {
                let status = handle.status().await?;
                println!(
                    "state={} queued={} uploading={} last_status={}",
                    status.worker_state,
                    status.queue_length,
                    status.is_uploading,
                    status.last_http_status
                );
            }
        }
    }

    tracker.background().await?;
    service.shutdown().await?;
    Ok(())
}

fn print_queue(config: &GeoCamConfig) -> Result<()> {
    let queue_file = config.queue_file_path()?;
    let items = load_queue_file(&queue_file);

    if items.is_empty() {
        println!("Upload queue is empty ({})", queue_file.display());
        return Ok(());
    }

    println!("{} pending upload(s) in {}", items.len(), queue_file.display());
    for (position, item) in items.iter().enumerate() {
        println!("{:>4}  {}", position + 1, item);
    }
    Ok(())
}

fn print_logs(config: &GeoCamConfig, max: usize) -> Result<()> {
    let entries = read_recent_logs(&config.logs_dir_path()?, Some(max))?;
    for entry in entries {
        println!(
            "{} {:>5} {} {}",
            entry.timestamp, entry.level, entry.target, entry.message
        );
    }
    Ok(())
}

fn annotate(config: &GeoCamConfig, args: AnnotateArgs) -> Result<()> {
    let store = DirectoryContentStore::new(config.photos_dir_path()?);
    let metadata = PhotoMetadata {
        capture_time_millis: args.time.unwrap_or_else(|| Utc::now().timestamp_millis()),
        latitude: args.latitude,
        longitude: args.longitude,
        roll: args.roll,
        pitch: args.pitch,
        yaw: args.yaw,
        note: args.note,
        tag: args.tag,
        uuid: None,
    };

    let written = store
        .annotate(&QueueItem::new(args.photo.as_str()), metadata)
        .with_context(|| format!("Failed to annotate {}", args.photo))?;
    println!(
        "Annotated {} (uuid {})",
        args.photo,
        written.uuid.unwrap_or_default()
    );
    Ok(())
}
