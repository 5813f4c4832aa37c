use clap::{Parser, Subcommand};
use img_ingest::event::NotificationBatch;
use img_ingest::imaging::RustBackend;
use img_ingest::imaging::rust_backend::supported_input_types;
use img_ingest::process::{Pipeline, PipelineSettings};
use img_ingest::query::{ApiRequest, QueryService};
use img_ingest::store::{FsMetadataStore, FsObjectStore, ObjectStore, PutOptions};
use img_ingest::{config, output};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "img-ingest")]
#[command(about = "Image ingestion pipeline and metadata read API")]
#[command(long_about = "\
Image ingestion pipeline and metadata read API

Uploads under the raw prefix are turned into a thumbnail and an optimized
JPEG, published under the public prefix, and described by one metadata
record keyed by filename.

Local data directory layout:

  .img-ingest/
  ├── objects/<bucket>/raw/cat.png              # uploads
  ├── objects/<bucket>/public/thumbs/cat.png    # published variants
  ├── headers/<bucket>/...                      # content type + cache control
  └── records/<table>/cat.png.json              # metadata records

Typical session:

  img-ingest upload cat.png > event.json
  img-ingest ingest event.json
  img-ingest query /images/cat.png

Logging goes to stderr and is controlled by IMG_INGEST_LOG (or RUST_LOG).
Run 'img-ingest gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults apply when it does not exist)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Directory holding the local object and metadata stores
    #[arg(long, default_value = ".img-ingest", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline over a notification batch (JSON file, or - for stdin)
    Ingest { event: PathBuf },
    /// Store a local file as an upload and print its notification
    Upload {
        file: PathBuf,
        /// Object key (default: <raw_prefix><file name>)
        #[arg(long)]
        key: Option<String>,
        /// Declared content type (default: guessed from the extension)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Send one request to the read API, e.g. `query /images?next=cat.png`
    Query {
        path: String,
        #[arg(long, default_value = "GET")]
        method: String,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Ingest { event } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);

            let batch = NotificationBatch::from_json(&read_input(&event)?)?;
            let uploads = batch.uploads()?;

            let objects = FsObjectStore::new(&cli.data_dir);
            let metadata = FsMetadataStore::new(&cli.data_dir, &config.table)?;
            let backend = RustBackend::new();

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_process_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = Pipeline::new(
                &objects,
                &metadata,
                &backend,
                PipelineSettings::from_config(&config),
            )
            .with_events(tx)
            .process_batch(&uploads);
            printer.join().ok();

            match result {
                Ok(report) => {
                    output::print_batch_report(&report);
                    println!("{}", serde_json::to_string_pretty(&report.summary())?);
                }
                Err(err) => {
                    output::print_batch_error(&err);
                    return Err(err.into());
                }
            }
        }
        Command::Upload {
            file,
            key,
            content_type,
        } => {
            let config = config::load_config(&cli.config)?;
            let body = std::fs::read(&file)?;
            let key = match key {
                Some(key) => key,
                None => default_upload_key(&config.raw_prefix, &file)?,
            };
            let options = PutOptions {
                content_type: content_type.unwrap_or_else(|| guess_content_type(&file)),
                cache_control: None,
            };

            if !supported_input_types().contains(&options.content_type.as_str()) {
                tracing::warn!(
                    content_type = %options.content_type,
                    supported = ?supported_input_types(),
                    "content type cannot be decoded, ingest will fail"
                );
            }

            let objects = FsObjectStore::new(&cli.data_dir);
            objects.put(&config.bucket, &key, &body, &options)?;
            tracing::info!(bucket = %config.bucket, %key, content_type = %options.content_type, "upload stored");

            let batch = NotificationBatch::single(&config.bucket, &key);
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
        Command::Query { path, method } => {
            let config = config::load_config(&cli.config)?;
            let metadata = FsMetadataStore::new(&cli.data_dir, &config.table)?;
            let response = QueryService::new(&metadata).handle(&ApiRequest::new(&method, &path));
            output::print_response(&response);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log filter from `IMG_INGEST_LOG`, then `RUST_LOG`, then `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("IMG_INGEST_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. User can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn read_input(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
    }
}

fn default_upload_key(raw_prefix: &str, file: &Path) -> Result<String, String> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("cannot derive a key from {}", file.display()))?;
    Ok(format!("{raw_prefix}{name}"))
}

fn guess_content_type(file: &Path) -> String {
    image::ImageFormat::from_path(file)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}
