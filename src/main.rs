use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "linebridge",
    version,
    about = "Relay LINE chat messages to OpenAI models"
)]
struct Cli {
    /// Path to config file (default: ~/.linebridge/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server (default)
    Serve,
    /// Write a config template
    Init,
    /// Split a file (or stdin) into delivery-sized chunks and print them
    Split {
        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,
        /// Maximum characters per chunk
        #[arg(long, default_value_t = linebridge::channels::segment::DEFAULT_MAX_MESSAGE_LEN as i64, allow_negative_numbers = true)]
        max_len: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linebridge=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => run_init(cli.config.as_deref()),
        Some(Commands::Split { file, max_len }) => run_split(file.as_deref(), max_len),
        Some(Commands::Serve) | None => run_serve(cli.config.as_deref()).await,
    }
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

fn run_init(config_override: Option<&Path>) -> anyhow::Result<()> {
    let config_path = linebridge::config::config_path(config_override);
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
    } else {
        std::fs::write(&config_path, linebridge::config::CONFIG_TEMPLATE)?;
        println!("Created {}", config_path.display());
        println!("Set LINE_CHANNEL_SECRET, LINE_CHANNEL_ACCESS_TOKEN and OPENAI_API_KEY, then run `linebridge`.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Split
// ---------------------------------------------------------------------------

fn run_split(file: Option<&Path>, max_len: i64) -> anyhow::Result<()> {
    let segmenter = linebridge::channels::Segmenter::new(max_len)?;

    let text = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let chunks = segmenter.split(&text);
    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "--- chunk {}/{} ({} chars) ---",
            i + 1,
            chunks.len(),
            chunk.chars().count()
        );
        println!("{}", chunk);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Serve
// ---------------------------------------------------------------------------

async fn run_serve(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = linebridge::config::load_config(config_path)?;
    tracing::info!(
        "Config loaded from {}",
        linebridge::config::config_path(config_path).display()
    );

    let conductor = Arc::new(linebridge::conductor::Conductor::from_config(&config)?);
    tracing::info!("Conductor initialized ({:?} mode)", config.llm.mode);

    linebridge::web::start_server(&config, conductor).await
}
