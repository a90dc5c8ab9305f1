mod commands;
mod logging;
mod source;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use plinth_types::query::{FilterParams, SortField};

use source::SourceArgs;

#[derive(Parser)]
#[command(
    name = "plinth",
    version,
    about = "Progressive database acquisition and query tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire the database image and write it to a file
    Fetch {
        #[command(flatten)]
        source: SourceArgs,
        /// Output path for the acquired image
        #[arg(short, long, default_value = "database.sqlite")]
        output: PathBuf,
    },
    /// Acquire, load, and run one search against the database
    Search {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filters: FilterArgs,
        /// Seconds to wait for the database to become ready
        #[arg(long, default_value_t = 360)]
        ready_timeout: u64,
        /// Print the result set as JSON
        #[arg(long)]
        json: bool,
    },
    /// Measure connection throughput against the image source
    Probe {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Free-text search over title and architect
    #[arg(long)]
    text: Option<String>,
    /// Exact category match
    #[arg(long)]
    category: Option<String>,
    /// Exact region match
    #[arg(long)]
    region: Option<String>,
    /// Earliest year, inclusive
    #[arg(long)]
    year_from: Option<i32>,
    /// Latest year, inclusive
    #[arg(long)]
    year_to: Option<i32>,
    /// Substring match on architect
    #[arg(long)]
    architect: Option<String>,
    /// Sort dimension
    #[arg(long, value_enum)]
    sort_by: Option<SortArg>,
    /// Zero-based page index
    #[arg(long, default_value_t = 0)]
    page: i64,
    /// Rows per page (capped at 100)
    #[arg(long)]
    page_size: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Title,
    Year,
    Region,
}

impl From<SortArg> for SortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Title => Self::Title,
            SortArg::Year => Self::Year,
            SortArg::Region => Self::Region,
        }
    }
}

impl From<FilterArgs> for FilterParams {
    fn from(args: FilterArgs) -> Self {
        Self {
            text: args.text,
            category: args.category,
            region: args.region,
            year_from: args.year_from,
            year_to: args.year_to,
            architect: args.architect,
            sort_by: args.sort_by.map(SortField::from),
            page: args.page,
            page_size: args.page_size,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Fetch { source, output } => {
            commands::fetch::execute(source.resolve()?, &output).await
        }
        Commands::Search {
            source,
            filters,
            ready_timeout,
            json,
        } => {
            commands::search::execute(
                source.resolve()?,
                filters.into(),
                Duration::from_secs(ready_timeout),
                json,
            )
            .await
        }
        Commands::Probe { source } => commands::probe::execute(source.resolve()?).await,
    }
}
