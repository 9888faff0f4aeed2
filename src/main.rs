mod cache;
mod graph;
mod join;
mod scopus;
mod search;

pub const USER_AGENT: &str = concat!("scopus-graph/", env!("CARGO_PKG_VERSION"));

use std::env;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Args, Parser, Subcommand};
use reqwest::Client;
use tracing::info;

use cache::{QueryCache, cache_key};
use scopus::ScopusClient;
use scopus::types::View;
use search::{
    DEFAULT_MAX_ITEMS, DEFAULT_PAGE_SIZE, SearchError, SearchOutcome, SearchRequest,
    resolve_selector,
};

const DEFAULT_DATA_DIR: &str = "data";

/// Cached Scopus search retrieval and co-authorship/citation graph building.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Data directory (default: $SCOPUS_DATA_DIR or ./data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a search query and cache its results
    Search {
        /// Scopus query, e.g. 'TITLE-ABS-KEY(neural network) AND PUBYEAR > 2010'
        query: String,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Build a co-authorship graph (GDF) from a query or a joined search
    Coauthors {
        /// Scopus query; omit when using --joined
        #[arg(required_unless_present = "joined")]
        query: Option<String>,
        /// Name of a directory under joined_searches/
        #[arg(long, conflicts_with = "query")]
        joined: Option<String>,
        #[command(flatten)]
        selection: SelectionArgs,
        /// Output .gdf path
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Search the citing articles of a query's results and build an author citation graph (GDF)
    Citations {
        query: String,
        #[command(flatten)]
        selection: SelectionArgs,
        /// Output .gdf path
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List queries with completed cache entries
    Queries,
    /// Join the cached results of several queries into one corpus
    Join {
        /// Cached queries to join, in order
        #[arg(required = true)]
        queries: Vec<String>,
        /// Directory name under joined_searches/ (default: unix timestamp)
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Args)]
struct SelectionArgs {
    /// Named view; COMPLETE is required for author data
    #[arg(long, value_enum)]
    view: Option<View>,
    /// Comma-separated field list; takes precedence over --view
    #[arg(long)]
    fields: Option<String>,
    /// Items per request (clamped to 100 for the COMPLETE view, 200 otherwise)
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    count: u32,
    /// Maximum items retrieved per query
    #[arg(long, default_value_t = DEFAULT_MAX_ITEMS)]
    max_items: u64,
}

impl SelectionArgs {
    fn request(&self, query: &str) -> Result<SearchRequest, SearchError> {
        let selector = resolve_selector(self.fields.clone(), self.view)?;
        SearchRequest::new(query, selector)?
            .with_page_size(self.count)?
            .with_max_items(self.max_items)
    }
}

fn scopus_client() -> Result<ScopusClient, Box<dyn std::error::Error>> {
    let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(ScopusClient::from_env(http)?)
}

fn search_summary(outcome: &SearchOutcome, max_items: u64) -> String {
    format!(
        "{} records ({:?}; declared total: {}, pages: {}, downloaded: {}, dropped: {}, duplicates: {}, max items: {max_items})",
        outcome.records.len(),
        outcome.origin,
        outcome
            .declared_total
            .map_or_else(|| "n/a".to_string(), |t| t.to_string()),
        outcome.pages_fetched,
        outcome.raw_count,
        outcome.dropped,
        outcome.duplicates,
    )
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scopus_graph=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .or_else(|| env::var_os("SCOPUS_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let cache = QueryCache::new(data_dir.join("search"));
    let graphs_dir = data_dir.join("graphs");
    info!(cache = %cache.root().display(), "using search cache");

    match cli.command {
        Command::Search { query, selection } => {
            let request = selection.request(&query)?;
            let client = scopus_client()?;
            let outcome = search::search(&client, &cache, &request).await?;
            println!("{}", search_summary(&outcome, request.max_items()));
        }
        Command::Coauthors {
            query,
            joined,
            selection,
            output,
        } => {
            let (records, label) = match (query, joined) {
                (_, Some(name)) => {
                    let dir = data_dir.join("joined_searches").join(&name);
                    (join::load_joined(&dir).await?, format!("joined_{}", cache_key(&name)))
                }
                (Some(query), None) => {
                    let request = selection.request(&query)?;
                    let client = scopus_client()?;
                    let outcome = search::search(&client, &cache, &request).await?;
                    (outcome.records, cache_key(&query))
                }
                (None, None) => return Err("a query or --joined is required".into()),
            };

            let graph = graph::coauthor_graph(&records);
            let path = output.unwrap_or_else(|| {
                graphs_dir
                    .join(label)
                    .join(format!("coauthors_{}.gdf", timestamp()))
            });
            graph::gdf::write_gdf(&path, &graph).await?;
            println!(
                "{} nodes, {} edges written to {}",
                graph.nodes.len(),
                graph.edges.len(),
                path.display()
            );
        }
        Command::Citations {
            query,
            selection,
            output,
        } => {
            let request = selection.request(&query)?;
            let client = scopus_client()?;
            let outcome = search::search(&client, &cache, &request).await?;
            let citations =
                search::citations::collect_citations(&client, &cache, &request, &outcome.records)
                    .await?;

            let graph = graph::citation_graph(&citations);
            let path = output.unwrap_or_else(|| {
                graphs_dir
                    .join(cache_key(request.query()))
                    .join(format!("citations_{}.gdf", timestamp()))
            });
            graph::gdf::write_gdf(&path, &graph).await?;
            println!(
                "{} cited articles ({} dropped), {} nodes, {} edges written to {}",
                citations.cited.len(),
                citations.dropped.len(),
                graph.nodes.len(),
                graph.edges.len(),
                path.display()
            );
        }
        Command::Queries => {
            for (i, query) in cache.cached_queries().await?.iter().enumerate() {
                println!("{i}\t{query}");
            }
        }
        Command::Join { queries, name } => {
            let name = name.unwrap_or_else(|| timestamp().to_string());
            let out_dir = data_dir.join("joined_searches").join(name);
            let joined = join::join_queries(&cache, &queries, &out_dir).await?;
            println!(
                "{} entries from {} queries joined into {}",
                joined.entries,
                queries.len(),
                joined.dir.display()
            );
        }
    }

    Ok(())
}
