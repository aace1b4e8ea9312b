mod analysis;
mod crawler;
mod db;
mod parser;
mod session;
mod settings;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use analysis::histogram::{HistogramSink, TerminalHistogram};
use analysis::{ClusterOutcome, Clusterer};
use crawler::{CrawlOptions, Crawler};
use db::RecordStore;
use parser::{BlockDetector, CardExtractor, CardSelectors};
use session::{ChromeFactory, ProfilePool};
use settings::Settings;

#[derive(Parser)]
#[command(name = "gig_scraper", about = "Fiverr gig scraper and common request analyzer")]
struct Cli {
    /// Settings file (default: gigs.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape search pages, then cluster the stored descriptions (default)
    Run {
        #[command(flatten)]
        crawl: CrawlArgs,
        /// Number of clusters
        #[arg(short = 'k', long)]
        clusters: Option<usize>,
    },
    /// Scrape search pages into the database
    Crawl {
        #[command(flatten)]
        crawl: CrawlArgs,
    },
    /// Cluster stored descriptions
    Analyze {
        /// Number of clusters
        #[arg(short = 'k', long)]
        clusters: Option<usize>,
        /// Also write the report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Show database statistics
    Stats,
}

#[derive(Args, Default)]
struct CrawlArgs {
    /// Search URL; `page=<n>` is set on it for every page
    #[arg(long)]
    url: Option<String>,
    /// Number of result pages to scrape
    #[arg(short = 'p', long)]
    pages: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let command = cli.command.unwrap_or(Commands::Run {
        crawl: CrawlArgs::default(),
        clusters: None,
    });

    let result = match command {
        Commands::Run { crawl, clusters } => {
            apply_crawl_args(&mut settings, crawl);
            if let Some(k) = clusters {
                settings.clusters = k;
            }
            settings.validate()?;

            // Step 1: scrape into the local database
            let store = open_store(&settings)?;
            crawl_pages(&settings, &store).await?;
            store.close()?;

            // Step 2: cluster what was stored
            let store = open_store(&settings)?;
            analyze(&settings, &store, None)?;
            store.close()
        }
        Commands::Crawl { crawl } => {
            apply_crawl_args(&mut settings, crawl);
            settings.validate()?;
            let store = open_store(&settings)?;
            crawl_pages(&settings, &store).await?;
            store.close()
        }
        Commands::Analyze { clusters, json } => {
            if let Some(k) = clusters {
                settings.clusters = k;
            }
            settings.validate()?;
            let store = open_store(&settings)?;
            analyze(&settings, &store, json)?;
            store.close()
        }
        Commands::Stats => {
            let store = open_store(&settings)?;
            let s = store.stats()?;
            println!("Database:         {}", settings.db_path.display());
            println!("Gigs:             {}", s.total);
            println!("With title:       {}", s.with_title);
            println!("With description: {}", s.with_description);
            store.close()
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn apply_crawl_args(settings: &mut Settings, args: CrawlArgs) {
    if let Some(url) = args.url {
        settings.base_url = url;
    }
    if let Some(p) = args.pages {
        settings.pages = p;
    }
}

fn open_store(settings: &Settings) -> anyhow::Result<RecordStore> {
    let store = RecordStore::open(&settings.db_path)?;
    store.init()?;
    Ok(store)
}

async fn crawl_pages(settings: &Settings, store: &RecordStore) -> anyhow::Result<()> {
    let selectors = CardSelectors {
        card: settings.card_selector.clone(),
        title: settings.title_selector.clone(),
        description: settings.description_selector.clone(),
    };
    let extractor = CardExtractor::new(&selectors)?;
    let factory = ChromeFactory {
        ready_selector: settings.card_selector.clone(),
        load_timeout: Duration::from_secs(settings.load_timeout_secs),
    };

    let mut crawler = Crawler::new(
        factory,
        ProfilePool::new(settings.user_agents.clone(), settings.proxies.clone()),
        extractor,
        BlockDetector::new(&settings.block_indicators),
        store,
        CrawlOptions::from(settings),
    );

    println!("Scraping {} pages of {}", settings.pages, settings.base_url);
    let stats = crawler.run(&settings.base_url, settings.pages).await?;
    stats.print();
    Ok(())
}

fn analyze(settings: &Settings, store: &RecordStore, json: Option<PathBuf>) -> anyhow::Result<()> {
    let descriptions = store.read_all_nonempty_descriptions()?;
    let clusterer = Clusterer {
        seed: settings.seed,
        n_init: settings.n_init,
    };
    let outcome = clusterer.cluster(&descriptions, settings.clusters)?;

    match &outcome {
        ClusterOutcome::NoDescriptions => println!("No data available for clustering."),
        ClusterOutcome::EmptyVocabulary => {
            println!("Empty vocabulary; perhaps the documents only contain stop words.")
        }
        ClusterOutcome::Clustered(report) => {
            report.print();
            TerminalHistogram::stdout().render(&report.assignments, report.k)?;
        }
    }

    if let Some(path) = json {
        let body = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Cluster report written to {}", path.display());
    }
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
