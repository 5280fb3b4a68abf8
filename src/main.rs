use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::watch;
use tracing::{error, info};

use radar::alert::sink::AlertLog;
use radar::alert::traits::AlertSink;
use radar::config::Config;
use radar::monitor::community::CommunityMonitor;
use radar::reddit::client::RedditClient;
use radar::reddit::traits::ListingSource;

/// Radar: rising-post momentum detection for Reddit.
///
/// Polls subreddit listings, tracks how fast candidate posts gain upvotes,
/// and alerts once when a post shows sustained momentum.
#[derive(Parser)]
#[command(name = "radar", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor communities until interrupted (Ctrl-C)
    Watch {
        /// Only watch these communities (default: all configured)
        #[arg(long = "community", short = 'c')]
        communities: Vec<String>,
    },

    /// Fetch a community's listing once and show each post's upvote rate
    Probe {
        /// The community to probe (e.g. news or r/news)
        community: String,

        /// Posts to fetch (default: tracking.listing_limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("radar=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { communities } => {
            let config = Config::load()?;
            config.require_credentials()?;
            let selected = config.select_communities(&communities)?;

            let client = RedditClient::new(config.credentials.clone(), &config.api)?;
            client.authenticate().await?;
            let source: Arc<dyn ListingSource> = Arc::new(client);

            let sink = AlertLog::open(&config.alert_log_path).await?;
            info!(path = %config.alert_log_path.display(), "Writing alerts");
            let sink: Arc<dyn AlertSink> = Arc::new(sink);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let loops: Vec<_> = selected
                .into_iter()
                .map(|community| {
                    let name = community.name.clone();
                    let monitor = CommunityMonitor::new(
                        community,
                        &config.tracking,
                        source.clone(),
                        sink.clone(),
                    );
                    (name, tokio::spawn(monitor.run(shutdown_rx.clone())))
                })
                .collect();

            println!(
                "Watching {} communit{}. Press Ctrl-C to stop.",
                loops.len(),
                if loops.len() == 1 { "y" } else { "ies" }
            );

            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown requested, finishing in-flight work");
                    let _ = shutdown_tx.send(true);
                }
            });

            let (names, handles): (Vec<_>, Vec<_>) = loops.into_iter().unzip();
            let results = futures::future::join_all(handles).await;
            interrupt.abort();

            let mut failed = 0;
            for (name, result) in names.iter().zip(results) {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        println!("  {} r/{name}: {e}", "Stopped:".red());
                        failed += 1;
                    }
                    Err(e) => {
                        error!(community = %name, error = %e, "Monitor task panicked");
                        failed += 1;
                    }
                }
            }

            if failed > 0 {
                anyhow::bail!("{failed} monitor loop(s) stopped on fatal errors");
            }
            println!("{}", "Radar stopped.".bold());
        }

        Commands::Probe { community, limit } => {
            let config = Config::load()?;
            config.require_credentials()?;
            let community = config
                .community(&community)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Community {community} is not configured"))?;

            let client = RedditClient::new(config.credentials.clone(), &config.api)?;
            let limit = limit.unwrap_or(config.tracking.listing_limit);

            println!("Fetching {} ({})...", community.display_name(), community.listing);
            let listing = client
                .fetch_listing(&community.name, community.listing, limit)
                .await?;

            let rows = radar::monitor::probe::probe(
                &listing,
                &community,
                &config.tracking,
                chrono::Utc::now(),
            );
            radar::output::terminal::display_probe(
                &community.display_name(),
                community.initial_threshold,
                &rows,
            );
        }

        Commands::Status => {
            let config = Config::load()?;
            radar::status::show(&config);
        }
    }

    Ok(())
}
