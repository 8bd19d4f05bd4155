//! quakemap - interactive earthquake map dashboard.
//!
//! Serves a single-page map of USGS earthquake events for a chosen date
//! range (or a fixed summary feed), with a click-detail card per event. The
//! same feed fetcher also backs one-shot `query` and `tail` commands.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

mod cache;
mod cli;
mod client;
mod config;
mod dashboard;
mod errors;
mod models;
mod output;
mod server;
mod session;
#[cfg(test)]
mod testutil;
mod view;

use cache::ResponseCache;
use cli::{Cli, Command, FeedArgs};
use client::FeedFetcher;
use config::{AppConfig, Credentials};
use models::{DateRange, EventRecord};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let debug = matches!(&cli.command, Command::Serve(args) if args.debug);
    init_tracing(cli.verbose || debug, cli.quiet);

    config::load_dotenv();

    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Query(args) => cmd_query(args),
        Command::Tail(args) => cmd_tail(args),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn build_fetcher(args: &FeedArgs, summary: client::FeedType) -> Result<FeedFetcher> {
    let cache = ResponseCache::new(Duration::from_secs(args.cache_ttl));
    FeedFetcher::new(&args.base_url, summary, cache).context("failed to create feed client")
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    Ok(runtime.block_on(future))
}

fn print_events(mut events: Vec<EventRecord>, limit: usize, format: output::Format) -> Result<()> {
    events.truncate(limit);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_events(&mut handle, &events, format)?;
    Ok(())
}

/// Execute the `serve` command - validate config, then run the web server.
fn cmd_serve(args: cli::ServeArgs) -> Result<()> {
    // Missing credentials must stop us before anything is served.
    let credentials = Credentials::from_env().context("invalid configuration")?;

    let config = AppConfig {
        host: args.host,
        port: args.port,
        mode: args.mode,
        summary: args.feed,
        base_url: args.upstream.base_url,
        cache_ttl: Duration::from_secs(args.upstream.cache_ttl),
        debug: args.debug,
        credentials,
    };
    config.validate().context("invalid configuration")?;

    info!(
        "charting account: {} (key {}), map tiles: {}",
        config.credentials.chart_username,
        config.credentials.masked_api_key(),
        if config.credentials.mapbox_token.is_some() { "mapbox" } else { "open-street-map" }
    );
    if config.credentials.uses_default_secret() {
        warn!("{} not set, using the built-in default", config::SECRET_KEY_VAR);
    }
    if config.debug {
        info!("debug mode enabled");
    }

    println!("\x1b[1m🌍 quakemap\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Local:   \x1b[96mhttp://{}\x1b[0m", config.bind_addr());
    println!("  Mode:    {}", config.mode.as_str());
    println!("  Cache:   {}s", config.cache_ttl.as_secs());
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    block_on(server::run_server(Arc::new(config)))?
}

/// Execute the `query` command - one events query for a date range.
fn cmd_query(args: cli::QueryArgs) -> Result<()> {
    let range = DateRange::from_bounds(Some(args.start.as_str()), Some(args.end.as_str()))?
        .context("both --start and --end are required")?;

    let fetcher = build_fetcher(&args.upstream, client::FeedType::AllDay)?;
    let events = block_on(async { fetcher.fetch(Some(&range)).await })?
        .context("failed to fetch earthquake events")?;

    print_events(events, args.limit, args.format)
}

/// Execute the `tail` command - one fetch of a summary feed.
fn cmd_tail(args: cli::TailArgs) -> Result<()> {
    let fetcher = build_fetcher(&args.upstream, args.feed)?;
    let events = block_on(async { fetcher.fetch(None).await })?
        .context("failed to fetch earthquake feed")?;

    print_events(events, args.limit, args.format)
}
