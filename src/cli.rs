//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use clap::{Args, Parser, Subcommand};

use crate::client::{FeedType, USGS_BASE_URL};
use crate::config::FeedMode;
use crate::output::Format;

/// Earthquake map dashboard backed by the USGS event feeds.
#[derive(Parser, Debug)]
#[command(name = "quakemap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the map dashboard
    Serve(ServeArgs),

    /// Fetch events for a date range once and print them
    Query(QueryArgs),

    /// Fetch a summary feed once and print it
    Tail(TailArgs),
}

/// Upstream options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct FeedArgs {
    /// Base URL of the event service
    #[arg(long, env = "QUAKEMAP_BASE_URL", default_value = USGS_BASE_URL)]
    pub base_url: String,

    /// Seconds to keep responses cached (0 disables caching)
    #[arg(long, env = "QUAKEMAP_CACHE_TTL", default_value = "500")]
    pub cache_ttl: u64,
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, short = 'p', env = "QUAKEMAP_PORT", default_value = "8050")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, env = "QUAKEMAP_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Dashboard mode: ranged (date picker) or static (summary feed)
    #[arg(long, default_value = "ranged", value_parser = parse_mode)]
    pub mode: FeedMode,

    /// Summary feed shown in static mode
    #[arg(long, default_value = "all_day", value_parser = parse_feed_type)]
    pub feed: FeedType,

    /// Debug mode: verbose logging for the server
    #[arg(long)]
    pub debug: bool,

    #[command(flatten)]
    pub upstream: FeedArgs,
}

/// Arguments for the `query` command.
#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: String,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    pub end: String,

    /// Maximum number of events to show
    #[arg(long, short = 'n', default_value = "100")]
    pub limit: usize,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,

    #[command(flatten)]
    pub upstream: FeedArgs,
}

/// Arguments for the `tail` command.
#[derive(Parser, Debug)]
pub struct TailArgs {
    /// Feed type to fetch
    #[arg(long, default_value = "2.5_day", value_parser = parse_feed_type)]
    pub feed: FeedType,

    /// Maximum number of events to show
    #[arg(long, short = 'n', default_value = "50")]
    pub limit: usize,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,

    #[command(flatten)]
    pub upstream: FeedArgs,
}

/// Parse a feed type from string.
fn parse_feed_type(s: &str) -> Result<FeedType, String> {
    s.parse()
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

/// Parse a dashboard mode from string.
fn parse_mode(s: &str) -> Result<FeedMode, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["quakemap", "serve"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        assert_eq!(args.mode, FeedMode::Ranged);
        assert_eq!(args.feed, FeedType::AllDay);
        assert!(!args.debug);
    }

    #[test]
    fn test_query_requires_both_dates() {
        assert!(Cli::try_parse_from(["quakemap", "query", "--start", "2020-01-01"]).is_err());

        let cli = Cli::try_parse_from([
            "quakemap", "query", "--start", "2020-01-01", "--end", "2020-01-02", "-f", "json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Query(ref a) if a.format == Format::Json));
    }
}
