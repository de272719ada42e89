//! feedctl: reads a partitioned fixture through the cross-partition pipeline.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration** from flags, with `FEEDCTL_*` environment fallbacks.
//! 2. **Wire observability**: a `tracing-subscriber` formatter (pretty or JSON)
//!    writing to stderr, filtered by `RUST_LOG` (default `info`). Every span and
//!    event from the `pipeline` and `driver` crates flows through it.
//! 3. **Construct the pipeline**: a query pipeline from the parallel engine, or
//!    a change-feed pipeline over the requested feed ranges, optionally resumed
//!    from a composite continuation token.
//! 4. **Drive it** against an in-memory source built from the fixture, printing
//!    one item per line on stdout.
//!
//! ```bash
//! feedctl --fixture partitions.json --page-size 2 --max-pages 1 --token-out token.json
//! feedctl --fixture partitions.json --resume token.json
//! ```

mod fixture;

use std::io::{BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use driver::{DriverConfig, PipelineDriver};
use pipeline::{
    ChangeFeedOptions, CompositeContinuationToken, FeedRange, ParallelQueryEngine,
    PartitionKeyRangeProperties, PartitionedPipeline, QueryEngine, QueryOptions, QueryPipeline,
    Timestamp,
};
use tracing_subscriber::EnvFilter;

use crate::fixture::Fixture;

#[derive(Parser, Debug)]
#[command(name = "feedctl")]
#[command(about = "Read a partitioned fixture through the cross-partition feed pipeline")]
struct Args {
    /// Fixture file describing partitions and their pages
    #[arg(long, env = "FEEDCTL_FIXTURE")]
    fixture: PathBuf,

    /// Read mode
    #[arg(long, value_enum, default_value_t = Mode::Query, env = "FEEDCTL_MODE")]
    mode: Mode,

    /// Query text (query mode only)
    #[arg(long, default_value = "SELECT * FROM c", env = "FEEDCTL_QUERY")]
    query: String,

    /// Gateway query plan file (query mode only)
    #[arg(long, env = "FEEDCTL_PLAN")]
    plan: Option<PathBuf>,

    /// Maximum items per page
    #[arg(long, default_value_t = 100, env = "FEEDCTL_PAGE_SIZE")]
    page_size: usize,

    /// Maximum concurrent partition fetches (default: unbounded)
    #[arg(long, env = "FEEDCTL_MAX_CONCURRENCY")]
    max_concurrency: Option<NonZeroUsize>,

    /// Feed range to read, as MIN:MAX (change-feed mode; repeatable; default: all)
    #[arg(long = "feed-range", value_parser = parse_feed_range, conflicts_with = "resume")]
    feed_ranges: Vec<FeedRange>,

    /// Only read changes made after this RFC 3339 time (change-feed mode)
    #[arg(long, env = "FEEDCTL_START_FROM")]
    start_from: Option<Timestamp>,

    /// Composite continuation token file to resume from
    #[arg(long, env = "FEEDCTL_RESUME")]
    resume: Option<PathBuf>,

    /// Stop after this many pages
    #[arg(long)]
    max_pages: Option<usize>,

    /// Where to write the continuation token when the run ends
    #[arg(long, env = "FEEDCTL_TOKEN_OUT")]
    token_out: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, env = "FEEDCTL_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Query,
    ChangeFeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn parse_feed_range(value: &str) -> Result<FeedRange, String> {
    let (min, max) = value
        .split_once(':')
        .ok_or_else(|| format!("expected MIN:MAX, got {value:?}"))?;
    FeedRange::try_new(min, max).map_err(|e| e.to_string())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn read_resume_token(path: &Path) -> anyhow::Result<CompositeContinuationToken> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading continuation token {}", path.display()))?;
    CompositeContinuationToken::from_json(json.trim())
        .with_context(|| format!("parsing continuation token {}", path.display()))
}

fn build_query_pipeline(
    args: &Args,
    ranges: &[PartitionKeyRangeProperties],
    resume: Option<&CompositeContinuationToken>,
) -> anyhow::Result<Box<dyn QueryPipeline>> {
    let plan = match &args.plan {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("reading query plan {}", path.display()))?,
        None => Vec::new(),
    };

    let engine = Arc::new(ParallelQueryEngine::new());
    let options = QueryOptions {
        max_item_count: u32::try_from(args.page_size).ok(),
        query_engine: Some(engine.clone()),
        ..QueryOptions::default()
    };
    tracing::debug!(headers = ?options.headers(), "query request headers");

    let pipeline = match resume {
        Some(token) => engine.resume_pipeline(&args.query, &plan, token, ranges),
        None => engine.create_pipeline(&args.query, &plan, ranges),
    };
    pipeline.context("creating query pipeline")
}

fn build_change_feed_pipeline(
    args: &Args,
    ranges: &[PartitionKeyRangeProperties],
    resume: Option<&CompositeContinuationToken>,
) -> anyhow::Result<Box<dyn QueryPipeline>> {
    let base = ChangeFeedOptions {
        max_item_count: u32::try_from(args.page_size).ok(),
        start_from: args.start_from,
        continuation: resume.map(CompositeContinuationToken::to_json).transpose()?,
        ..ChangeFeedOptions::default()
    };
    // One read per feed range; a resumed read is scoped by its token instead.
    let scoped: Vec<Option<FeedRange>> = if args.feed_ranges.is_empty() {
        vec![None]
    } else {
        args.feed_ranges.iter().cloned().map(Some).collect()
    };
    for feed_range in scoped {
        let options = ChangeFeedOptions {
            feed_range,
            ..base.clone()
        };
        tracing::debug!(headers = ?options.headers(ranges)?, "change feed request headers");
    }

    let pipeline = match resume {
        Some(token) => PartitionedPipeline::resume(String::new(), token, ranges),
        None => PartitionedPipeline::for_change_feed(&args.feed_ranges, ranges),
    };
    Ok(Box::new(pipeline.context("creating change feed pipeline")?))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let fixture = Fixture::load(&args.fixture)?;
    let ranges = fixture.ranges()?;
    let resume = args.resume.as_deref().map(read_resume_token).transpose()?;

    let pipeline: Arc<dyn QueryPipeline> = Arc::from(match args.mode {
        Mode::Query => build_query_pipeline(&args, &ranges, resume.as_ref())?,
        Mode::ChangeFeed => build_change_feed_pipeline(&args, &ranges, resume.as_ref())?,
    });

    let config = DriverConfig {
        max_page_size: args.page_size,
        max_concurrent_fetches: args.max_concurrency,
    };
    let driver = PipelineDriver::new(pipeline.clone(), Arc::new(fixture.source()), config);

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut pages = 0usize;
    let mut items = 0usize;
    while args.max_pages.map_or(true, |max| pages < max) {
        let Some(page) = driver.next_page().await? else {
            break;
        };
        pages += 1;
        items += page.len();
        for item in page {
            out.write_all(&item)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;

    let token = CompositeContinuationToken::new(fixture.resource_id(), pipeline.continuations()?);
    let complete = token.is_finished();
    tracing::info!(pages, items, complete, "read finished");

    let json = token.to_json()?;
    match &args.token_out {
        Some(path) => std::fs::write(path, &json)
            .with_context(|| format!("writing continuation token {}", path.display()))?,
        None if !complete => tracing::info!(token = %json, "stopped before completion"),
        None => {}
    }

    pipeline.close();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);
    run(args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_range_flag_parses_bounds() {
        let range = parse_feed_range(":80").unwrap();
        assert_eq!(range.min_inclusive(), "");
        assert_eq!(range.max_exclusive(), "80");
        assert!(parse_feed_range("80").is_err());
        assert!(parse_feed_range("FF:80").is_err());
    }

    #[test]
    fn flags_parse_with_defaults() {
        let args = Args::try_parse_from([
            "feedctl",
            "--fixture",
            "f.json",
            "--mode",
            "change-feed",
            "--feed-range",
            "00:80",
            "--feed-range",
            "80:FF",
        ])
        .unwrap();
        assert_eq!(args.mode, Mode::ChangeFeed);
        assert_eq!(args.feed_ranges.len(), 2);
        assert_eq!(args.log_format, LogFormat::Pretty);
        assert_eq!(args.max_concurrency, None);
        assert_eq!(args.start_from, None);
    }

    #[test]
    fn feed_ranges_cannot_be_combined_with_resume() {
        let err = Args::try_parse_from([
            "feedctl",
            "--fixture",
            "f.json",
            "--mode",
            "change-feed",
            "--resume",
            "token.json",
            "--feed-range",
            "00:80",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn start_from_parses_as_rfc3339() {
        let args = Args::try_parse_from([
            "feedctl",
            "--fixture",
            "f.json",
            "--start-from",
            "2024-03-01T12:00:00Z",
        ])
        .unwrap();
        assert_eq!(
            args.start_from.map(Timestamp::to_rfc1123).as_deref(),
            Some("Fri, 01 Mar 2024 12:00:00 GMT")
        );
    }
}
