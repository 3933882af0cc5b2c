//! # Caissa CLI Entry Point
//!
//! Main binary for the Caissa analysis relay. Provides the command-line
//! interface for running the relay and for talking to a running relay from
//! scripts.
//!
//! ## Usage
//!
//! ```bash
//! # Start a relay in front of two spots
//! caissa serve -b 0.0.0.0:8080 \
//!   --spot id=alpha,endpoint=10.0.0.1:9101,priority=150,region=eu \
//!   --spot id=beta,endpoint=10.0.0.2:9101
//!
//! # One-shot analysis (outputs raw JSON)
//! caissa call http://127.0.0.1:8080 "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1" --depth 20
//!
//! # Dump the spot table of a running relay
//! caissa spots http://127.0.0.1:8080
//! ```
//!
//! ## URL Format
//!
//! Server URLs must include the `http://` or `https://` prefix.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use caissa_common::protocol::AnalysisRequest;
use caissa_orchestrator::{HttpServer, Orchestrator, OrchestratorConfig, SpotConfig};
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

/// Validates that a URL string starts with http:// or https://
fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid {}: '{}' must start with http:// or https://",
            description,
            url
        ))
    }
}

/// Parses one `--spot` specification.
///
/// Format: comma-separated `key=value` pairs plus the bare `disabled` flag.
/// `id` and `endpoint` are required; `priority`, `region` and `disabled` are
/// optional.
///
/// ```text
/// id=alpha,endpoint=10.0.0.1:9101,priority=150,region=eu-west,disabled
/// ```
fn parse_spot_spec(spec: &str) -> Result<SpotConfig> {
    let mut id = None;
    let mut endpoint = None;
    let mut priority = None;
    let mut region = None;
    let mut enabled = true;

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part == "disabled" {
            enabled = false;
            continue;
        }
        let (key, value) = part.split_once('=').ok_or_else(|| {
            anyhow::anyhow!("Invalid spot spec '{}': expected key=value, got '{}'", spec, part)
        })?;
        match key {
            "id" => id = Some(value.to_string()),
            "endpoint" => endpoint = Some(value.to_string()),
            "priority" => {
                priority = Some(value.parse::<u8>().map_err(|e| {
                    anyhow::anyhow!("Invalid priority '{}' in spot spec '{}': {}", value, spec, e)
                })?)
            }
            "region" => region = Some(value.to_string()),
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown key '{}' in spot spec '{}'",
                    other,
                    spec
                ))
            }
        }
    }

    let id = id.ok_or_else(|| anyhow::anyhow!("Spot spec '{}' is missing 'id'", spec))?;
    let endpoint =
        endpoint.ok_or_else(|| anyhow::anyhow!("Spot spec '{}' is missing 'endpoint'", spec))?;

    let mut config = SpotConfig::new(id, endpoint).with_enabled(enabled);
    if let Some(priority) = priority {
        config = config.with_priority(priority);
    }
    if let Some(region) = region {
        config = config.with_region(region);
    }
    Ok(config)
}

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// Caissa - chess analysis relay
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: run the relay in front of a fleet of spots
/// - **Call**: send one analysis request (unix-friendly JSON output)
/// - **Spots**: dump a running relay's spot table
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
    Spots(SpotsArgs),
}

/// Arguments for running the relay.
///
/// The relay accepts analysis requests over HTTP, routes each one to the
/// best available spot, and fails over to the next candidate when a spot
/// misbehaves. A background monitor probes every enabled spot on a fixed
/// interval.
///
/// # Example
///
/// ```bash
/// caissa serve -b 0.0.0.0:8080 \
///   --spot id=alpha,endpoint=10.0.0.1:9101,priority=150 \
///   --spot id=beta,endpoint=10.0.0.2:9101,region=us-east
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// run the analysis relay
struct ServeArgs {
    /// address to bind the relay's HTTP server to
    ///
    /// Clients send analysis requests to this address. Defaults to
    /// "0.0.0.0:8080".
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// spot specification, repeatable
    ///
    /// Comma-separated key=value pairs: id and endpoint are required,
    /// priority (0-200), region and the bare flag disabled are optional.
    /// Example: id=alpha,endpoint=10.0.0.1:9101,priority=150,region=eu
    #[argh(option, long = "spot")]
    spots: Vec<String>,

    /// timeout for a single analysis attempt in milliseconds
    ///
    /// If a spot does not answer within this time the relay cancels the
    /// attempt and moves to the next candidate. Defaults to 30000ms.
    #[argh(option, long = "attempt-timeout-ms", default = "30000")]
    attempt_timeout_ms: u64,

    /// retries after the first failed attempt
    ///
    /// A request is tried on at most 1 + this many distinct spots.
    /// Defaults to 2.
    #[argh(option, long = "max-retries", default = "2")]
    max_retries: usize,

    /// interval between background health check cycles in milliseconds
    ///
    /// Lower values detect failures faster but increase probe traffic.
    /// Defaults to 30000ms.
    #[argh(option, long = "health-interval-ms", default = "30000")]
    health_interval_ms: u64,

    /// timeout for a single health probe in milliseconds
    ///
    /// A probe that does not answer within this time counts as a failure.
    /// Defaults to 5000ms.
    #[argh(option, long = "probe-timeout-ms", default = "5000")]
    probe_timeout_ms: u64,

    /// consecutive failures before a spot is marked Down
    ///
    /// A Down spot stays out of the rotation until a probe or request
    /// succeeds again. Defaults to 3.
    #[argh(option, long = "down-threshold", default = "3")]
    down_threshold: u32,
}

/// Arguments for a one-shot analysis call.
///
/// Sends one position to a running relay and prints the raw JSON result to
/// stdout, which makes it suitable for piping into `jq` and friends. Errors
/// go to stderr with a non-zero exit code.
///
/// # Examples
///
/// ```bash
/// caissa call http://127.0.0.1:8080 "8/8/8/8/8/5k2/6q1/7K b - - 0 1" --depth 24
/// caissa call http://127.0.0.1:8080 "$FEN" | jq '.best_move'
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// analyze one position via a running relay
struct CallArgs {
    /// address of the relay
    ///
    /// Must include the http:// or https:// prefix (e.g., http://127.0.0.1:8080).
    #[argh(positional)]
    server_address: String,

    /// position to analyze, in FEN
    #[argh(positional)]
    fen: String,

    /// requested search depth in plies
    #[argh(option, short = 'd', long = "depth")]
    depth: Option<u32>,

    /// number of principal variations to report
    #[argh(option, long = "multi-pv")]
    multi_pv: Option<u32>,

    /// fixed thinking time in milliseconds
    #[argh(option, long = "movetime-ms")]
    movetime_ms: Option<u64>,
}

/// Arguments for dumping a relay's spot table.
///
/// Fetches the live configuration and metrics of every registered spot and
/// prints them as raw JSON.
#[derive(FromArgs)]
#[argh(subcommand, name = "spots")]
/// list the spots of a running relay
struct SpotsArgs {
    /// address of the relay
    ///
    /// Must include the http:// or https:// prefix (e.g., http://127.0.0.1:8080).
    #[argh(positional)]
    server_address: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Initialize tracing only for serve: call and spots keep their output
    // clean for unix tool usage (piping to jq, etc.).
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
        Commands::Spots(args) => run_spots(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    tracing::info!("Starting Caissa relay");
    tracing::info!("Binding to: {}", args.bind);

    let spots = args
        .spots
        .iter()
        .map(|spec| parse_spot_spec(spec))
        .collect::<Result<Vec<_>>>()?;

    if spots.is_empty() {
        tracing::warn!("No spots specified! Use --spot id=...,endpoint=... to add spots.");
    }
    for spot in &spots {
        tracing::info!(
            "Spot {}: endpoint={} priority={} enabled={}",
            spot.id,
            spot.endpoint,
            spot.priority,
            spot.enabled
        );
    }

    let config = OrchestratorConfig {
        per_attempt_timeout: Duration::from_millis(args.attempt_timeout_ms),
        max_retries: args.max_retries,
        health_check_interval: Duration::from_millis(args.health_interval_ms),
        probe_timeout: Duration::from_millis(args.probe_timeout_ms),
        down_threshold: args.down_threshold,
    };

    let orchestrator = Orchestrator::with_config(spots, config).await?;
    tracing::info!("Relay created with {} spots", orchestrator.spot_count().await);

    let server = HttpServer::new(Arc::new(orchestrator));
    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", args.bind, e))?;
    server.run(addr).await?;

    Ok(())
}

/// Executes the `call` subcommand: one POST to the relay's analyze endpoint,
/// raw JSON to stdout.
async fn run_call(args: CallArgs) -> Result<()> {
    validate_http_url(&args.server_address, "server address")?;

    let mut request = AnalysisRequest::new(&args.fen);
    request.depth = args.depth;
    request.multi_pv = args.multi_pv;
    request.movetime_ms = args.movetime_ms;

    let url = format!("{}/analyze", args.server_address.trim_end_matches('/'));
    let client = Client::builder(TokioExecutor::new()).build_http();
    let http_request = hyper::Request::builder()
        .method("POST")
        .uri(&url)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(&request)?)))?;

    let response = client
        .request(http_request)
        .await
        .map_err(|e| anyhow::anyhow!("Request to {} failed: {}", url, e))?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    let text = String::from_utf8_lossy(&body);

    if !status.is_success() {
        return Err(anyhow::anyhow!("Relay returned {}: {}", status, text));
    }

    println!("{}", text);
    Ok(())
}

/// Executes the `spots` subcommand: dumps the relay's spot table as raw JSON.
async fn run_spots(args: SpotsArgs) -> Result<()> {
    validate_http_url(&args.server_address, "server address")?;

    let url = format!("{}/spots", args.server_address.trim_end_matches('/'));
    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
    let response = client
        .get(url.parse()?)
        .await
        .map_err(|e| anyhow::anyhow!("Request to {} failed: {}", url, e))?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    let text = String::from_utf8_lossy(&body);

    if !status.is_success() {
        return Err(anyhow::anyhow!("Relay returned {}: {}", status, text));
    }

    println!("{}", text);
    Ok(())
}
