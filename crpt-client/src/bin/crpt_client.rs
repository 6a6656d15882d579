use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use crpt_client::ApiConfig;
use crpt_client::ApiError;
use crpt_client::CREATE_CONTRACT_PATH;
use crpt_client::Document;
use crpt_client::FailurePolicy;
use crpt_client::Inbound;
use crpt_client::Outbound;
use crpt_client::Product;
use crpt_client::ProductionType;
use crpt_client::RateLimiter;
use crpt_client::SubmissionClient;
use hdrhistogram::Histogram;
use rand::Rng as _;
use reqwest::StatusCode;
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::time::sleep;
use tower::BoxError;
use tower::Service;
use tower::service_fn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Throttled CRPT document submission")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit one document read from a JSON file.
    Submit {
        /// Path to the document JSON.
        #[arg(long)]
        document: PathBuf,
        /// File holding the detached signature, base64.
        #[arg(long)]
        signature: PathBuf,
        #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
        window: Duration,
        /// Requests per window, 0 disables throttling.
        #[arg(long, default_value_t = 10)]
        limit: i64,
        #[arg(long, default_value = CREATE_CONTRACT_PATH)]
        path: String,
        /// Fail on transport errors instead of printing an empty body.
        #[arg(long)]
        strict: bool,
    },
    /// Fire a burst at a local stub and report how admissions spread out.
    Probe {
        #[arg(long, default_value_t = 50)]
        requests: usize,
        #[arg(long, default_value_t = 10)]
        limit: i64,
        #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
        window: Duration,
        /// Upper bound of the simulated remote latency.
        #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
        latency: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Args::parse().command {
        Command::Submit {
            document,
            signature,
            window,
            limit,
            path,
            strict,
        } => {
            let document: Document = serde_json::from_str(&std::fs::read_to_string(&document)?)?;
            let signature = std::fs::read_to_string(&signature)?;
            let policy = if strict {
                FailurePolicy::Propagate
            } else {
                FailurePolicy::Swallow
            };
            let client = SubmissionClient::from_env(window, limit)?.with_failure_policy(policy);

            let body = client.submit(&document, signature.trim(), &path).await?;
            println!("{body}");
        }
        Command::Probe {
            requests,
            limit,
            window,
            latency,
        } => probe(requests, limit, window, latency).await?,
    }

    Ok(())
}

fn probe_transport(
    max_latency_ms: u64,
) -> impl Service<Outbound, Response = Inbound, Error = BoxError, Future: Send + 'static>
+ Clone
+ Send
+ 'static {
    service_fn(move |_req: Outbound| {
        let delay = Duration::from_millis(rand::rng().random_range(0..=max_latency_ms));
        async move {
            sleep(delay).await;
            Ok::<_, BoxError>(Inbound {
                status: StatusCode::OK,
                body: String::new(),
            })
        }
    })
}

async fn probe(
    requests: usize,
    limit: i64,
    window: Duration,
    latency: Duration,
) -> Result<(), BoxError> {
    let max_latency_ms = u64::try_from(latency.as_millis())?;
    let remote = probe_transport(max_latency_ms);

    let config = ApiConfig::new("http://probe.invalid", "probe")?;
    let limiter = RateLimiter::new(window, limit)?;
    let client = SubmissionClient::with_transport(config, limiter, remote)
        .with_failure_policy(FailurePolicy::Propagate);
    let document = Arc::new(sample_document());

    let barrier = Arc::new(Barrier::new(requests));
    let mut tasks = JoinSet::new();
    let start = Instant::now();

    for _ in 0..requests {
        let client = client.clone();
        let document = Arc::clone(&document);
        let bar = Arc::clone(&barrier);
        tasks.spawn(async move {
            bar.wait().await;
            let res = client.submit(&document, "probe", CREATE_CONTRACT_PATH).await;
            (res, start.elapsed())
        });
    }

    let mut hist_elapsed = Histogram::<u64>::new_with_bounds(1, 3_600_000, 3)?;
    let mut per_window = BTreeMap::<u128, usize>::new();
    let mut failures = Vec::new();

    while let Some(task) = tasks.join_next().await {
        let (res, elapsed) = task?;
        match res {
            Ok(_) => {
                hist_elapsed.saturating_record(u64::try_from(elapsed.as_millis())?);
                let tick = elapsed.as_nanos() / window.as_nanos().max(1);
                *per_window.entry(tick).or_default() += 1;
            }
            Err(err) => failures.push(err),
        }
    }

    let total_duration = start.elapsed();
    println!(
        "--- probe: {requests} requests, {limit} per {} ---",
        humantime::format_duration(window)
    );
    println!("Total Duration:  {total_duration:.2?}");
    println!("Success/Total:   {}/{}", hist_elapsed.len(), requests);
    if !hist_elapsed.is_empty() {
        println!("P50 (Elapsed):   {}ms", hist_elapsed.value_at_quantile(0.5));
        println!("P99 (Elapsed):   {}ms", hist_elapsed.value_at_quantile(0.99));
        println!("Max (Elapsed):   {}ms", hist_elapsed.max());
    }
    println!("Admitted per window:");
    for (tick, count) in &per_window {
        println!("  └─ #{tick:<4} {count}");
    }
    if !failures.is_empty() {
        let interrupted = failures
            .iter()
            .filter(|err| matches!(err, ApiError::Interrupted))
            .count();
        println!("Errors:          {}", failures.len());
        println!("  └─ Interrupted: {interrupted}");
        println!("  └─ Other:       {}", failures.len() - interrupted);
    }

    Ok(())
}

fn sample_document() -> Document {
    let today = chrono::Local::now().date_naive();
    let product = Product::builder()
        .production_date(today)
        .owner_inn("7700000000")
        .producer_inn("7700000000")
        .tnved_code("6401100000")
        .uit_code("010463003407001221CMK3EwmGKxZ0")
        .build();

    Document::builder()
        .doc_id("probe")
        .doc_status("NEW")
        .doc_type("LP_INTRODUCE_GOODS")
        .owner_inn("7700000000")
        .participant_inn("7700000000")
        .producer_inn("7700000000")
        .production_date(today)
        .production_type(ProductionType::OwnProduction)
        .reg_date(today)
        .reg_number("probe")
        .products(vec![product])
        .build()
}
