#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]

use pointfilter::{
    config::{self, Config},
    filter::Filter,
    http_client, logger,
    metrics::{aggregator::Aggregator, constants::CONTEXTS, FilterMetrics},
    point::Point,
    rules::{LocalSource, RefresherConfig, RemoteSource, RuleRefresher, RuleSource, RuleStore},
};
use serde::{Deserialize, Serialize};
use std::{
    env,
    io::{Error, ErrorKind, Result},
    path::PathBuf,
    process,
    sync::{Arc, Mutex},
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// One NDJSON line on stdin or stdout.
#[derive(Debug, Deserialize, Serialize)]
struct Record {
    category: String,
    #[serde(flatten)]
    point: Point,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config();
    enable_logging_subsystem(&config);

    let aggregator = Aggregator::<CONTEXTS>::new()
        .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
    let metrics = FilterMetrics::new(Arc::new(Mutex::new(aggregator)));
    let store = Arc::new(RuleStore::new());

    let source: Arc<dyn RuleSource> = match &config.pull_url {
        Some(url) => {
            debug!("RULES | using remote rules from {url}");
            Arc::new(RemoteSource::new(
                http_client::get_client(Arc::clone(&config)),
                url.clone(),
            ))
        }
        None => Arc::new(LocalSource::new(&config.filters)),
    };
    let mut refresher = RuleRefresher::new(
        source,
        Arc::clone(&store),
        metrics.clone(),
        RefresherConfig::from_config(&config),
    );
    let cancel_token = refresher.cancel_token();
    let status = refresher.status_handle();

    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {e}");
            return;
        }
        debug!("Received shutdown signal");
        signal_token.cancel();
    });

    // Rules must be in place before the first batch is filtered.
    if !refresher.start_cancellable().await {
        return Ok(());
    }
    let refresher_handle = tokio::spawn(refresher.poll());

    let filter = Filter::new(store, metrics.clone());
    let result = filter_stdin(&filter, &cancel_token).await;

    cancel_token.cancel();
    if let Err(e) = refresher_handle.await {
        error!("RULES | refresher task failed: {e}");
    }

    match serde_json::to_string(&filter.stats(&status)) {
        Ok(stats) => info!("FILTER | final stats: {stats}"),
        Err(e) => error!("FILTER | unable to serialize stats: {e}"),
    }
    debug!("FILTER | metrics: {:?}", metrics.snapshot());

    result
}

async fn filter_stdin(filter: &Filter, cancel_token: &CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = BufWriter::new(tokio::io::stdout());

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = cancel_token.cancelled() => break,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let record: Record = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!("FILTER | skipping malformed input line: {e}");
                continue;
            }
        };
        let category = record.category;
        for point in filter.filter(&category, vec![record.point]) {
            let record = Record {
                category: category.clone(),
                point,
            };
            let mut encoded = serde_json::to_vec(&record)
                .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
            encoded.push(b'\n');
            out.write_all(&encoded).await?;
        }
    }

    out.flush().await
}

fn load_config() -> Arc<Config> {
    let config_directory = config_directory();
    match config::get_config(&config_directory) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    }
}

fn config_directory() -> PathBuf {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config-dir" {
            if let Some(dir) = args.next() {
                return PathBuf::from(dir);
            }
        } else if let Some(dir) = arg.strip_prefix("--config-dir=") {
            return PathBuf::from(dir);
        }
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn enable_logging_subsystem(config: &Arc<Config>) {
    let env_filter = format!(
        "h2=off,hyper=off,reqwest=off,rustls=off,{}",
        config.log_level.as_level_filter()
    );
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(false)
        .without_time()
        .event_format(logger::Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");
}
