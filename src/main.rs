use anyhow::{Context, Result};
use clap::Parser;
use event_bridge::kafka::{KafkaConnectionFactory, KafkaProducerBuilder};
use event_bridge::monitor::TracingMonitor;
use event_bridge::unit_of_work::DefaultUnitOfWork;
use event_bridge::{Config, DefaultMessageConverter, EventDispatcher, EventEnvelope, PublisherFactory};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "event-bridge")]
#[command(about = "Publishes JSON-lines event envelopes to Kafka", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(short, long, value_name = "FILE", help = "Envelope file, one JSON object per line (stdin if omitted)")]
    input: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct Summary {
    published: usize,
    failed: usize,
    skipped: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting event-bridge");
    info!("Loading configuration from {:?}", args.config);

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;

    info!(
        kafka_brokers = ?config.kafka.brokers,
        client_id = %config.kafka.client_id,
        default_destination = %config.publisher.default_destination,
        confirmation_mode = %config.publisher.confirmation_mode,
        pool_capacity = config.publisher.pool_capacity,
        "Configuration summary"
    );

    let factory = Arc::new(PublisherFactory::new(
        config.factory_config(),
        KafkaConnectionFactory::new(config.kafka.clone()),
        KafkaProducerBuilder::new(),
    )?);
    let dispatcher = EventDispatcher::new(
        config.dispatcher_config(),
        factory,
        DefaultMessageConverter::default(),
        TracingMonitor,
    )?;

    let outcome = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {:?}", path))?;
            publish_lines(&dispatcher, BufReader::new(file)).await
        }
        None => publish_lines(&dispatcher, BufReader::new(tokio::io::stdin())).await,
    };

    dispatcher.shut_down().await;

    let summary = outcome?;
    info!(
        published = summary.published,
        failed = summary.failed,
        skipped = summary.skipped,
        "Finished publishing"
    );

    if summary.failed > 0 {
        anyhow::bail!("{} events could not be published", summary.failed);
    }
    Ok(())
}

async fn publish_lines<R>(
    dispatcher: &EventDispatcher<KafkaConnectionFactory, KafkaProducerBuilder>,
    reader: R,
) -> Result<Summary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = Summary::default();
    let mut lines = reader.lines();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await.context("failed to read envelopes")? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let envelope: EventEnvelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Skipping line {}: {}", line_number, e);
                summary.skipped += 1;
                continue;
            }
        };

        let unit_of_work = DefaultUnitOfWork::new();
        match dispatcher.send(&envelope, &unit_of_work).await {
            Ok(()) => {
                unit_of_work.commit().await;
                summary.published += 1;
            }
            Err(e) => {
                error!("Failed to publish event {}: {}", envelope.identifier, e);
                unit_of_work.rollback().await;
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("event_bridge=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("event_bridge=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
