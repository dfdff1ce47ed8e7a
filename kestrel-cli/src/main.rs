//! Commits consumer-group offsets from the command line.
//!
//! ```bash
//! kestrel-commit --bootstrap localhost:9092 --group test-group \
//!     --generation 1 --member member-1 \
//!     --offset test-topic:0:100:test-metadata --offset test-topic:1:250
//! ```
//!
//! Prints one line per partition. Exits non-zero if the request fails or
//! any partition is rejected.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use kestrel_client::{CallContext, ClientConfig, OffsetCommitClient};
use kestrel_core::{BrokerEndpoint, CommitRequest, PartitionOffset};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Commit consumer-group offsets to the group coordinator.
#[derive(Parser, Debug)]
#[command(name = "kestrel-commit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bootstrap broker in format `host:port`.
    /// Can be specified multiple times; brokers are tried in order.
    #[arg(long = "bootstrap", value_parser = parse_broker, required = true)]
    bootstrap: Vec<BrokerEndpoint>,

    /// Consumer group id.
    #[arg(long)]
    group: String,

    /// Group generation id (-1 for a commit outside any generation).
    #[arg(long, default_value = "-1", allow_negative_numbers = true)]
    generation: i32,

    /// Member id assigned by the coordinator.
    #[arg(long, default_value = "")]
    member: String,

    /// Static membership instance id.
    #[arg(long)]
    instance: Option<String>,

    /// Client id sent to the broker.
    #[arg(long, default_value = "kestrel-commit")]
    client_id: String,

    /// Overall timeout for the commit in milliseconds.
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: Level,

    /// Offset in format `topic:partition:offset[:metadata]`.
    /// Can be specified multiple times.
    #[arg(long = "offset", value_parser = parse_offset, required = true)]
    offsets: Vec<OffsetSpec>,
}

/// One offset to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OffsetSpec {
    /// Topic name.
    topic: String,
    /// Partition and offset.
    offset: PartitionOffset,
}

fn parse_broker(s: &str) -> Result<BrokerEndpoint, String> {
    BrokerEndpoint::parse(s).map_err(|e| e.to_string())
}

/// Parses `topic:partition:offset[:metadata]`. Metadata may contain `:`.
fn parse_offset(s: &str) -> Result<OffsetSpec, String> {
    let parts: Vec<&str> = s.splitn(4, ':').collect();
    if parts.len() < 3 {
        return Err(format!(
            "invalid offset format '{s}', expected 'topic:partition:offset[:metadata]'"
        ));
    }

    let topic = parts[0].to_string();
    if topic.is_empty() {
        return Err("topic name cannot be empty".to_string());
    }

    let partition: i32 = parts[1]
        .parse()
        .map_err(|_| format!("invalid partition '{}' in '{s}'", parts[1]))?;
    let offset: i64 = parts[2]
        .parse()
        .map_err(|_| format!("invalid offset '{}' in '{s}'", parts[2]))?;

    let mut offset = PartitionOffset::new(partition, offset);
    if let Some(metadata) = parts.get(3) {
        offset = offset.with_metadata(*metadata);
    }

    Ok(OffsetSpec { topic, offset })
}

fn build_request(args: &Args) -> kestrel_core::CommitResult<CommitRequest> {
    let mut builder = CommitRequest::builder(args.group.clone())
        .generation_id(args.generation)
        .member_id(args.member.clone());
    if let Some(instance) = &args.instance {
        builder = builder.instance_id(instance.clone());
    }
    for spec in &args.offsets {
        builder = builder.offset(spec.topic.clone(), spec.offset.clone());
    }
    builder.build()
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the per-partition results.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let timeout = Duration::from_millis(args.timeout_ms);
    let config = ClientConfig::new(args.bootstrap.clone())
        .with_client_id(args.client_id.clone())
        .with_request_timeout(timeout);
    let client = OffsetCommitClient::new(config)?;
    let request = build_request(&args)?;

    info!(
        group_id = %request.group_id,
        partitions = request.partition_count(),
        "Committing offsets"
    );

    let ctx = CallContext::background().with_timeout(timeout);
    let response = client.set_consumer_group_offset(&ctx, &request).await?;

    for (topic, results) in &response.topics {
        for result in results {
            match result.error {
                None => println!("{topic}:{} committed", result.partition),
                Some(error) => println!("{topic}:{} failed: {error}", result.partition),
            }
        }
    }
    if !response.throttle.is_zero() {
        println!("throttled for {}ms", response.throttle.as_millis());
    }

    Ok(if response.all_committed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
