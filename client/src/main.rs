use clap::{Parser, ValueEnum};
use client::network::Client;
use client::policy::{OverlapPolicy, SyncConfig, SyncPolicy};
use log::{info, warn};
use shared::DEFAULT_BATCH_WIDTH;
use std::time::Duration;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    /// Apply locally, roll back on rejection
    Optimistic,
    /// Apply only after the server confirms
    WaitAck,
    /// Apply locally, server only answers failures
    FailureOnly,
}

impl From<PolicyArg> for SyncPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Optimistic => SyncPolicy::Optimistic,
            PolicyArg::WaitAck => SyncPolicy::WaitServerAck,
            PolicyArg::FailureOnly => SyncPolicy::ServerOnlySendsOnFailure,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// When local mutations become visible
    #[arg(short = 'p', long, value_enum, default_value = "optimistic")]
    policy: PolicyArg,

    /// Slots requested per backfill window
    #[arg(short = 'b', long, default_value_t = DEFAULT_BATCH_WIDTH)]
    batch_width: u32,

    /// Settle unanswered requests after this many milliseconds
    #[arg(long)]
    pending_timeout_ms: Option<u64>,

    /// Refuse mutations touching a slot with a pending request
    #[arg(long)]
    refuse_overlap: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = SyncConfig {
        policy: args.policy.into(),
        batch_width: args.batch_width,
        pending_timeout: args.pending_timeout_ms.map(Duration::from_millis),
        overlap: if args.refuse_overlap {
            OverlapPolicy::Refuse
        } else {
            OverlapPolicy::Allow
        },
    };

    if config.overlap != config.enforced_overlap() {
        warn!("--refuse-overlap needs --pending-timeout-ms under the failure-only policy, ignoring it");
    }

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Sync policy: {:?}", config.policy);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    println!("Type 'help' for commands");

    let mut client = Client::new(&args.server, args.fake_ping, config).await?;

    client.run().await?;

    Ok(())
}
