use clap::Parser;
use log::info;
use server::authority::AuthorityConfig;
use server::network::Server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Inventory capacity per client
    #[arg(short, long, default_value = "250")]
    capacity: u32,

    /// Items placed in a new client's inventory
    #[arg(short, long, default_value = "40")]
    items: u32,

    /// Probability of rejecting a valid mutation
    #[arg(short, long, default_value = "0.0")]
    reject_rate: f64,

    /// Only answer failed mutations
    #[arg(long)]
    silent_success: bool,

    /// Seed for item generation
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = AuthorityConfig {
        inventory_capacity: args.capacity,
        starting_items: args.items,
        reject_rate: args.reject_rate,
        silent_success: args.silent_success,
        seed: args.seed,
        ..AuthorityConfig::default()
    };

    if config.reject_rate > 0.0 {
        info!("Rejecting {:.0}% of valid mutations", config.reject_rate * 100.0);
    }
    if config.silent_success {
        info!("Silent success mode: only failures are answered");
    }

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, args.max_clients, config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
