use clap::Parser;
use log::info;
use server::network::Server;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on (0 picks a free port)
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Maximum number of connected players
    #[clap(short, long, default_value = "16")]
    max_players: usize,
    /// Yes/No questions answered per round before guessing opens
    #[clap(short, long, default_value = "1")]
    questions: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, args.max_players, args.questions).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            result?;
            info!("Game finished; server exiting");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
