//! Interactive command-line client for the secret-word game
//!
//! Reads terminal lines and ships each one as a protocol message carrying the
//! configured display name; everything received from the server is printed as
//! `<username>: <body>`. Typing `quit` (or closing stdin) leaves the game.

use clap::Parser;
use log::info;
use shared::{read_message, write_message, Message, QUIT_COMMAND};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to connect to
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Display name sent with every message
    #[clap(short, long, default_value = "anonymous")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {}", args.server);

    let (mut read_half, mut write_half) = stream.into_split();

    // Print everything the server sends until it closes the stream.
    let mut printer = tokio::spawn(async move {
        while let Ok(message) = read_message(&mut read_half).await {
            println!("{}: {}", message.username, message.body);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                // Stdin closing counts as quitting.
                let body = line?.unwrap_or_else(|| QUIT_COMMAND.to_string());
                write_message(&mut write_half, &Message::new(&args.name, &body)).await?;
                if body == QUIT_COMMAND {
                    break;
                }
            }
            _ = &mut printer => {
                eprintln!("Server closed the connection");
                return Ok(());
            }
        }
    }

    printer.abort();
    Ok(())
}
