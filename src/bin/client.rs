//! TCP Chat Client
//!
//! A plain pipe: stdin lines go to the server, server bytes go to stdout
//! as they arrive. Exits when either side closes.

use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tcpchat-client")]
#[command(about = "Connect to a tcpchat server", long_about = None)]
struct Args {
    /// Server address, e.g. 127.0.0.1:8989
    addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let stream = TcpStream::connect(&args.addr).await?;
    info!("Connected to {}", args.addr);

    let (mut server_reader, mut server_writer) = stream.into_split();

    // Server -> stdout
    let mut inbound = tokio::spawn(async move {
        let mut stdout = io::stdout();
        io::copy(&mut server_reader, &mut stdout).await
    });

    // Stdin -> server, one line at a time
    let mut stdin_lines = BufReader::new(io::stdin()).lines();
    loop {
        tokio::select! {
            copied = &mut inbound => {
                log_inbound(copied);
                eprintln!("Disconnected from server.");
                return Ok(());
            }
            line = stdin_lines.next_line() => {
                let Some(line) = line? else { break };
                server_writer.write_all(format!("{}\n", line).as_bytes()).await?;
            }
        }
    }

    // Stdin closed: half-close and let the server finish talking
    server_writer.shutdown().await?;
    log_inbound(inbound.await);
    Ok(())
}

fn log_inbound(copied: Result<io::Result<u64>, JoinError>) {
    match copied {
        Ok(Ok(bytes)) => debug!("Server closed after {} bytes", bytes),
        Ok(Err(e)) => debug!("Read from server failed: {}", e),
        Err(e) => debug!("Inbound task failed: {}", e),
    }
}
