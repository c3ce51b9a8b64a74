use clap::Parser;
use signal_client::{logger, Client, ClientConfig, ClientEvent, HandshakeState, Payload};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Connect to a signaling server, print inbound messages and send stdin lines.
#[derive(Parser, Debug)]
#[command(name = "signal-client", version)]
struct Args {
    /// Signaling server, host:port or base url
    #[arg(short, long, env = "SIGNAL_ADDRESS")]
    address: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `info` or `signal_client=debug`
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> signal_client::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(address) = &args.address {
        config.address = address.clone();
    }
    if let Some(level) = &args.log_level {
        config.log.enabled = true;
        config.log.level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("signal-client: {e}");
            return ExitCode::FAILURE;
        }
    };
    logger::init(&config.log);

    let (client, mut events) = match Client::new(&config) {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("signal-client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let connector = client.clone();
    tokio::spawn(async move { connector.connect().await });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Connected) => eprintln!("connected"),
                Some(ClientEvent::Data(Payload::Text(text))) => println!("{text}"),
                Some(ClientEvent::Data(Payload::Binary(bytes))) => {
                    println!("<{} bytes>", bytes.len())
                }
                Some(ClientEvent::Closed) => return ExitCode::SUCCESS,
                Some(ClientEvent::Error(e)) => {
                    eprintln!("signal-client: {e}");
                    if client.state() == HandshakeState::Idle {
                        return ExitCode::FAILURE;
                    }
                }
                None => return ExitCode::FAILURE,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => client.send(line).await,
                Ok(None) | Err(_) => {
                    stdin_open = false;
                    client.stop().await;
                }
            },
            _ = tokio::signal::ctrl_c() => client.stop().await,
        }
    }
}
