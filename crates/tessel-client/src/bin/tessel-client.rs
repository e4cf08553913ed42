#![forbid(unsafe_code)]

//! Tessel CLI client - one encrypted request to an attested enclave.
//!
//! Reads the request from `--message` or stdin, prints the response (or each
//! streamed chunk) to stdout.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tessel_client::{Session, SessionError, SessionOptions, WsConnector};
use tessel_common::config::{ENV_CONNECT_TIMEOUT_SECS, ENV_ENDPOINT, ENV_SERVER_PUBLIC_KEY};
use tessel_common::helpers::{env_bool, env_string};
use tessel_common::ChannelConfig;
use tessel_noise::{OsProvider, StaticPublicKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tessel-client")]
#[command(about = "Send a request over a Noise NK channel to an attested enclave")]
struct Args {
    /// JSON channel config; flags and TESSEL_* variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// WebSocket endpoint (ws:// or wss://)
    #[arg(long, env = "TESSEL_ENDPOINT")]
    endpoint: Option<String>,

    /// Attested server static key, base64 or hex
    #[arg(long, env = "TESSEL_SERVER_PUBLIC_KEY")]
    server_key: Option<String>,

    /// Seconds to wait for the transport to become ready
    #[arg(long, env = "TESSEL_CONNECT_TIMEOUT_SECS")]
    connect_timeout_secs: Option<u64>,

    /// Request body; read from stdin when absent
    #[arg(long)]
    message: Option<String>,

    /// Print each response chunk until the end-of-stream marker
    #[arg(long, default_value_t = false)]
    stream: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Config file, then flags, then `TESSEL_*` variables not already read by clap.
fn load_config(args: &Args) -> Result<ChannelConfig> {
    let path = args.config.as_deref();
    ChannelConfig::load(path, |name| {
        let flag = match name {
            ENV_ENDPOINT => args.endpoint.clone(),
            ENV_SERVER_PUBLIC_KEY => args.server_key.clone(),
            ENV_CONNECT_TIMEOUT_SECS => args.connect_timeout_secs.map(|s| s.to_string()),
            _ => None,
        };
        flag.or_else(|| env_string(name))
    })
    .with_context(|| match path {
        Some(path) => format!("loading config {}", path.display()),
        None => "loading config".to_string(),
    })
}

async fn read_request(args: &Args) -> Result<Vec<u8>> {
    if let Some(message) = &args.message {
        return Ok(message.as_bytes().to_vec());
    }
    let mut buf = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut buf)
        .await
        .context("reading request from stdin")?;
    Ok(buf)
}

async fn run(
    config: &ChannelConfig,
    server_key: &StaticPublicKey,
    request: &[u8],
    stream: bool,
) -> Result<(), SessionError> {
    let connector = WsConnector::new(config.endpoint.clone(), config.max_message_size);

    let mut session =
        Session::connect(&connector, server_key, &OsProvider, SessionOptions::from(config)).await?;
    info!(endpoint = %connector.url(), "connected");

    let mut stdout = tokio::io::stdout();
    let result = if stream {
        stream_response(&mut session, request, &mut stdout).await
    } else {
        match session.send_and_receive(request).await {
            Ok(response) => {
                write_out(&mut stdout, &response).await;
                Ok(())
            }
            Err(err) => Err(err),
        }
    };

    session.close().await;
    result
}

async fn stream_response<T: tessel_client::Transport>(
    session: &mut Session<T>,
    request: &[u8],
    stdout: &mut tokio::io::Stdout,
) -> Result<(), SessionError> {
    let mut chunks = session.send_and_stream(request).await?;
    while let Some(chunk) = chunks.next().await {
        write_out(stdout, &chunk?).await;
    }
    Ok(())
}

/// A broken stdout is not a channel failure, so it is only logged.
async fn write_out(stdout: &mut tokio::io::Stdout, bytes: &[u8]) {
    if let Err(err) = stdout.write_all(bytes).await {
        error!(error = %err, "failed to write response");
    }
    if let Err(err) = stdout.flush().await {
        error!(error = %err, "failed to flush stdout");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tessel_common::init_tracing_with_default(&args.log_level);

    let config = load_config(&args)?;
    let server_key = StaticPublicKey::parse(&config.server_public_key)
        .context("invalid server public key")?;
    let request = read_request(&args).await?;
    let stream = args.stream || env_bool("TESSEL_STREAM", false);

    info!("Starting tessel-client v{}", env!("CARGO_PKG_VERSION"));

    if let Err(err) = run(&config, &server_key, &request, stream).await {
        error!(kind = ?err.kind(), error = %err, "request failed");
        return Err(anyhow!(err.user_message()));
    }
    Ok(())
}
