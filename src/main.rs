use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::num::NonZeroUsize;
use std::process::ExitCode;
use udslink::config::{DEFAULT_SOCKET_PATH, TransportConfig, expand_socket_path};
use udslink::transport::{DEFAULT_CHUNK_SIZE, ReadOutcome, SocketTransport, TransportError};

#[derive(Parser)]
#[command(name = "udslink")]
#[command(about = "Send bytes over a Unix-domain stream socket")]
#[command(version = "0.1.0")]
struct Cli {
    /// Log transport activity to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream stdin to the socket, then print the reply until end-of-stream
    Send {
        /// Unix socket path
        #[arg(long, env = "UDSLINK_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,

        /// Largest number of bytes per read or write syscall
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: NonZeroUsize,

        /// Connect attempts while the socket path does not exist yet
        #[arg(long, default_value = "1")]
        attempts: u32,
    },

    /// Check whether anything is listening on the socket
    Probe {
        /// Unix socket path
        #[arg(long, env = "UDSLINK_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum ProbeStatus {
    Listening,
    NotFound,
    Error,
}

impl ProbeStatus {
    fn exit_code(self) -> ExitCode {
        match self {
            ProbeStatus::Listening => ExitCode::SUCCESS,
            ProbeStatus::Error => ExitCode::from(1),
            ProbeStatus::NotFound => ExitCode::from(2),
        }
    }
}

#[derive(Serialize, Debug)]
struct ProbeReport {
    socket_path: String,
    status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ProbeReport {
    fn from_result(socket_path: String, result: udslink::transport::Result<SocketTransport>) -> Self {
        let (status, detail) = match result {
            Ok(transport) => {
                transport.close();
                (ProbeStatus::Listening, None)
            }
            Err(TransportError::NotFound) => (ProbeStatus::NotFound, None),
            Err(e) => (ProbeStatus::Error, Some(e.to_string())),
        };
        Self {
            socket_path,
            status,
            detail,
        }
    }

    fn render(&self, format: &OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
            OutputFormat::Text => match (&self.status, &self.detail) {
                (ProbeStatus::Listening, _) => format!("{}: listening", self.socket_path),
                (ProbeStatus::NotFound, _) => format!("{}: not found", self.socket_path),
                (ProbeStatus::Error, detail) => format!(
                    "{}: error: {}",
                    self.socket_path,
                    detail.as_deref().unwrap_or("unknown")
                ),
            },
        })
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "udslink=debug" } else { "udslink=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn send(socket_path: &str, config: &TransportConfig) -> Result<()> {
    let transport = SocketTransport::connect_with_backoff(socket_path, config)
        .with_context(|| format!("Failed to connect to {}", socket_path))?;

    let mut buf = vec![0u8; config.chunk_size.get()];
    let mut stdin = io::stdin().lock();
    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read stdin"),
        };
        transport.write(&buf[..n]).context("Failed to send")?;
    }
    transport
        .shutdown_write()
        .context("Failed to half-close socket")?;

    let mut stdout = io::stdout().lock();
    loop {
        match transport.read(&mut buf).context("Failed to receive")? {
            ReadOutcome::Data(n) => stdout.write_all(&buf[..n])?,
            ReadOutcome::EndOfStream => break,
        }
    }
    stdout.flush()?;

    transport.close();
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Send {
            socket_path,
            chunk_size,
            attempts,
        } => {
            let expanded_socket_path = expand_socket_path(&socket_path);
            let config = TransportConfig::default()
                .with_chunk_size(chunk_size)
                .with_connect_attempts(attempts);

            send(&expanded_socket_path, &config)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Probe {
            socket_path,
            format,
        } => {
            let expanded_socket_path = expand_socket_path(&socket_path);
            let result =
                SocketTransport::connect_to(&expanded_socket_path, &TransportConfig::default());
            let report = ProbeReport::from_result(expanded_socket_path, result);

            println!("{}", report.render(&format)?);
            Ok(report.status.exit_code())
        }
    }
}
