//! `docflow`: host the document service or drive one from the command line.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod error;
mod script;

use std::collections::HashSet;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use docflow_protocol::DocumentService;
use docflow_rpc::{RpcClient, RpcServer, ServerConfig};
use docflow_service_memory::{
    DEFAULT_MAX_DOCUMENT_SIZE, DEFAULT_MAX_OPEN_DOCUMENTS, MemoryService, ServicePolicy,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use error::Error;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Host the in-memory document service over RPC
    Serve(ServeArgs),

    /// Execute a single operation and print its outcome as JSON
    Call(CallArgs),

    /// Execute a JSON script of operations in order
    Run(RunArgs),
}

#[derive(Debug, ClapArgs)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:7700", env = "DOCFLOW_LISTEN")]
    listen: SocketAddr,

    /// Only allow operations that neither change state nor write files
    #[arg(long, env = "DOCFLOW_READONLY")]
    readonly: bool,

    /// Comma-separated list of the only operations to allow
    #[arg(long, env = "DOCFLOW_ALLOW", value_delimiter = ',')]
    allow: Option<Vec<String>>,

    /// Comma-separated list of operations to refuse
    #[arg(long, env = "DOCFLOW_DENY", value_delimiter = ',')]
    deny: Vec<String>,

    /// Restrict every file path to this directory
    #[arg(long, env = "DOCFLOW_SANDBOX_ROOT")]
    sandbox_root: Option<PathBuf>,

    /// Maximum number of open documents
    #[arg(long, default_value_t = DEFAULT_MAX_OPEN_DOCUMENTS, env = "DOCFLOW_MAX_DOCUMENTS")]
    max_documents: usize,

    /// Maximum size in bytes of a document file to open
    #[arg(long, default_value_t = DEFAULT_MAX_DOCUMENT_SIZE, env = "DOCFLOW_MAX_DOCUMENT_SIZE")]
    max_document_size: u64,

    /// Author recorded on new documents
    #[arg(long, env = "DOCFLOW_AUTHOR")]
    author: Option<String>,

    /// Maximum concurrent client connections
    #[arg(long, default_value_t = 100, env = "DOCFLOW_MAX_CONNECTIONS")]
    max_connections: usize,
}

impl ServeArgs {
    fn policy(&self) -> ServicePolicy {
        let normalize = |names: &[String]| -> HashSet<String> {
            names
                .iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        };

        ServicePolicy {
            readonly: self.readonly,
            allowed_operations: self.allow.as_deref().map(normalize),
            denied_operations: normalize(&self.deny),
            sandbox_root: self.sandbox_root.clone(),
            max_open_documents: self.max_documents,
            max_document_size: self.max_document_size,
            default_author: self.author.clone(),
        }
    }
}

#[derive(Debug, ClapArgs)]
struct ClientArgs {
    /// Address of a running `docflow serve`
    #[arg(long, default_value = "127.0.0.1:7700", env = "DOCFLOW_SERVER")]
    server: SocketAddr,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30, env = "DOCFLOW_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// Times to resend a read-only operation after a transport failure
    #[arg(long, default_value_t = 0, env = "DOCFLOW_READ_RETRIES")]
    read_retries: u32,
}

impl ClientArgs {
    async fn connect(&self) -> Result<RpcClient, Error> {
        let client = RpcClient::builder()
            .request_timeout(Duration::from_secs(self.timeout_secs))
            .read_only_retries(self.read_retries)
            .connect(self.server)
            .await?;
        Ok(client)
    }
}

#[derive(Debug, ClapArgs)]
struct CallArgs {
    #[command(flatten)]
    client: ClientArgs,

    /// Operation name, e.g. `create_document`
    operation: String,

    /// Operation arguments as a JSON object
    arguments: Option<String>,
}

#[derive(Debug, ClapArgs)]
struct RunArgs {
    #[command(flatten)]
    client: ClientArgs,

    /// Script file: a JSON array of `{"name", "arguments"}` operations
    script: PathBuf,
}

async fn serve(args: ServeArgs) -> Result<(), Error> {
    let policy = args.policy();
    if policy.readonly {
        info!("Running in read-only mode");
    }
    if let Some(root) = &policy.sandbox_root {
        info!("File access restricted to {}", root.display());
    }

    let service = MemoryService::with_policy(policy);
    let server = RpcServer::new(
        service,
        ServerConfig {
            max_connections: args.max_connections,
            ..ServerConfig::default()
        },
    );

    tokio::spawn(shutdown_on_signal(server.shutdown_token()));

    server.serve(args.listen).await?;
    info!("Server stopped");
    Ok(())
}

async fn call(args: CallArgs) -> Result<(), Error> {
    let arguments = args
        .arguments
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(Error::InvalidOperation)?;
    let operation = script::parse_operation(&args.operation, arguments)?;

    let client = args.client.connect().await?;
    let result = client.execute(operation).await;
    client.shutdown();

    let outcome = result?;
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &outcome).map_err(std::io::Error::from)?;
    writeln!(stdout)?;
    Ok(())
}

async fn run(args: RunArgs) -> Result<(), Error> {
    let steps = script::load(&args.script)?;

    let client = args.client.connect().await?;
    let mut stdout = std::io::stdout();
    let result = script::run(&client, steps, &mut stdout).await;
    client.shutdown();

    result.map(|_| ())
}

async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received interrupt signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received interrupt signal");
    }

    info!("Shutting down");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Call(args) => call(args).await,
        Command::Run(args) => run(args).await,
    }
}
