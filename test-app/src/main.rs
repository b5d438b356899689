// emberlib test application -- CLI for browsing the element tree of an
// Ember+ provider.
//
// Usage:
//   emberlib-test-app --host 192.168.1.40 --port 9000 root
//   emberlib-test-app --host 192.168.1.40 --port 9000 dir --path 1.3
//   emberlib-test-app --host 192.168.1.40 --port 9000 dir --path 1.3 --kind parameter
//   emberlib-test-app --host 192.168.1.40 --port 9000 --compact root
//
// Logging is controlled through RUST_LOG, e.g.:
//   RUST_LOG=emberlib=debug emberlib-test-app --host ... root

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use emberlib::{Consumer, ConsumerOptions, ElementKind};

/// emberlib test application -- sends directory requests to a provider
/// and prints the decoded tree as JSON.
#[derive(Parser)]
#[command(name = "emberlib-test-app", version, about)]
struct Cli {
    /// Provider host name or IP address.
    #[arg(long)]
    host: String,

    /// Provider TCP port.
    #[arg(long, default_value_t = 9000)]
    port: u16,

    /// Response timeout in seconds.
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Print compact JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the immediate children of the provider's root.
    Root,

    /// List the children of the element at a dotted-decimal path.
    Dir {
        /// Dotted-decimal path, e.g. "1.3".
        #[arg(long)]
        path: String,

        /// Element kind at that path.
        #[arg(long, value_enum, default_value_t = KindArg::Node)]
        kind: KindArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Node,
    Parameter,
    Function,
}

impl std::fmt::Display for KindArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            KindArg::Node => "node",
            KindArg::Parameter => "parameter",
            KindArg::Function => "function",
        })
    }
}

impl From<KindArg> for ElementKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Node => ElementKind::QualifiedNode,
            KindArg::Parameter => ElementKind::QualifiedParameter,
            KindArg::Function => ElementKind::Function,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let options = ConsumerOptions {
        response_timeout: Duration::from_secs(cli.timeout),
    };
    let mut consumer = Consumer::connect_with_options(&cli.host, cli.port, options)
        .await
        .with_context(|| format!("failed to connect to {}:{}", cli.host, cli.port))?;

    let collection = match &cli.command {
        Command::Root => consumer.get_root().await.context("root request failed")?,
        Command::Dir { path, kind } => consumer
            .get_directory((*kind).into(), path)
            .await
            .with_context(|| format!("directory request for {path} failed"))?,
    };

    let json = collection.serialise();
    let rendered = if cli.compact {
        serde_json::to_string(&json)?
    } else {
        serde_json::to_string_pretty(&json)?
    };
    println!("{rendered}");

    consumer.close().await.ok();
    Ok(())
}
