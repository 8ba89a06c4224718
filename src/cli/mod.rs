//! # SPCCTL CLI
//!
//! Command-line interface for the Secret Protection Controller.
//!
//! Answers "why is this secret not going away?" and lets operators protect a
//! secret by hand.
//!
//! ## Usage
//!
//! ```bash
//! # List every resource that still references a secret
//! spcctl holders db-creds --namespace ns1
//!
//! # Show deletion state, finalizers and the controller's verdict
//! spcctl status db-creds --namespace ns1 --output yaml
//!
//! # Add the protection finalizer to an existing secret
//! spcctl protect db-creds --namespace ns1
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kube::Client;

mod holders;
mod protect;
mod status;

/// Secret Protection Controller CLI
#[derive(Parser)]
#[command(name = "spcctl")]
#[command(
    about = "Secret Protection Controller CLI",
    long_about = None,
    after_help = "\
Examples:
  spcctl holders db-creds -n ns1
  spcctl status db-creds -n ns1 -o json
  spcctl protect db-creds -n ns1
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to current context namespace)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List resources that reference a secret, per kind
    Holders {
        /// Name of the Secret
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Show the protection status of a secret
    Status {
        /// Name of the Secret
        #[arg(value_name = "NAME")]
        name: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Add the protection finalizer to a secret
    Protect {
        /// Name of the Secret
        #[arg(value_name = "NAME")]
        name: String,
    },
}

/// Output formats supported by `status`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Required for rustls 0.23+; an Err means a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spcctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
    let namespace = cli
        .namespace
        .unwrap_or_else(|| client.default_namespace().to_string());

    match cli.command {
        Commands::Holders { name } => holders::holders_command(client, name, namespace).await,
        Commands::Status { name, output } => {
            status::status_command(client, name, namespace, output).await
        }
        Commands::Protect { name } => protect::protect_command(client, name, namespace).await,
    }
}
