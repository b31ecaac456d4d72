//! CK node inspector
//!
//! Builds the node registry the same way a host would and prints what it
//! contains.
//!
//! # Usage
//!
//! ```bash
//! # List registered node types
//! ck-node-inspect list
//!
//! # Export every schema, or one node's schema, as JSON
//! ck-node-inspect schema
//! ck-node-inspect schema --node TextLineCount
//!
//! # Print the network diagnostics report
//! ck-node-inspect --config ck-host.toml net-report
//! ```

use anyhow::{Context, Result};
use ck_nodes_core::nodes::network::get_network_diagnostics;
use ck_nodes_core::{register_core_nodes, HostConfig, NetworkConfig, NodeContext, NodeRegistry, NodeRegistryBuilder};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// CK node inspector - list nodes, export schemas, check the network setup
#[derive(Parser)]
#[command(name = "ck-node-inspect")]
#[command(author, version)]
#[command(about = "Inspect the CK node registry")]
struct Args {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Host configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered node types with their display names
    List,

    /// Export node schemas as JSON
    Schema {
        /// Only export this node type
        #[arg(short, long)]
        node: Option<String>,
    },

    /// Print the network diagnostics report
    NetReport,
}

fn build_registry(ctx: &NodeContext) -> NodeRegistry {
    let mut builder = NodeRegistryBuilder::new();
    register_core_nodes(&mut builder, ctx);
    ck_nodes_api::register_api_nodes(&mut builder, ctx);
    ck_nodes_vlm::register_vlm_nodes(&mut builder, ctx, None);

    for unit in builder.failed_units() {
        tracing::warn!(unit = %unit, "Registration unit failed, its nodes are unavailable");
    }
    builder.build()
}

fn list(registry: &NodeRegistry) {
    for node_type in registry.list_types() {
        let display = registry.display_name(&node_type).unwrap_or(&node_type);
        println!("{:<28} {}", node_type, display);
    }
}

fn schema(registry: &NodeRegistry, node: Option<&str>) -> Result<()> {
    let json = match node {
        Some(node_type) => {
            let schema = registry
                .schema(node_type)
                .with_context(|| format!("Unknown node type '{}'", node_type))?;
            serde_json::to_string_pretty(&schema)?
        }
        None => serde_json::to_string_pretty(&registry.schemas())?,
    };
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let host = HostConfig::load(args.config.as_deref()).context("Failed to load host configuration")?;
    tracing::debug!(output_dir = %host.output_dir.display(), models_dir = %host.models_dir.display(), "Host configuration");
    let ctx = NodeContext::new(host, NetworkConfig::from_env());
    let registry = build_registry(&ctx);
    tracing::info!(nodes = registry.len(), "Registry ready");

    match args.command {
        Command::List => list(&registry),
        Command::Schema { node } => schema(&registry, node.as_deref())?,
        Command::NetReport => println!("{}", get_network_diagnostics(&ctx.network).await),
    }

    Ok(())
}
