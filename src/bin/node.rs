//! `meshrelief-node` — standalone demo binary.
//!
//! Boots a single gossip node, subscribes a stdout handler to
//! `disaster/help-requests`, and optionally publishes one request built from
//! CLI flags before idling until Ctrl-C. Exercises `init_node` / `start` /
//! `subscribe` / `publish` end to end without the out-of-scope REST façade.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use meshrelief_core::{
    config::NodeConfig, geo::GeoLocation, init_node, model::HelpRequest, RequestPriority,
    RequestType,
};

#[derive(Parser, Debug)]
#[command(name = "meshrelief-node", about = "Disaster-response gossip mesh node")]
struct Cli {
    /// Path to a TOML config file; CLI flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// TCP port to listen on for peer connections.
    #[arg(long)]
    port: Option<u16>,

    /// `host:port` of a peer to dial at startup; repeatable.
    #[arg(long = "bootstrap")]
    bootstrap_peers: Vec<String>,

    /// Enable the BLE transport (no-op without a platform radio wired in).
    #[arg(long)]
    enable_ble: bool,

    /// Display name advertised in discovery beacons and heartbeats.
    #[arg(long)]
    name: Option<String>,

    /// If set, publish one help request built from the flags below, then idle.
    #[arg(long)]
    publish_title: Option<String>,

    #[arg(long, default_value = "Generated from the command line")]
    publish_description: String,

    #[arg(long, value_enum, default_value = "info")]
    publish_type: CliRequestType,

    #[arg(long, value_enum, default_value = "medium")]
    publish_priority: CliRequestPriority,

    #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
    latitude: f64,

    #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
    longitude: f64,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliRequestType {
    Medical,
    Rescue,
    Shelter,
    FoodWater,
    Transport,
    Info,
}

impl From<CliRequestType> for RequestType {
    fn from(t: CliRequestType) -> Self {
        match t {
            CliRequestType::Medical => RequestType::Medical,
            CliRequestType::Rescue => RequestType::Rescue,
            CliRequestType::Shelter => RequestType::Shelter,
            CliRequestType::FoodWater => RequestType::FoodWater,
            CliRequestType::Transport => RequestType::Transport,
            CliRequestType::Info => RequestType::Info,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliRequestPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl From<CliRequestPriority> for RequestPriority {
    fn from(p: CliRequestPriority) -> Self {
        match p {
            CliRequestPriority::Low => RequestPriority::Low,
            CliRequestPriority::Medium => RequestPriority::Medium,
            CliRequestPriority::High => RequestPriority::High,
            CliRequestPriority::Critical => RequestPriority::Critical,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            NodeConfig::from_toml_str(&raw).context("parsing config file")?
        }
        None => NodeConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listen_port = port;
    }
    if cli.enable_ble {
        config.enable_ble = true;
    }
    if cli.name.is_some() {
        config.display_name = cli.name.clone();
    }
    config.bootstrap_peers.extend(cli.bootstrap_peers.clone());

    let node = init_node(None, config).await.context("starting node")?;
    tracing::info!(
        node_id = %node.identity().node_id,
        display_name = ?node.identity().display_name,
        "node started"
    );

    node.subscribe(
        "disaster/help-requests",
        Box::new(|payload| {
            println!("[help-request] {}", payload);
        }),
    )
    .await;

    if let Some(title) = cli.publish_title {
        let location = GeoLocation::new(cli.latitude, cli.longitude, None, None)
            .context("invalid --latitude/--longitude")?;
        let request = HelpRequest::new(
            cli.publish_type.into(),
            cli.publish_priority.into(),
            title,
            cli.publish_description,
            location,
            None,
            3600,
            node.identity().node_id.clone(),
        )
        .context("invalid help request")?;
        node.publish(
            "disaster/help-requests",
            serde_json::to_value(&request).context("serializing help request")?,
        )
        .await;
        tracing::info!(request_id = %request.id, "published help request");
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    node.stop().await;
    Ok(())
}
