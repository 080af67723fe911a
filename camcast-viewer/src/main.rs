//! camcast viewer: entry point.
//!
//! ```text
//! camcast-viewer                          Subscribe to tcp://0.0.0.0:5555
//! camcast-viewer --count 3 --show-rate    Three streams, with throughput
//! camcast-viewer --discover               Find the producer via UDP beacon
//! camcast-viewer --config <path>          Load a custom config TOML
//! camcast-viewer --write-config <path>    Write default config to a file
//! camcast-viewer --gen-config             Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camcast_core::{JpegCodec, Receiver, StreamOutcome, TcpConnector, discover, shutdown_signal};
use camcast_viewer::config::ViewerConfig;
use camcast_viewer::display::LogSink;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "camcast-viewer", about = "Receive one or more camera streams")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "camcast-viewer.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to PATH and exit.
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// IP of the publisher(s).
    #[arg(long)]
    broadcast_ip: Option<String>,

    /// Port of the first stream; stream i uses base-port + i.
    #[arg(long)]
    base_port: Option<u16>,

    /// Number of consecutive ports to subscribe to.
    #[arg(long)]
    count: Option<u16>,

    /// Seconds to wait for each stream's first frame.
    #[arg(long)]
    connect_timeout: Option<f64>,

    /// Show per-stream bytes/second.
    #[arg(long)]
    show_rate: bool,

    /// Listen for a producer beacon before subscribing.
    #[arg(long)]
    discover: bool,
}

impl Cli {
    fn apply(&self, config: &mut ViewerConfig) {
        if let Some(ip) = &self.broadcast_ip {
            config.network.broadcast_ip = ip.clone();
        }
        if let Some(port) = self.base_port {
            config.network.base_port = port;
        }
        if let Some(count) = self.count {
            config.network.count = count;
        }
        if let Some(secs) = self.connect_timeout {
            config.stream.connect_timeout_secs = secs;
        }
        config.display.show_rate |= self.show_rate;
        config.discovery.enabled |= self.discover;
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // --write-config: bootstrap a config file and exit.
    if let Some(path) = &cli.write_config {
        ViewerConfig::write_default(path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    cli.apply(&mut config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("camcast-viewer v{}", env!("CARGO_PKG_VERSION"));

    if config.discovery.enabled {
        let timeout = Duration::from_secs(config.discovery.timeout_secs);
        info!(port = config.discovery.port, ?timeout, "waiting for a broadcaster");
        match discover(config.discovery.port, timeout).await? {
            Some(endpoint) => config.network.broadcast_ip = endpoint.host().to_string(),
            None => {
                eprintln!("No broadcaster found.");
                return Ok(());
            }
        }
    }

    let stop = CancellationToken::new();
    let connector = TcpConnector::new(config.to_subscribe_options());
    let receiver = Receiver::start_with_cancel(
        config.to_receiver_config(),
        &connector,
        Arc::new(JpegCodec::new()),
        stop.clone(),
    )
    .await?;

    // Ctrl-C / SIGTERM handler.
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Stopping receivers...");
        stop.cancel();
    });

    let mut sink = LogSink::new(Duration::from_secs(config.display.summary_interval_secs.max(1)));
    let report = receiver.run(&mut sink).await;

    for stream in &report.streams {
        match &stream.outcome {
            StreamOutcome::ConnectTimeout => warn!(stream = %stream.id, "never connected"),
            StreamOutcome::Fault(e) => warn!(stream = %stream.id, "failed: {e}"),
            StreamOutcome::Stopped => info!(
                stream = %stream.id,
                frames = stream.frames,
                bytes = stream.bytes,
                decode_failures = stream.decode_failures,
                "stopped"
            ),
        }
    }
    println!("All receivers stopped");

    Ok(())
}
