//! camcast streamer: entry point.
//!
//! ```text
//! camcast-streamer                         One camera on port 5555
//! camcast-streamer --camera-ids 0 1 2      Three cameras on 5555..=5557
//! camcast-streamer --beacon                Announce the first endpoint over UDP
//! camcast-streamer --config <path>         Load a custom config TOML
//! camcast-streamer --write-config <path>   Write default config to a file
//! camcast-streamer --gen-config            Write default config to stdout
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camcast_core::discovery::{Beacon, local_ip};
use camcast_core::{Endpoint, StreamPublisher, shutdown_signal};
use camcast_streamer::config::StreamerConfig;
use camcast_streamer::source::TestPattern;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "camcast-streamer", about = "Stream one or more cameras over TCP pub/sub")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "camcast-streamer.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to PATH and exit.
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Port of the first camera; camera i uses base-port + i.
    #[arg(long)]
    base_port: Option<u16>,

    /// Camera ids to stream (example: --camera-ids 0 1 2).
    #[arg(long, num_args = 1..)]
    camera_ids: Option<Vec<u32>>,

    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// JPEG quality, 1..=100.
    #[arg(long)]
    quality: Option<u8>,

    /// Announce the first camera's endpoint on the discovery port.
    #[arg(long)]
    beacon: bool,
}

impl Cli {
    fn apply(&self, config: &mut StreamerConfig) {
        if let Some(port) = self.base_port {
            config.network.base_port = port;
        }
        if let Some(ids) = &self.camera_ids {
            config.camera.camera_ids = ids.clone();
        }
        if let Some(fps) = self.fps {
            config.camera.fps = fps;
        }
        if let Some(quality) = self.quality {
            config.camera.jpeg_quality = quality;
        }
        config.beacon.enabled |= self.beacon;
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&StreamerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // --write-config: bootstrap a config file and exit.
    if let Some(path) = &cli.write_config {
        StreamerConfig::write_default(path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let mut config = StreamerConfig::load(&cli.config);
    cli.apply(&mut config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("camcast-streamer v{}", env!("CARGO_PKG_VERSION"));

    let bind_ip: IpAddr = config.network.bind_ip.parse()?;
    let publisher_config = config.to_publisher_config();
    let cancel = CancellationToken::new();
    let tasks = TaskTracker::new();

    for (camera_id, port) in config.assignments() {
        let source = TestPattern::new(camera_id, config.camera.width, config.camera.height)
            .with_dropout(config.camera.dropout_every);
        let publisher = StreamPublisher::bind(
            SocketAddr::new(bind_ip, port),
            Box::new(source),
            publisher_config.clone(),
        )
        .await?;
        tasks.spawn(publisher.run(cancel.child_token()));
        info!("Started camera {camera_id} on port {port}");
    }

    if config.beacon.enabled {
        let first_port = config.network.base_port;
        let advertised = local_ip().await;
        let target_ip = if config.beacon.target_ip.is_empty() {
            IpAddr::V4(Ipv4Addr::BROADCAST)
        } else {
            config.beacon.target_ip.parse()?
        };
        let target = SocketAddr::new(target_ip, config.beacon.port);
        let rounds = config.beacon.rounds;
        let interval = Duration::from_millis(config.beacon.interval_ms);
        let beacon_cancel = cancel.child_token();

        tasks.spawn(async move {
            let endpoint = Endpoint::new(advertised.to_string(), first_port);
            let announced = match Beacon::bind().await {
                Ok(beacon) => {
                    beacon
                        .announce(&endpoint, target, rounds, interval, &beacon_cancel)
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = announced {
                warn!("discovery beacon failed: {e}");
            }
        });
    }
    tasks.close();

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Stopping streams...");
            cancel.cancel();
        }
        _ = tasks.wait() => {}
    }
    tasks.wait().await;

    println!("All streams stopped");
    Ok(())
}
