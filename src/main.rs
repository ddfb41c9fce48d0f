//! mjpeg-server: stream a capture device to browsers as MJPEG

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mjpeg_rs::broadcast::FrameBuffer;
use mjpeg_rs::capture::{JpegFrameEncoder, Producer, ProducerConfig, TestPattern};
use mjpeg_rs::launch::LaunchConfig;
use mjpeg_rs::server::{MjpegServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "mjpeg-server", version, about = "Serve a live MJPEG stream over HTTP")]
struct Cli {
    /// Capture device index (used only together with ADDR)
    device: Option<String>,

    /// Listen address, host:port (used only together with DEVICE)
    addr: Option<String>,

    /// Maximum concurrent connections, 0 for unlimited
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Serve the stream only on this path instead of every path
    #[arg(long)]
    path: Option<String>,

    /// Send an empty part after this many idle seconds
    #[arg(long)]
    keepalive_secs: Option<u64>,

    /// Frame width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Capture rate in frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// JPEG quality, 1 to 100
    #[arg(long, default_value_t = 80)]
    quality: u8,

    /// Stop capturing after this many consecutive encode failures
    #[arg(long)]
    max_encode_failures: Option<u32>,
}

#[tokio::main]
async fn main() -> mjpeg_rs::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let launch = LaunchConfig::from_env(cli.device.as_deref(), cli.addr.as_deref());
    let bind_addr = launch.bind_addr().await?;

    let mut config = ServerConfig::with_addr(bind_addr).max_connections(cli.max_connections);
    if let Some(path) = cli.path {
        config = config.stream_path(path);
    }
    if let Some(secs) = cli.keepalive_secs.filter(|s| *s > 0) {
        config = config.keepalive_interval(Duration::from_secs(secs));
    }

    let buffer = Arc::new(FrameBuffer::new());
    let server = MjpegServer::new(config, Arc::clone(&buffer));

    // Bind before capturing so a bad address fails fast
    let listener = server.bind().await?;
    let local_addr = listener.local_addr()?;

    let shutdown = CancellationToken::new();

    let mut producer_config = ProducerConfig::default();
    if let Some(max) = cli.max_encode_failures {
        producer_config = producer_config.max_consecutive_encode_failures(max);
    }
    let source = TestPattern::new(launch.device, cli.width, cli.height, cli.fps);
    let producer = Producer::with_config(
        source,
        JpegFrameEncoder::new(cli.quality),
        Arc::clone(&buffer),
        producer_config,
    )
    .spawn(shutdown.clone());

    tracing::info!(
        device = launch.device,
        addr = %local_addr,
        "Capturing. Point your browser to http://{}",
        local_addr
    );

    let signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupted, shutting down");
                shutdown.cancel();
            }
            Err(e) => {
                tracing::error!(error = %e, "Unable to listen for shutdown signal");
            }
        }
    };

    let (served, ()) = tokio::join!(server.serve(listener, shutdown.clone()), signal);

    match producer.await {
        Ok(report) => tracing::info!(report = ?report, "Producer stopped"),
        Err(e) => tracing::error!(error = %e, "Producer task failed"),
    }

    served
}
