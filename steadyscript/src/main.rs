//! Binary entrypoint: wires C1-C9 together and serves the HTTP/duplex
//! surface on `--port` (default 7878).
//!
//! Grounded on the teacher's `strand-cam` binary (`env_tracing_logger::init()`
//! then `run_app`) and the workspace's several `#[tokio::main]` binaries
//! for the async entrypoint shape.

use std::sync::Arc;

use clap::Parser;
use parking_lot::RwLock;

use steadyscript::config::{Cli, Config};
use steadyscript::error::Error;
use steadyscript::frame::{SyntheticFrameSource, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use steadyscript::led::{LedGateway, NoopGateway};
use steadyscript::pipeline::{self, PipelineHandle};
use steadyscript::store::SessionStore;
use steadyscript::stream;

const EVENT_BUS_CAPACITY: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_tracing_logger::init();

    let cli = Cli::parse();
    let config = Config::from_env().apply_cli(&cli);

    tracing::info!(camera_index = config.camera_index, port = config.port, "starting steadyscript");

    let frame_source = open_frame_source(&config)?;
    let led_gateway = open_led_gateway(&config);

    let store = Arc::new(SessionStore::new(config.sessions_file.clone()));
    let (events_tx, _) = tokio::sync::broadcast::channel(EVENT_BUS_CAPACITY);
    let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();

    let persistence_events = events_tx.clone();

    let handle = Arc::new(PipelineHandle {
        events: events_tx,
        commands: command_tx,
        latest_metrics: Arc::new(RwLock::new(None)),
        latest_frame: Arc::new(RwLock::new(None)),
        store: store.clone(),
    });

    let frame_rx = pipeline::spawn_capture_thread(frame_source);
    let persistence_tx = pipeline::spawn_persistence_task(store, persistence_events);
    let led_tx = pipeline::spawn_led_task(led_gateway);

    let tick_handle = handle.clone();
    let tick_config = config.clone();
    tokio::spawn(async move {
        pipeline::run_tick_loop(tick_config, frame_rx, command_rx, tick_handle, persistence_tx, led_tx)
            .await;
    });

    let app = stream::router(handle);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Opens the configured capture backend. `DeviceUnavailable` is fatal at
/// startup (spec.md §7): the process exits with a non-zero code.
#[cfg(feature = "camera-v4l2")]
fn open_frame_source(config: &Config) -> anyhow::Result<Box<dyn steadyscript::frame::FrameSource>> {
    match steadyscript::frame::v4l2::V4l2FrameSource::open(config.camera_index) {
        Ok(src) => Ok(Box::new(src)),
        Err(Error::DeviceUnavailable(msg)) => {
            tracing::error!("camera unavailable: {msg}");
            anyhow::bail!("camera unavailable: {msg}")
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(feature = "camera-v4l2"))]
fn open_frame_source(_config: &Config) -> anyhow::Result<Box<dyn steadyscript::frame::FrameSource>> {
    tracing::warn!("camera-v4l2 feature disabled; using a synthetic frame source");
    Ok(Box::new(SyntheticFrameSource::new(
        DEFAULT_WIDTH,
        DEFAULT_HEIGHT,
        (0, 255, 0),
        20,
        vec![Some((DEFAULT_WIDTH as i32 / 2, DEFAULT_HEIGHT as i32 / 2))],
    )))
}

fn open_led_gateway(config: &Config) -> Box<dyn LedGateway> {
    match &config.led_serial_path {
        #[cfg(feature = "led-serial")]
        Some(path) => match steadyscript::led::SerialGateway::open(path) {
            Ok(gw) => Box::new(gw),
            Err(e) => {
                tracing::warn!("LED serial device unavailable, using no-op gateway: {e}");
                Box::new(NoopGateway)
            }
        },
        #[cfg(not(feature = "led-serial"))]
        Some(_) => {
            tracing::warn!("LED_SERIAL_PATH set but led-serial feature is disabled");
            Box::new(NoopGateway)
        }
        None => Box::new(NoopGateway),
    }
}
