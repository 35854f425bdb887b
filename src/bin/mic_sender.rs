//! Microphone Sender
//!
//! Streams the default input device to a host over UDP.
//!
//! ```text
//! mic-sender <host-ip> [port] [config.toml]
//! ```

use anyhow::{bail, Context, Result};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mic_uplink::{MicConfig, MicStream, StaticSession};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(host_arg) = args.next() else {
        bail!("usage: mic-sender <host-ip> [port] [config.toml]");
    };
    let host: IpAddr = host_arg
        .parse()
        .with_context(|| format!("invalid host address: {host_arg}"))?;
    let port: u16 = match args.next() {
        Some(port) => port.parse().context("invalid port")?,
        None => 0, // let the stream fall back to the default microphone port
    };

    let config = match args.next() {
        Some(path) => MicConfig::from_file(&path).with_context(|| format!("loading {path}"))?,
        None => MicConfig::default(),
    };

    tracing::info!(
        "streaming {} Hz / {} channel(s) / {} ms frames at {} kbps",
        config.sample_rate,
        config.channels,
        config.frame_duration_ms,
        config.bitrate / 1000
    );

    let session = Arc::new(StaticSession::new(host, port));
    let stream = MicStream::new(config, session);
    stream.start().context("starting microphone stream")?;

    tracing::info!("streaming to {} - press Ctrl+C to stop", host);
    loop {
        std::thread::sleep(Duration::from_secs(5));
        tracing::debug!("pipeline state: {:?}", stream.state());
    }
}
