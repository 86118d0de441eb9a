use sendrate_core::ServerConfig;
use sendrate_transport::{PlatformProbe, SendRateServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Usage: sendrate-demo [config.toml]
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };

    let probe = PlatformProbe::detect();
    if !probe.is_native() {
        tracing::warn!("no outbound queue query on this platform; minimum_send_rate checks will not rescue stalled writes");
    }

    SendRateServer::new(config).start().await?;
    Ok(())
}
