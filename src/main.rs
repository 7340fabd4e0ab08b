use clap::Parser;
use engine_controller::config::BrokerConfig;
use engine_controller::controller::controller::Controller;
use engine_controller::controller::event_loop::EventLoop;
use engine_controller::http;
use engine_controller::transport::net::NetTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BrokerConfig::parse();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    tracing::info!("Starting engine controller on {}", config.interface);

    // 1. Transport (TCP channels + UDP heartbeat):
    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::unbounded_channel();
    let (transport, bound) = NetTransport::bind(&config, inbound_tx.clone()).await?;

    tracing::info!(
        "Registration on {}, clients on {}, engine queues on {}",
        bound.registration,
        bound.client,
        bound.queue
    );

    // 2. Dispatch core:
    let controller = Controller::new(config.controller_settings(&bound), transport);

    // 3. HTTP status server:
    if let Some(port) = config.http_port {
        let addr = config.addr(port);
        let inbound = inbound_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = http::serve(addr, inbound).await {
                tracing::error!("HTTP status server stopped: {}", e);
            }
        });
    }

    // the transport and HTTP server hold their own senders
    drop(inbound_tx);

    // 4. Event loop:
    tracing::info!("Press Ctrl+C to shutdown");

    let event_loop = EventLoop::new(
        controller,
        inbound_rx,
        config.heartbeat_period(),
        config.stats_interval(),
    );

    let controller = event_loop
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!(
        "Controller stopped with {} engine(s) and {} outstanding request(s)",
        controller.registry().len(),
        controller.pending().len()
    );

    Ok(())
}
