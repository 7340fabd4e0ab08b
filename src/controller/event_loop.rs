//! Single-task event loop feeding the controller.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::controller::Controller;
use super::protocol::Inbound;
use crate::transport::Outbound;

pub struct EventLoop<T: Outbound> {
    controller: Controller<T>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    heartbeat_period: Duration,
    stats_interval: Duration,
}

impl<T: Outbound> EventLoop<T> {
    pub fn new(
        controller: Controller<T>,
        inbound: mpsc::UnboundedReceiver<Inbound>,
        heartbeat_period: Duration,
        stats_interval: Duration,
    ) -> Self {
        Self {
            controller,
            inbound,
            heartbeat_period,
            stats_interval,
        }
    }

    /// Runs until `shutdown` resolves or every inbound sender is gone, then
    /// hands the controller back.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Controller<T> {
        let mut heartbeat = tokio::time::interval(self.heartbeat_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately; the first round starts one period in
        heartbeat.tick().await;

        let mut stats = tokio::time::interval(self.stats_interval);
        stats.set_missed_tick_behavior(MissedTickBehavior::Skip);
        stats.tick().await;

        tokio::pin!(shutdown);

        tracing::info!(
            "Event loop started (heartbeat every {:?})",
            self.heartbeat_period
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping event loop");
                    break;
                }
                event = self.inbound.recv() => match event {
                    Some(event) => self.controller.handle(event),
                    None => {
                        tracing::info!("Inbound channel closed, stopping event loop");
                        break;
                    }
                },
                _ = heartbeat.tick() => self.controller.heartbeat_tick(),
                _ = stats.tick() => self.controller.log_stats(),
            }
        }

        self.controller
    }
}
