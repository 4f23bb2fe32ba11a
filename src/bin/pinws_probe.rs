//! Probe a pinned WebSocket endpoint
//!
//! Connects to `PINWS_URL` trusting only the key hashed in `PINWS_PIN`, logs
//! every event, sends `PINWS_MESSAGE` on each open, and closes on Ctrl+C.
//! Pass `--json` to print events as JSON lines on stdout.

use anyhow::Result;
use pinned_ws::bin_common::{init_tracing, parse_args, BinaryRunner, ProbeConfig, RunConfig, ShutdownManager};
use pinned_ws::pinsockets::{ConnectionState, Event, PinnedClient, TracingDiagnostics};
use std::time::Duration;
use tracing::{error, info, warn};

/// Upper bound on waiting for the close handshake at exit
const CLOSE_WAIT: Duration = Duration::from_secs(6);

struct Probe {
    config: ProbeConfig,
    run_config: RunConfig,
    shutdown: ShutdownManager,
    json: bool,
    opens: usize,
    messages: usize,
    failures: usize,
}

impl Probe {
    fn report(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::Opened => self.opens += 1,
            Event::Message { .. } => self.messages += 1,
            Event::Failure { .. } => self.failures += 1,
            _ => {}
        }
        if self.json {
            println!("{}", event.to_json()?);
        }
        match event {
            Event::Failure { error } => warn!("{}: {}", event.kind().bridge_name(), error),
            _ => info!("{}: {:?}", event.kind().bridge_name(), event),
        }
        Ok(())
    }
}

impl BinaryRunner for Probe {
    async fn run(&mut self) -> Result<()> {
        let client = PinnedClient::builder()
            .endpoint(self.config.url.clone())
            .pin(self.config.pin.clone())?
            .reconnect_strategy(self.config.reconnect_strategy())
            .diagnostics(TracingDiagnostics)
            .build()?;
        let (_, events) = client.subscribe_channel();

        info!("Probing {} with pin {}", client.endpoint(), self.config.pin);
        client.connect()?;

        while self.shutdown.is_running() {
            for event in events.try_iter() {
                self.report(&event)?;
                match &event {
                    Event::Opened => {
                        if let Some(message) = &self.config.message {
                            if let Err(e) = client.send(message.clone()) {
                                error!("Failed to send probe message: {}", e);
                            }
                        }
                    }
                    // Peer close or retries exhausted; nothing reconnects after this
                    Event::Closed { .. } => self.shutdown.request_shutdown(),
                    _ => {}
                }
            }
            tokio::time::sleep(self.run_config.poll_interval).await;
        }

        if client.ready_state() != ConnectionState::Closed {
            client.close();
            let deadline = tokio::time::Instant::now() + CLOSE_WAIT;
            while client.ready_state() != ConnectionState::Closed
                && tokio::time::Instant::now() < deadline
            {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            for event in events.try_iter() {
                self.report(&event)?;
            }
        }

        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        Some(format!(
            "Sessions opened: {}, messages: {}, failures: {}",
            self.opens, self.messages, self.failures
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let json = parse_args().iter().any(|arg| arg == "--json");
    let config = ProbeConfig::from_env()?;

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let mut probe = Probe {
        config,
        run_config: RunConfig::new("pinws-probe"),
        shutdown,
        json,
        opens: 0,
        messages: 0,
        failures: 0,
    };
    probe.execute().await
}
