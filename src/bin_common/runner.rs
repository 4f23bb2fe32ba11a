//! Binary runner utilities
//!
//! Provides a standardized way to run binaries with proper
//! logging, Ctrl+C handling, and graceful shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// How often the main loop checks for shutdown
    pub poll_interval: Duration,
}

impl RunConfig {
    /// Create a new run configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Initialize tracing, filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .init();
}

/// Manages graceful shutdown for long-running processes
pub struct ShutdownManager {
    flag: Arc<AtomicBool>,
}

impl ShutdownManager {
    /// Create a new shutdown manager with running state
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Spawn a Ctrl+C signal handler that triggers shutdown
    pub fn spawn_signal_handler(&self) {
        let flag = Arc::clone(&self.flag);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal (Ctrl+C)");
                flag.store(false, Ordering::Release);
            }
        });
    }

    /// Trigger shutdown without a signal
    pub fn request_shutdown(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Check if the process should continue running
    pub fn is_running(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for binary applications
pub trait BinaryRunner {
    /// Run the application main loop
    async fn run(&mut self) -> anyhow::Result<()>;

    /// Get the run configuration
    fn config(&self) -> &RunConfig;

    /// Summary line for the shutdown banner
    fn stats(&self) -> Option<String> {
        None
    }

    /// Print startup banner
    fn print_banner(&self) {
        let config = self.config();
        info!("========================================");
        info!("Starting {}", config.name);
        info!("Press Ctrl+C to stop");
        info!("========================================");
    }

    /// Print shutdown banner
    fn print_shutdown(&self, stats: Option<&str>) {
        let config = self.config();
        info!("========================================");
        info!("{} stopped", config.name);
        if let Some(stats) = stats {
            info!("{}", stats);
        }
        info!("========================================");
    }

    /// Execute the binary with banners around the main loop
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.print_banner();
        let result = self.run().await;
        let stats = self.stats();
        self.print_shutdown(stats.as_deref());
        result
    }
}
