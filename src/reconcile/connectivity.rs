use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::reconcile::lifecycle::{Heartbeat, ShutdownSignal};

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Online when a TCP connection to a well known address succeeds
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: Duration::from_secs(3),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Connectivity probe to {} failed: {}", self.addr, e);
                false
            }
            Err(_) => {
                debug!("Connectivity probe to {} timed out", self.addr);
                false
            }
        }
    }
}

/// Blocks until the probe reports connectivity. There is no upper bound;
/// the heartbeat keeps beating so the watchdog does not fire during an outage.
/// Returns early, with `false`, only on shutdown.
pub async fn wait_for_connectivity(
    probe: &dyn ConnectivityProbe,
    poll: Duration,
    heartbeat: &Heartbeat,
    shutdown: &ShutdownSignal,
) -> bool {
    if probe.is_online().await {
        return true;
    }

    warn!("No internet connection, waiting...");
    loop {
        if shutdown.is_triggered() {
            return false;
        }
        tokio::time::sleep(poll).await;
        heartbeat.beat();
        if probe.is_online().await {
            info!("Connection restored");
            return true;
        }
        info!("Still waiting for the connection to come back...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Offline for the first `offline_polls` probes
    struct FlakyProbe {
        calls: AtomicU32,
        offline_polls: u32,
    }

    #[async_trait]
    impl ConnectivityProbe for FlakyProbe {
        async fn is_online(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) >= self.offline_polls
        }
    }

    #[tokio::test]
    async fn waits_until_probe_succeeds() {
        let probe = FlakyProbe {
            calls: AtomicU32::new(0),
            offline_polls: 3,
        };
        let online = wait_for_connectivity(
            &probe,
            Duration::from_millis(1),
            &Heartbeat::new(),
            &ShutdownSignal::new(),
        )
        .await;

        assert!(online);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn shutdown_interrupts_waiting() {
        let probe = FlakyProbe {
            calls: AtomicU32::new(0),
            offline_polls: u32::MAX,
        };
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let online =
            wait_for_connectivity(&probe, Duration::from_millis(1), &Heartbeat::new(), &shutdown)
                .await;
        assert!(!online);
    }
}
