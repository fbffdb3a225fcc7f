use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Liveness signal bumped whenever the service makes progress
#[derive(Clone, Debug)]
pub struct Heartbeat {
    last: Arc<Mutex<Instant>>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn beat(&self) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).elapsed()
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Kills the process when the heartbeat stops. The portal session cannot be
/// recovered from a hang in-process, so an external supervisor restarts us.
pub struct Watchdog {
    heartbeat: Heartbeat,
    timeout: Duration,
    poll: Duration,
}

impl Watchdog {
    pub fn new(heartbeat: Heartbeat, timeout: Duration, poll: Duration) -> Self {
        Self {
            heartbeat,
            timeout,
            poll,
        }
    }

    pub fn is_stalled(&self) -> bool {
        self.heartbeat.elapsed() > self.timeout
    }

    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            "Watchdog armed: restart after {}s without progress",
            self.timeout.as_secs()
        );
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.poll).await;
                if self.is_stalled() {
                    error!(
                        "[WATCHDOG] No progress for {:.0}s, forcing restart",
                        self.heartbeat.elapsed().as_secs_f64()
                    );
                    std::process::exit(1);
                }
            }
        })
    }
}

/// Set on Ctrl-C; checked between contracts and during idle sleeps
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Triggers the signal when the process receives Ctrl-C
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, finishing the current contract");
                signal.trigger();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beating_resets_elapsed_time() {
        let heartbeat = Heartbeat::new();
        std::thread::sleep(Duration::from_millis(20));
        assert!(heartbeat.elapsed() >= Duration::from_millis(20));
        heartbeat.beat();
        assert!(heartbeat.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn watchdog_detects_stall() {
        let heartbeat = Heartbeat::new();
        let watchdog = Watchdog::new(
            heartbeat.clone(),
            Duration::from_millis(10),
            Duration::from_secs(10),
        );
        assert!(!watchdog.is_stalled());
        std::thread::sleep(Duration::from_millis(25));
        assert!(watchdog.is_stalled());
        heartbeat.beat();
        assert!(!watchdog.is_stalled());
    }

    #[test]
    fn shutdown_is_shared_between_clones() {
        let signal = ShutdownSignal::new();
        let other = signal.clone();
        assert!(!other.is_triggered());
        signal.trigger();
        assert!(other.is_triggered());
    }
}
