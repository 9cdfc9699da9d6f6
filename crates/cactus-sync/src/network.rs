//! Network availability monitoring.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

/// Reports whether the backend is currently reachable.
#[async_trait]
pub trait PathProbe: Send + Sync {
    async fn reachable(&self) -> bool;
}

/// Probe that opens a TCP connection to the backend host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Probe the host of `url`, on its explicit or scheme-default port.
    pub fn for_url(url: &url::Url, timeout: Duration) -> Option<Self> {
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(Self::new(host, port, timeout))
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl PathProbe for TcpProbe {
    async fn reachable(&self) -> bool {
        let connect = tokio::net::TcpStream::connect((self.host.as_str(), self.port));
        matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)))
    }
}

/// Callback receiving availability changes.
pub type AvailabilitySink = Arc<dyn Fn(bool) + Send + Sync>;

/// Polls a [`PathProbe`] and publishes availability changes.
///
/// Availability starts out `true`; the sink is only called when the probed
/// value differs from the last published one. The polling task stops when
/// the monitor is dropped.
pub struct NetworkMonitor {
    state: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl NetworkMonitor {
    pub fn spawn(probe: Arc<dyn PathProbe>, every: Duration, sink: AvailabilitySink) -> Self {
        let (tx, rx) = watch::channel(true);

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                debug!("Probing network availability");
                let available = probe.reachable().await;
                if *tx.borrow() == available {
                    continue;
                }

                info!(available, "Network availability changed");
                tx.send_replace(available);
                sink(available);
            }
        });

        Self { state: rx, task }
    }

    pub fn is_available(&self) -> bool {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
