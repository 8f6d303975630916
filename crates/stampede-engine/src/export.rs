//! Prometheus snapshot exporter.
//!
//! Optional: when a plan carries an `[export]` table, live aggregates are
//! served in text format on `GET /metrics` for the duration of the run.
//! The exporter never affects the run result; only a failure to bind the
//! listen address is fatal, and that happens before load starts.

use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use tokio::task::JoinHandle;
use tracing::{error, info};

use stampede_core::error::{Result, StampedeError};
use stampede_core::metrics::RunMetrics;
use stampede_core::plan::ExportSettings;

/// Text-format exporter for live run aggregates
pub struct MetricsExporter {
    registry: Registry,
    requests_total: IntCounter,
    requests_failed_total: IntCounter,
    vus_active: IntGauge,
    listener: TcpListener,
}

impl MetricsExporter {
    /// Bind the listen address and register the run metrics
    pub fn bind(settings: &ExportSettings) -> Result<Self> {
        let addr: SocketAddr = settings
            .address
            .parse()
            .map_err(|e| StampedeError::ExporterBind(format!("{}: {}", settings.address, e)))?;

        let listener = TcpListener::bind(addr)
            .map_err(|e| StampedeError::ExporterBind(format!("{}: {}", addr, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| StampedeError::ExporterBind(e.to_string()))?;

        let registry = Registry::new();
        let requests_total = IntCounter::new(
            "stampede_requests_total",
            "Total HTTP requests issued by the run",
        )
        .map_err(|e| StampedeError::ExporterBind(e.to_string()))?;
        let requests_failed_total = IntCounter::new(
            "stampede_requests_failed_total",
            "Requests with a transport error or non-2xx/3xx status",
        )
        .map_err(|e| StampedeError::ExporterBind(e.to_string()))?;
        let vus_active = IntGauge::new("stampede_vus_active", "Currently running virtual users")
            .map_err(|e| StampedeError::ExporterBind(e.to_string()))?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(|e| StampedeError::ExporterBind(e.to_string()))?;
        registry
            .register(Box::new(requests_failed_total.clone()))
            .map_err(|e| StampedeError::ExporterBind(e.to_string()))?;
        registry
            .register(Box::new(vus_active.clone()))
            .map_err(|e| StampedeError::ExporterBind(e.to_string()))?;

        Ok(Self {
            registry,
            requests_total,
            requests_failed_total,
            vus_active,
            listener,
        })
    }

    /// The bound address (useful when the settings asked for port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Serve scrapes until the task is aborted at run end
    pub fn spawn(self, metrics: Arc<RunMetrics>, active: Arc<AtomicUsize>) -> JoinHandle<()> {
        if let Some(addr) = self.local_addr() {
            info!(%addr, "metrics exporter listening");
        }

        tokio::spawn(async move {
            loop {
                match self.listener.accept() {
                    Ok((mut stream, _)) => {
                        self.refresh(&metrics, &active);

                        let encoder = TextEncoder::new();
                        let metric_families = self.registry.gather();
                        let mut buffer = Vec::new();
                        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                            error!("Failed to encode metrics: {}", e);
                            continue;
                        }
                        let content_type = encoder.format_type().to_string();

                        tokio::task::spawn_blocking(move || {
                            let mut request = [0u8; 1024];
                            if std::io::Read::read(&mut stream, &mut request).is_ok() {
                                let response = format!(
                                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
                                    content_type,
                                    buffer.len()
                                );
                                let _ = stream.write_all(response.as_bytes());
                                let _ = stream.write_all(&buffer);
                            }
                        });
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                    }
                    Err(e) => {
                        error!("Metrics exporter accept error: {}", e);
                    }
                }
            }
        })
    }

    /// Bring the prometheus view up to date with the run aggregates
    fn refresh(&self, metrics: &RunMetrics, active: &AtomicUsize) {
        let total = metrics.total();
        let failed = metrics.failed();
        // counters only move forward, so feed them the delta
        self.requests_total
            .inc_by(total.saturating_sub(self.requests_total.get()));
        self.requests_failed_total
            .inc_by(failed.saturating_sub(self.requests_failed_total.get()));
        self.vus_active.set(active.load(Ordering::SeqCst) as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let exporter = MetricsExporter::bind(&ExportSettings {
            address: "127.0.0.1:0".to_string(),
        })
        .unwrap();
        assert!(exporter.local_addr().is_some());
    }

    #[test]
    fn test_bind_rejects_bad_address() {
        let result = MetricsExporter::bind(&ExportSettings {
            address: "not-an-addr".to_string(),
        });
        assert!(matches!(result, Err(StampedeError::ExporterBind(_))));
    }

    #[test]
    fn test_refresh_tracks_aggregates() {
        use stampede_core::metrics::RequestOutcome;
        use std::time::Duration;

        let exporter = MetricsExporter::bind(&ExportSettings {
            address: "127.0.0.1:0".to_string(),
        })
        .unwrap();

        let metrics = RunMetrics::new();
        metrics.record(&RequestOutcome {
            step: "s".to_string(),
            status: Some(500),
            latency: Duration::from_millis(1),
            error: None,
            checks: Vec::new(),
        });
        let active = AtomicUsize::new(3);

        exporter.refresh(&metrics, &active);
        exporter.refresh(&metrics, &active); // idempotent for unchanged aggregates

        assert_eq!(exporter.requests_total.get(), 1);
        assert_eq!(exporter.requests_failed_total.get(), 1);
        assert_eq!(exporter.vus_active.get(), 3);
    }
}
