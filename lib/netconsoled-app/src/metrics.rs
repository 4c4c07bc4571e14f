//! Metrics.
//!
//! [`MetricsRegistry`] is a `metrics` recorder that keeps every registered metric in memory, and can render them in the
//! Prometheus text exposition format. [`MetricsServer`] serves that rendering over HTTP at `/metrics`.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Write as _,
    net::SocketAddr,
    sync::{atomic::Ordering, Arc, RwLock},
};

use anyhow::Context as _;
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::GenericError;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

type Descriptions = HashMap<String, SharedString, foldhash::quality::RandomState>;

/// An in-memory metrics registry.
///
/// Metrics are registered through the [`Recorder`] implementation. The registry is meant to be created once at startup
/// and handed explicitly to whatever needs to record metrics, rather than installed as the global recorder.
///
/// Only counters and gauges are rendered. Histograms can be registered, but are never exposed.
pub struct MetricsRegistry {
    registry: Registry<Key, AtomicStorage>,
    descriptions: RwLock<Descriptions>,
}

impl MetricsRegistry {
    /// Creates an empty `MetricsRegistry`.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(AtomicStorage {}),
            descriptions: RwLock::new(Descriptions::default()),
        }
    }

    fn describe(&self, key: KeyName, description: SharedString) {
        let mut descriptions = self.descriptions.write().unwrap_or_else(|e| e.into_inner());
        descriptions.entry(key.as_str().to_string()).or_insert(description);
    }

    /// Renders all counters and gauges in the Prometheus text exposition format.
    ///
    /// Metric families are sorted by name, and the samples within a family by their labels.
    pub fn render(&self) -> String {
        let mut families = BTreeMap::<String, (&'static str, Vec<(String, String)>)>::new();

        self.registry.visit_counters(|key, counter| {
            let value = counter.load(Ordering::Relaxed);
            push_sample(&mut families, key, "counter", value.to_string());
        });
        self.registry.visit_gauges(|key, gauge| {
            let value = f64::from_bits(gauge.load(Ordering::Relaxed));
            push_sample(&mut families, key, "gauge", value.to_string());
        });

        let descriptions = self.descriptions.read().unwrap_or_else(|e| e.into_inner());

        let mut output = String::new();
        for (name, (kind, mut samples)) in families {
            samples.sort();

            if let Some(help) = descriptions.get(&name) {
                let _ = writeln!(output, "# HELP {} {}", name, help.replace('\\', "\\\\").replace('\n', "\\n"));
            }
            let _ = writeln!(output, "# TYPE {} {}", name, kind);
            for (labels, value) in samples {
                let _ = writeln!(output, "{}{} {}", name, labels, value);
            }
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn push_sample(
    families: &mut BTreeMap<String, (&'static str, Vec<(String, String)>)>, key: &Key, kind: &'static str,
    value: String,
) {
    let (_, samples) = families
        .entry(key.name().to_string())
        .or_insert_with(|| (kind, Vec::new()));
    samples.push((format_labels(key), value));
}

fn format_labels(key: &Key) -> String {
    let mut labels = key.labels().peekable();
    if labels.peek().is_none() {
        return String::new();
    }

    let mut output = String::from("{");
    for (i, label) in labels.enumerate() {
        if i > 0 {
            output.push(',');
        }
        let _ = write!(output, "{}=\"", label.key());
        for c in label.value().chars() {
            match c {
                '\\' => output.push_str("\\\\"),
                '"' => output.push_str("\\\""),
                '\n' => output.push_str("\\n"),
                c => output.push(c),
            }
        }
        output.push('"');
    }
    output.push('}');
    output
}

impl Recorder for MetricsRegistry {
    fn describe_counter(&self, key: KeyName, _: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_gauge(&self, key: KeyName, _: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_histogram(&self, key: KeyName, _: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        self.registry.get_or_create_counter(key, |c| c.clone().into())
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        self.registry.get_or_create_gauge(key, |g| g.clone().into())
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        self.registry.get_or_create_histogram(key, |h| h.clone().into())
    }
}

/// HTTP server exposing a [`MetricsRegistry`] at `/metrics`.
pub struct MetricsServer {
    listener: TcpListener,
}

impl MetricsServer {
    /// Binds the server to the given address.
    ///
    /// # Errors
    ///
    /// If the address cannot be bound, an error will be returned.
    pub async fn bind(addr: SocketAddr) -> Result<Self, GenericError> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics server to {}", addr))?;
        Ok(Self { listener })
    }

    /// Returns the address the server is bound to.
    ///
    /// # Errors
    ///
    /// If the local address cannot be determined, an error will be returned.
    pub fn local_addr(&self) -> Result<SocketAddr, GenericError> {
        self.listener
            .local_addr()
            .context("failed to get metrics server address")
    }

    /// Serves metrics until `shutdown` is cancelled.
    ///
    /// Once cancelled, the server stops accepting connections and returns after in-flight requests complete.
    ///
    /// # Errors
    ///
    /// If the server fails, an error will be returned.
    pub async fn serve(self, registry: Arc<MetricsRegistry>, shutdown: CancellationToken) -> Result<(), GenericError> {
        let addr = self.local_addr()?;
        let router = Router::new()
            .route("/metrics", get(handle_metrics))
            .with_state(registry);

        info!(%addr, "Serving Prometheus metrics.");
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .context("metrics server failed")?;
        info!("Metrics server stopped.");

        Ok(())
    }
}

async fn handle_metrics(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], registry.render())
}
