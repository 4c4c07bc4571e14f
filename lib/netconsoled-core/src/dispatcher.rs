//! Dispatcher.

use std::fmt;

use tracing::{error, trace};

use crate::{
    filters::{Filter, FilterOutcome},
    observability::{Outcome, PipelineMetrics},
    record::{LogEntry, Record, SourceAddress},
    sinks::{close_sink, Sink, SinkError},
};

/// Pipeline dispatcher.
///
/// The single entry point for inbound log entries. Each entry is wrapped into a [`Record`], run through the filter
/// chain and, if it survives, stored in the sink chain. Failures are reported through `tracing` and never returned to
/// the caller, so a log source can keep accepting new entries regardless of what happens to any single one.
///
/// Both chains are fixed at construction, which makes a `Dispatcher` safe to share between threads without any
/// further synchronization.
pub struct Dispatcher {
    filter: Box<dyn Filter>,
    sink: Box<dyn Sink>,
    metrics: PipelineMetrics,
}

impl Dispatcher {
    /// Creates a new `Dispatcher` with the given filter and sink chains.
    ///
    /// Metrics are disabled by default.
    pub fn new<F, S>(filter: F, sink: S) -> Self
    where
        F: Filter + 'static,
        S: Sink + 'static,
    {
        Self {
            filter: Box::new(filter),
            sink: Box::new(sink),
            metrics: PipelineMetrics::disabled(),
        }
    }

    /// Sets the pipeline metrics to update while handling records.
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the filter chain.
    pub fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }

    /// Returns the sink chain.
    pub fn sink(&self) -> &dyn Sink {
        self.sink.as_ref()
    }

    /// Handles a single log entry received from `source`.
    pub fn handle(&self, source: SourceAddress, entry: LogEntry) {
        let record = Record::new(source, entry);

        let host = match record.source.host() {
            Ok(host) => host.into_owned(),
            Err(e) => {
                error!(source = %record.source, error = %e, "Failed to determine source host. Dropping log.");
                return;
            }
        };

        self.metrics.increment_received(&host);

        let record = match self.filter.process(record) {
            Ok(FilterOutcome::Continue(record)) => {
                self.metrics.increment_filter(&host, Outcome::Ok);
                record
            }
            Ok(FilterOutcome::Reject) => {
                self.metrics.increment_filter(&host, Outcome::Dropped);
                trace!(source_host = %host, "Log rejected by filter chain.");
                return;
            }
            Err(e) => {
                self.metrics.increment_filter(&host, Outcome::Error);
                error!(source_host = %host, stage = %self.filter.name(), error = %e, "Failed to filter log.");
                return;
            }
        };

        match self.sink.store(&record) {
            Ok(()) => self.metrics.increment_sink(&host, Outcome::Ok),
            Err(e) => {
                self.metrics.increment_sink(&host, Outcome::Error);
                error!(source = %record.source, stage = %self.sink.name(), error = %e, "Failed to store log.");
            }
        }
    }

    /// Closes the sink chain, flushing and releasing any resources it holds.
    ///
    /// Must only be called once no further calls to [`handle`][Self::handle] can happen.
    ///
    /// # Errors
    ///
    /// If any sink in the chain fails to close, an error is returned.
    pub fn close(&self) -> Result<(), SinkError> {
        close_sink(self.sink.as_ref())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("filter", &self.filter.name())
            .field("sink", &self.sink.name())
            .field("metrics", &self.metrics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{IpAddr, Ipv4Addr, SocketAddr},
        sync::{Arc, Mutex},
        time::Duration,
    };

    use metrics::{Key, Label};
    use metrics_util::{
        debugging::{DebugValue, DebuggingRecorder, Snapshotter},
        CompositeKey, MetricKind,
    };
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        filters::{BlocklistFilter, FilterError, FuncFilter, MultiFilter, NoopFilter},
        sinks::{FuncSink, MultiSink, NoopSink},
    };

    const HOST: &str = "192.168.1.1";

    fn source() -> SourceAddress {
        SocketAddr::from((Ipv4Addr::new(192, 168, 1, 1), 6666)).into()
    }

    fn entry() -> LogEntry {
        LogEntry::new(Duration::from_secs(1), "hello world")
    }

    fn metered(filter: impl Filter + 'static, sink: impl Sink + 'static) -> (Dispatcher, Snapshotter) {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let dispatcher = Dispatcher::new(filter, sink).with_metrics(PipelineMetrics::new(Arc::new(recorder)));
        (dispatcher, snapshotter)
    }

    /// Returns every counter in the snapshot as `(name, labels, value)`, sorted.
    fn counters(snapshotter: &Snapshotter) -> Vec<(String, Vec<(String, String)>, u64)> {
        let mut counters = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(value) => {
                    let (_, key) = key.into_parts();
                    let labels = key
                        .labels()
                        .map(|l| (l.key().to_string(), l.value().to_string()))
                        .collect();
                    Some((key.name().to_string(), labels, value))
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        counters.sort();
        counters
    }

    fn labels(outcome: Option<&str>) -> Vec<(String, String)> {
        let mut labels = vec![("source_host".to_string(), HOST.to_string())];
        if let Some(outcome) = outcome {
            labels.push(("outcome".to_string(), outcome.to_string()));
        }
        labels
    }

    fn collecting_sink() -> (Arc<Mutex<Vec<Record>>>, impl Sink + 'static) {
        let got = Arc::new(Mutex::new(Vec::new()));
        let got2 = Arc::clone(&got);
        let sink = FuncSink::new(move |record: &Record| {
            got2.lock().unwrap().push(record.clone());
            Ok(())
        });
        (got, sink)
    }

    #[test]
    fn accepted_record_counts_once_per_boundary() {
        let (got, sink) = collecting_sink();
        let (dispatcher, snapshotter) = metered(NoopFilter, sink);

        dispatcher.handle(source(), entry());

        assert_eq!(*got.lock().unwrap(), vec![Record::new(source(), entry())]);
        assert_eq!(
            counters(&snapshotter),
            vec![
                ("netconsoled_logs_filter_total".to_string(), labels(Some("ok")), 1),
                ("netconsoled_logs_received_total".to_string(), labels(None), 1),
                ("netconsoled_logs_sink_total".to_string(), labels(Some("ok")), 1),
            ]
        );
    }

    #[test]
    fn ipv4_mapped_sources_count_under_ipv4_host() {
        let (got, sink) = collecting_sink();
        let blocklist = BlocklistFilter::new([IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))]);
        let (dispatcher, snapshotter) = metered(blocklist, sink);

        let mapped = SocketAddr::from((Ipv4Addr::new(192, 168, 1, 1).to_ipv6_mapped(), 6666));
        dispatcher.handle(mapped.into(), entry());

        assert!(got.lock().unwrap().is_empty());
        assert_eq!(
            counters(&snapshotter),
            vec![
                ("netconsoled_logs_filter_total".to_string(), labels(Some("dropped")), 1),
                ("netconsoled_logs_received_total".to_string(), labels(None), 1),
            ]
        );
    }

    #[test]
    fn rejected_record_never_reaches_sinks() {
        let filter = FuncFilter::new(|_| Ok(FilterOutcome::Reject));
        let sink = FuncSink::new(|_| panic!("reached sink"));
        let (dispatcher, snapshotter) = metered(filter, sink);

        dispatcher.handle(source(), entry());

        assert_eq!(
            counters(&snapshotter),
            vec![
                ("netconsoled_logs_filter_total".to_string(), labels(Some("dropped")), 1),
                ("netconsoled_logs_received_total".to_string(), labels(None), 1),
            ]
        );
    }

    #[test]
    #[traced_test]
    fn filter_error_is_reported() {
        let filter = MultiFilter::default().with_filter(FuncFilter::new(|_| {
            Err(FilterError::Failed {
                message: "lookup failed".to_string(),
            })
        }));
        let sink = FuncSink::new(|_| panic!("reached sink"));
        let (dispatcher, snapshotter) = metered(filter, sink);

        dispatcher.handle(source(), entry());

        assert!(logs_contain("Failed to filter log."));
        assert!(logs_contain("filter 'func' failed: lookup failed"));
        assert!(logs_contain("source_host=192.168.1.1"));
        assert_eq!(
            counters(&snapshotter),
            vec![
                ("netconsoled_logs_filter_total".to_string(), labels(Some("error")), 1),
                ("netconsoled_logs_received_total".to_string(), labels(None), 1),
            ]
        );
    }

    #[test]
    #[traced_test]
    fn sink_error_is_reported() {
        let sink = MultiSink::default().with_sink(FuncSink::new(|_| {
            Err(SinkError::Failed {
                message: "disk full".to_string(),
            })
        }));
        let (dispatcher, snapshotter) = metered(NoopFilter, sink);

        dispatcher.handle(source(), entry());

        assert!(logs_contain("Failed to store log."));
        assert!(logs_contain("sink 'func' failed: disk full"));

        let sink_error = CompositeKey::new(
            MetricKind::Counter,
            Key::from_parts(
                "netconsoled_logs_sink_total",
                vec![Label::new("source_host", HOST), Label::new("outcome", "error")],
            ),
        );
        let snapshot = snapshotter.snapshot().into_hashmap();
        assert_eq!(snapshot.get(&sink_error).map(|(_, _, v)| v), Some(&DebugValue::Counter(1)));
    }

    #[test]
    #[traced_test]
    fn malformed_source_stops_before_filters() {
        let filter = FuncFilter::new(|_| panic!("reached filter"));
        let (dispatcher, snapshotter) = metered(filter, NoopSink);

        dispatcher.handle(SourceAddress::from("not-an-address"), entry());

        assert!(logs_contain("Failed to determine source host."));
        assert!(counters(&snapshotter).is_empty());
    }

    #[test]
    fn works_without_metrics() {
        let (got, sink) = collecting_sink();
        let dispatcher = Dispatcher::new(NoopFilter, sink);

        dispatcher.handle(source(), entry());
        dispatcher.handle(SourceAddress::from("not-an-address"), entry());

        assert_eq!(got.lock().unwrap().len(), 1);
        assert!(dispatcher.close().is_ok());
    }

    #[test]
    fn transformed_record_is_stored() {
        let filter = FuncFilter::new(|mut record: Record| {
            record.entry.message = record.entry.message.to_uppercase();
            Ok(FilterOutcome::Continue(record))
        });
        let (got, sink) = collecting_sink();
        let dispatcher = Dispatcher::new(filter, sink);

        dispatcher.handle(source(), entry());

        assert_eq!(got.lock().unwrap()[0].entry.message, "HELLO WORLD");
    }

    #[test]
    fn concurrent_handles() {
        let (got, sink) = collecting_sink();
        let dispatcher = Arc::new(Dispatcher::new(NoopFilter, sink));

        let handles = (0..4)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        dispatcher.handle(source(), entry());
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(got.lock().unwrap().len(), 200);
    }
}
