//! Dispatch worker pool.

use std::{
    hash::BuildHasher as _,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use netconsoled_core::{dispatcher::Dispatcher, record::LogEntry};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error};

/// Number of pending logs each worker can hold before the listener has to wait.
const WORKER_QUEUE_DEPTH: usize = 1024;

struct Job {
    source: SocketAddr,
    entry: LogEntry,
}

/// A fixed pool of blocking workers that hand logs to a shared [`Dispatcher`].
///
/// Filters and sinks do blocking work, such as writing to files, so each worker runs on the blocking thread pool. A
/// log is routed to a worker by hashing its source IP address, which keeps logs from a single sender on the same
/// worker.
pub struct WorkerPool {
    senders: Vec<mpsc::Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    hasher: foldhash::fast::RandomState,
}

impl WorkerPool {
    /// Spawns `workers` workers, each handling logs with `dispatcher`.
    ///
    /// At least one worker is always spawned.
    pub fn spawn(dispatcher: Arc<Dispatcher>, workers: usize) -> Self {
        let (senders, handles): (Vec<_>, Vec<_>) = (0..workers.max(1))
            .map(|id| {
                let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
                let dispatcher = Arc::clone(&dispatcher);
                let handle = tokio::task::spawn_blocking(move || run_worker(id, dispatcher, rx));
                (tx, handle)
            })
            .unzip();

        Self {
            senders,
            handles,
            hasher: foldhash::fast::RandomState::default(),
        }
    }

    /// Returns the number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Queues a log for dispatch, waiting for room if the chosen worker is busy.
    pub async fn dispatch(&self, source: SocketAddr, entry: LogEntry) {
        let worker = self.worker_for(source.ip());
        if self.senders[worker].send(Job { source, entry }).await.is_err() {
            error!(worker, "Dispatch worker stopped unexpectedly. Dropping log.");
        }
    }

    fn worker_for(&self, host: IpAddr) -> usize {
        (self.hasher.hash_one(host) % self.senders.len() as u64) as usize
    }

    /// Stops the pool, waiting for every worker to finish the logs already queued to it.
    pub async fn shutdown(self) {
        drop(self.senders);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatch worker panicked.");
            }
        }
    }
}

fn run_worker(id: usize, dispatcher: Arc<Dispatcher>, mut rx: mpsc::Receiver<Job>) {
    debug!(worker = id, "Dispatch worker started.");

    while let Some(job) = rx.blocking_recv() {
        dispatcher.handle(job.source.into(), job.entry);
    }

    debug!(worker = id, "Dispatch worker stopped.");
}

#[cfg(test)]
mod tests {
    use std::{net::Ipv4Addr, sync::Mutex, time::Duration};

    use netconsoled_core::{
        filters::NoopFilter,
        record::{Record, SourceAddress},
        sinks::FuncSink,
    };

    use super::*;

    fn collecting_dispatcher() -> (Arc<Mutex<Vec<Record>>>, Arc<Dispatcher>) {
        let got = Arc::new(Mutex::new(Vec::new()));
        let got2 = Arc::clone(&got);
        let sink = FuncSink::new(move |record: &Record| {
            got2.lock().unwrap().push(record.clone());
            Ok(())
        });
        (got, Arc::new(Dispatcher::new(NoopFilter, sink)))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drains_queued_logs_on_shutdown() {
        let (got, dispatcher) = collecting_dispatcher();
        let pool = WorkerPool::spawn(dispatcher, 4);
        assert_eq!(pool.worker_count(), 4);

        for i in 0..100u8 {
            let source = SocketAddr::from((Ipv4Addr::new(192, 0, 2, i), 6666));
            pool.dispatch(source, LogEntry::new(Duration::from_secs(u64::from(i)), "hello"))
                .await;
        }
        pool.shutdown().await;

        assert_eq!(got.lock().unwrap().len(), 100);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn same_source_stays_in_order() {
        let (got, dispatcher) = collecting_dispatcher();
        let pool = WorkerPool::spawn(dispatcher, 4);

        let source = SocketAddr::from((Ipv4Addr::new(192, 0, 2, 1), 6666));
        for i in 0..50u64 {
            pool.dispatch(source, LogEntry::new(Duration::from_secs(i), "hello")).await;
        }
        pool.shutdown().await;

        let got = got.lock().unwrap();
        let elapsed = got.iter().map(|r| r.entry.elapsed.as_secs()).collect::<Vec<_>>();
        assert_eq!(elapsed, (0..50u64).collect::<Vec<_>>());
        assert!(got.iter().all(|r| r.source == SourceAddress::from(source)));
    }

    #[tokio::test]
    async fn zero_workers_still_dispatches() {
        let (got, dispatcher) = collecting_dispatcher();
        let pool = WorkerPool::spawn(dispatcher, 0);
        assert_eq!(pool.worker_count(), 1);

        pool.dispatch(SocketAddr::from((Ipv4Addr::LOCALHOST, 1)), LogEntry::default())
            .await;
        pool.shutdown().await;

        assert_eq!(got.lock().unwrap().len(), 1);
    }
}
