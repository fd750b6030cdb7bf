//! The analyzer worker pool.
//!
//! Records flow in over a rendezvous channel, so `collect` blocks until a
//! worker is free: backpressure comes from the channel, not from queue
//! bookkeeping. Workers are stateless beyond the shared immutable window,
//! and every envelope leaves through the `analyzed` callback supplied at
//! construction. Closing drops the sender, drains in-flight work, joins the
//! workers, then fires the `closed` callback exactly once.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::warn;

use crate::input::{InputRecord, ScoringWindow};
use crate::reconciler::{reconcile_host_max, HostQueries};
use crate::scorer::score_timestamps;
use crate::update::{PairRecordUpdate, StrobeUpdate, UpdateEnvelope};

pub struct BeaconProxyAnalyzer {
    worker: Arc<Worker>,
    sender: Mutex<Option<SyncSender<InputRecord>>>,
    receiver: Arc<Mutex<Receiver<InputRecord>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    closed: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// Shared per-run state the worker threads execute against.
struct Worker {
    window: ScoringWindow,
    host_queries: Arc<dyn HostQueries + Send + Sync>,
    analyzed: Box<dyn Fn(UpdateEnvelope) + Send + Sync>,
}

impl BeaconProxyAnalyzer {
    pub fn new(
        window: ScoringWindow,
        host_queries: Arc<dyn HostQueries + Send + Sync>,
        analyzed: impl Fn(UpdateEnvelope) + Send + Sync + 'static,
        closed: impl FnOnce() + Send + 'static,
    ) -> Self {
        let (tx, rx) = sync_channel(0);
        Self {
            worker: Arc::new(Worker {
                window,
                host_queries,
                analyzed: Box::new(analyzed),
            }),
            sender: Mutex::new(Some(tx)),
            receiver: Arc::new(Mutex::new(rx)),
            handles: Mutex::new(Vec::new()),
            closed: Mutex::new(Some(Box::new(closed))),
        }
    }

    /// Spawns one analysis worker. Call once per desired worker; a small
    /// multiple of the core count is the intended tuning.
    pub fn start(&self) {
        let worker = Arc::clone(&self.worker);
        let receiver = Arc::clone(&self.receiver);

        let handle = std::thread::spawn(move || loop {
            // Hold the receiver lock only for the receive itself so peers
            // can pick up the next record while this one is analyzed.
            let entry = {
                let guard = match receiver.lock() {
                    Ok(guard) => guard,
                    Err(_) => {
                        warn!("analysis channel lock poisoned; worker exiting");
                        return;
                    }
                };
                guard.recv()
            };

            match entry {
                Ok(entry) => worker.analyze(entry),
                // sender dropped and channel drained
                Err(_) => return,
            }
        });

        match self.handles.lock() {
            Ok(mut handles) => handles.push(handle),
            Err(_) => warn!("worker handle lock poisoned; pool close will not join this worker"),
        }
    }

    /// Hands one record to the pool. Blocks until a worker accepts it.
    pub fn collect(&self, entry: InputRecord) {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => {
                warn!("analysis sender lock poisoned; dropping record");
                return;
            }
        };

        match sender {
            Some(tx) => {
                if tx.send(entry).is_err() {
                    warn!("analysis channel has no workers; dropping record");
                }
            }
            None => warn!("collect after close; dropping record"),
        }
    }

    /// Signals end of input, waits for all in-flight work to reach the
    /// sink, then fires the closed callback. The callback runs at most once
    /// for the lifetime of the pool.
    pub fn close(&self) {
        match self.sender.lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(_) => warn!("analysis sender lock poisoned during close"),
        }

        let handles = match self.handles.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!("analysis worker panicked");
            }
        }

        let closed = match self.closed.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(closed) = closed {
            closed();
        }
    }
}

impl Worker {
    fn analyze(&self, entry: InputRecord) {
        let output = match entry.ts_list.as_deref() {
            // The pair crossed the upstream connection limit and its
            // timestamps were discarded. Flag the pair table here: the
            // grouping stage does no reads and cannot know the final count.
            None => UpdateEnvelope {
                uconn_proxy: Some(StrobeUpdate {
                    selector: entry.hosts.clone(),
                }),
                ..UpdateEnvelope::default()
            },
            Some(ts_list) if ts_list.len() < 2 => {
                warn!(
                    src = %entry.hosts.src_ip,
                    fqdn = %entry.hosts.fqdn,
                    samples = ts_list.len(),
                    "dropping pair with too few timestamps for interval analysis"
                );
                return;
            }
            Some(ts_list) => {
                let doc = score_timestamps(&entry, ts_list, &self.window);
                let host_max = reconcile_host_max(
                    self.host_queries.as_ref(),
                    doc.score,
                    &entry.hosts.source(),
                    &entry.hosts.fqdn,
                    self.window.chunk,
                );

                UpdateEnvelope {
                    uconn_proxy: None,
                    pair_record: Some(PairRecordUpdate {
                        selector: entry.hosts.clone(),
                        doc,
                    }),
                    host_max,
                }
            }
        };

        (self.analyzed)(output);
    }
}
