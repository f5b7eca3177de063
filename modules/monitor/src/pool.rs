//! Bounded probe worker pool.
//!
//! Probing a node blocks on an external server, so triggers are handed to a
//! fixed set of workers through a bounded queue instead of running inline. A
//! node id is held in the in-flight set from enqueue until its probe finishes,
//! which keeps concurrent triggers from ever racing two probes against the
//! same node.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use health_sqlite::{Db, NodeId};
use site_probe::Prober;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct ProbePool {
    tx: mpsc::Sender<NodeId>,
    in_flight: Arc<Mutex<HashSet<NodeId>>>,
    workers: Vec<JoinHandle<()>>,
}

impl ProbePool {
    /// Spawn `workers` probe workers draining a queue of `queue` pending ids.
    pub fn start(store: Arc<Db>, prober: Arc<Prober>, workers: usize, queue: usize) -> Self {
        let (tx, rx) = mpsc::channel::<NodeId>(queue.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let in_flight: Arc<Mutex<HashSet<NodeId>>> = Arc::new(Mutex::new(HashSet::new()));

        let handles = (0..workers)
            .map(|_| {
                let rx = rx.clone();
                let store = store.clone();
                let prober = prober.clone();
                let in_flight = in_flight.clone();
                tokio::spawn(async move {
                    loop {
                        let id = rx.lock().await.recv().await;
                        let Some(id) = id else { break };
                        if let Err(e) = crate::run_probe(&store, &prober, id).await {
                            warn!(node = id, error = %e, "probe run failed");
                        }
                        lock_set(&in_flight).remove(&id);
                    }
                })
            })
            .collect();

        ProbePool {
            tx,
            in_flight,
            workers: handles,
        }
    }

    /// Queue a probe for a node. Returns false when the trigger is dropped:
    /// either a probe for this node is already queued or running, or the
    /// queue is full (the periodic batch will catch the node up later).
    pub fn enqueue(&self, id: NodeId) -> bool {
        if !lock_set(&self.in_flight).insert(id) {
            debug!(node = id, "probe already in flight, dropping trigger");
            return false;
        }
        match self.tx.try_send(id) {
            Ok(()) => true,
            Err(e) => {
                lock_set(&self.in_flight).remove(&id);
                warn!(node = id, error = %e, "probe queue full, dropping trigger");
                false
            }
        }
    }

    /// Stop accepting work, let the workers drain what is queued, and wait
    /// for them to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

fn lock_set(set: &Mutex<HashSet<NodeId>>) -> std::sync::MutexGuard<'_, HashSet<NodeId>> {
    match set.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}
