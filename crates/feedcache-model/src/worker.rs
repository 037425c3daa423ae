use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use feedcache_storage::Row;

use crate::pending::PendingQueue;
use crate::row::ModelRow;

/// Adapter half of the bridge. Every method runs on the worker thread.
///
/// Implementations own their database handle (and therefore the SQLite
/// connection) for the whole life of the thread, so the connection is
/// opened, used, and closed on one thread.
pub trait CacheStore: Send + 'static {
    /// One-time setup, called lazily before the first request is serviced.
    /// Opening and migrating the database belongs here, never on the owning
    /// thread. Returning `false` marks the store failed; later requests are
    /// rejected without further I/O.
    fn initialize(&mut self) -> bool;

    /// Read the current row set in display order. `None` signals a failed
    /// read; the model keeps its previous rows.
    fn refresh(&mut self, events: &EventSink) -> Option<Vec<ModelRow>>;

    /// Persist one drained batch inside a transaction. The batch is dropped
    /// on failure; it is never requeued.
    fn commit(&mut self, batch: PendingQueue, events: &EventSink) -> bool;

    /// Teardown on the worker thread before it exits.
    fn finalize(&mut self) {}
}

/// Results republished to the owning thread.
///
/// Delivery is queued: the worker never executes owning-thread code
/// synchronously, and the owner drains events at its own pace.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A refresh completed: the full, freshly read row set.
    DataReady(Vec<ModelRow>),
    /// One visible row changed in place (e.g. a thumbnail path resolved).
    RowUpdated { index: usize, row: ModelRow },
    /// Terminal status of a commit request.
    CommitFinished { ok: bool },
}

/// Worker-side handle for publishing incremental events mid-operation.
#[derive(Debug)]
pub struct EventSink {
    events: Sender<ModelEvent>,
}

impl EventSink {
    pub fn row_updated(&self, index: usize, row: ModelRow) {
        let _ = self.events.send(ModelEvent::RowUpdated { index, row });
    }
}

enum Request {
    Refresh,
    Commit,
    Quiesce,
}

#[derive(Default)]
struct BridgeState {
    queue: PendingQueue,
    refresh_in_flight: bool,
    quiesced: bool,
}

struct Shared {
    state: Mutex<BridgeState>,
    quiesce_done: Condvar,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().expect("bridge mutex poisoned")
    }

    // Poison-tolerant variant for teardown paths: the acknowledgement must
    // still travel even if the worker panicked while holding the mutex.
    fn state_for_teardown(&self) -> MutexGuard<'_, BridgeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Owning-thread handle to the background cache worker.
///
/// Construction spawns one dedicated thread and moves the [`CacheStore`]
/// onto it. The owning thread queues writes and requests work; all database
/// I/O happens on the worker. Dropping the bridge runs the shutdown
/// handshake: signal quiesce, wait until the worker acknowledges (closing
/// the store on its own thread), then join.
pub struct CacheWorkerBridge {
    shared: Arc<Shared>,
    requests: Sender<Request>,
    events: Receiver<ModelEvent>,
    worker: Option<JoinHandle<()>>,
}

impl CacheWorkerBridge {
    pub fn new<S: CacheStore>(store: S) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(BridgeState::default()),
            quiesce_done: Condvar::new(),
        });
        let (request_tx, request_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || run_worker(store, worker_shared, request_rx, event_tx));
        Self {
            shared,
            requests: request_tx,
            events: event_rx,
            worker: Some(worker),
        }
    }

    /// Ask the worker for a fresh read. Coalesced: while a refresh is in
    /// flight, further requests are no-ops until it completes.
    pub fn request_refresh(&self) {
        {
            let mut state = self.shared.state();
            if state.refresh_in_flight {
                return;
            }
            state.refresh_in_flight = true;
        }
        let _ = self.requests.send(Request::Refresh);
    }

    /// Ask the worker to persist everything queued so far. The queue is
    /// drained atomically when the worker picks the request up, so writes
    /// queued after this call land in the next commit.
    pub fn request_commit(&self) {
        let _ = self.requests.send(Request::Commit);
    }

    pub fn queue_insert(&self, id: impl Into<String>, row: Row) {
        self.shared.state().queue.queue_insert(id, row);
    }

    pub fn queue_update(&self, id: impl Into<String>, row: Row) {
        self.shared.state().queue.queue_update(id, row);
    }

    pub fn queue_remove(&self, id: impl Into<String>) {
        self.shared.state().queue.queue_remove(id);
    }

    /// Owning-thread event stream; drain with `try_recv`/`try_iter`, or
    /// block on `recv` in a headless consumer.
    pub fn events(&self) -> &Receiver<ModelEvent> {
        &self.events
    }
}

impl Drop for CacheWorkerBridge {
    fn drop(&mut self) {
        // Shutdown handshake: signal, wait for the acknowledgement, join.
        // Only after the worker acks has the store been finalized on its own
        // thread, making the join (and this drop) safe.
        let _ = self.requests.send(Request::Quiesce);
        {
            let mut state = self.shared.state_for_teardown();
            while !state.quiesced {
                state = match self.shared.quiesce_done.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// Acknowledges quiescence however the worker exits, including a panic
// unwinding through the loop, so the owning thread's drop cannot hang.
struct QuiesceGuard {
    shared: Arc<Shared>,
}

impl Drop for QuiesceGuard {
    fn drop(&mut self) {
        let mut state = self.shared.state_for_teardown();
        state.quiesced = true;
        self.shared.quiesce_done.notify_all();
    }
}

fn run_worker<S: CacheStore>(
    mut store: S,
    shared: Arc<Shared>,
    requests: Receiver<Request>,
    events: Sender<ModelEvent>,
) {
    let _quiesce = QuiesceGuard {
        shared: Arc::clone(&shared),
    };
    let sink = EventSink {
        events: events.clone(),
    };
    let mut initialized: Option<bool> = None;

    while let Ok(request) = requests.recv() {
        match request {
            Request::Refresh => {
                let rows = if ensure_initialized(&mut store, &mut initialized) {
                    store.refresh(&sink)
                } else {
                    None
                };
                // Clear the coalescing flag before publishing, so an owner
                // reacting to the event can request the next refresh.
                shared.state().refresh_in_flight = false;
                match rows {
                    Some(rows) => {
                        let _ = events.send(ModelEvent::DataReady(rows));
                    }
                    None => tracing::warn!("cache refresh produced no data"),
                }
            }
            Request::Commit => {
                let batch = shared.state().queue.take();
                let ok = if batch.is_empty() {
                    true
                } else if ensure_initialized(&mut store, &mut initialized) {
                    store.commit(batch, &sink)
                } else {
                    false
                };
                let _ = events.send(ModelEvent::CommitFinished { ok });
            }
            Request::Quiesce => break,
        }
    }

    store.finalize();
}

fn ensure_initialized<S: CacheStore>(store: &mut S, initialized: &mut Option<bool>) -> bool {
    if initialized.is_none() {
        let ok = store.initialize();
        if !ok {
            tracing::error!("cache store initialization failed; rejecting requests");
        }
        *initialized = Some(ok);
    }
    initialized.unwrap_or(false)
}
