use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use models::{Target, TargetId, DATA_MAX_AGE_MINUTES};

const WORKER_THREAD_NAME: &str = "atmos-db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Task = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum WorkerMessage {
    Run(Task),
    Stop,
}

/// Owns the thread holding the connection. Dropped with the last
/// [`Database`] clone, which stops and joins the thread.
struct Worker {
    queue: mpsc::Sender<WorkerMessage>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn spawn(db_path: PathBuf) -> Result<Self> {
        let (queue, inbox) = mpsc::channel::<WorkerMessage>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                let mut conn = match open_connection(&db_path) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                for message in inbox {
                    match message {
                        WorkerMessage::Run(task) => task(&mut conn),
                        WorkerMessage::Stop => break,
                    }
                }
                debug!("{WORKER_THREAD_NAME} thread exiting");
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("database worker exited during startup"))??;

        Ok(Self {
            queue,
            thread: Mutex::new(Some(thread)),
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(handle) = handle else {
            return;
        };
        if self.queue.send(WorkerMessage::Stop).is_err() {
            error!("database worker already gone at shutdown");
        }
        if handle.join().is_err() {
            error!("database worker panicked");
        }
    }
}

fn open_connection(db_path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(db_path)
        .with_context(|| format!("failed to open SQLite database {}", db_path.display()))?;

    // WAL lets the widget host read while a refresh writes.
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;

    migrations::run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

/// Widget target store. A single thread owns the SQLite connection; every
/// query is shipped to it as a closure, so writes for different widgets are
/// serialized without any locking in the callers.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let worker = Worker::spawn(db_path.clone())?;
        info!("Widget store ready at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(worker),
            path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `task` on the database thread and hands its result back.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let message = WorkerMessage::Run(Box::new(move |conn| {
            // The caller may have been cancelled; nothing to report to then.
            let _ = reply_tx.send(task(conn));
        }));

        self.worker
            .queue
            .send(message)
            .map_err(|_| anyhow!("database worker is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }
}
