/// Background persistence thread for writing controller snapshots to KeyDB.
///
/// The tick thread periodically captures every controller into
/// [`ControllerSnapshot`]s and sends them to this thread via an `mpsc`
/// channel. The background thread owns a persistent `redis::Connection`
/// and writes the data using pipelined commands, so persistence never
/// stalls spawn or respawn processing.
///
/// # Failure handling
///
/// A failed snapshot write dumps the batch to a local backup file, then
/// reconnects and retries the write exactly once. Either way the tick
/// thread never notices: persistence failures are logged, not raised.
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use crate::keydb;
use crate::snapshot::{self, ControllerSnapshot};

/// A unit of work sent to the background saver thread via
/// [`BackgroundSaver::send`].
///
/// Each variant carries the cloned data needed for one write operation
/// so the tick thread can hand off ownership and continue immediately.
pub enum SaveJob {
    /// Persist a full set of controller snapshots.
    Snapshots(Vec<ControllerSnapshot>),
    /// Delete one controller record by storage key.
    Remove(String),
    /// Request a synchronous flush — the saver thread will ack via the
    /// provided one-shot channel once all prior writes complete.
    Flush(mpsc::Sender<Result<(), String>>),
    /// Shut down the background thread cleanly.
    Shutdown,
}

/// Handle for the background saver thread.
///
/// Returned by [`spawn`]. Stores the `mpsc` sender and the thread join
/// handle so the owner can enqueue [`SaveJob`]s and join on shutdown.
pub struct BackgroundSaver {
    tx: mpsc::Sender<SaveJob>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundSaver {
    /// Enqueue a save job on the background thread.
    ///
    /// This call is non-blocking — the data is sent through the `mpsc`
    /// channel and processed asynchronously.
    pub fn send(&self, job: SaveJob) {
        if let Err(e) = self.tx.send(job) {
            log::error!("Failed to send save job to background saver: {e}");
        }
    }

    /// Request a synchronous flush: blocks the caller until the
    /// background thread has drained its entire job queue.
    ///
    /// Used by the clean-shutdown path (and tests) to guarantee all
    /// queued writes have completed.
    pub fn flush(&self) -> Result<(), String> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.send(SaveJob::Flush(ack_tx));
        ack_rx
            .recv()
            .map_err(|_| "Background saver flush: channel closed".to_string())?
    }

    /// Signal the background thread to stop and block until it exits.
    ///
    /// Safe to call multiple times — subsequent calls are no-ops after
    /// the join handle has been consumed. Also called automatically by
    /// the [`Drop`] implementation.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(SaveJob::Shutdown);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                log::error!("Background saver thread panicked: {e:?}");
            }
        }
    }
}

impl Drop for BackgroundSaver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the background saver thread.
///
/// Creates an `mpsc` channel and starts a dedicated thread that listens
/// for [`SaveJob`] messages. The thread maintains its own
/// [`redis::Connection`] and reconnects automatically on failure.
///
/// # Panics
///
/// Panics if the OS thread cannot be spawned.
pub fn spawn() -> BackgroundSaver {
    let (tx, rx) = mpsc::channel::<SaveJob>();

    let handle = thread::Builder::new()
        .name("bg-saver".into())
        .spawn(move || {
            saver_thread_main(rx);
        })
        .expect("Failed to spawn background saver thread");

    BackgroundSaver {
        tx,
        handle: Some(handle),
    }
}

// ---------------------------------------------------------------------------
//  Background thread main loop
// ---------------------------------------------------------------------------

/// Establish a KeyDB connection, retrying every 5 seconds on failure.
/// Never returns `Err`; it loops until a connection succeeds.
fn connect_with_retry() -> redis::Connection {
    loop {
        match keydb::connect() {
            Ok(con) => return con,
            Err(e) => {
                log::error!("Background saver: KeyDB connect failed ({e}), retrying in 5s...");
                thread::sleep(std::time::Duration::from_secs(5));
            }
        }
    }
}

/// Entry point for the background saver thread.
///
/// Blocks on the `mpsc` receiver, processing [`SaveJob`] messages in
/// FIFO order until a [`SaveJob::Shutdown`] is received or the channel
/// is closed.
fn saver_thread_main(rx: mpsc::Receiver<SaveJob>) {
    log::info!("Background saver thread started.");
    let mut con = connect_with_retry();

    loop {
        let job = match rx.recv() {
            Ok(job) => job,
            Err(_) => {
                log::info!("Background saver: channel closed, shutting down.");
                break;
            }
        };

        match job {
            SaveJob::Snapshots(snaps) => {
                let t = std::time::Instant::now();
                if let Err(e) = snapshot::save_all(&mut con, &snaps) {
                    log::error!("Background snapshot save failed: {e}");
                    // One-time backup, then reconnect and retry once.
                    if let Err(e) = snapshot::write_backup_file(&snaps) {
                        log::error!("Backup file write also failed: {e}");
                    }
                    con = connect_with_retry();
                    if let Err(e) = snapshot::save_all(&mut con, &snaps) {
                        log::error!("Snapshot save retry failed, giving up this cycle: {e}");
                    }
                } else {
                    log::debug!(
                        "Background save: {} controllers in {:.2?}",
                        snaps.len(),
                        t.elapsed()
                    );
                }
            }
            SaveJob::Remove(key) => {
                if let Err(e) = snapshot::delete(&mut con, &key) {
                    log::error!("Background delete of {key} failed: {e}");
                    con = connect_with_retry();
                }
            }
            SaveJob::Flush(ack) => {
                // All prior jobs have already been processed (channel is FIFO).
                let _ = ack.send(Ok(()));
            }
            SaveJob::Shutdown => {
                log::info!("Background saver: shutdown requested.");
                break;
            }
        }
    }

    log::info!("Background saver thread exiting.");
}

// ---------------------------------------------------------------------------
//  Unit Tests
// ---------------------------------------------------------------------------
