//! Background scan scheduling.
//!
//! At most one scan thread holds the engine at a time. Starting a scan or
//! changing the configuration first raises the active scan's stop flag and
//! joins it. Results travel back over an mpsc channel; every message carries a
//! complete snapshot, so consumers should keep only the newest one
//! ([`latest_message`]).

use crate::config::{ScanConfig, DEFAULT_LIVE_INTERVAL_MS};
use crate::engine::{Cursor, ParseEngine, ScanMessage, ScanState, ScanStatus};
use crate::error::{LogSpamError, Result};
use crate::report::ResultRow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

struct ActiveScan {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct ScanScheduler {
    engine: Arc<Mutex<ParseEngine>>,
    status: Arc<ScanStatus>,
    tx: Sender<ScanMessage>,
    active: Option<ActiveScan>,
    live_interval: Duration,
    last_attempt: Option<Instant>,
}

// A panicking scan leaves the mutex poisoned; the tables it touched are still
// usable, so later callers take the guard anyway.
fn lock_engine(engine: &Mutex<ParseEngine>) -> MutexGuard<'_, ParseEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drain the channel and return the newest message, if any.
pub fn latest_message(rx: &Receiver<ScanMessage>) -> Option<ScanMessage> {
    rx.try_iter().last()
}

impl ScanScheduler {
    pub fn new(config: ScanConfig) -> (Self, Receiver<ScanMessage>) {
        let (tx, rx) = mpsc::channel();
        let engine = ParseEngine::new(config);
        let status = engine.status();
        let scheduler = Self {
            engine: Arc::new(Mutex::new(engine)),
            status,
            tx,
            active: None,
            live_interval: Duration::from_millis(DEFAULT_LIVE_INTERVAL_MS),
            last_attempt: None,
        };
        scheduler.check_file();
        (scheduler, rx)
    }

    pub fn with_live_interval(mut self, interval: Duration) -> Self {
        self.live_interval = interval;
        self
    }

    pub fn live_interval(&self) -> Duration {
        self.live_interval
    }

    /// Cancel any running scan, then start a new one in the background.
    pub fn start_scan(&mut self) {
        self.stop_active_scan();
        self.spawn_scan();
    }

    /// Live-update trigger. Starts an incremental scan only when none is
    /// running and the live interval has passed since the last attempt.
    pub fn tick(&mut self) -> bool {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> bool {
        if self.is_scanning() {
            return false;
        }
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.live_interval {
                return false;
            }
        }
        self.reap();
        self.spawn_scan_at(now);
        true
    }

    pub fn is_scanning(&self) -> bool {
        self.active.as_ref().is_some_and(|scan| !scan.handle.is_finished())
    }

    /// Raise the stop flag of the running scan and block until its thread has
    /// exited.
    pub fn stop_active_scan(&mut self) {
        if let Some(scan) = self.active.take() {
            scan.stop.store(true, Ordering::Release);
            join_scan(scan.handle);
        }
    }

    /// Block until the running scan finishes on its own.
    pub fn wait(&mut self) {
        if let Some(scan) = self.active.take() {
            join_scan(scan.handle);
        }
    }

    pub fn change_file(&mut self, path: impl Into<PathBuf>) {
        self.stop_active_scan();
        lock_engine(&self.engine).set_file(path);
        self.check_file();
    }

    pub fn change_filter(&mut self, filter: impl Into<String>) {
        self.stop_active_scan();
        lock_engine(&self.engine).set_filter(filter);
    }

    pub fn change_granularity(&mut self, granularity: f64) -> Result<()> {
        self.stop_active_scan();
        lock_engine(&self.engine).set_granularity(granularity)
    }

    /// Empty the result tables, keeping the cursor, and publish the empty
    /// snapshot.
    pub fn clear_results(&mut self) {
        self.stop_active_scan();
        let tx = self.tx.clone();
        lock_engine(&self.engine).clear(|msg| {
            let _ = tx.send(msg);
        });
    }

    /// Blocks while a scan holds the engine.
    pub fn export_csv(&self) -> String {
        lock_engine(&self.engine).generate_csv()
    }

    pub fn results(&self) -> Vec<ResultRow> {
        lock_engine(&self.engine).results()
    }

    pub fn config(&self) -> ScanConfig {
        lock_engine(&self.engine).config().clone()
    }

    pub fn cursor(&self) -> Cursor {
        lock_engine(&self.engine).cursor()
    }

    pub fn current_match_count(&self) -> usize {
        self.status.match_count()
    }

    pub fn current_progress(&self) -> f64 {
        self.status.progress()
    }

    /// Engine state as published by the scan thread; never blocks.
    pub fn scan_state(&self) -> ScanState {
        self.status.state()
    }

    /// See [`ParseEngine::set_hold_unterminated_lines`].
    pub fn hold_unterminated_lines(&mut self, hold: bool) {
        self.stop_active_scan();
        lock_engine(&self.engine).set_hold_unterminated_lines(hold);
    }

    fn check_file(&self) {
        let path = lock_engine(&self.engine).config().file_path.clone();
        if !path.is_file() {
            warn!(path = %path.display(), "log file not found");
            let _ = self.tx.send(ScanMessage::FileNotFound { path });
        }
    }

    fn reap(&mut self) {
        if let Some(scan) = self.active.take() {
            join_scan(scan.handle);
        }
    }

    fn spawn_scan(&mut self) {
        self.spawn_scan_at(Instant::now());
    }

    fn spawn_scan_at(&mut self, now: Instant) {
        self.last_attempt = Some(now);
        let stop = Arc::new(AtomicBool::new(false));
        let engine = Arc::clone(&self.engine);
        let tx = self.tx.clone();
        let flag = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name("logspam-scan".into())
            .spawn(move || run_scan(&engine, &flag, &tx));
        match spawned {
            Ok(handle) => self.active = Some(ActiveScan { stop, handle }),
            Err(e) => error!(error = %e, "failed to spawn scan thread"),
        }
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        self.stop_active_scan();
    }
}

fn run_scan(engine: &Mutex<ParseEngine>, stop: &AtomicBool, tx: &Sender<ScanMessage>) {
    let mut engine = lock_engine(engine);
    let res = engine.scan(
        || stop.load(Ordering::Acquire),
        |msg| {
            let _ = tx.send(msg);
        },
    );
    match res {
        Ok(outcome) => debug!(?outcome, "scan ended"),
        Err(LogSpamError::FileNotFound { path }) => {
            warn!(path = %path.display(), "log file not found");
            let _ = tx.send(ScanMessage::FileNotFound { path });
        }
        Err(e) => warn!(error = %e, "scan aborted"),
    }
}

fn join_scan(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("scan thread panicked; keeping the tables it left behind");
    }
}
