//! Incremental scan engine.
//!
//! A scan reads the lines after the cursor, filters them, normalizes the
//! survivors and clusters them per tag. Cluster updates are applied line by
//! line, so a cancelled scan keeps what it already applied and moves the cursor
//! exactly past the processed lines.

use crate::config::ScanConfig;
use crate::error::{LogSpamError, Result};
use crate::filter::FilterExpression;
use crate::parser;
use crate::patterns::ClusterTable;
use crate::report::{self, ResultRow};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Notification published by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanMessage {
    /// A full parse began; the progress value is meaningful until the next
    /// snapshot.
    Started { path: PathBuf },
    /// Complete result table, `count<TAB>tag text` per row.
    Snapshot(String),
    FileNotFound { path: PathBuf },
}

impl ScanMessage {
    /// Display text of the message.
    pub fn text(&self) -> String {
        match self {
            ScanMessage::Started { path } => format!("Parsing entire log ({})...", path.display()),
            ScanMessage::Snapshot(body) => body.clone(),
            ScanMessage::FileNotFound { path } => format!("File not found: \"{}\"", path.display()),
        }
    }

    pub fn is_parsing(&self) -> bool {
        matches!(self, ScanMessage::Started { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Cancelled,
}

impl ScanState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ScanState::Scanning,
            2 => ScanState::Cancelled,
            _ => ScanState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ScanState::Idle => 0,
            ScanState::Scanning => 1,
            ScanState::Cancelled => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed { lines: usize },
    Cancelled { lines: usize },
}

/// How far previous scans got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub last_line_parsed: usize,
    /// Byte size seen by the last scan. `None` until a scan has run, which
    /// acts as an infinite baseline for truncation detection.
    pub last_known_size: Option<u64>,
}

/// Scan state, progress and match count, readable while a scan holds the
/// engine.
#[derive(Debug, Default)]
pub struct ScanStatus {
    state: AtomicU8,
    progress_bits: AtomicU64,
    full_parse: AtomicBool,
    match_count: AtomicUsize,
}

impl ScanStatus {
    pub fn state(&self) -> ScanState {
        ScanState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ScanState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Fraction of the current full parse processed; 1.0 outside full parses.
    pub fn progress(&self) -> f64 {
        if self.full_parse.load(Ordering::Acquire) {
            f64::from_bits(self.progress_bits.load(Ordering::Acquire))
        } else {
            1.0
        }
    }

    pub fn is_full_parse(&self) -> bool {
        self.full_parse.load(Ordering::Acquire)
    }

    /// Representatives discovered so far, updated after every processed line.
    pub fn match_count(&self) -> usize {
        self.match_count.load(Ordering::Acquire)
    }

    fn set_progress(&self, progress: f64) {
        self.progress_bits.store(progress.to_bits(), Ordering::Release);
    }

    fn begin_full_parse(&self) {
        self.set_progress(0.0);
        self.full_parse.store(true, Ordering::Release);
    }

    fn end_full_parse(&self) {
        self.full_parse.store(false, Ordering::Release);
    }

    fn set_match_count(&self, count: usize) {
        self.match_count.store(count, Ordering::Release);
    }
}

struct TailRead {
    lines: Vec<String>,
    total: usize,
}

pub struct ParseEngine {
    config: ScanConfig,
    filter: FilterExpression,
    cursor: Cursor,
    clusters: ClusterTable,
    hold_unterminated: bool,
    status: Arc<ScanStatus>,
}

impl ParseEngine {
    pub fn new(config: ScanConfig) -> Self {
        let filter = FilterExpression::parse(&config.filter);
        Self {
            config,
            filter,
            cursor: Cursor::default(),
            clusters: ClusterTable::new(),
            hold_unterminated: false,
            status: Arc::new(ScanStatus::default()),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn state(&self) -> ScanState {
        self.status.state()
    }

    /// Leave a final line without a newline for the next scan instead of
    /// consuming it. Meant for files that are still being written.
    pub fn set_hold_unterminated_lines(&mut self, hold: bool) {
        self.hold_unterminated = hold;
    }

    pub fn clusters(&self) -> &ClusterTable {
        &self.clusters
    }

    pub fn status(&self) -> Arc<ScanStatus> {
        Arc::clone(&self.status)
    }

    pub fn match_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn progress(&self) -> f64 {
        self.status.progress()
    }

    pub fn set_file(&mut self, path: impl Into<PathBuf>) {
        self.config.file_path = path.into();
        self.reset();
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.config.filter = filter.into();
        self.filter = FilterExpression::parse(&self.config.filter);
        self.reset();
    }

    pub fn set_granularity(&mut self, granularity: f64) -> Result<()> {
        self.config.set_granularity(granularity)?;
        self.reset();
        Ok(())
    }

    /// Drop every cluster and rewind the cursor; the next scan reads the whole
    /// file again.
    pub fn reset(&mut self) {
        debug!(path = %self.config.file_path.display(), "resetting scan state");
        self.clusters.clear();
        self.cursor = Cursor::default();
        self.status.end_full_parse();
        self.status.set_match_count(0);
    }

    /// Empty the tables without moving the cursor, then publish the (empty)
    /// snapshot. Lines already consumed will not come back until a reset.
    pub fn clear<F: FnMut(ScanMessage)>(&mut self, mut publish: F) {
        self.clusters.clear();
        self.status.set_match_count(0);
        publish(ScanMessage::Snapshot(self.snapshot()));
    }

    pub fn results(&self) -> Vec<ResultRow> {
        report::result_rows(&self.clusters)
    }

    pub fn snapshot(&self) -> String {
        report::render_snapshot(&self.results())
    }

    pub fn generate_csv(&self) -> String {
        report::render_csv(&self.results(), self.config.granularity())
    }

    /// Filter, normalize and cluster one raw line. Returns whether the line
    /// contributed to the tables.
    pub fn ingest_line(&mut self, line: &str) -> bool {
        if !self.filter.matches(line) {
            return false;
        }
        match parser::normalize_line(line) {
            Some(norm) => {
                self.clusters.assign(&norm.tag, &norm.tokens, self.config.granularity());
                true
            }
            None => false,
        }
    }

    /// Run one scan over the unread part of the file.
    ///
    /// `should_stop` is polled once per line while reading and once per
    /// processed line; when it returns true the scan ends as
    /// [`ScanOutcome::Cancelled`] without publishing a snapshot.
    pub fn scan<S, F>(&mut self, mut should_stop: S, mut publish: F) -> Result<ScanOutcome>
    where
        S: FnMut() -> bool,
        F: FnMut(ScanMessage),
    {
        self.status.set_state(ScanState::Scanning);
        let res = self.scan_inner(&mut should_stop, &mut publish);
        self.status.set_match_count(self.clusters.len());
        if !matches!(res, Ok(ScanOutcome::Completed { .. })) {
            self.status.set_state(ScanState::Cancelled);
            self.status.end_full_parse();
        }
        self.status.set_state(ScanState::Idle);
        res
    }

    fn scan_inner<S, F>(&mut self, should_stop: &mut S, publish: &mut F) -> Result<ScanOutcome>
    where
        S: FnMut() -> bool,
        F: FnMut(ScanMessage),
    {
        let path = self.config.file_path.clone();
        let size = file_size(&path)?;
        if let Some(prev) = self.cursor.last_known_size {
            if size < prev {
                warn!(path = %path.display(), prev, size, "log shrank, starting over");
                self.reset();
            }
        }
        self.cursor.last_known_size = Some(size);

        if self.cursor.last_line_parsed == 0 {
            self.begin_full_parse(&path, publish);
        }

        let hold = self.hold_unterminated;
        let mut tail = match read_tail(&path, self.cursor.last_line_parsed, hold, should_stop)? {
            Some(tail) => tail,
            None => return Ok(ScanOutcome::Cancelled { lines: 0 }),
        };
        if tail.total < self.cursor.last_line_parsed {
            warn!(
                path = %path.display(),
                cursor = self.cursor.last_line_parsed,
                lines = tail.total,
                "log has fewer lines than already parsed, starting over"
            );
            self.reset();
            self.cursor.last_known_size = Some(size);
            self.begin_full_parse(&path, publish);
            tail = match read_tail(&path, 0, hold, should_stop)? {
                Some(tail) => tail,
                None => return Ok(ScanOutcome::Cancelled { lines: 0 }),
            };
        }

        let n = tail.lines.len();
        debug!(path = %path.display(), from = self.cursor.last_line_parsed, lines = n, "scanning");
        let denom = n.saturating_sub(1).max(1) as f64;
        for (i, line) in tail.lines.iter().enumerate() {
            self.status.set_progress(i as f64 / denom);
            self.ingest_line(line);
            self.status.set_match_count(self.clusters.len());
            if should_stop() {
                self.status.set_state(ScanState::Cancelled);
                self.cursor.last_line_parsed += i + 1;
                info!(path = %path.display(), lines = i + 1, "scan cancelled");
                return Ok(ScanOutcome::Cancelled { lines: i + 1 });
            }
        }

        self.cursor.last_line_parsed += n;
        self.status.set_progress(1.0);
        self.status.end_full_parse();
        self.status.set_match_count(self.clusters.len());
        info!(
            path = %path.display(),
            lines = n,
            cursor = self.cursor.last_line_parsed,
            matches = self.clusters.len(),
            "scan finished"
        );
        publish(ScanMessage::Snapshot(self.snapshot()));
        Ok(ScanOutcome::Completed { lines: n })
    }

    fn begin_full_parse<F: FnMut(ScanMessage)>(&mut self, path: &Path, publish: &mut F) {
        self.clusters.clear();
        self.status.set_match_count(0);
        self.status.begin_full_parse();
        info!(path = %path.display(), "parsing entire log");
        publish(ScanMessage::Started { path: path.to_path_buf() });
    }
}

fn file_size(path: &Path) -> Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(LogSpamError::FileNotFound { path: path.to_path_buf() }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(LogSpamError::FileNotFound { path: path.to_path_buf() })
        }
        Err(e) => Err(LogSpamError::io(e, format!("stat {}", path.display()))),
    }
}

/// Read every line at index `from` or later, counting all lines of the file.
/// With `hold_unterminated` a final line lacking `\n` is neither read nor
/// counted. Returns `None` when `should_stop` fires mid-read.
fn read_tail<S: FnMut() -> bool>(
    path: &Path,
    from: usize,
    hold_unterminated: bool,
    should_stop: &mut S,
) -> Result<Option<TailRead>> {
    let f = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LogSpamError::FileNotFound { path: path.to_path_buf() },
        _ => LogSpamError::io(e, format!("open {}", path.display())),
    })?;
    let mut reader = BufReader::with_capacity(1 << 20, f);
    let mut buf = Vec::new();
    let mut lines = Vec::new();
    let mut total = 0usize;
    loop {
        if should_stop() {
            return Ok(None);
        }
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| LogSpamError::io(e, format!("read {}", path.display())))?;
        if read == 0 || (hold_unterminated && buf.last() != Some(&b'\n')) {
            break;
        }
        if total >= from {
            lines.push(decode_line(&buf));
        }
        total += 1;
    }
    Ok(Some(TailRead { lines, total }))
}

fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
