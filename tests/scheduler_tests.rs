use logspam::config::ScanConfig;
use logspam::engine::ScanState;
use logspam::{latest_message, ScanMessage, ScanScheduler};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

fn write_log(path: &Path, lines: &[&str]) {
    let mut f = std::fs::File::create(path).unwrap();
    for l in lines {
        writeln!(f, "{l}").unwrap();
    }
}

fn append_log(path: &Path, lines: &[&str]) {
    let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    for l in lines {
        writeln!(f, "{l}").unwrap();
    }
}

fn scheduler_for(path: &Path, filter: &str, granularity: f64) -> (ScanScheduler, std::sync::mpsc::Receiver<ScanMessage>) {
    ScanScheduler::new(ScanConfig::new(path.to_path_buf(), filter, granularity).unwrap())
}

#[test]
fn background_scan_delivers_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    write_log(&path, &["ERROR a b", "ERROR a b", "WARN c"]);
    let (mut sched, rx) = scheduler_for(&path, "", 1.0);

    sched.start_scan();
    sched.wait();
    assert!(!sched.is_scanning());

    let msgs: Vec<ScanMessage> = rx.try_iter().collect();
    assert!(msgs[0].is_parsing());
    assert_eq!(msgs.last().unwrap(), &ScanMessage::Snapshot("2\tERROR a b\n1\tWARN c\n".to_string()));
    assert_eq!(sched.current_match_count(), 2);
    assert_eq!(sched.current_progress(), 1.0);
    assert_eq!(sched.cursor().last_line_parsed, 3);
    assert_eq!(sched.export_csv(), "\"Count\",\"Line (100% similarity)\"\n2,\"a b\"\n1,\"c\"\n");
}

#[test]
fn missing_file_is_reported_on_the_channel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.log");
    let (mut sched, rx) = scheduler_for(&path, "", 1.0);
    assert_eq!(rx.try_recv().unwrap(), ScanMessage::FileNotFound { path: path.clone() });

    sched.start_scan();
    sched.wait();
    let msg = latest_message(&rx).unwrap();
    assert_eq!(msg.text(), format!("File not found: \"{}\"", path.display()));

    write_log(&path, &["INFO ok"]);
    sched.change_file(&path);
    assert!(latest_message(&rx).is_none());
    sched.start_scan();
    sched.wait();
    assert_eq!(latest_message(&rx).unwrap(), ScanMessage::Snapshot("1\tINFO ok\n".to_string()));
}

#[test]
fn live_ticks_respect_the_interval() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    write_log(&path, &["ERROR a"]);
    let (sched, rx) = scheduler_for(&path, "", 1.0);
    let mut sched = sched.with_live_interval(Duration::from_millis(500));
    assert_eq!(sched.live_interval(), Duration::from_millis(500));

    let t0 = Instant::now();
    assert!(sched.tick_at(t0));
    sched.wait();
    assert!(!sched.tick_at(t0 + Duration::from_millis(100)));

    append_log(&path, &["ERROR a", "WARN new"]);
    assert!(sched.tick_at(t0 + Duration::from_millis(600)));
    sched.wait();
    assert_eq!(latest_message(&rx).unwrap(), ScanMessage::Snapshot("2\tERROR a\n1\tWARN new\n".to_string()));
    assert_eq!(sched.cursor().last_line_parsed, 3);
}

#[test]
fn stop_returns_promptly_on_large_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.log");
    {
        let mut f = std::io::BufWriter::new(std::fs::File::create(&path).unwrap());
        for i in 0..300_000 {
            writeln!(f, "[ts] [main] INFO request {i} served by worker {} in {}ms", i % 7, i % 100).unwrap();
        }
    }
    let (mut sched, _rx) = scheduler_for(&path, "", 0.9);
    sched.start_scan();
    std::thread::sleep(Duration::from_millis(5));

    let started = Instant::now();
    sched.stop_active_scan();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!sched.is_scanning());
    assert!(sched.cursor().last_line_parsed <= 300_000);
}

#[test]
fn restarting_a_scan_cancels_the_previous_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    write_log(&path, &["ERROR a", "ERROR a", "INFO b"]);
    let (mut sched, rx) = scheduler_for(&path, "", 1.0);
    sched.start_scan();
    sched.start_scan();
    sched.wait();
    let map: Vec<_> = sched.results().into_iter().map(|r| (r.line(), r.count)).collect();
    assert!(map.contains(&("ERROR a".to_string(), 2)));
    assert!(map.contains(&("INFO b".to_string(), 1)));
    assert!(matches!(latest_message(&rx), Some(ScanMessage::Snapshot(_))));
}

#[test]
fn clear_results_publishes_empty_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    write_log(&path, &["ERROR a", "INFO b"]);
    let (mut sched, rx) = scheduler_for(&path, "", 1.0);
    sched.start_scan();
    sched.wait();

    sched.clear_results();
    assert_eq!(latest_message(&rx).unwrap(), ScanMessage::Snapshot(String::new()));
    assert_eq!(sched.current_match_count(), 0);
    assert_eq!(sched.export_csv(), "\"Count\",\"Line (100% similarity)\"\n");
    assert_eq!(sched.cursor().last_line_parsed, 2);
}

#[test]
fn config_changes_reset_without_starting_a_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    write_log(&path, &["ERROR a", "INFO b"]);
    let (mut sched, rx) = scheduler_for(&path, "", 1.0);
    sched.start_scan();
    sched.wait();
    let _ = latest_message(&rx);

    sched.change_filter("ERROR");
    assert_eq!(sched.cursor().last_line_parsed, 0);
    assert_eq!(sched.current_match_count(), 0);
    assert!(!sched.is_scanning());
    assert!(latest_message(&rx).is_none());

    sched.change_granularity(0.25).unwrap();
    assert_eq!(sched.config().granularity(), 0.25);
    assert!(sched.change_granularity(f64::NAN).is_err());

    sched.start_scan();
    sched.wait();
    assert_eq!(latest_message(&rx).unwrap(), ScanMessage::Snapshot("1\tERROR a\n".to_string()));
}

#[test]
fn dropping_scheduler_stops_its_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    write_log(&path, &["ERROR a"; 1000]);
    let (mut sched, _rx) = scheduler_for(&path, "", 1.0);
    sched.start_scan();
    drop(sched);
}

fn write_big_log(path: &Path, lines: usize) {
    let mut f = std::io::BufWriter::new(std::fs::File::create(path).unwrap());
    for i in 0..lines {
        writeln!(f, "[ts] [main] INFO request {i} served by worker {} in {}ms", i % 7, i % 100).unwrap();
    }
}

#[test]
fn live_tick_is_a_no_op_while_a_scan_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.log");
    write_big_log(&path, 300_000);
    let (sched, rx) = scheduler_for(&path, "", 0.9);
    let mut sched = sched.with_live_interval(Duration::ZERO);

    let t0 = Instant::now();
    assert!(sched.tick_at(t0));
    assert!(sched.is_scanning());

    let deadline = Instant::now() + Duration::from_secs(5);
    while sched.scan_state() != ScanState::Scanning && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(sched.scan_state(), ScanState::Scanning);

    // interval has elapsed, but the running scan must not be replaced
    assert!(!sched.tick_at(t0 + Duration::from_secs(60)));
    assert!(sched.is_scanning());

    sched.stop_active_scan();
    assert_eq!(sched.scan_state(), ScanState::Idle);
    let started = rx.try_iter().filter(ScanMessage::is_parsing).count();
    assert_eq!(started, 1);
}
