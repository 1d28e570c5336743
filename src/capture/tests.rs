use super::*;
use crate::camera::DeviceSession;
use crate::clock::{Clock, ManualClock};
use crate::config::CaptureMode;
use crate::frame::Resolution;
use crate::storage::FrameStore;
use crate::test_support::{RecordingPreview, ScriptedDriver, WarnCounter};
use chrono::{Local, TimeZone};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;

fn start_time() -> chrono::DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .unwrap()
}

fn settings(mode: CaptureMode, interval: u64, period: u64) -> SchedulerSettings {
    SchedulerSettings {
        mode,
        sample_interval: Duration::from_secs(interval),
        capture_period: Duration::from_secs(period),
        poll_interval: Duration::from_secs(1),
        headless: true,
        display_resolution: None,
    }
}

fn scheduler(
    settings: SchedulerSettings,
    dir: &Path,
    clock: Arc<ManualClock>,
) -> CaptureScheduler {
    CaptureScheduler::new(settings, FrameStore::new(dir), clock)
}

#[test]
fn test_period_capture_with_one_second_ticks() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let driver = Arc::new(ScriptedDriver::new());
    let mut session = DeviceSession::new(driver, 0, None);
    let mut scheduler = scheduler(settings(CaptureMode::Period, 5, 20), temp.path(), clock.clone());

    let outcome = scheduler
        .run(&mut session, &CancellationToken::new())
        .unwrap();

    assert_eq!(outcome, CaptureOutcome::Stopped);
    assert_eq!(scheduler.phase(), CapturePhase::Stopped);

    let frames = scheduler.store().list_sorted().unwrap();
    assert!((4..=5).contains(&frames.len()), "got {} frames", frames.len());

    let names: Vec<&str> = frames.iter().map(|f| f.timestamp.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert_eq!(names[0], "2024-06-01_12-00-05");
}

#[test]
fn test_persisted_count_stays_within_tolerance() {
    for interval in 1..=4u64 {
        for period in [0u64, 1, 3, 7, 10, 13] {
            let temp = tempfile::tempdir().unwrap();
            let clock = Arc::new(ManualClock::new(start_time()));
            let mut session = DeviceSession::new(Arc::new(ScriptedDriver::new()), 0, None);
            let mut scheduler = scheduler(
                settings(CaptureMode::Period, interval, period),
                temp.path(),
                clock,
            );

            scheduler
                .run(&mut session, &CancellationToken::new())
                .unwrap();

            let expected = (period / interval) as i64;
            let persisted = scheduler.stats().frames_persisted as i64;
            assert!(
                (expected - 1..=expected + 1).contains(&persisted),
                "interval {} period {}: {} frames",
                interval,
                period,
                persisted
            );
        }
    }
}

#[test]
fn test_consecutive_frames_respect_interval() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let mut session = DeviceSession::new(Arc::new(ScriptedDriver::new()), 0, None);
    let mut scheduler = scheduler(settings(CaptureMode::Period, 3, 30), temp.path(), clock);

    scheduler
        .run(&mut session, &CancellationToken::new())
        .unwrap();

    let times: Vec<chrono::NaiveDateTime> = scheduler
        .store()
        .list_sorted()
        .unwrap()
        .iter()
        .map(|f| {
            chrono::NaiveDateTime::parse_from_str(&f.timestamp, crate::storage::FRAME_NAME_FORMAT)
                .unwrap()
        })
        .collect();

    assert!(times.len() >= 2);
    for pair in times.windows(2) {
        assert!((pair[1] - pair[0]).num_seconds() >= 3);
    }
}

#[test]
fn test_read_failures_are_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let driver = Arc::new(ScriptedDriver::new().failing_reads(10));
    let mut session = DeviceSession::new(driver.clone(), 0, None);
    let mut scheduler = scheduler(settings(CaptureMode::Period, 1, 9), temp.path(), clock);

    let warnings = WarnCounter::for_target("timelapse::capture::scheduler");
    let subscriber = tracing_subscriber::registry().with(warnings.clone());
    let outcome = tracing::subscriber::with_default(subscriber, || {
        scheduler.run(&mut session, &CancellationToken::new())
    })
    .unwrap();

    assert_eq!(outcome, CaptureOutcome::Stopped);
    assert_eq!(warnings.count(), 10);
    assert_eq!(scheduler.stats().read_failures, 10);
    assert_eq!(scheduler.stats().frames_persisted, 0);
    assert!(scheduler.store().list().unwrap().is_empty());
    assert!(session.is_open());
}

#[test]
fn test_loop_recovers_after_read_failures() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let driver = Arc::new(ScriptedDriver::new().failing_reads(10));
    let mut session = DeviceSession::new(driver, 0, None);
    let mut scheduler = scheduler(settings(CaptureMode::Period, 1, 14), temp.path(), clock);

    scheduler
        .run(&mut session, &CancellationToken::new())
        .unwrap();

    let stats = scheduler.stats();
    assert_eq!(stats.read_failures, 10);
    assert_eq!(stats.ticks, 15);
    // Reads at t=10..=14 succeed and the gate has long been open.
    assert_eq!(stats.frames_persisted, 5);
}

#[test]
fn test_continuous_capture_until_cancelled() {
    let temp = tempfile::tempdir().unwrap();
    let origin = start_time();
    let clock = Arc::new(ManualClock::new(origin));
    let cancel = CancellationToken::new();

    let hook_clock = Arc::clone(&clock);
    let hook_cancel = cancel.clone();
    let driver = Arc::new(ScriptedDriver::new().on_read(Arc::new(move |_: u64| {
        if hook_clock.seconds_since(origin) >= 12 {
            hook_cancel.cancel();
        }
    })));

    let mut session = DeviceSession::new(driver, 0, None);
    let mut scheduler =
        scheduler(settings(CaptureMode::Continuous, 5, 0), temp.path(), clock.clone());

    let outcome = scheduler.run(&mut session, &cancel).unwrap();

    assert_eq!(outcome, CaptureOutcome::Interrupted);
    assert_eq!(scheduler.phase(), CapturePhase::Interrupted);

    let names: Vec<String> = scheduler
        .store()
        .list_sorted()
        .unwrap()
        .into_iter()
        .map(|f| f.timestamp)
        .collect();
    assert_eq!(
        names,
        vec!["2024-06-01_12-00-05", "2024-06-01_12-00-10"]
    );
}

#[test]
fn test_pre_cancelled_period_capture_is_interrupted() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let driver = Arc::new(ScriptedDriver::new());
    let mut session = DeviceSession::new(driver.clone(), 0, None);
    let mut scheduler = scheduler(settings(CaptureMode::Period, 1, 60), temp.path(), clock);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = scheduler.run(&mut session, &cancel).unwrap();
    assert_eq!(outcome, CaptureOutcome::Interrupted);
    assert_eq!(scheduler.stats().ticks, 0);
    assert_eq!(driver.opens(), 1);
}

#[test]
fn test_unavailable_device_aborts_run() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let mut session = DeviceSession::new(Arc::new(ScriptedDriver::new().devices(0)), 0, None);
    let mut scheduler = scheduler(settings(CaptureMode::Period, 1, 5), temp.path(), clock);

    let result = scheduler.run(&mut session, &CancellationToken::new());

    assert!(matches!(
        result,
        Err(crate::error::TimelapseError::DeviceUnavailable { .. })
    ));
    assert_eq!(scheduler.phase(), CapturePhase::Idle);
}

#[test]
fn test_preview_rendered_at_display_resolution_when_not_headless() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let preview = RecordingPreview::default();
    let mut session = DeviceSession::new(Arc::new(ScriptedDriver::new()), 0, None)
        .with_preview(Box::new(preview.clone()));

    let mut settings = settings(CaptureMode::Period, 2, 4);
    settings.headless = false;
    settings.display_resolution = Some(Resolution::new(2, 2));
    let mut scheduler = scheduler(settings, temp.path(), clock);

    scheduler
        .run(&mut session, &CancellationToken::new())
        .unwrap();

    assert_eq!(preview.shown.load(Ordering::SeqCst), 5);
    assert_eq!(scheduler.stats().frames_previewed, 5);
    assert_eq!(*preview.last_resolution.lock(), Some(Resolution::new(2, 2)));
}

#[test]
fn test_headless_skips_preview() {
    let temp = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let preview = RecordingPreview::default();
    let mut session = DeviceSession::new(Arc::new(ScriptedDriver::new()), 0, None)
        .with_preview(Box::new(preview.clone()));
    let mut scheduler = scheduler(settings(CaptureMode::Period, 2, 4), temp.path(), clock);

    scheduler
        .run(&mut session, &CancellationToken::new())
        .unwrap();

    assert_eq!(preview.shown.load(Ordering::SeqCst), 0);
}

#[test]
fn test_run_preview_until_cancelled() {
    let clock = ManualClock::new(start_time());
    let cancel = CancellationToken::new();
    let hook_cancel = cancel.clone();
    let driver = Arc::new(ScriptedDriver::new().on_read(Arc::new(move |read: u64| {
        if read == 2 {
            hook_cancel.cancel();
        }
    })));
    let preview = RecordingPreview::default();
    let mut session = DeviceSession::new(driver, 0, None).with_preview(Box::new(preview.clone()));

    let shown = run_preview(
        &mut session,
        &clock,
        Duration::from_millis(10),
        None,
        &cancel,
    )
    .unwrap();

    assert_eq!(shown, 3);
    assert!(session.is_open());
    assert_eq!(clock.now(), start_time() + chrono::Duration::milliseconds(30));
}

#[test]
fn test_save_metadata_writes_json() {
    let temp = tempfile::tempdir().unwrap();
    let metadata = SessionMetadata {
        device_index: 1,
        resolution: Some(Resolution::X720),
        mode: CaptureMode::Period,
        interval_seconds: 5,
        period_seconds: 20,
        started_at: start_time(),
        finished_at: start_time() + chrono::Duration::seconds(20),
        outcome: CaptureOutcome::Stopped,
        stats: CaptureStats {
            ticks: 21,
            frames_read: 21,
            frames_persisted: 4,
            ..CaptureStats::default()
        },
    };

    let path = save_metadata(&metadata, temp.path()).unwrap();

    assert_eq!(
        path,
        temp.path().join("metadata").join("2024-06-01_12-00-00.json")
    );
    let parsed: SessionMetadata =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed, metadata);
}

#[test]
fn test_capture_state_gate() {
    let start = start_time();
    let mut state = CaptureState::new(start);
    let interval = Duration::from_secs(5);

    assert!(!state.interval_elapsed(start + chrono::Duration::seconds(4), interval));
    assert!(state.interval_elapsed(start + chrono::Duration::seconds(5), interval));

    state.mark_captured(start + chrono::Duration::seconds(5));
    assert!(!state.interval_elapsed(start + chrono::Duration::seconds(9), interval));
    assert!(state.period_elapsed(start + chrono::Duration::seconds(9), Duration::from_secs(9)));

    // Clock going backwards never opens the gate
    assert!(!state.interval_elapsed(start, interval));
}
