/// End-to-end test-session behavior over disposable drive fixtures.
use mediatest::{
    EngineError, Engine, ProgressEvent, SessionStatus, TestMode, TestParams, TestPattern,
};

#[path = "common/mod.rs"]
mod common;

use common::{
    drain_events, image_drive, mount_drive, proxy_leftovers, wait_status, wait_terminal, MIB,
};

fn quick_params(patterns: Vec<TestPattern>) -> TestParams {
    TestParams {
        passes: 1,
        patterns,
        verify_on_write: true,
        mode: TestMode::FreeSpace,
        chunk_size_mb: 1,
        adaptive_chunk: false,
        auto_format_requested: false,
        filesystem_hint: String::new(),
    }
}

#[test]
fn free_space_test_completes_cleanly() {
    let (dir, drive) = mount_drive(5 * MIB);
    let engine = Engine::new();

    let handle = engine
        .start_test(&drive, quick_params(vec![TestPattern::Zeros, TestPattern::Ones]))
        .expect("failed to start test");

    let stats = wait_terminal(&engine, handle);
    assert_eq!(stats.status, SessionStatus::Completed);
    // Proxy region = free space minus the filesystem reserve, written once
    // per selected pattern
    assert_eq!(stats.total_bytes, 4 * MIB);
    assert_eq!(stats.tested_bytes, 8 * MIB);
    assert_eq!(stats.current_pass, 1);
    assert_eq!(stats.bad_sector_count, 0);
    assert!(engine.bad_sectors(handle).unwrap().is_empty());

    // Proxy file removed on completion
    assert!(proxy_leftovers(&dir).is_empty());

    let events = drain_events(&engine, handle);
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Completed { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ProgressEvent::BadSector { .. })));
}

#[test]
fn hundred_mib_zero_scenario() {
    let (_dir, drive) = image_drive(100 * MIB);
    let engine = Engine::new();

    let params = TestParams {
        mode: TestMode::FullDevice,
        chunk_size_mb: 32,
        patterns: vec![TestPattern::Zeros],
        ..quick_params(vec![])
    };
    let handle = engine.start_test(&drive, params).unwrap();

    let stats = wait_terminal(&engine, handle);
    assert_eq!(stats.status, SessionStatus::Completed);
    assert_eq!(stats.total_bytes, 100 * MIB);
    assert_eq!(stats.tested_bytes, 100 * MIB);
    assert_eq!(stats.bad_sector_count, 0);

    // The image really is zero-filled afterwards
    let content = std::fs::read(&drive.path).unwrap();
    assert_eq!(content.len() as u64, 100 * MIB);
    assert!(content.iter().all(|&b| b == 0));
}

#[test]
fn multi_pass_slices_cover_the_whole_region() {
    let (_dir, drive) = image_drive(10 * MIB + 513);
    let engine = Engine::new();

    let params = TestParams {
        mode: TestMode::FullDevice,
        passes: 3,
        patterns: vec![TestPattern::Ones],
        verify_on_write: true,
        ..quick_params(vec![])
    };
    let handle = engine.start_test(&drive, params).unwrap();

    let stats = wait_terminal(&engine, handle);
    assert_eq!(stats.status, SessionStatus::Completed);
    assert_eq!(stats.current_pass, 3);
    // Pass slices union to the full range: every byte written exactly once
    assert_eq!(stats.tested_bytes, 10 * MIB + 513);

    let content = std::fs::read(&drive.path).unwrap();
    assert!(content.iter().all(|&b| b == 0xFF));
}

#[test]
fn statistics_are_monotonic_while_running() {
    let (_dir, drive) = image_drive(48 * MIB);
    let engine = Engine::new();

    let params = TestParams {
        mode: TestMode::FullDevice,
        passes: 2,
        patterns: vec![TestPattern::Random],
        ..quick_params(vec![])
    };
    let handle = engine.start_test(&drive, params).unwrap();

    let mut last_tested = 0u64;
    let mut last_pass = 0u32;
    loop {
        let stats = engine.statistics(handle).unwrap();
        assert!(
            stats.tested_bytes >= last_tested,
            "tested_bytes went backwards"
        );
        assert!(stats.current_pass >= last_pass, "current_pass went backwards");
        assert!(stats.current_pass <= stats.total_passes);
        last_tested = stats.tested_bytes;
        last_pass = stats.current_pass;

        if stats.status.is_terminal() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

#[test]
fn pause_then_stop_ends_cancelled_with_no_completed_event() {
    let (_dir, drive) = image_drive(64 * MIB);
    let engine = Engine::new();

    let params = TestParams {
        mode: TestMode::FullDevice,
        passes: 3,
        patterns: vec![TestPattern::Random],
        ..quick_params(vec![])
    };
    let handle = engine.start_test(&drive, params).unwrap();

    assert!(engine.pause_test(handle).unwrap(), "toggle should pause");
    let paused = wait_status(&engine, handle, SessionStatus::Paused);
    let frozen_pass = paused.current_pass;

    engine.stop_test(handle);
    let stats = wait_terminal(&engine, handle);

    assert_eq!(stats.status, SessionStatus::Cancelled);
    assert_eq!(stats.current_pass, frozen_pass, "pass frozen at cancel");
    assert!(stats.current_pass <= stats.total_passes);

    let events = drain_events(&engine, handle);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ProgressEvent::Completed { .. })),
        "cancelled session must not report Completed"
    );
}

#[test]
fn stop_is_idempotent() {
    let (_dir, drive) = image_drive(32 * MIB);
    let engine = Engine::new();

    let params = TestParams {
        mode: TestMode::FullDevice,
        passes: 2,
        patterns: vec![TestPattern::Random],
        ..quick_params(vec![])
    };
    let handle = engine.start_test(&drive, params).unwrap();

    engine.pause_test(handle).unwrap();
    wait_status(&engine, handle, SessionStatus::Paused);

    engine.stop_test(handle);
    engine.stop_test(handle);
    let stats = wait_terminal(&engine, handle);
    assert_eq!(stats.status, SessionStatus::Cancelled);
    engine.stop_test(handle); // after terminal: still a no-op

    let events = drain_events(&engine, handle);
    let completions = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. }))
        .count();
    assert_eq!(completions, 0, "no duplicate or spurious terminal events");
}

#[test]
fn pause_resume_round_trip() {
    let (_dir, drive) = image_drive(48 * MIB);
    let engine = Engine::new();

    let params = TestParams {
        mode: TestMode::FullDevice,
        passes: 2,
        patterns: vec![TestPattern::Zeros],
        ..quick_params(vec![])
    };
    let handle = engine.start_test(&drive, params).unwrap();

    assert!(engine.pause_test(handle).unwrap());
    wait_status(&engine, handle, SessionStatus::Paused);

    assert!(!engine.pause_test(handle).unwrap(), "second toggle resumes");
    let stats = wait_terminal(&engine, handle);
    assert_eq!(stats.status, SessionStatus::Completed);
}

#[test]
fn second_session_is_rejected_while_running() {
    let (_dir, drive) = image_drive(32 * MIB);
    let engine = Engine::new();

    let params = TestParams {
        mode: TestMode::FullDevice,
        patterns: vec![TestPattern::Zeros],
        ..quick_params(vec![])
    };
    let handle = engine.start_test(&drive, params.clone()).unwrap();
    engine.pause_test(handle).unwrap();
    wait_status(&engine, handle, SessionStatus::Paused);

    let err = engine.start_test(&drive, params).unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRunning));

    engine.stop_test(handle);
    wait_terminal(&engine, handle);
}

#[test]
fn system_drives_are_refused() {
    let (_dir, mut drive) = mount_drive(8 * MIB);
    drive.is_system_drive = true;

    let engine = Engine::new();
    let err = engine
        .start_test(&drive, quick_params(vec![TestPattern::Zeros]))
        .unwrap_err();
    assert!(matches!(err, EngineError::UnsafeTarget(_)));
}

#[test]
fn stale_handles_are_rejected_after_replacement() {
    let (_dir_a, drive_a) = mount_drive(3 * MIB);
    let (_dir_b, drive_b) = mount_drive(3 * MIB);
    let engine = Engine::new();

    let first = engine
        .start_test(&drive_a, quick_params(vec![TestPattern::Zeros]))
        .unwrap();
    wait_terminal(&engine, first);

    let second = engine
        .start_test(&drive_b, quick_params(vec![TestPattern::Zeros]))
        .unwrap();

    assert!(matches!(
        engine.statistics(first),
        Err(EngineError::InvalidHandle)
    ));
    assert!(matches!(engine.poll(first), Err(EngineError::InvalidHandle)));

    wait_terminal(&engine, second);
}

#[cfg(target_os = "linux")]
#[test]
fn write_failures_become_bad_sectors_and_the_loop_continues() {
    use mediatest::SectorErrorKind;

    // /dev/full fails every write with ENOSPC, which makes it a perfect
    // always-bad device: each chunk records one WriteFailed and moves on.
    let drive = mediatest::DriveInfo {
        path: "/dev/full".into(),
        total_bytes: 4 * MIB,
        free_bytes: 0,
        is_system_drive: false,
        sector_size_hint: Some(512),
    };

    let engine = Engine::new();
    let params = TestParams {
        mode: TestMode::FullDevice,
        patterns: vec![TestPattern::Zeros],
        verify_on_write: false,
        ..quick_params(vec![])
    };
    let handle = engine.start_test(&drive, params).unwrap();

    let stats = wait_terminal(&engine, handle);
    // Per-chunk I/O errors are non-fatal: the sweep still completes
    assert_eq!(stats.status, SessionStatus::Completed);
    assert_eq!(stats.tested_bytes, 0);
    assert_eq!(stats.bad_sector_count, 4);

    let records = engine.bad_sectors(handle).unwrap();
    assert_eq!(records.len(), 4);
    let expected_sectors: Vec<u64> = (0..4).map(|i| i * MIB / 512).collect();
    let sectors: Vec<u64> = records.iter().map(|r| r.sector_index).collect();
    assert_eq!(sectors, expected_sectors);
    assert!(records
        .iter()
        .all(|r| r.kind == SectorErrorKind::WriteFailed && r.attempts == 1));

    // Every BadSector event was delivered despite the bounded channel
    let events = drain_events(&engine, handle);
    let bad_events = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::BadSector { .. }))
        .count();
    assert_eq!(bad_events, 4);
}

#[test]
fn proxy_file_is_removed_after_cancel() {
    let (dir, drive) = mount_drive(64 * MIB);
    let engine = Engine::new();

    let params = TestParams {
        passes: 4,
        patterns: vec![TestPattern::Random],
        ..quick_params(vec![])
    };
    let handle = engine.start_test(&drive, params).unwrap();

    engine.pause_test(handle).unwrap();
    wait_status(&engine, handle, SessionStatus::Paused);
    engine.stop_test(handle);
    wait_terminal(&engine, handle);

    assert!(
        proxy_leftovers(&dir).is_empty(),
        "proxy must be removed regardless of outcome"
    );
}
