use super::*;
use aprobe_process::is_process_alive;

/// Shell companion honouring the lock-file protocol (lock path is the last arg).
const LINGERING_SCRIPT: &str = r#"for a in "$@"; do lock="$a"; done
while [ -f "$lock" ]; do touch -c "$lock"; sleep 0.2; done
exit 0"#;

fn lingering_spec(lock_dir: &Path) -> CompanionSpec {
    let mut spec = CompanionSpec::new(
        "bash",
        vec!["-c".into(), LINGERING_SCRIPT.into(), "companion".into()],
    );
    spec.lock_dir = lock_dir.to_path_buf();
    spec.ready_timeout = Duration::from_secs(10);
    spec.stop_timeout = Duration::from_secs(5);
    spec
}

#[tokio::test]
async fn test_start_waits_for_liveness_and_stop_removes_lock() {
    let tmp = tempfile::tempdir().unwrap();
    let mut companion = CompanionProcess::start(lingering_spec(tmp.path()))
        .await
        .expect("companion should start");

    assert_eq!(companion.state(), CompanionState::Running);
    let pid = companion.pid().expect("pid");
    assert!(is_process_alive(pid));
    let lock = companion.lock_file().expect("lock file").to_path_buf();
    assert!(lock.exists());
    assert!(
        lock.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("lingeredapp.")
    );

    companion.stop().await.expect("stop");
    assert_eq!(companion.state(), CompanionState::Stopped);
    assert!(!lock.exists());
    assert!(!is_process_alive(pid));
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();

    let mut never_started = CompanionProcess::new(lingering_spec(tmp.path()));
    never_started.stop().await.expect("stop on never-started");
    assert_eq!(never_started.state(), CompanionState::NotStarted);

    let mut companion = CompanionProcess::start(lingering_spec(tmp.path()))
        .await
        .expect("start");
    companion.stop().await.expect("first stop");
    companion.stop().await.expect("second stop");
    assert_eq!(companion.state(), CompanionState::Stopped);
}

#[tokio::test]
async fn test_exit_before_ready_is_startup_error() {
    let tmp = tempfile::tempdir().unwrap();
    let mut spec = CompanionSpec::new("bash", vec!["-c".into(), "exit 4".into()]);
    spec.lock_dir = tmp.path().to_path_buf();

    let err = CompanionProcess::start(spec).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProbeError>(),
        Some(ProbeError::Startup(_))
    ));
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_silent_companion_times_out_and_is_killed() {
    let tmp = tempfile::tempdir().unwrap();
    let mut spec = CompanionSpec::new("bash", vec!["-c".into(), "sleep 30".into()]);
    spec.lock_dir = tmp.path().to_path_buf();
    spec.ready_timeout = Duration::from_millis(500);
    spec.stop_timeout = Duration::from_millis(200);

    let start = std::time::Instant::now();
    let err = CompanionProcess::start(spec).await.unwrap_err();

    assert!(err.to_string().contains("did not touch its lock file"));
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_missing_program_is_startup_error() {
    let tmp = tempfile::tempdir().unwrap();
    let mut spec = CompanionSpec::new("/nonexistent/java", vec![]);
    spec.lock_dir = tmp.path().to_path_buf();

    let err = CompanionProcess::start(spec).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProbeError>(),
        Some(ProbeError::Startup(_))
    ));
}

#[tokio::test]
async fn test_drop_kills_running_companion() {
    let tmp = tempfile::tempdir().unwrap();
    let companion = CompanionProcess::start(lingering_spec(tmp.path()))
        .await
        .expect("start");
    let pid = companion.pid().expect("pid");
    let lock = companion.lock_file().expect("lock").to_path_buf();

    drop(companion);

    assert!(!lock.exists());
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while is_running(pid) && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!is_running(pid), "companion {pid} survived drop");
}

/// Alive and not a zombie awaiting reaping.
fn is_running(pid: u32) -> bool {
    if !is_process_alive(pid) {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z"),
        Err(_) => false,
    }
}
