use super::*;
use serial_test::serial;
use std::time::Duration;
use tempfile::tempdir;

const ALL_VARS: &[&str] = &[
    ENV_MAX_BATCH_SIZE,
    ENV_MAX_BATCH_AGE_MS,
    ENV_MAX_IN_FLIGHT,
    ENV_FLUSH_ON_STOP,
    ENV_WORKERS,
];

fn clear_env() {
    for var in ALL_VARS {
        unsafe { std::env::remove_var(var) };
    }
}

#[test]
fn defaults_match_stage_defaults() {
    let s = StageSettings::default();
    assert_eq!(s.max_batch_size, Some(10));
    assert_eq!(s.max_batch_age(), Duration::from_millis(250));
    assert_eq!(s.max_in_flight, None);
    assert!(s.flush_on_stop);
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempdir().expect("create temp dir");
    let loaded = StageSettings::load(&dir.path().join("nope.json")).expect("load");
    assert_eq!(loaded, StageSettings::default());
}

#[test]
fn partial_file_keeps_defaults_for_absent_fields() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{ "max_in_flight": 3, "max_batch_age_ms": 40 }"#)
        .expect("write settings");

    let loaded = StageSettings::load(&path).expect("load");
    assert_eq!(loaded.max_in_flight, Some(3));
    assert_eq!(loaded.max_batch_age(), Duration::from_millis(40));
    assert_eq!(loaded.max_batch_size, Some(10));
    assert!(loaded.flush_on_stop);
}

#[test]
fn zero_limits_in_file_mean_unbounded() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{ "max_in_flight": 0, "max_batch_size": 0 }"#)
        .expect("write settings");

    let loaded = StageSettings::load(&path).expect("load");
    assert_eq!(loaded.max_in_flight, None);
    assert_eq!(loaded.max_batch_size, None);
}

#[test]
fn null_limit_in_file_means_unbounded() {
    let loaded: StageSettings =
        serde_json::from_str(r#"{ "max_batch_size": null }"#).expect("parse");
    assert_eq!(loaded.max_batch_size, None);
    assert_eq!(loaded.max_in_flight, None);
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").expect("write settings");

    let err = StageSettings::load(&path).expect_err("should fail");
    assert!(matches!(err, SettingsError::Parse { .. }), "{err}");
}

#[test]
fn negative_age_disables_age_closing() {
    let s = StageSettings {
        max_batch_age_ms: -5,
        ..StageSettings::default()
    };
    assert_eq!(s.max_batch_age(), Duration::ZERO);
}

#[test]
#[serial]
fn env_overrides_apply_on_top_of_file() {
    clear_env();
    unsafe {
        std::env::set_var(ENV_MAX_BATCH_SIZE, "0");
        std::env::set_var(ENV_MAX_IN_FLIGHT, "4");
        std::env::set_var(ENV_FLUSH_ON_STOP, "false");
        std::env::set_var(ENV_WORKERS, "6");
    }

    let s = StageSettings::default()
        .with_env_overrides()
        .expect("overrides");
    clear_env();

    assert_eq!(s.max_batch_size, None);
    assert_eq!(s.max_in_flight, Some(4));
    assert!(!s.flush_on_stop);
    assert_eq!(s.workers, 6);
}

#[test]
#[serial]
fn invalid_env_value_is_reported() {
    clear_env();
    unsafe { std::env::set_var(ENV_MAX_IN_FLIGHT, "lots") };

    let err = StageSettings::default()
        .with_env_overrides()
        .expect_err("should fail");
    clear_env();

    match err {
        SettingsError::InvalidEnv { var, value } => {
            assert_eq!(var, ENV_MAX_IN_FLIGHT);
            assert_eq!(value, "lots");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
#[serial]
fn resolve_reads_explicit_path() {
    clear_env();
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{ "max_batch_size": 25 }"#).expect("write settings");

    let s = StageSettings::resolve(Some(&path)).expect("resolve");
    assert_eq!(s.max_batch_size, Some(25));
}
