//! Tests for config loading, env overrides and validation as seen by callers.

use retrace_lib::config::{
    load_config_from, save_config_to, validate_config, AppConfig, ReplayConfig,
};
use retrace_lib::RetraceError;

#[test]
fn test_app_config_default_is_not_usable_without_credentials() {
    let config = AppConfig::default();
    assert!(config.llm.api_key.is_none());
    assert!(matches!(
        validate_config(&config),
        Err(RetraceError::Config(_))
    ));
}

#[test]
fn test_replay_policy_roundtrips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("retrace").join("config.toml");

    let config = AppConfig {
        replay: ReplayConfig {
            continue_on_failure: false,
            max_correction_attempts: 3,
            ..ReplayConfig::default()
        },
        ..AppConfig::default()
    };
    save_config_to(&config, &path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("continue_on_failure = false"));

    let loaded = load_config_from(&path).unwrap();
    assert_eq!(loaded.replay, config.replay);
}

#[test]
fn test_storage_dirs_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[llm]
api_key = "sk-test"

[storage]
test_cases_dir = "/tmp/retrace-cases"
"#,
    )
    .unwrap();

    let config = load_config_from(&path).unwrap();
    assert_eq!(
        config.storage.test_cases_dir,
        std::path::PathBuf::from("/tmp/retrace-cases")
    );
    assert!(config.storage.reports_dir.ends_with("replay_reports"));
    assert!(validate_config(&config).is_ok());
}
