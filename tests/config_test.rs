//! Layered configuration: defaults, TOML file, environment.

use std::io::Write;

use daq_batch::config::BatchConfig;
use daq_batch::dispatcher::FailurePolicy;
use daq_batch::error::BatchError;
use serial_test::serial;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
#[serial]
fn test_missing_file_gives_defaults() {
    let config = BatchConfig::load_from("does/not/exist.toml").unwrap();
    assert_eq!(config, BatchConfig::default());
}

#[test]
#[serial]
fn test_file_values_override_defaults() {
    let file = config_file(
        r#"
[application]
log_level = "debug"

[table]
labels_row = 0
action_column = "Scan Type"

[dispatch]
failure_policy = "continue"

[dispatch.metadata]
beamline = "9-ID"

[simulation]
devices = ["sx", "sy", "I0"]
"#,
    );

    let config = BatchConfig::load_from(file.path()).unwrap();
    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.table.labels_row, 0);
    assert_eq!(config.table.action_column, "Scan Type");
    assert!(config.table.ignore_extra);
    assert_eq!(config.dispatch.failure_policy, FailurePolicy::Continue);
    assert_eq!(config.dispatch.metadata["beamline"], "9-ID");
    assert_eq!(config.simulation.devices.len(), 3);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = config_file("[table]\nlabels_row = 5\n");
    std::env::set_var("DAQ_BATCH_TABLE__LABELS_ROW", "1");
    std::env::set_var("DAQ_BATCH_JOURNAL__ENABLED", "false");

    let result = BatchConfig::load_from(file.path());

    std::env::remove_var("DAQ_BATCH_TABLE__LABELS_ROW");
    std::env::remove_var("DAQ_BATCH_JOURNAL__ENABLED");

    let config = result.unwrap();
    assert_eq!(config.table.labels_row, 1);
    assert!(!config.journal.enabled);
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    let file = config_file("[application]\nlog_level = \"chatty\"\n");
    let err = BatchConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, BatchError::Configuration(_)));
    assert!(err.to_string().contains("chatty"));

    let file = config_file("[table]\nlabels_row = \"four\"\n");
    let err = BatchConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, BatchError::Config(_)));
}
