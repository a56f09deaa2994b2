use std::time::Duration;

use assert_matches::assert_matches;

use vahan_harvest::config::ConfigLoader;
use vahan_harvest::error::HarvestError;
use vahan_harvest::executor::Backoff;

fn write_config(temp: &tempfile::TempDir, content: &str) -> String {
    let path = temp.path().join("vahan-harvest.json");
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn explicit_config_file_overrides_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_config(
        &temp,
        r#"{
            "schema_version": 1,
            "artifact_root": "/srv/vahan",
            "states": ["Goa", " Kerala ", ""],
            "workers": 3,
            "max_attempts": 2,
            "retry_delay_secs": 1,
            "backoff": "linear",
            "headless": false
        }"#,
    );

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(resolved.states, ["Goa", "Kerala"]);
    assert_eq!(resolved.workers, 3);
    assert_eq!(resolved.retry.max_attempts, 2);
    assert_eq!(resolved.retry.backoff, Backoff::Linear);
    assert_eq!(resolved.retry.delay_for(2), Duration::from_secs(2));
    assert_eq!(resolved.manifest_dir, "/srv/vahan/manifests");
    assert!(!resolved.webdriver.headless);
    assert_eq!(resolved.webdriver.driver_url, "http://localhost:9515");
}

#[test]
fn unknown_fields_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_config(&temp, r#"{ "wokers": 3 }"#);
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(HarvestError::ConfigParse(_))
    );
}

#[test]
fn missing_explicit_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(Some(path.to_str().unwrap())),
        Err(HarvestError::ConfigRead(_))
    );
}

#[test]
fn invalid_values_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    for content in [
        r#"{ "schema_version": 2 }"#,
        r#"{ "states": [] }"#,
        r#"{ "max_attempts": 0 }"#,
    ] {
        let path = write_config(&temp, content);
        assert_matches!(
            ConfigLoader::resolve(Some(&path)),
            Err(HarvestError::InvalidConfig(_))
        );
    }
}
