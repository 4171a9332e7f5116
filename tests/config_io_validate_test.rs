use mqtt_pvinverter::config::Config;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.mqtt.server = "10.0.0.5".to_string();
    cfg.mqtt.username = Some("venus".to_string());
    cfg.publish.nominal_voltage = 240.0;
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.mqtt.server, "10.0.0.5");
    assert_eq!(loaded.mqtt.username.as_deref(), Some("venus"));
    assert_eq!(loaded.publish.nominal_voltage, 240.0);
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert!(loaded.validate().is_ok());
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();

    // Empty broker address
    cfg.mqtt.server.clear();
    assert!(cfg.validate().is_err());

    // Invalid port
    cfg = Config::default();
    cfg.mqtt.port = 0;
    assert!(cfg.validate().is_err());

    // Empty subscription
    cfg = Config::default();
    cfg.mqtt.topic_base = String::new();
    assert!(cfg.validate().is_err());

    // Publish interval zero
    cfg = Config::default();
    cfg.publish.interval_ms = 0;
    assert!(cfg.validate().is_err());

    // Non-positive voltage would divide by zero
    cfg = Config::default();
    cfg.publish.nominal_voltage = -230.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.reconnect.rate = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.reconnect.max_attempts = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.reconnect.first_delay_secs = 120;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.position = 3;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.sign_of_life_minutes = 1441;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.sign_of_life_minutes = u64::MAX / 30;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.sign_of_life_minutes = 1440;
    assert!(cfg.validate().is_ok());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"mqtt: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn from_file_missing_is_io_error() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(tmp_dir.path().join("absent.yaml")).unwrap_err();
    assert!(format!("{}", err).contains("I/O error"));
}
