use mqtt_pvinverter::config::LoggingConfig;
use mqtt_pvinverter::logging::{
    LogContext, get_logger, get_logger_with_context, init_logging, parse_log_level,
};
use tracing::Level;

#[test]
fn level_strings_parse_case_insensitively() {
    assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
    assert_eq!(parse_log_level("Warning").unwrap(), Level::WARN);
    assert_eq!(parse_log_level("CRITICAL").unwrap(), Level::ERROR);
    assert!(parse_log_level("verbose").is_err());
}

#[test]
fn init_writes_into_configured_directory() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let cfg = LoggingConfig {
        level: "DEBUG".to_string(),
        file: tmp_dir
            .path()
            .join("current.log")
            .to_string_lossy()
            .to_string(),
        console_output: false,
        ..LoggingConfig::default()
    };

    init_logging(&cfg).unwrap();
    // Second call is a no-op
    init_logging(&cfg).unwrap();

    get_logger("test").info("hello from logging test");
}

#[test]
fn context_fields_are_kept_on_logger() {
    let logger = get_logger_with_context(
        LogContext::new("mqtt")
            .with_device_instance(42)
            .with_field("broker", "127.0.0.1:1883".to_string()),
    );
    assert_eq!(logger.component(), "mqtt");
    logger.debug("context logger works");
}
