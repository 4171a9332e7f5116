use mqtt_pvinverter::error::PvInverterError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        PvInverterError::config("x"),
        PvInverterError::Config { .. }
    ));
    assert!(matches!(
        PvInverterError::mqtt("x"),
        PvInverterError::Mqtt { .. }
    ));
    assert!(matches!(
        PvInverterError::dbus("x"),
        PvInverterError::DBus { .. }
    ));
    assert!(matches!(
        PvInverterError::payload("pv/l1/power", "x"),
        PvInverterError::Payload { .. }
    ));
}

#[test]
fn error_constructors_group_2() {
    let ser = PvInverterError::Serialization {
        message: "s".into(),
    };
    assert!(matches!(ser, PvInverterError::Serialization { .. }));
    assert!(matches!(PvInverterError::io("x"), PvInverterError::Io { .. }));
    assert!(matches!(
        PvInverterError::validation("f", "m"),
        PvInverterError::Validation { .. }
    ));
    assert!(matches!(
        PvInverterError::timeout("x"),
        PvInverterError::Timeout { .. }
    ));
    assert!(matches!(
        PvInverterError::generic("x"),
        PvInverterError::Generic { .. }
    ));
}

#[test]
fn connection_errors_are_classified() {
    assert!(PvInverterError::mqtt("gone").is_connection_error());
    assert!(PvInverterError::timeout("no CONNACK").is_connection_error());
    assert!(!PvInverterError::payload("t", "NaN").is_connection_error());
    assert!(!PvInverterError::ReconnectExhausted { attempts: 12 }.is_connection_error());
}

#[test]
fn display_messages() {
    let e = PvInverterError::validation("field", "bad");
    assert!(format!("{}", e).contains("Validation error"));

    let e = PvInverterError::payload("pv/l2/power", "empty payload");
    assert_eq!(format!("{}", e), "Payload error on pv/l2/power: empty payload");

    let e = PvInverterError::ReconnectExhausted { attempts: 12 };
    assert_eq!(format!("{}", e), "Reconnect failed after 12 attempts");
}
