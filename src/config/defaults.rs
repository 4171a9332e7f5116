use super::*;

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".to_string(),
            port: 1883,
            client_id: "mqtt-pvinverter".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            topic_base: "pv/#".to_string(),
            topic_l1: "pv/l1/power".to_string(),
            topic_l2: "pv/l2/power".to_string(),
            topic_l3: "pv/l3/power".to_string(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            first_delay_secs: 1,
            rate: 2,
            max_delay_secs: 60,
            max_attempts: 12,
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            interval_ms: 250,
            nominal_voltage: 230.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/data/log/mqtt_pvinverter/current.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_instance: 42,
            custom_name: "MQTT PV inverter".to_string(),
            product_name: "Generic mqtt inverter".to_string(),
            position: 0,
            serial: "1234".to_string(),
            require_dbus: true,
            sign_of_life_minutes: 5,
            mqtt: MqttConfig::default(),
            reconnect: ReconnectConfig::default(),
            publish: PublishConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
