use sparsnas_config::{AppConfig, CliOverrides};

#[test]
fn defaults_match_reference_deployment() {
    let config = AppConfig::default();
    assert_eq!(config.mqtt_host, "localhost");
    assert_eq!(config.mqtt_port, 1883);
    assert_eq!(config.mqtt_username, None);
    assert_eq!(config.mqtt_topic, "#");
    assert_eq!(config.influx_addr, "http://localhost:8086");
    assert_eq!(config.influx_database, "sparsnas");
    assert!(!config.influx_forward);
}

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("SPARSNAS_MQTT_HOST", "broker.lan");
        std::env::set_var("SPARSNAS_MQTT_PORT", "8883");
        std::env::set_var("SPARSNAS_MQTT_USERNAME", "meter");
        std::env::set_var("SPARSNAS_INFLUX_FORWARD", "true");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.mqtt_host, "broker.lan");
    assert_eq!(config.mqtt_port, 8883);
    assert_eq!(config.mqtt_username.as_deref(), Some("meter"));
    assert!(config.influx_forward);
    // 未设置的项仍是默认值
    assert_eq!(config.influx_database, "sparsnas");
}

#[test]
fn cli_overrides_take_precedence() {
    let mut config = AppConfig::default();
    let overrides = CliOverrides {
        mqtt_host: Some("10.0.0.7".to_string()),
        influx_database: Some("metering".to_string()),
        influx_forward: true,
        ..CliOverrides::default()
    };
    overrides.apply(&mut config);
    assert_eq!(config.mqtt_host, "10.0.0.7");
    assert_eq!(config.influx_database, "metering");
    assert!(config.influx_forward);
    // 未给出的命令行项不动原值
    assert_eq!(config.mqtt_port, 1883);
}
