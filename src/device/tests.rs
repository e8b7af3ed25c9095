use super::*;
use crate::network::link::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS};
use crate::session::DEFAULT_BROKER_PORT;
use crate::telemetry::HeartbeatPolicy;
use crate::telemetry::scheduler::DEFAULT_TICK_INTERVAL_MS;

#[test]
fn test_full_config() {
    let json = br#"{
        "link": {"ssid": "plant-floor", "secret": "hunter22", "connect_timeout_ms": 8000, "poll_interval_ms": 250},
        "broker": {"host": "10.0.0.2", "port": 8883, "client_id": "node-7", "keep_alive_seconds": 30,
                   "credentials": {"username": "dev", "password": "pw"}},
        "telemetry": {"tick_interval_ms": 1000, "heartbeat_ms": 5000}
    }"#;
    let config = DeviceConfig::from_json(json).unwrap();

    assert_eq!(config.link.ssid.as_str(), "plant-floor");
    assert_eq!(config.link.connect_timeout_ms, 8000);
    assert_eq!(config.link.poll_interval_ms, 250);
    assert_eq!(config.broker.port, 8883);
    assert_eq!(config.broker.client_id.as_str(), "node-7");
    assert_eq!(config.broker.keep_alive_seconds, 30);
    let credentials = config.broker.credentials.unwrap();
    assert_eq!(credentials.username.as_str(), "dev");
    assert_eq!(credentials.password.as_str(), "pw");
    assert_eq!(config.telemetry.tick_interval_ms, 1000);
    assert_eq!(config.telemetry.heartbeat, HeartbeatPolicy::Every(5000));
}

#[test]
fn test_minimal_config_uses_defaults() {
    let json = br#"{"link":{"ssid":"a","secret":"b"},"broker":{"host":"h"}}"#;
    let config = DeviceConfig::from_json(json).unwrap();

    assert_eq!(config.link.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
    assert_eq!(config.link.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    assert_eq!(config.broker.port, DEFAULT_BROKER_PORT);
    assert_eq!(config.broker.keep_alive_seconds, 15);
    assert!(config.broker.client_id.is_empty());
    assert!(config.broker.credentials.is_none());
    assert_eq!(config.telemetry.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
    assert_eq!(config.telemetry.heartbeat, HeartbeatPolicy::Disabled);
}

#[test]
fn test_null_heartbeat_disables() {
    let json = br#"{"link":{"ssid":"a","secret":"b"},"broker":{"host":"h"},"telemetry":{"heartbeat_ms":null}}"#;
    let config = DeviceConfig::from_json(json).unwrap();
    assert_eq!(config.telemetry.heartbeat, HeartbeatPolicy::Disabled);
}

#[test]
fn test_rejects_malformed_config() {
    assert_eq!(DeviceConfig::from_json(b"{"), Err(DeviceError::Config));
    assert_eq!(
        DeviceConfig::from_json(br#"{"broker":{"host":"h"}}"#),
        Err(DeviceError::Config)
    );

    let long_ssid = format!(
        r#"{{"link":{{"ssid":"{}","secret":"b"}},"broker":{{"host":"h"}}}}"#,
        "s".repeat(40)
    );
    assert_eq!(
        DeviceConfig::from_json(long_ssid.as_bytes()),
        Err(DeviceError::Config)
    );
}

#[test]
fn test_thing_name_bounds() {
    assert_eq!(ThingName::new("porch").unwrap().as_str(), "porch");
    assert_eq!(ThingName::new(""), Err(CapacityError));
    assert_eq!(
        ThingName::new(&"n".repeat(MAX_THING_NAME_LEN + 1)),
        Err(CapacityError)
    );
}

#[test]
fn test_link_secret_is_redacted() {
    let link = LinkConfig::new("net", "hunter22").unwrap();
    let text = format!("{:?}", link);
    assert!(text.contains("net"));
    assert!(!text.contains("hunter22"));
}
