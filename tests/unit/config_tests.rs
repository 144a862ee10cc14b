// Configuration module unit tests
// Extra-config parsing as seen by the collector facade

use gatewatch::config::{parse_duration, ExtraConfig, MetricsConfig, ServiceConfig, NAMESPACE};
use gatewatch::Metrics;
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::watch;

fn extra(section: serde_json::Value) -> ExtraConfig {
    let mut extra = ExtraConfig::new();
    extra.insert(NAMESPACE.to_string(), section);
    extra
}

#[test]
fn test_other_namespaces_are_ignored() {
    let mut bag = ExtraConfig::new();
    bag.insert("gatewatch/other".to_string(), json!({"collection_time": "1s"}));

    assert!(MetricsConfig::from_extra_config(&bag).is_none());
}

#[test]
fn test_facade_follows_configuration() {
    let (_tx, rx) = watch::channel(false);
    let metrics = Metrics::new(&extra(json!({"collection_time": "250ms"})), rx);

    let cfg = metrics.config().expect("metrics configured");
    assert_eq!(cfg.collection_time, Duration::from_millis(250));
    assert!(!metrics.registry().is_null());
    assert_eq!(metrics.registry().prefix(), "gatewatch.");
}

#[test]
fn test_compound_durations() {
    assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5_400)));
    assert_eq!(parse_duration("1m0.5s"), Ok(Duration::from_millis(60_500)));
    assert!(parse_duration("1h30").is_err());
}

#[test]
fn test_service_config_with_metrics_section() {
    let mut temp_file = NamedTempFile::new().unwrap();
    let yaml = r#"
log_level: warn
extra_config:
  gatewatch/metrics:
    collection_time: 2m
    router_disabled: true
    endpoint_disabled: true
"#;
    temp_file.write_all(yaml.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let service = ServiceConfig::from_file(temp_file.path()).unwrap();
    let cfg = service.metrics().unwrap();

    assert_eq!(service.log_level, "warn");
    assert_eq!(cfg.collection_time, Duration::from_secs(120));
    assert!(cfg.router_disabled);
    assert!(cfg.endpoint_disabled);
    assert!(!cfg.proxy_disabled);
    assert_eq!(cfg.listen_address, ":8090");
}

#[test]
fn test_service_config_without_metrics_section() {
    let service = ServiceConfig::from_yaml_with_env("log_level: info\n").unwrap();
    assert!(service.metrics().is_none());
}

#[test]
fn test_invalid_yaml_is_a_config_error() {
    let err = ServiceConfig::from_yaml_with_env("log_level: [unclosed\n").unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}
