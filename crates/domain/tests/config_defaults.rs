//! Configuration defaults must survive an empty TOML document.

use vx_domain::config::{Config, ConfigSeverity};

#[test]
fn empty_toml_yields_spec_defaults() {
    let config: Config = toml::from_str("").unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.llm.provider, "anthropic");
    assert_eq!(config.llm.timeout_secs, 30);
    assert_eq!(config.speech.min_chunk, 30);
    assert_eq!(config.speech.max_chunk, 80);
    assert_eq!(config.speech.partial_delay_ms, 0);
    assert_eq!(config.limits.max_event_bytes, 65_536);
    assert_eq!(config.limits.max_turns, 20);
    assert_eq!(config.limits.rate_limit_per_min, 30);
    assert_eq!(config.limits.pending_ttl_secs, 300);
    assert!(config.tools.catalog.is_empty());
}

#[test]
fn partial_section_keeps_sibling_defaults() {
    let config: Config = toml::from_str(
        r#"
        [limits]
        max_turns = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.limits.max_turns, 5);
    assert_eq!(config.limits.max_event_bytes, 65_536);
    assert_eq!(config.server.port, 8080);
}

#[test]
fn unknown_provider_is_a_validation_error() {
    let config: Config = toml::from_str(
        r#"
        [llm]
        provider = "carrier-pigeon"
        "#,
    )
    .unwrap();

    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("carrier-pigeon")));
}

#[test]
fn inverted_chunk_bounds_are_rejected() {
    let config: Config = toml::from_str(
        r#"
        [speech]
        min_chunk = 90
        max_chunk = 40
        "#,
    )
    .unwrap();

    assert!(config
        .validate()
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("chunk bounds")));
}
