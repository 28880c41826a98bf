use pl_domain::config::{Config, ConfigSeverity};

#[test]
fn defaults_match_documented_limits() {
    let config = Config::default();
    assert_eq!(config.engine.max_rounds, 15);
    assert_eq!(config.engine.max_history, 50);
    assert_eq!(config.engine.max_turns(), 100);
    assert_eq!(config.limits.max_block_bytes, 20_000);
    assert_eq!(config.limits.max_tool_result_bytes, 10_000);
    assert_eq!(config.limits.image_retention_turns, 10);
    assert_eq!(config.limits.outbound_split_chars, 4096);
    assert_eq!(config.llm.retry.max_attempts, 3);
    assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
}

#[test]
fn default_config_validates_clean() {
    let config = Config::default();
    assert!(config.validate().is_empty(), "{:?}", config.validate());
}

#[test]
fn empty_toml_uses_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.engine.max_rounds, 15);
    assert_eq!(config.tools.timezone, "UTC");
    assert!(config.store.audit);
}

#[test]
fn partial_sections_keep_other_defaults() {
    let toml_str = r#"
[engine]
max_rounds = 4

[llm.retry]
base_delay_ms = 250

[llm.model_aliases]
fast = "claude-haiku-4-5-20251001"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.engine.max_rounds, 4);
    assert_eq!(config.engine.max_history, 50);
    assert_eq!(config.llm.retry.base_delay_ms, 250);
    assert_eq!(config.llm.retry.max_attempts, 3);
    assert_eq!(
        config.llm.resolve_model("fast").as_deref(),
        Some("claude-haiku-4-5-20251001")
    );
}

#[test]
fn zero_round_ceiling_is_an_error() {
    let toml_str = r#"
[engine]
max_rounds = 0
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|e| e.field == "engine.max_rounds" && e.severity == ConfigSeverity::Error));
}

#[test]
fn unknown_timezone_is_an_error() {
    let toml_str = r#"
[tools]
timezone = "Mars/Olympus_Mons"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(config.validate().iter().any(|e| e.field == "tools.timezone"));
}

#[test]
fn zero_backoff_is_only_a_warning() {
    let toml_str = r#"
[llm.retry]
base_delay_ms = 0
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
}
