/*!
 * Tests for application configuration functionality
 */

use std::collections::HashMap;

use annotext::annotation::CancelPolicy;
use annotext::app_config::{AudioEngine, Config, LogLevel, ProviderKind};
use annotext::gateway::GatewayOptions;

use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "en");
    assert_eq!(config.target_language, "fr");
    assert_eq!(config.gateway.provider, ProviderKind::OpenAI);
    assert_eq!(config.gateway.max_attempts, 3);
    assert_eq!(config.runner.concurrency_limit, 8);
    assert_eq!(config.runner.cancel_policy, CancelPolicy::Drain);
    assert_eq!(config.audio.engine, AudioEngine::Tone);
    assert_eq!(config.audio.fallback_engine, Some(AudioEngine::Tone));
    assert_eq!(config.log_level, LogLevel::Info);
}

/// Partial files are completed with defaults
#[test]
fn test_from_file_withPartialConfig_shouldFillDefaults() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(
        dir.path(),
        "annotext.json",
        r#"{"source_language": "zh", "target_language": "en", "gateway": {"provider": "anthropic"}, "runner": {"cancel_policy": "abandon"}}"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();

    assert_eq!(config.source_language, "zh");
    assert_eq!(config.gateway.provider, ProviderKind::Anthropic);
    assert_eq!(config.gateway.effective_model(), "claude-3-5-haiku-latest");
    assert_eq!(config.gateway.heartbeat_interval_ms, 5000);
    assert_eq!(config.runner.cancel_policy, CancelPolicy::Abandon);
    assert!(config.audio.token_audio);
    assert!(config.audio.page_audio);
    assert!(config.gateway.system_prompt.is_none());
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = common::offline_config(std::path::Path::new("/tmp"));
    assert!(config.validate().is_ok());

    // An empty target turns translation off and is allowed
    config.target_language = String::new();
    assert!(config.validate().is_ok());

    config.source_language = "zzzz".to_string();
    assert!(config.validate().is_err());
    config.source_language = "en".to_string();

    config.runner.concurrency_limit = 0;
    assert!(config.validate().is_err());
    config.runner.concurrency_limit = 4;

    // Hosted providers need a key
    config.gateway.provider = ProviderKind::OpenAI;
    config.gateway.api_key = String::new();
    assert!(config.validate().is_err());
    config.gateway.api_key = "sk-test".to_string();
    assert!(config.validate().is_ok());
}

/// Environment overrides fill the key and replace tunables
#[test]
fn test_apply_overrides_from_withVariables_shouldOverride() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("OPENAI_API_KEY", "sk-from-env"),
        ("ANNOTEXT_MODEL", "gpt-4o"),
        ("ANNOTEXT_CONCURRENCY", "3"),
        ("ANNOTEXT_TTS_ENGINE", "speech"),
    ]);
    let mut config = Config::default();

    config
        .apply_overrides_from(|name| vars.get(name).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.gateway.api_key, "sk-from-env");
    assert_eq!(config.gateway.effective_model(), "gpt-4o");
    assert_eq!(config.runner.concurrency_limit, 3);
    assert_eq!(config.audio.engine, AudioEngine::Speech);

    let mut broken = Config::default();
    assert!(broken
        .apply_overrides_from(|name| (name == "ANNOTEXT_CONCURRENCY").then(|| "many".to_string()))
        .is_err());
}

/// Gateway knobs flow from the configuration into request options
#[test]
fn test_gateway_options_fromConfig_shouldCarryRetrySettings() {
    let mut config = Config::default();
    config.gateway.max_attempts = 5;
    config.gateway.retry_backoff_ms = 250;
    config.gateway.heartbeat_interval_ms = 1500;

    let options = GatewayOptions::from_config(&config.gateway);

    assert_eq!(options.retry.max_attempts, 5);
    assert_eq!(options.retry.backoff_base.as_millis(), 250);
    assert_eq!(options.heartbeat_interval.as_millis(), 1500);
}

/// Provider names parse case-insensitively
#[test]
fn test_provider_kind_fromStr_shouldParseNames() {
    assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
    assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
    assert!("lmstudio".parse::<ProviderKind>().is_err());
}
