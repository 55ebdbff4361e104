/*!
 * Tests for the gateway: retries, schema checks and heartbeats
 */

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use annotext::annotation::operations;
use annotext::app_config::GatewayConfig;
use annotext::document::NodePath;
use annotext::errors::GatewayError;
use annotext::gateway::{Gateway, GatewayOptions};
use annotext::providers::mock::MockProvider;
use annotext::telemetry::{MemoryTelemetry, NullTelemetry};

use crate::common;

#[derive(Debug, Deserialize, PartialEq)]
struct Translation {
    translation: String,
}

/// Two transient failures then success gives the same result as a clean run
#[tokio::test]
async fn test_run_withTwoTransientFailures_shouldMatchCleanRunAndReportRetries() {
    let text = common::segmented_text();
    let spec = operations::translation();

    let clean = common::runner_with(common::scripted_provider())
        .run(&text, &spec, 1, false, &NullTelemetry)
        .await
        .unwrap();

    let flaky_provider = MockProvider::fail_first(2).with_responder(common::scripted::respond);
    let telemetry = MemoryTelemetry::new();
    let flaky = common::runner_with(flaky_provider.clone())
        .run(&text, &spec, 1, false, &telemetry)
        .await
        .unwrap();

    assert_eq!(flaky.text, clean.text);
    assert!(flaky.failures.is_empty());
    assert!(telemetry.events_matching("retrying after transient error").len() >= 2);
    // Two failed attempts plus one call per segment
    assert_eq!(flaky_provider.request_count(), 4);
}

/// A provider that never recovers fails the segment but not the run
#[tokio::test]
async fn test_run_withFailingProvider_shouldRecordFailuresAndKeepText() {
    let text = common::segmented_text();
    let outcome = common::runner_with(MockProvider::failing())
        .run(&text, &operations::translation(), 2, false, &NullTelemetry)
        .await
        .unwrap();

    assert_eq!(outcome.text, text);
    assert_eq!(
        outcome.failures.iter().map(|(path, _)| *path).collect::<Vec<_>>(),
        vec![NodePath::segment(0, 0), NodePath::segment(0, 1)]
    );
}

/// Authentication errors are not retried
#[tokio::test]
async fn test_request_withAuthFailure_shouldNotRetry() {
    let provider = MockProvider::auth_failure();
    let gateway = Gateway::new(Arc::new(provider.clone()));

    let result = gateway
        .request::<Translation>("translate", &common::fast_options(), &NullTelemetry, None)
        .await;

    assert!(matches!(result, Err(GatewayError::Provider(_))));
    assert_eq!(provider.request_count(), 1);
}

/// Answers without JSON are retried, then surface as a schema error
#[tokio::test]
async fn test_request_withMalformedAnswers_shouldFailWithSchemaError() {
    let provider = MockProvider::malformed();
    let gateway = Gateway::new(Arc::new(provider.clone()));
    let options = common::fast_options();

    let result = gateway
        .request::<Translation>("translate", &options, &NullTelemetry, None)
        .await;

    assert!(matches!(result, Err(GatewayError::ResponseSchema { .. })), "got {:?}", result);
    assert_eq!(provider.request_count(), options.schema_retries as usize + 1);
}

/// A slow call emits heartbeats under the caller's operation id
#[tokio::test]
async fn test_request_withSlowProvider_shouldEmitHeartbeats() {
    let provider = MockProvider::slow(80).with_fixed_response(r#"{"translation": "Salut"}"#);
    let gateway = Gateway::new(Arc::new(provider));
    let telemetry = MemoryTelemetry::new();
    let options = common::fast_options().with_heartbeat_interval(Duration::from_millis(15));

    let answer: Translation = gateway
        .request("translate", &options, &telemetry, Some("op-slow"))
        .await
        .unwrap();

    assert_eq!(answer.translation, "Salut");
    assert!(telemetry.heartbeat_count() >= 2, "only {} heartbeats", telemetry.heartbeat_count());
}

/// A call longer than the timeout counts as a transient failure
#[tokio::test]
async fn test_request_withTimeout_shouldExhaustRetries() {
    let provider = MockProvider::slow(200).with_fixed_response(r#"{"translation": "Salut"}"#);
    let gateway = Gateway::new(Arc::new(provider.clone()));
    let options = common::fast_options().with_timeout(Duration::from_millis(20));

    let result = gateway
        .request::<Translation>("translate", &options, &NullTelemetry, None)
        .await;

    assert!(matches!(result, Err(GatewayError::RetriesExhausted { attempts: 3, .. })), "got {:?}", result);
    assert_eq!(provider.request_count(), 3);
}

/// A configured system prompt travels with every request
#[tokio::test]
async fn test_request_withConfiguredSystemPrompt_shouldSendItToProvider() {
    let provider = MockProvider::working().with_responder(|request| match &request.system {
        Some(system) if system == "You annotate texts for learners." => r#"{"translation": "Salut"}"#.to_string(),
        _ => "no system prompt".to_string(),
    });
    let gateway = Gateway::new(Arc::new(provider.clone()));
    let config = GatewayConfig {
        system_prompt: Some("You annotate texts for learners.".to_string()),
        ..GatewayConfig::default()
    };
    let options = GatewayOptions::from_config(&config);

    let answer: Translation = gateway
        .request("translate", &options, &NullTelemetry, None)
        .await
        .unwrap();

    assert_eq!(answer.translation, "Salut");
    assert_eq!(provider.request_count(), 1);
    assert_eq!(gateway.provider_name(), "mock");
}
