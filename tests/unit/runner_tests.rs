/*!
 * Tests for the operation runner over the generative annotator
 */

use serde_json::json;
use std::time::Duration;

use annotext::annotation::{operations, CancelPolicy, RunControl};
use annotext::document::{NodePath, Page, Segment, Text, Token};
use annotext::errors::PipelineError;
use annotext::providers::mock::MockProvider;
use annotext::telemetry::NullTelemetry;

use crate::common;

/// Re-running translation without force issues no calls and changes nothing
#[tokio::test]
async fn test_run_withTranslationAlreadyPresent_shouldMakeNoCalls() {
    let provider = common::scripted_provider();
    let runner = common::runner_with(provider.clone());
    let spec = operations::translation();

    let first = runner.run(&common::segmented_text(), &spec, 4, false, &NullTelemetry).await.unwrap();
    let calls_after_first = provider.request_count();
    let second = runner.run(&first.text, &spec, 4, false, &NullTelemetry).await.unwrap();

    assert_eq!(calls_after_first, 2);
    assert_eq!(provider.request_count(), calls_after_first);
    assert_eq!(second.text, first.text);
    assert_eq!(second.dispatched, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(
        second.text.segment(NodePath::segment(0, 1)).unwrap().annotation("translation"),
        Some(&json!("[fr]The boy's name was Will."))
    );
}

/// Force redoes the work and may replace the value
#[tokio::test]
async fn test_run_withForce_shouldRequestAgain() {
    let provider = common::scripted_provider();
    let runner = common::runner_with(provider.clone());
    let spec = operations::translation();

    let first = runner.run(&common::segmented_text(), &spec, 4, false, &NullTelemetry).await.unwrap();
    let forced = runner.run(&first.text, &spec, 4, true, &NullTelemetry).await.unwrap();

    assert_eq!(provider.request_count(), 4);
    assert_eq!(forced.dispatched, 2);
    assert_eq!(forced.text, first.text);
}

/// Completion order does not affect where results land
#[tokio::test]
async fn test_run_withRandomLatency_shouldKeepDocumentOrder() {
    let text = common::numbered_text(24);
    let provider = MockProvider::random_delay(20).with_responder(common::scripted::respond);

    let outcome = common::runner_with(provider)
        .run(&text, &operations::translation(), 8, false, &NullTelemetry)
        .await
        .unwrap();

    for (path, segment) in outcome.text.segments() {
        let expected = format!("[fr]word{}.", path.segment);
        assert_eq!(segment.annotation("translation"), Some(&json!(expected)), "at {}", path);
    }
}

/// Every token of an expression ends up with the same lemma and gloss
#[tokio::test]
async fn test_lemmaAndGloss_withExpression_shouldShareValuesAcrossMembers() {
    let provider = common::scripted_provider();
    let runner = common::runner_with(provider.clone());

    let lemmas = runner.run(&common::mwe_text(), &operations::lemma(), 2, false, &NullTelemetry).await.unwrap();
    let glosses = runner.run(&lemmas.text, &operations::gloss(), 2, false, &NullTelemetry).await.unwrap();
    let text = glosses.text;

    let member = |index: usize| text.token(NodePath::token(0, 0, index)).unwrap();
    for key in ["lemma", "gloss"] {
        let first = member(2).annotation(key).cloned();
        assert!(first.is_some(), "{} missing", key);
        assert_eq!(member(4).annotation(key).cloned(), first, "{} differs on 'up'", key);
        assert_eq!(member(6).annotation(key).cloned(), first, "{} differs on 'with'", key);
    }
    assert_eq!(member(2).annotation("lemma"), Some(&json!("put up with")));
    assert_eq!(member(10).annotation("gloss"), Some(&json!("gloss(noise)")));
    // Whitespace and punctuation stay bare
    assert!(member(1).annotation("lemma").is_none());
    assert!(member(11).annotation("gloss").is_none());
    // One request per operation for the single segment
    assert_eq!(provider.request_count(), 2);
}

/// Unit operations refuse segments that have not been through expression detection
#[tokio::test]
async fn test_lemma_withoutExpressionPass_shouldFailSegment() {
    let text = common::numbered_text(1);
    let outcome = common::runner_with(common::scripted_provider())
        .run(&text, &operations::lemma(), 1, false, &NullTelemetry)
        .await
        .unwrap();

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.text, text);
}

/// A tokenization answer that rewrites the text aborts the run and keeps the input
#[tokio::test]
async fn test_tokenize_withRewrittenTokens_shouldAbortWithInputUnchanged() {
    let provider = MockProvider::working().with_responder(|request| {
        if request.prompt.contains("The boy") {
            r#"{"tokens": ["The", " ", "girl"]}"#.to_string()
        } else {
            common::scripted::respond(request)
        }
    });
    let text = common::segmented_text();

    let err = common::runner_with(provider)
        .run(&text, &operations::tokenize(), 2, false, &NullTelemetry)
        .await
        .unwrap_err();

    match err {
        PipelineError::OperationAborted { failed_paths, partial, .. } => {
            let paths: Vec<NodePath> = failed_paths.iter().map(|(path, _)| *path).collect();
            assert_eq!(paths, vec![NodePath::segment(0, 1)]);
            assert_eq!(*partial, text);
        }
        other => panic!("expected OperationAborted, got {:?}", other),
    }
}

/// A deadline with the abandon policy returns what finished
#[tokio::test]
async fn test_run_withDeadlineAndAbandon_shouldReturnCancelledPartial() {
    let text = common::numbered_text(6);
    let provider = MockProvider::slow(300).with_responder(common::scripted::respond);
    let control = RunControl::new()
        .with_timeout(Duration::from_millis(50))
        .with_policy(CancelPolicy::Abandon);

    let err = common::runner_with(provider)
        .run_with_control(&text, &operations::translation(), 2, false, &NullTelemetry, &control)
        .await
        .unwrap_err();

    match err {
        PipelineError::Cancelled { pending_paths, partial, .. } => {
            assert_eq!(pending_paths.len(), 6);
            assert_eq!(*partial, text);
        }
        other => panic!("expected Cancelled, got {:?}", other),
    }
}

fn untokenized(count: usize) -> Text {
    let segments = (0..count).map(|i| Segment::new(format!("Line {}.", i))).collect();
    Text::new("en", vec![Page::from_segments(segments)]).unwrap()
}

fn rewriting_tokenizer() -> MockProvider {
    MockProvider::working().with_responder(|request| {
        if common::scripted::operation_of(&request.prompt) == "tokenize" {
            r#"{"tokens": ["Something", " ", "else"]}"#.to_string()
        } else {
            common::scripted::respond(request)
        }
    })
}

/// After the first failed segment nothing else is sent to the service
#[tokio::test]
async fn test_tokenize_withFirstSegmentFailing_shouldStopSendingRequests() {
    // Calls spent on one failing segment, schema retries included
    let single = rewriting_tokenizer();
    let _ = common::runner_with(single.clone())
        .run(&untokenized(1), &operations::tokenize(), 1, false, &NullTelemetry)
        .await;
    let per_segment = single.request_count();
    assert!(per_segment >= 1);

    let provider = rewriting_tokenizer();
    let err = common::runner_with(provider.clone())
        .run(&untokenized(6), &operations::tokenize(), 1, false, &NullTelemetry)
        .await
        .unwrap_err();

    match err {
        PipelineError::OperationAborted { failed_paths, partial, .. } => {
            assert_eq!(failed_paths.len(), 1);
            assert_eq!(failed_paths[0].0, NodePath::segment(0, 0));
            assert_eq!(*partial, untokenized(6));
        }
        other => panic!("expected OperationAborted, got {:?}", other),
    }
    assert_eq!(provider.request_count(), per_segment);
}

/// A segment whose answer clashes with an existing value fails alone
#[tokio::test]
async fn test_lemma_withConflictingExistingValue_shouldFailOnlyThatSegment() {
    let surfaces = ["She", " ", "put", " ", "up", " ", "with", " ", "the", " ", "noise", "."];
    let tokens = surfaces
        .iter()
        .enumerate()
        .map(|(i, surface)| match i {
            2 => Token::new(*surface).with_annotation("mwe_id", json!("m1")).with_annotation("lemma", json!("put")),
            4 | 6 => Token::new(*surface).with_annotation("mwe_id", json!("m1")),
            _ => Token::new(*surface),
        })
        .collect();
    let clashing = Segment::from_tokens(tokens)
        .with_annotation("mwes", json!([{ "id": "m1", "tokens": [2, 4, 6], "label": "put up with" }]));
    let plain = Segment::from_tokens(vec![Token::new(" "), Token::new("Hi"), Token::new(".")])
        .with_annotation("mwes", json!([]));
    let text = Text::new("en", vec![Page::from_segments(vec![clashing, plain])]).unwrap();

    let outcome = common::runner_with(common::scripted_provider())
        .run(&text, &operations::lemma(), 2, false, &NullTelemetry)
        .await
        .unwrap();

    let failed: Vec<NodePath> = outcome.failures.iter().map(|(path, _)| *path).collect();
    assert_eq!(failed, vec![NodePath::segment(0, 0)]);
    assert_eq!(
        outcome.text.token(NodePath::token(0, 1, 1)).unwrap().annotation("lemma"),
        Some(&json!("hi"))
    );
    // The clashing segment is left exactly as it was
    assert_eq!(
        outcome.text.segment(NodePath::segment(0, 0)),
        text.segment(NodePath::segment(0, 0))
    );
}

/// A forced expression pass that finds a different span leaves no old ids behind
#[tokio::test]
async fn test_mwe_withForceAndNewSpan_shouldDropStaleMemberIds() {
    let provider = MockProvider::working().with_fixed_response(r#"{"mwes": [{"id": "1", "tokens": [8, 10]}]}"#);
    let outcome = common::runner_with(provider)
        .run(&common::mwe_text(), &operations::mwe(), 1, true, &NullTelemetry)
        .await
        .unwrap();

    let text = outcome.text;
    for index in [2, 4, 6] {
        assert!(text.token(NodePath::token(0, 0, index)).unwrap().annotation("mwe_id").is_none());
    }
    let the = text.token(NodePath::token(0, 0, 8)).unwrap().annotation("mwe_id").cloned();
    assert!(the.is_some());
    assert_eq!(text.token(NodePath::token(0, 0, 10)).unwrap().annotation("mwe_id").cloned(), the);

    let spans = text.segment(NodePath::segment(0, 0)).unwrap().annotation("mwes").unwrap();
    assert_eq!(spans.as_array().unwrap().len(), 1);
    assert_eq!(spans[0]["label"], json!("the noise"));
    // Upstream results are untouched
    assert_eq!(
        text.segment(NodePath::segment(0, 0)).unwrap().annotation("translation"),
        Some(&json!("Elle a supporté le bruit."))
    );
}
