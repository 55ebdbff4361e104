/*!
 * Integration tests for application lifecycle
 */

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;

use annotext::annotation::RunControl;
use annotext::app_controller::{describe_failure, Controller, RunRequest};
use annotext::document::{NodePath, Text};
use annotext::pipeline::Stage;
use annotext::providers::mock::MockProvider;
use annotext::telemetry::NullTelemetry;

use crate::common;

fn controller(cache_dir: &std::path::Path, provider: MockProvider) -> Result<Controller> {
    Controller::with_provider(common::offline_config(cache_dir), Arc::new(provider))
}

fn read_document(path: &std::path::Path) -> Result<Text> {
    Ok(Text::from_json(&std::fs::read_to_string(path)?)?)
}

/// Test the controller initialization with an offline config
#[test]
fn test_controller_initialization_withOfflineConfig_shouldSucceed() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = controller(temp_dir.path(), common::scripted_provider())?;
    assert_eq!(controller.config().source_language, "en");
    Ok(())
}

/// A plain text file is annotated end to end and written next to the input
#[tokio::test]
async fn test_run_withTextFile_shouldWriteAnnotatedDocument() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "story.txt", common::SCENARIO_A)?;
    let controller = controller(&temp_dir.path().join("audio"), common::scripted_provider())?;

    let report = controller
        .run(&input, &RunRequest::default(), &NullTelemetry, &RunControl::new())
        .await?
        .expect("a report for a fresh output");

    let output = temp_dir.path().join("story.annotated.json");
    let saved = read_document(&output)?;
    assert_eq!(saved, report.text);
    assert_eq!(saved.surface(), common::SCENARIO_A);
    assert_eq!(saved.title(), Some("Scripted"));
    let boy = saved.token(NodePath::token(0, 0, 2)).unwrap();
    assert!(boy.annotation("gloss").is_some());
    assert!(boy.annotation("audio").is_some());
    Ok(())
}

/// Existing outputs are left alone unless overwriting is requested
#[test]
fn test_run_withExistingOutput_shouldSkipWithoutOverwrite() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "story.txt", "Hello there.")?;
    common::create_test_file(temp_dir.path(), "story.annotated.json", "{}")?;
    let provider = common::scripted_provider();
    let controller = controller(&temp_dir.path().join("audio"), provider.clone())?;

    let (skipped, report) = tokio_test::block_on(async {
        let skipped = controller
            .run(&input, &RunRequest::default(), &NullTelemetry, &RunControl::new())
            .await?;
        let request = RunRequest {
            overwrite: true,
            end: Stage::Translation,
            ..RunRequest::default()
        };
        let report = controller.run(&input, &request, &NullTelemetry, &RunControl::new()).await?;
        anyhow::Ok((skipped, report))
    })?;

    assert!(skipped.is_none());
    assert!(report.is_some());
    assert!(provider.request_count() > 0);
    assert!(read_document(&temp_dir.path().join("story.annotated.json")).is_ok());
    Ok(())
}

/// A saved document resumes in place from a later stage
#[tokio::test]
async fn test_run_withSavedDocument_shouldResumeInPlace() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "story.txt", common::SCENARIO_A)?;
    let controller = controller(&temp_dir.path().join("audio"), common::scripted_provider())?;

    let first = RunRequest {
        end: Stage::SegmentationPhase2,
        ..RunRequest::default()
    };
    controller.run(&input, &first, &NullTelemetry, &RunControl::new()).await?;
    let saved = temp_dir.path().join("story.annotated.json");
    assert!(read_document(&saved)?.segments().all(|(_, s)| s.annotation("translation").is_none()));

    let resume = RunRequest {
        start: Stage::Translation,
        end: Stage::Translation,
        ..RunRequest::default()
    };
    controller.run(&saved, &resume, &NullTelemetry, &RunControl::new()).await?;

    let resumed = read_document(&saved)?;
    assert_eq!(
        resumed.segment(NodePath::segment(0, 1)).unwrap().annotation("translation"),
        Some(&json!("[fr]The boy's name was Will."))
    );
    Ok(())
}

/// An aborted stage still leaves the last consistent document on disk
#[tokio::test]
async fn test_run_withAbortedTokenization_shouldWritePartialDocument() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "story.txt", common::SCENARIO_A)?;
    let provider = MockProvider::working().with_responder(|request| {
        if common::scripted::operation_of(&request.prompt) == "tokenize" {
            r#"{"tokens": ["nothing", "like", "it"]}"#.to_string()
        } else {
            common::scripted::respond(request)
        }
    });
    let controller = controller(&temp_dir.path().join("audio"), provider)?;

    let err = controller
        .run(&input, &RunRequest::default(), &NullTelemetry, &RunControl::new())
        .await
        .unwrap_err();

    assert!(describe_failure(&err).contains("tokenize aborted"), "{}", describe_failure(&err));
    let partial = read_document(&temp_dir.path().join("story.annotated.json"))?;
    assert_eq!(partial.segment_count(), 2);
    assert!(partial.segments().all(|(_, s)| !s.is_tokenized()));
    Ok(())
}

/// Every text file under a directory is processed
#[tokio::test]
async fn test_run_folder_withTwoFiles_shouldProcessBoth() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let nested = temp_dir.path().join("chapters");
    std::fs::create_dir_all(&nested)?;
    common::create_test_file(temp_dir.path(), "one.txt", "First line.")?;
    common::create_test_file(&nested, "two.txt", "Second line.")?;
    common::create_test_file(temp_dir.path(), "notes.md", "Not a text input.")?;
    let controller = controller(&temp_dir.path().join("audio"), common::scripted_provider())?;

    let request = RunRequest {
        end: Stage::Translation,
        ..RunRequest::default()
    };
    let processed = controller
        .run_folder(temp_dir.path(), &request, &NullTelemetry, &RunControl::new())
        .await?;

    assert_eq!(processed, 2);
    assert!(temp_dir.path().join("one.annotated.json").exists());
    assert!(nested.join("two.annotated.json").exists());
    Ok(())
}

/// A description becomes a generated, annotated document at the requested path
#[tokio::test]
async fn test_generate_withDescription_shouldWriteAnnotatedDocument() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let provider = common::scripted_provider();
    let controller = controller(&temp_dir.path().join("audio"), provider.clone())?;
    let output = temp_dir.path().join("fox.annotated.json");
    let request = RunRequest {
        end: Stage::Translation,
        output: Some(output.clone()),
        ..RunRequest::default()
    };

    let report = controller
        .generate("a fox in winter", &request, &NullTelemetry, &RunControl::new())
        .await?
        .expect("a report for a fresh output");

    let saved = read_document(&output)?;
    assert_eq!(saved, report.text);
    assert_eq!(saved.surface(), "This is a story about a fox in winter. It ends by the sea.");
    assert_eq!(saved.title(), Some("Generated"));
    assert!(saved.segment(NodePath::segment(0, 0)).unwrap().annotation("translation").is_some());

    // Generation always starts at segmentation
    let late = RunRequest {
        start: Stage::Lemma,
        output: Some(temp_dir.path().join("late.annotated.json")),
        ..RunRequest::default()
    };
    let calls = provider.request_count();
    assert!(controller.generate("a fox", &late, &NullTelemetry, &RunControl::new()).await.is_err());
    assert_eq!(provider.request_count(), calls);
    Ok(())
}
