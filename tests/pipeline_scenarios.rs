//! End-to-end turns through the deterministic agent.
//!
//! The container engine, vector index and completion model are replaced by
//! the fakes in `common::fakes`; everything else (descriptor, retriever,
//! code generator, executor, object store, renderer) is the real code.

mod common;

use pretty_assertions::assert_eq;

use cadforge::dxf::{describe_file, describe_text, apply_filters, FilterConfig};
use cadforge::pipeline::{PipelineState, Role, TurnOutcome};
use cadforge::progress::noop_progress;
use cadforge::storage::{is_valid_key, key_from_reference, mime_for, URL_PREFIX};

use common::fixtures::{annotated_drawing, large_drawing, small_drawing, BROKEN_SCRIPT, GOOD_SCRIPT};
use common::{RunBehavior, TestHarness};

#[tokio::test]
async fn test_happy_path_small_drawing() {
    let harness = TestHarness::new();
    let dxf = harness.write_file("bracket.dxf", &small_drawing());

    let mut state = PipelineState::new("Build this bracket, 4 mm thick")
        .unwrap()
        .with_dxf(dxf);
    let report = harness
        .agent
        .run_turn(&mut state, noop_progress().as_ref())
        .await;

    // Descriptor: detailed branch, one line per entity
    let geometry = state.geometry.as_deref().unwrap();
    assert!(geometry.contains("## Entities\n"));
    assert!(!geometry.contains("## Entity Groups"));
    assert_eq!(geometry.matches("LINE on layer 'geom'").count(), 3);
    assert_eq!(geometry.matches("CIRCLE on layer 'geom'").count(), 1);

    // Retriever: exactly four hits, best first
    let context = state.semantic_context.as_deref().unwrap();
    assert_eq!(context.matches("prompt: ").count(), 4);
    let best = context.find("example part 3").unwrap();
    let worst = context.find("example part 0").unwrap();
    assert!(best < worst, "hits must be in descending similarity order");

    // Executor: one run, one stored .vtp
    assert_eq!(harness.runner.executor_runs(), 1);
    assert_eq!(report.executor_calls, 1);
    let url = report.url().expect("completed turn has a URL");
    assert!(url.starts_with(URL_PREFIX));
    let key = key_from_reference(url);
    assert!(is_valid_key(key), "unexpected key layout: {}", key);
    assert!(key.ends_with(".vtp"));
    assert!(harness.object_path(key).is_file());

    assert!(report.reply.contains(url));
    assert_eq!(state.final_reply(), Some(report.reply.as_str()));
}

#[tokio::test]
async fn test_generation_prompt_carries_geometry_and_examples() {
    let harness = TestHarness::new();
    let dxf = harness.write_file("bracket.dxf", &small_drawing());

    let mut state = PipelineState::new("Build this bracket").unwrap().with_dxf(dxf);
    harness
        .agent
        .run_turn(&mut state, noop_progress().as_ref())
        .await;

    let requests = harness.completion.requests();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].prompt;
    assert!(prompt.contains("Build this bracket"));
    assert!(prompt.contains("CIRCLE on layer 'geom'"));
    assert!(prompt.contains("example part 3"));
    assert!(requests[0].temperature <= 0.1);
}

#[tokio::test]
async fn test_grouped_description() {
    let harness = TestHarness::new();
    let dxf = harness.write_file("plate.dxf", &large_drawing());

    let summary = describe_file(&dxf, &FilterConfig::default()).unwrap();
    assert!(summary.grouped);
    assert_eq!(summary.retained_entities, 45);
    assert!(summary.document.contains("## Entity Groups"));
    assert!(!summary.document.contains("## Entities\n"));

    let groups: Vec<&str> = summary
        .document
        .split("## Entity Groups\n")
        .nth(1)
        .unwrap()
        .lines()
        .take_while(|l| !l.is_empty())
        .collect();
    assert_eq!(groups.len(), 2, "one group per (type, layer): {:?}", groups);
    // 40 chained lines share endpoints: 41 distinct, not fewer
    assert!(groups.iter().any(|g| g.contains("40 lines")));
    assert!(summary.document.contains("connected segments: no"));

    let mut state = PipelineState::new("Build this plate").unwrap().with_dxf(dxf);
    let report = harness
        .agent
        .run_turn(&mut state, noop_progress().as_ref())
        .await;
    assert!(report.url().is_some());
    assert!(harness.completion.requests()[0]
        .prompt
        .contains("## Entity Groups"));
}

#[tokio::test]
async fn test_single_repair() {
    let harness = TestHarness::builder()
        .runs([
            RunBehavior::Fail {
                exit_code: 1,
                stderr: "NameError: name 'hieght' is not defined".into(),
            },
            RunBehavior::WriteArtifact,
        ])
        .replies(&[BROKEN_SCRIPT, GOOD_SCRIPT])
        .build();
    let dxf = harness.write_file("bracket.dxf", &small_drawing());

    let mut state = PipelineState::new("Build this bracket").unwrap().with_dxf(dxf);
    let report = harness
        .agent
        .run_turn(&mut state, noop_progress().as_ref())
        .await;

    assert!(matches!(report.outcome, TurnOutcome::Completed { .. }));
    assert_eq!(report.executor_calls, 2);
    assert_eq!(harness.runner.executor_runs(), 2);

    let requests = harness.completion.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].prompt.contains("hieght"));
    assert!(requests[1].prompt.contains("NameError: name 'hieght' is not defined"));
    assert!(requests[1].prompt.contains(BROKEN_SCRIPT.trim()));

    assert!(state
        .messages
        .iter()
        .any(|m| m.role == Role::Tool && m.content.starts_with("ERROR [CONTAINER_FAILURE]")));
    assert!(state.last_failure.is_none());
    assert_eq!(report.reply.matches(URL_PREFIX).count(), 1);
}

#[tokio::test]
async fn test_unrecoverable_no_artifact() {
    let harness = TestHarness::builder()
        .runs([RunBehavior::WriteNothing, RunBehavior::WriteNothing])
        .build();
    let dxf = harness.write_file("bracket.dxf", &small_drawing());

    let mut state = PipelineState::new("Build this bracket").unwrap().with_dxf(dxf);
    let report = harness
        .agent
        .run_turn(&mut state, noop_progress().as_ref())
        .await;

    match &report.outcome {
        TurnOutcome::Failed { label, .. } => assert_eq!(label, "NO_ARTIFACT"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report.executor_calls, 2);
    assert_eq!(harness.runner.executor_runs(), 2);
    assert!(report.url().is_none());
    assert!(state.artifact.is_none());
    assert!(!report.reply.contains(URL_PREFIX));
    assert!(report.reply.contains("NO_ARTIFACT"));
    assert_eq!(state.messages.last().unwrap().role, Role::Assistant);
}

#[tokio::test]
async fn test_preview_capture() {
    let harness = TestHarness::builder().render(true).build();
    let dxf = harness.write_file("bracket.dxf", &small_drawing());

    let mut state = PipelineState::new("Build this bracket").unwrap().with_dxf(dxf);
    let report = harness
        .agent
        .run_turn(&mut state, noop_progress().as_ref())
        .await;

    let TurnOutcome::Completed { previews, .. } = &report.outcome else {
        panic!("expected completion, got {:?}", report.outcome);
    };
    assert_eq!(previews.len(), 6);
    for url in previews {
        let key = key_from_reference(url);
        assert!(key.ends_with(".png"));
        let bytes = std::fs::read(harness.object_path(key)).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }
    for url in previews {
        assert!(report.reply.contains(url.as_str()));
    }
}

#[tokio::test]
async fn test_preview_frame_names() {
    let harness = TestHarness::builder().render(true).build();
    let dxf = harness.write_file("bracket.dxf", &small_drawing());
    let mut state = PipelineState::new("Build this bracket").unwrap().with_dxf(dxf);
    harness
        .agent
        .run_turn(&mut state, noop_progress().as_ref())
        .await;

    let mut names: Vec<String> = std::fs::read_dir(state.workdir().join("previews"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    let suffixes = [
        "_1_front.png",
        "_2_back-top-right.png",
        "_3_left.png",
        "_4_front-bot-left.png",
        "_5_back-bot-left.png",
        "_6_bottom.png",
    ];
    assert_eq!(names.len(), 6);
    for (name, suffix) in names.iter().zip(suffixes) {
        assert!(name.ends_with(suffix), "{} should end with {}", name, suffix);
    }
}

#[test]
fn test_filter_equivalence() {
    let text = annotated_drawing();

    let unfiltered = describe_text("annotated.dxf", &text, &FilterConfig::all()).unwrap();
    assert_eq!(unfiltered.retained_entities, 6);
    let refiltered = apply_filters(unfiltered.entities, &FilterConfig::default());
    let refiltered_ids: Vec<&str> = refiltered.retained.iter().map(|e| e.id.as_str()).collect();

    let direct = describe_text("annotated.dxf", &text, &FilterConfig::default()).unwrap();
    assert_eq!(refiltered_ids, direct.entity_ids());
    assert_eq!(direct.entity_ids(), vec!["B1", "B3", "B6"]);
}

#[tokio::test]
async fn test_dwg_attachment_is_converted() {
    let harness = TestHarness::builder()
        .runs([RunBehavior::Convert(small_drawing()), RunBehavior::WriteArtifact])
        .build();
    let stored = harness
        .store
        .upload_new("dwg", b"AC1032 fake drawing".to_vec(), mime_for("dwg"))
        .await
        .unwrap();

    let mut state = PipelineState::new("Build this bracket")
        .unwrap()
        .with_drawing_key(stored.url.clone());
    let report = harness
        .agent
        .run_turn(&mut state, noop_progress().as_ref())
        .await;

    assert!(report.url().is_some(), "reply: {}", report.reply);
    let specs = harness.runner.specs();
    assert_eq!(specs[0].argv[0], "dwg2dxf");
    assert!(state.dxf_path.as_ref().unwrap().ends_with(
        format!("{}.dxf", stored.key.rsplit('/').next().unwrap().trim_end_matches(".dwg"))
    ));
    assert_eq!(
        state.geometry.as_deref().unwrap().matches(" on layer 'geom'").count(),
        4
    );
}

#[tokio::test]
async fn test_request_without_drawing() {
    let harness = TestHarness::new();
    let mut state = PipelineState::new("A 20 mm cube with a 5 mm through hole").unwrap();
    let report = harness
        .agent
        .run_turn(&mut state, noop_progress().as_ref())
        .await;

    assert!(report.url().is_some());
    assert!(state.geometry.is_none());
    assert!(harness.runner.specs().iter().all(|s| s.argv[0] == "python3"));
}
