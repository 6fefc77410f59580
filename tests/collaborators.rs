#[path = "common/mod.rs"]
mod common;

use anyhow::{bail, Result};
use common::*;
use pqpack::{
    build_request, parse_classification, upload_file, upload_outputs, ChatClassifier, ChatRequest, Classifier,
    ErrorKind, IdlePolicy, LocalDirStore, ObjectStore, StaticSamples, UtilizationSource,
};
use std::cell::Cell;
use std::fs;
use std::time::Duration;

/// Requests carry the system prompt, a `TEXT:`-prefixed user turn and `stream: false`,
/// and serialise to the chat API shape.
#[test]
fn build_request_shapes_chat_payload() {
    let req = build_request("tiny-model", "classify this", "great service");
    let json = serde_json::to_value(&req).unwrap();

    assert_eq!(json["model"], "tiny-model");
    assert_eq!(json["stream"], false);
    assert_eq!(json["messages"][0]["role"], "system");
    assert_eq!(json["messages"][0]["content"], "classify this");
    assert_eq!(json["messages"][1]["role"], "user");
    assert_eq!(json["messages"][1]["content"], "TEXT:great service");
}

/// The verdict is the first JSON object in the reply, keyed `label` or `sentiment`;
/// surrounding chatter and string confidences are tolerated.
#[test]
fn parse_classification_extracts_first_object() {
    let c = parse_classification("Sure! {\"label\": \"Loan\", \"confidence\": 0.9, \"reason\": \"asks about rates\"} done").unwrap();
    assert_eq!(c.label, "Loan");
    assert_eq!(c.confidence, Some(0.9));
    assert_eq!(c.reason.as_deref(), Some("asks about rates"));

    let c = parse_classification("```\n{\"sentiment\": \" Positive \", \"confidence\": \"0.75\"}\n```").unwrap();
    assert_eq!(c.label, "Positive");
    assert_eq!(c.confidence, Some(0.75));
    assert_eq!(c.reason, None);

    assert!(parse_classification("no verdict here").is_err());
    assert!(parse_classification("{\"confidence\": 1}").is_err());
}

/// A classifier sends one request per text through the injected backend.
#[test]
fn chat_classifier_uses_backend() {
    let calls = Cell::new(0);
    let backend = |req: &ChatRequest| -> Result<String> {
        calls.set(calls.get() + 1);
        if req.messages[1].content.contains("awful") {
            Ok("{\"sentiment\": \"Negative\"}".to_string())
        } else {
            Ok("{\"sentiment\": \"Positive\"}".to_string())
        }
    };
    let classifier = ChatClassifier::new(backend, "m", "prompt");

    assert_eq!(classifier.classify("awful queue").unwrap().label, "Negative");
    assert_eq!(classifier.classify("lovely app").unwrap().label, "Positive");
    assert_eq!(calls.get(), 2);

    let failing = ChatClassifier::new(|_: &ChatRequest| -> Result<String> { bail!("connection refused") }, "m", "p");
    assert!(failing.classify("x").is_err());
}

/// The local store writes objects under its root, creating nested prefixes, and refuses
/// keys that would escape it.
#[test]
fn local_store_puts_objects_under_root() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalDirStore::new(dir.path().join("bucket"));

    store.put_object(b"hello", "reports/2024/a.txt").unwrap();
    assert_eq!(fs::read(dir.path().join("bucket/reports/2024/a.txt")).unwrap(), b"hello");
    store.put_object(b"again", "reports/2024/a.txt").unwrap();
    assert_eq!(fs::read(dir.path().join("bucket/reports/2024/a.txt")).unwrap(), b"again");
    assert!(!dir.path().join("bucket/reports/2024/_staging").exists());

    for bad in ["../outside", "/abs/key", ""] {
        let err = store.put_object(b"x", bad).unwrap_err();
        assert_eq!(ErrorKind::classify(&err), ErrorKind::Config, "key {bad:?}");
    }
}

/// Uploading outputs keys each file by prefix and file name.
#[test]
fn upload_outputs_keys_by_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("x_final_part0001.parquet");
    let b = dir.path().join("x_final_part0002.parquet");
    write_text(&a, "one");
    write_text(&b, "two");
    let store = LocalDirStore::new(dir.path().join("bucket"));

    let keys = upload_outputs(&store, &[a.clone(), b.clone()], "/exports/x/").unwrap();
    assert_eq!(keys, vec!["exports/x/x_final_part0001.parquet", "exports/x/x_final_part0002.parquet"]);
    assert_eq!(fs::read_to_string(store.root().join(&keys[1])).unwrap(), "two");

    upload_file(&store, &a, "single.parquet").unwrap();
    assert!(store.root().join("single.parquet").exists());
    assert!(upload_file(&store, &dir.path().join("missing"), "k").is_err());
}

struct Failing;

impl UtilizationSource for Failing {
    fn average_utilization(&self, _window: Duration) -> Result<Option<f64>> {
        bail!("metrics unavailable")
    }
}

/// Idle means a window average strictly below the threshold; no samples counts as idle
/// and source errors propagate.
#[test]
fn idle_policy_thresholds() {
    let policy = IdlePolicy::default();
    assert_eq!(policy.threshold_percent, 5.0);
    assert_eq!(policy.window, Duration::from_secs(3600));

    assert!(policy.is_idle(&StaticSamples(vec![1.0, 2.0, 3.0])).unwrap());
    assert!(!policy.is_idle(&StaticSamples(vec![4.0, 6.0])).unwrap());
    assert!(!policy.is_idle(&StaticSamples(vec![5.0])).unwrap());
    assert!(policy.is_idle(&StaticSamples(Vec::new())).unwrap());
    assert!(policy.is_idle(&Failing).is_err());
}
