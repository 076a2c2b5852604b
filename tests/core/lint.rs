#[path = "../common/mod.rs"]
mod common;

use common::{Fixture, SIGNER, cycle, task};
use govlint::core::crypto::{self, Ed25519Provider, SignatureProvider};
use govlint::core::error::LintError;
use govlint::core::findings::{Level, ValidatorKind};
use govlint::core::lint::{LintEngine, LintOptions};
use govlint::core::record::EntityType;
use govlint::core::store::{FsRecordStore, RecordEntry, RecordStore};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn engine(fx: &Fixture) -> LintEngine {
    LintEngine::new(fx.store.clone())
}

fn sequential() -> LintOptions {
    LintOptions {
        concurrent: false,
        ..LintOptions::default()
    }
}

#[test]
fn clean_root_has_no_findings() {
    let fx = Fixture::new();
    fx.put(EntityType::Task, fx.signed(EntityType::Task, json!({
        "id": "t1", "title": "T", "status": "active", "priority": "high",
        "description": "d", "cycleIds": ["c1"], "references": ["file:src/lib.rs"],
    })));
    fx.put(EntityType::Cycle, fx.signed(EntityType::Cycle, cycle("c1", &["t1"])));

    let report = engine(&fx).lint(&LintOptions::default()).expect("lint");
    assert!(report.results.is_empty(), "unexpected findings: {:?}", report.results);
    assert_eq!(report.summary.files_checked, 3);
    assert!(!report.has_errors());
    assert_eq!(report.metadata.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(report.metadata.run_id.len(), 26);
    assert!(report.metadata.timestamp.ends_with('Z'));
}

#[test]
fn concurrent_and_sequential_reports_agree() {
    let fx = Fixture::new();
    for i in 0..25 {
        let mut payload = task(&format!("t{:02}", i));
        if i % 3 == 0 {
            payload.as_object_mut().unwrap().remove("title");
        }
        fx.put(EntityType::Task, fx.signed(EntityType::Task, payload));
    }
    let engine = engine(&fx);
    let concurrent = engine
        .lint(&LintOptions {
            concurrency_limit: 4,
            ..LintOptions::default()
        })
        .expect("lint");
    let sequential = engine.lint(&sequential()).expect("lint");
    assert_eq!(concurrent.results, sequential.results);
    assert_eq!(concurrent.summary.files_checked, 26);
    assert_eq!(concurrent.summary.errors, 9);
}

#[test]
fn unreadable_records_become_findings() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.root().join("tasks")).unwrap();
    fs::write(fx.root().join("tasks").join("broken.json"), b"{ not json").unwrap();

    let report = engine(&fx).lint(&sequential()).expect("lint");
    assert_eq!(report.summary.files_checked, 2);
    assert_eq!(report.results.len(), 1);
    let finding = &report.results[0];
    assert_eq!(finding.validator, ValidatorKind::SchemaValidation);
    assert_eq!(finding.level, Level::Error);
    assert!(!finding.fixable);
    assert!(finding.message.contains("not valid JSON"));
}

#[test]
fn tampered_payload_fails_checksum_and_signature() {
    let fx = Fixture::new();
    let mut doc = fx.signed(EntityType::Task, task("t1"));
    doc["payload"]["title"] = json!("tampered");
    fx.put(EntityType::Task, doc.clone());

    let report = engine(&fx).lint(&sequential()).expect("lint");
    let kinds: Vec<_> = report.results.iter().map(|r| r.validator).collect();
    assert_eq!(kinds, vec![ValidatorKind::ChecksumVerification]);
    assert!(report.results[0].fixable);

    // Checksum refreshed by hand: only the signature is now wrong.
    doc["header"]["payloadChecksum"] = json!(crypto::payload_checksum(&doc["payload"]));
    fx.put(EntityType::Task, doc);
    let report = engine(&fx).lint(&sequential()).expect("lint");
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].validator, ValidatorKind::SignatureStructure);
    assert!(!report.results[0].fixable);

    let off = engine(&fx)
        .lint(&LintOptions {
            validate_signatures: false,
            ..sequential()
        })
        .expect("lint");
    assert!(off.results.is_empty());
}

#[test]
fn actor_resolution_runs_without_reference_validation() {
    let fx = Fixture::new();
    let other = ed25519_dalek::SigningKey::from_bytes(&[3u8; 32]);
    let payload = task("t1");
    let sig = Ed25519Provider
        .sign(&payload, &crypto::encode_signing_key(&other), "human:bob", "author", "n")
        .expect("sign");
    let mut doc = fx.signed(EntityType::Task, payload);
    doc["header"]["signatures"] = json!([sig]);
    fx.put(EntityType::Task, doc);

    let options = LintOptions {
        validate_references: false,
        ..sequential()
    };
    let report = engine(&fx).lint(&options).expect("lint");
    let kinds: Vec<_> = report.results.iter().map(|r| r.validator).collect();
    assert_eq!(kinds, vec![ValidatorKind::ActorResolution]);

    let none = engine(&fx)
        .lint(&LintOptions {
            validate_actors: false,
            ..options
        })
        .expect("lint");
    assert!(none.results.is_empty());
}

#[test]
fn lint_file_infers_type_from_directory() {
    let fx = Fixture::new();
    let path = fx.put(EntityType::Cycle, fx.signed(EntityType::Cycle, cycle("c1", &["t404"])));
    let report = engine(&fx).lint_file(&path, &sequential()).expect("lint");
    assert_eq!(report.summary.files_checked, 1);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].validator, ValidatorKind::ReferentialIntegrity);
    assert_eq!(report.results[0].entity.entity_type, EntityType::Cycle);
    assert_eq!(report.summary.warnings, 1);

    assert!(engine(&fx).lint_file(&fx.root().join("nowhere").join("x.json"), &sequential()).is_err());
}

#[test]
fn missing_file_reported_as_not_found() {
    let fx = Fixture::new();
    let engine = engine(&fx);
    let entry = RecordEntry {
        id: "ghost".to_string(),
        entity_type: EntityType::Task,
        path: fx.store.record_path(EntityType::Task, "ghost"),
    };
    let findings = engine.lint_record(&entry, &sequential());
    assert_eq!(findings.len(), 1);
    assert!(findings[0].message.starts_with("Record file not found"));
}

#[test]
fn signer_key_id_is_resolved_through_actor_records() {
    let fx = Fixture::new();
    let store: Arc<dyn RecordStore> = fx.store.clone();
    assert!(store.get(EntityType::Actor, SIGNER).is_some());
}

/// Store that resolves every path to one fixed record, whatever its directory.
struct AliasStore {
    inner: FsRecordStore,
    target: RecordEntry,
}

impl RecordStore for AliasStore {
    fn list_records(&self) -> Result<Vec<RecordEntry>, LintError> {
        self.inner.list_records()
    }

    fn record_path(&self, entity_type: EntityType, id: &str) -> PathBuf {
        self.inner.record_path(entity_type, id)
    }

    fn entry_for_path(&self, _path: &Path) -> Result<RecordEntry, LintError> {
        Ok(self.target.clone())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, LintError> {
        self.inner.read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), LintError> {
        self.inner.write(path, bytes)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), LintError> {
        self.inner.copy(from, to)
    }
}

#[test]
fn lint_file_resolves_entries_through_the_injected_store() {
    let fx = Fixture::new();
    let path = fx.put(EntityType::Task, fx.signed(EntityType::Task, task("t1")));
    let store = AliasStore {
        inner: FsRecordStore::new(fx.root()),
        target: RecordEntry {
            id: "t1".to_string(),
            entity_type: EntityType::Task,
            path,
        },
    };

    // `inbox/` is no entity directory; only the store knows what it holds.
    let report = LintEngine::new(Arc::new(store))
        .lint_file(Path::new("inbox/anything.json"), &sequential())
        .expect("lint file");
    assert_eq!(report.summary.files_checked, 1);
    assert!(report.results.is_empty(), "{:?}", report.results);
}
