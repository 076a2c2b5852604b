#[path = "../common/mod.rs"]
mod common;

use common::{CountingStore, Fixture, SIGNER, task};
use govlint::core::crypto::{Ed25519Provider, SignatureProvider, payload_checksum};
use govlint::core::findings::{FixReport, LintReport, ValidatorKind};
use govlint::core::fix::{FixOptions, RepairEngine};
use govlint::core::lint::{LintEngine, LintOptions};
use govlint::core::record::EntityType;
use govlint::core::store::{FsRecordStore, RecordStore};
use serde_json::json;
use std::fs;
use std::sync::Arc;

fn options() -> LintOptions {
    LintOptions {
        concurrent: false,
        ..LintOptions::default()
    }
}

fn lint_and_fix(store: Arc<dyn RecordStore>, fix: &FixOptions) -> (LintReport, FixReport) {
    let mut report = LintEngine::new(store.clone()).lint(&options()).expect("lint");
    let fixes = RepairEngine::new(store).fix(&report, fix);
    report.mark_fixed(&fixes);
    (report, fixes)
}

#[test]
fn checksum_repair_backs_up_and_marks_fixed() {
    let fx = Fixture::new();
    let mut doc = fx.signed(EntityType::Task, task("t1"));
    doc["header"]["payloadChecksum"] = json!("0".repeat(64));
    let path = fx.put(EntityType::Task, doc);

    let (report, fixes) = lint_and_fix(fx.store.clone(), &FixOptions::default());
    assert_eq!(fixes.summary.fixed, 1);
    assert_eq!(fixes.summary.failed, 0);
    assert_eq!(fixes.summary.backups_created, 1);
    let fix = &fixes.fixes[0];
    assert_eq!(fix.validator, ValidatorKind::ChecksumVerification);
    let backup = fix.backup_path.as_ref().expect("backup path");
    assert!(backup.starts_with(&path.display().to_string()));
    assert!(fs::metadata(backup).is_ok());
    assert!(report.results.iter().all(|r| r.fixed == Some(true)));

    let repaired = fx.read(&path);
    assert_eq!(
        repaired["header"]["payloadChecksum"],
        json!(payload_checksum(&repaired["payload"]))
    );
    let again = LintEngine::new(fx.store.clone()).lint(&options()).expect("lint");
    assert!(again.results.is_empty(), "{:?}", again.results);
}

#[test]
fn dry_run_touches_nothing() {
    let fx = Fixture::new();
    let mut doc = fx.signed(EntityType::Task, task("t1"));
    doc["header"]["payloadChecksum"] = json!("0".repeat(64));
    let path = fx.put(EntityType::Task, doc);
    let before = fs::read(&path).unwrap();

    let dry = FixOptions {
        dry_run: true,
        ..FixOptions::default()
    };
    let (report, fixes) = lint_and_fix(fx.store.clone(), &dry);
    assert_eq!(fixes.fixes.len(), 1);
    assert!(fixes.fixes[0].success);
    assert!(fixes.fixes[0].dry_run);
    assert!(fixes.fixes[0].action.starts_with("would "));
    assert_eq!(fixes.summary.fixed, 0);
    assert_eq!(fixes.summary.backups_created, 0);
    assert!(report.results.iter().all(|r| r.fixed.is_none()));
    assert_eq!(fs::read(&path).unwrap(), before);
    assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
}

#[test]
fn missing_private_key_fails_and_restores() {
    let fx = Fixture::new();
    let mut payload = task("t1");
    payload["legacyField"] = json!(true);
    let path = fx.put(EntityType::Task, fx.signed(EntityType::Task, payload));
    let before = fs::read(&path).unwrap();

    let only_embedded = FixOptions {
        fix_types: Some(vec![ValidatorKind::EmbeddedMetadataStructure]),
        ..FixOptions::default()
    };
    let (_, fixes) = lint_and_fix(fx.store.clone(), &only_embedded);
    assert_eq!(fixes.summary.failed, 1);
    assert!(fixes.has_failures());
    let fix = &fixes.fixes[0];
    assert!(!fix.success);
    assert!(fix.error.as_deref().unwrap().contains("Private key required"));
    assert!(fix.backup_path.is_some());
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn bad_signature_is_regenerated_under_the_same_signer() {
    let fx = Fixture::new();
    let mut doc = fx.signed(EntityType::Task, task("t1"));
    doc["header"]["signatures"][0]["signature"] = json!("not-a-signature");
    let path = fx.put(EntityType::Task, doc);

    let fix = FixOptions {
        key_id: "system:bot".to_string(),
        private_key: Some(fx.private_key()),
        ..FixOptions::default()
    };
    let (report, fixes) = lint_and_fix(fx.store.clone(), &fix);
    assert!(report.results.iter().any(|r| r.validator == ValidatorKind::SignatureStructure && r.fixable));
    assert_eq!(fixes.summary.fixed, 1);

    let repaired = fx.read(&path);
    let sigs = repaired["header"]["signatures"].as_array().unwrap();
    assert_eq!(sigs.len(), 1);
    assert_eq!(sigs[0]["keyId"], SIGNER);
    assert_eq!(sigs[0]["role"], "author");
    assert_eq!(sigs[0]["notes"], "created");

    let again = LintEngine::new(fx.store.clone()).lint(&options()).expect("lint");
    assert!(again.results.is_empty(), "{:?}", again.results);
}

#[test]
fn header_extras_are_stripped_without_signing() {
    let fx = Fixture::new();
    let mut doc = fx.signed(EntityType::Task, task("t1"));
    doc["header"]["legacy"] = json!("x");
    let path = fx.put(EntityType::Task, doc);

    let (_, fixes) = lint_and_fix(fx.store.clone(), &FixOptions::default());
    assert_eq!(fixes.summary.fixed, 1, "{:?}", fixes);
    assert!(fx.read(&path)["header"].get("legacy").is_none());
}

#[test]
fn missing_envelope_is_a_fatal_repair() {
    let fx = Fixture::new();
    let path = fx.store.record_path(EntityType::Task, "t1");
    fx.store
        .write(&path, br#"{"payload": {"id": "t1"}}"#)
        .unwrap();

    let (report, fixes) = lint_and_fix(fx.store.clone(), &FixOptions::default());
    assert!(report.results.iter().any(|r| r.validator == ValidatorKind::EmbeddedMetadataStructure));
    assert_eq!(fixes.summary.failed, 1);
    assert!(fixes.fixes[0].error.as_deref().unwrap().contains("header/payload envelope"));
    assert_eq!(fs::read(&path).unwrap(), br#"{"payload": {"id": "t1"}}"#);
}

#[test]
fn fix_types_limit_the_repaired_categories() {
    let fx = Fixture::new();
    let mut doc = fx.signed(EntityType::Task, task("t1"));
    doc["header"]["payloadChecksum"] = json!("0".repeat(64));
    doc["header"]["signatures"][0]["notes"] = json!("");
    fx.put(EntityType::Task, doc);

    let only_notes = FixOptions {
        fix_types: Some(vec![ValidatorKind::SignatureStructure]),
        ..FixOptions::default()
    };
    let (_, fixes) = lint_and_fix(fx.store.clone(), &only_notes);
    let kinds: Vec<_> = fixes.fixes.iter().map(|f| f.validator).collect();
    assert_eq!(kinds, vec![ValidatorKind::SignatureStructure]);
}

#[test]
fn write_failure_without_backup_reports_the_error() {
    let fx = Fixture::new();
    let mut doc = fx.signed(EntityType::Task, task("t1"));
    doc["header"]["payloadChecksum"] = json!("0".repeat(64));
    let path = fx.put(EntityType::Task, doc);

    let store = Arc::new(CountingStore::new(FsRecordStore::new(fx.root())));
    store.fail_writes(&path);
    let (_, fixes) = lint_and_fix(store.clone(), &FixOptions {
        create_backups: false,
        ..FixOptions::default()
    });
    assert_eq!(fixes.summary.failed, 1);
    assert!(fixes.fixes[0].backup_path.is_none());
    assert!(fixes.fixes[0].error.as_deref().unwrap().contains("injected write failure"));
}

/// A task signed by the author and co-signed by an approver.
fn cosigned_task(fx: &Fixture, id: &str) -> serde_json::Value {
    let mut doc = fx.signed(EntityType::Task, task(id));
    let approval = Ed25519Provider
        .sign(&doc["payload"], &fx.private_key(), SIGNER, "approver", "approved")
        .unwrap();
    doc["header"]["signatures"]
        .as_array_mut()
        .unwrap()
        .push(serde_json::to_value(approval).unwrap());
    doc
}

#[test]
fn extra_property_on_one_signature_keeps_the_cosigner() {
    let fx = Fixture::new();
    let mut doc = cosigned_task(&fx, "t1");
    let approver_before = doc["header"]["signatures"][1].clone();
    doc["header"]["signatures"][0]["extra"] = json!(1);
    let path = fx.put(EntityType::Task, doc);

    // No private key: dropping an unsigned property needs no re-signing.
    let (report, fixes) = lint_and_fix(fx.store.clone(), &FixOptions::default());
    assert!(report.results.iter().any(|r| r.validator == ValidatorKind::SignatureStructure && r.fixable));
    assert_eq!(fixes.summary.fixed, 1, "{:?}", fixes);

    let repaired = fx.read(&path);
    let sigs = repaired["header"]["signatures"].as_array().unwrap();
    assert_eq!(sigs.len(), 2);
    let roles: Vec<_> = sigs.iter().map(|s| s["role"].clone()).collect();
    assert_eq!(roles, vec![json!("author"), json!("approver")]);
    assert!(sigs[0].get("extra").is_none());
    assert_eq!(sigs[1], approver_before);

    let again = LintEngine::new(fx.store.clone()).lint(&options()).expect("lint");
    assert!(again.results.is_empty(), "{:?}", again.results);
}

#[test]
fn broken_signature_is_regenerated_in_place() {
    let fx = Fixture::new();
    let mut doc = cosigned_task(&fx, "t1");
    let author_before = doc["header"]["signatures"][0].clone();
    doc["header"]["signatures"][1]["signature"] = json!("not-a-signature");
    let path = fx.put(EntityType::Task, doc);

    let fix = FixOptions {
        key_id: "system:bot".to_string(),
        private_key: Some(fx.private_key()),
        ..FixOptions::default()
    };
    let (_, fixes) = lint_and_fix(fx.store.clone(), &fix);
    assert_eq!(fixes.summary.fixed, 1, "{:?}", fixes);

    let repaired = fx.read(&path);
    let sigs = repaired["header"]["signatures"].as_array().unwrap();
    assert_eq!(sigs.len(), 2);
    assert_eq!(sigs[0], author_before);
    assert_eq!(sigs[1]["keyId"], SIGNER);
    assert_eq!(sigs[1]["role"], "approver");
    assert_eq!(sigs[1]["notes"], "approved");
    assert_ne!(sigs[1]["signature"], json!("not-a-signature"));

    let again = LintEngine::new(fx.store.clone()).lint(&options()).expect("lint");
    assert!(again.results.is_empty(), "{:?}", again.results);
}

#[test]
fn failed_restore_still_reports_the_repair_error() {
    let fx = Fixture::new();
    let mut doc = fx.signed(EntityType::Task, task("t1"));
    doc["header"]["payloadChecksum"] = json!("0".repeat(64));
    let path = fx.put(EntityType::Task, doc);

    let store = Arc::new(CountingStore::new(FsRecordStore::new(fx.root())));
    store.fail_writes(&path);
    store.fail_restores();
    let (_, fixes) = lint_and_fix(store.clone(), &FixOptions::default());

    assert_eq!(fixes.summary.failed, 1);
    assert_eq!(fixes.summary.backups_created, 1);
    let fix = &fixes.fixes[0];
    assert!(!fix.success);
    let error = fix.error.as_deref().unwrap();
    assert!(error.contains("injected write failure"), "{}", error);
    assert!(!error.contains("restore"), "{}", error);
    let backup = fix.backup_path.as_ref().expect("backup path");
    assert!(fs::metadata(backup).is_ok());
}

#[test]
fn non_string_notes_are_replaced_without_signing() {
    let fx = Fixture::new();
    let mut doc = fx.signed(EntityType::Task, task("t1"));
    doc["header"]["signatures"][0]["notes"] = json!(42);
    let path = fx.put(EntityType::Task, doc);

    let (report, fixes) = lint_and_fix(fx.store.clone(), &FixOptions::default());
    let notes = report
        .results
        .iter()
        .find(|r| r.field() == Some("/header/signatures/0/notes"))
        .expect("notes finding");
    assert_eq!(notes.validator, ValidatorKind::SignatureStructure);
    assert!(notes.fixable);
    assert_eq!(fixes.summary.fixed, 1, "{:?}", fixes);

    let repaired = fx.read(&path);
    assert!(repaired["header"]["signatures"][0]["notes"].as_str().is_some_and(|s| !s.is_empty()));
    let again = LintEngine::new(fx.store.clone()).lint(&options()).expect("lint");
    assert!(again.results.is_empty(), "{:?}", again.results);
}
