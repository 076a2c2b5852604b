//! Shared fixtures: a temp governance root, a real signer and an
//! instrumented store/provider pair.

#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use govlint::core::crypto::{self, Ed25519Provider, SignatureProvider, payload_checksum};
use govlint::core::error::LintError;
use govlint::core::record::{EntityType, Signature};
use govlint::core::store::{FsRecordStore, RecordEntry, RecordStore};
use rand::rngs::OsRng;
use serde_json::{Value as JsonValue, json};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SIGNER: &str = "human:alice";

pub struct Fixture {
    pub tmp: TempDir,
    pub store: Arc<FsRecordStore>,
    pub key: SigningKey,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FsRecordStore::new(tmp.path()));
        let key = SigningKey::generate(&mut OsRng);
        let fixture = Self { tmp, store, key };
        let actor = json!({
            "id": SIGNER,
            "type": "human",
            "displayName": "Alice",
            "publicKey": crypto::encode_verifying_key(&fixture.key.verifying_key()),
            "roles": ["author"],
        });
        fixture.put(EntityType::Actor, fixture.signed(EntityType::Actor, actor));
        fixture
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn private_key(&self) -> String {
        crypto::encode_signing_key(&self.key)
    }

    /// A well-formed record of `entity_type` signed by [`SIGNER`].
    pub fn signed(&self, entity_type: EntityType, payload: JsonValue) -> JsonValue {
        let signature = Ed25519Provider
            .sign(&payload, &self.private_key(), SIGNER, "author", "created")
            .expect("sign");
        json!({
            "header": {
                "version": "1.0",
                "type": entity_type.as_str(),
                "payloadChecksum": payload_checksum(&payload),
                "signatures": [serde_json::to_value(signature).expect("signature json")],
            },
            "payload": payload,
        })
    }

    /// Write `doc` at the path its payload id maps to; returns that path.
    pub fn put(&self, entity_type: EntityType, doc: JsonValue) -> PathBuf {
        let id = doc["payload"]["id"].as_str().expect("payload id").to_string();
        let path = self.store.record_path(entity_type, &id);
        self.store
            .write(&path, &serde_json::to_vec_pretty(&doc).expect("encode"))
            .expect("write record");
        path
    }

    pub fn read(&self, path: &Path) -> JsonValue {
        serde_json::from_slice(&std::fs::read(path).expect("read record")).expect("parse record")
    }
}

pub fn task(id: &str) -> JsonValue {
    json!({
        "id": id,
        "title": format!("Task {}", id),
        "status": "active",
        "priority": "medium",
        "description": "fixture task",
    })
}

pub fn cycle(id: &str, task_ids: &[&str]) -> JsonValue {
    json!({
        "id": id,
        "title": format!("Cycle {}", id),
        "status": "active",
        "taskIds": task_ids,
    })
}

/// Store wrapper recording every read and write, optionally failing writes
/// to one path or every copy out of a backup.
pub struct CountingStore {
    pub inner: FsRecordStore,
    pub reads: Mutex<Vec<PathBuf>>,
    pub writes: Mutex<Vec<PathBuf>>,
    pub fail_writes_to: Mutex<Option<PathBuf>>,
    pub fail_restores: AtomicBool,
}

impl CountingStore {
    pub fn new(inner: FsRecordStore) -> Self {
        Self {
            inner,
            reads: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            fail_writes_to: Mutex::new(None),
            fail_restores: AtomicBool::new(false),
        }
    }

    pub fn reads_of(&self, path: &Path) -> usize {
        self.reads.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    pub fn writes_of(&self, path: &Path) -> usize {
        self.writes.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    pub fn fail_writes(&self, path: &Path) {
        *self.fail_writes_to.lock().unwrap() = Some(path.to_path_buf());
    }

    pub fn fail_restores(&self) {
        self.fail_restores.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.reads.lock().unwrap().clear();
        self.writes.lock().unwrap().clear();
    }
}

impl RecordStore for CountingStore {
    fn list_records(&self) -> Result<Vec<RecordEntry>, LintError> {
        self.inner.list_records()
    }

    fn record_path(&self, entity_type: EntityType, id: &str) -> PathBuf {
        self.inner.record_path(entity_type, id)
    }

    fn entry_for_path(&self, path: &Path) -> Result<RecordEntry, LintError> {
        self.inner.entry_for_path(path)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, LintError> {
        self.reads.lock().unwrap().push(path.to_path_buf());
        self.inner.read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), LintError> {
        self.writes.lock().unwrap().push(path.to_path_buf());
        if self.fail_writes_to.lock().unwrap().as_deref() == Some(path) {
            return Err(LintError::IoError(std::io::Error::other("injected write failure")));
        }
        self.inner.write(path, bytes)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), LintError> {
        let from_backup = from.to_string_lossy().contains(".backup-");
        if from_backup && self.fail_restores.load(Ordering::SeqCst) {
            return Err(LintError::IoError(std::io::Error::other("injected restore failure")));
        }
        self.inner.copy(from, to)
    }
}

/// Ed25519 provider that counts signing calls.
#[derive(Default)]
pub struct CountingProvider {
    pub signs: AtomicUsize,
}

impl CountingProvider {
    pub fn sign_calls(&self) -> usize {
        self.signs.load(Ordering::SeqCst)
    }
}

impl SignatureProvider for CountingProvider {
    fn checksum(&self, payload: &JsonValue) -> String {
        Ed25519Provider.checksum(payload)
    }

    fn sign(
        &self,
        payload: &JsonValue,
        private_key: &str,
        key_id: &str,
        role: &str,
        notes: &str,
    ) -> Result<Signature, LintError> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        Ed25519Provider.sign(payload, private_key, key_id, role, notes)
    }

    fn verify(&self, payload: &JsonValue, signature: &Signature, public_key: &str) -> bool {
        Ed25519Provider.verify(payload, signature, public_key)
    }
}
