//! Classification, fixability and noise tables for loader field errors.
//!
//! Loader messages are human-readable text from a schema engine, so every
//! decision here is keyword matching. The keywords live in ordered rule
//! tables rather than inline conditionals; the first matching classification
//! rule wins.

use regex::Regex;
use std::sync::LazyLock;

use crate::core::findings::ValidatorKind;
use crate::core::schemas::FieldError;

/// `(lowercased message, field path)`.
pub type Predicate = fn(&str, &str) -> bool;

pub struct Rule<T> {
    pub name: &'static str,
    pub matches: Predicate,
    pub outcome: T,
}

static VERSION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bv\d+\b|\bversion \d+").expect("static regex"));

const VERSION_KEYWORDS: &[&str] = &[
    "required in v",
    "deprecated",
    "obsolete",
    "schema version",
    "migration",
];

pub static CLASSIFICATION_RULES: &[Rule<ValidatorKind>] = &[
    Rule {
        name: "checksum",
        matches: |msg, field| msg.contains("checksum") || field.contains("payloadChecksum"),
        outcome: ValidatorKind::ChecksumVerification,
    },
    Rule {
        name: "signature",
        matches: |msg, field| msg.contains("signature") || field.contains("/signatures/"),
        outcome: ValidatorKind::SignatureStructure,
    },
    Rule {
        name: "embedded-metadata",
        matches: |msg, field| {
            msg.contains("header") || msg.contains("payload") || field.contains("/header/")
        },
        outcome: ValidatorKind::EmbeddedMetadataStructure,
    },
    Rule {
        name: "schema-version",
        matches: |msg, _| {
            VERSION_KEYWORDS.iter().any(|k| msg.contains(k)) || VERSION_TOKEN.is_match(msg)
        },
        outcome: ValidatorKind::SchemaVersionMismatch,
    },
];

pub static FIXABLE_RULES: &[Rule<()>] = &[
    Rule {
        name: "metadata",
        matches: |msg, _| msg.contains("header") || msg.contains("metadata"),
        outcome: (),
    },
    Rule {
        name: "additional-properties",
        matches: |msg, _| msg.contains("additional properties"),
        outcome: (),
    },
    Rule {
        name: "checksum",
        matches: |msg, field| msg.contains("checksum") || field.contains("payloadChecksum"),
        outcome: (),
    },
    Rule {
        name: "signature-format",
        matches: |msg, field| {
            let about_signature = msg.contains("signature") || field.contains("/signatures/");
            about_signature
                && (field.ends_with("/notes")
                    || ["pattern", "format", "notes", "fewer than"]
                        .iter()
                        .any(|k| msg.contains(k)))
        },
        outcome: (),
    },
];

/// Artifacts of `oneOf` / if-then-else composition.
pub static NOISE_RULES: &[Rule<()>] = &[
    Rule {
        name: "boolean-schema",
        matches: |msg, _| msg.contains("boolean schema is false"),
        outcome: (),
    },
    Rule {
        name: "else-branch",
        matches: |msg, _| msg.contains("must match \"else\" schema"),
        outcome: (),
    },
    Rule {
        name: "then-branch",
        matches: |msg, _| msg.contains("must match \"then\" schema"),
        outcome: (),
    },
    Rule {
        name: "one-of-path",
        matches: |msg, field| msg.contains("#/oneof/") || field.contains("#/oneOf/"),
        outcome: (),
    },
];

fn first_match<'a, T>(rules: &'a [Rule<T>], message: &str, field: &str) -> Option<&'a Rule<T>> {
    let msg = message.to_lowercase();
    rules.iter().find(|r| (r.matches)(&msg, field))
}

pub fn classify(message: &str, field: &str) -> ValidatorKind {
    first_match(CLASSIFICATION_RULES, message, field)
        .map(|r| r.outcome)
        .unwrap_or(ValidatorKind::SchemaValidation)
}

pub fn is_fixable(message: &str, field: &str) -> bool {
    first_match(FIXABLE_RULES, message, field).is_some()
}

pub fn is_additional_properties(message: &str) -> bool {
    message.to_lowercase().contains("additional properties")
}

pub fn is_schema_noise(error: &FieldError) -> bool {
    first_match(NOISE_RULES, &error.message, &error.field).is_some()
}

/// Drop composition artifacts when a real additional-properties violation is present.
pub fn filter_schema_noise(errors: Vec<FieldError>) -> Vec<FieldError> {
    if !errors.iter().any(|e| is_additional_properties(&e.message)) {
        return errors;
    }
    errors.into_iter().filter(|e| !is_schema_noise(e)).collect()
}
