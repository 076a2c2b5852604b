//! Core modules of the governance record linter.
//!
//! Record model and storage, the loader and its classification tables, the
//! single-record and reference validators, the batch lint engine and the
//! repair engine all live here. The CLI is a thin layer over these.

pub mod backup;
pub mod classify;
pub mod config;
pub mod crypto;
pub mod error;
pub mod findings;
pub mod fix;
pub mod lint;
pub mod output;
pub mod record;
pub mod references;
pub mod schemas;
pub mod store;
pub mod time;
pub mod validate;
