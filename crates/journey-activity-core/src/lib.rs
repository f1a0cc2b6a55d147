//! # Journey Activity Core
//!
//! Execution pipeline for a journey-orchestration "custom activity" webhook.
//!
//! The orchestrator calls the activity once per record moving through a
//! journey. Each call is reduced to a canonical payload, written to an
//! upstream data collection through an ordered list of endpoint candidates,
//! and recorded in an audit collection on a best-effort basis.
//!
//! ## Architecture
//!
//! Components are wired through trait seams so the HTTP layer and tests can
//! substitute their own collaborators:
//! - [`credentials::CredentialVerifier`] checks inbound signed tokens
//! - [`payload::PayloadNormalizer`] extracts the record key, message and correlation ID
//! - [`upstream::TokenProvider`] exchanges client credentials for a bearer token
//! - [`upsert::RecordUpserter`] writes the record, falling back across candidates
//! - [`audit::ExecutionAuditor`] records the outcome
//! - [`execute::ExecuteHandler`] drives the pipeline and never fails
//!
//! ## Usage
//!
//! ```rust
//! use journey_activity_core::payload::{ExecutionRequest, PayloadNormalizer};
//! use journey_activity_core::credentials::CredentialVerifier;
//!
//! let normalizer = PayloadNormalizer::new(Default::default(), CredentialVerifier::new(None));
//! let request = ExecutionRequest::from_raw(
//!     Some("application/json"),
//!     br#"{"inArguments":[{"contactKey":"101010","customMessage":"hello"}]}"#,
//! );
//!
//! let payload = normalizer.normalize(&request);
//! assert_eq!(payload.record_key, "101010");
//! assert_eq!(payload.message, "hello");
//! ```

pub mod audit;
pub mod config;
pub mod credentials;
pub mod error;
pub mod execute;
pub mod lifecycle;
pub mod payload;
pub mod upsert;
pub mod upstream;

pub use config::{
    AuditFieldNames, CollectionConfig, InboundFieldNames, InvalidConfig, RecordFieldNames,
    UpsertConfig, UpstreamConfig,
};
pub use error::{AuditError, AuthError, UpsertError, UpsertFailureKind};
pub use execute::{ExecuteHandler, ExecutionReport, ExecutionState};
