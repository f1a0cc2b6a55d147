//! Configuration-time lifecycle callbacks (save, validate, publish, stop).
//!
//! These steps carry no data to write. They verify the token when one is
//! present, log the identifiers the orchestrator sends, and are always
//! acknowledged regardless of the verification outcome.

use std::fmt;
use tracing::{info, warn};

use crate::credentials::{CredentialVerifier, Verification};
use crate::payload::ExecutionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    Save,
    Validate,
    Publish,
    Stop,
}

impl LifecycleStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Validate => "validate",
            Self::Publish => "publish",
            Self::Stop => "stop",
        }
    }

    /// Stop carries no token to check.
    fn verifies_token(&self) -> bool {
        !matches!(self, Self::Stop)
    }
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers the orchestrator includes with lifecycle calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleContext {
    pub activity_object_id: Option<String>,
    pub definition_instance_id: Option<String>,
    pub request_object_id: Option<String>,
}

impl LifecycleContext {
    pub fn from_request(request: &ExecutionRequest) -> Self {
        Self {
            activity_object_id: request.field("activityObjectID").map(str::to_string),
            definition_instance_id: request.field("definitionInstanceId").map(str::to_string),
            request_object_id: request.field("requestObjectId").map(str::to_string),
        }
    }
}

/// Result of one lifecycle call. Always acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleAck {
    pub step: LifecycleStep,
    pub context: LifecycleContext,

    /// `None` for steps that do not check tokens.
    pub verification: Option<Verification>,
}

/// Verify and log a lifecycle call.
pub fn acknowledge(
    verifier: &CredentialVerifier,
    step: LifecycleStep,
    request: &ExecutionRequest,
) -> LifecycleAck {
    let context = LifecycleContext::from_request(request);

    let verification = step.verifies_token().then(|| verifier.verify(request.token()));

    match &verification {
        Some(Verification::Rejected { reason }) => {
            warn!(step = %step, reason = %reason, "Lifecycle token failed verification; proceeding")
        }
        Some(Verification::Skipped { reason }) => {
            info!(step = %step, reason = %reason, "Lifecycle token not verified")
        }
        _ => {}
    }

    info!(
        step = %step,
        activity_object_id = ?context.activity_object_id,
        definition_instance_id = ?context.definition_instance_id,
        request_object_id = ?context.request_object_id,
        token_valid = ?verification.as_ref().map(Verification::is_valid),
        "Lifecycle step acknowledged"
    );

    LifecycleAck {
        step,
        context,
        verification,
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
