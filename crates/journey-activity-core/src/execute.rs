//! Execute-call orchestration.
//!
//! Each call walks a fixed sequence of states. Every transition has a
//! fallback, so the walk always ends in [`ExecutionState::Acknowledged`]:
//!
//! ```text
//! Received -> Normalized -> Upserted{Success|Failure} -> Audited -> Acknowledged
//! ```
//!
//! Normalization falls back to defaults, an upsert failure becomes an error
//! audit record, and audit failures are swallowed by the auditor. Nothing is
//! retried at this level.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::audit::{AuditRecord, ExecutionAuditor};
use crate::error::UpsertError;
use crate::payload::{ExecutionRequest, NormalizedPayload, PayloadNormalizer};
use crate::upsert::{RecordUpserter, UpsertSuccess};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Received,
    Normalized,
    Upserted,
    Audited,
    Acknowledged,
}

/// Everything that happened during one execute call.
#[derive(Debug)]
pub struct ExecutionReport {
    pub payload: NormalizedPayload,
    pub upsert: Result<UpsertSuccess, UpsertError>,
    pub audit: AuditRecord,

    /// States visited, in order.
    pub states: Vec<ExecutionState>,
}

impl ExecutionReport {
    pub fn final_state(&self) -> Option<ExecutionState> {
        self.states.last().copied()
    }

    pub fn upsert_succeeded(&self) -> bool {
        self.upsert.is_ok()
    }
}

enum Stage {
    Received,
    Normalized {
        payload: NormalizedPayload,
    },
    Upserted {
        payload: NormalizedPayload,
        upsert: Result<UpsertSuccess, UpsertError>,
    },
    Audited {
        payload: NormalizedPayload,
        upsert: Result<UpsertSuccess, UpsertError>,
        audit: AuditRecord,
    },
    Acknowledged(ExecutionReport),
}

impl Stage {
    fn state(&self) -> ExecutionState {
        match self {
            Self::Received => ExecutionState::Received,
            Self::Normalized { .. } => ExecutionState::Normalized,
            Self::Upserted { .. } => ExecutionState::Upserted,
            Self::Audited { .. } => ExecutionState::Audited,
            Self::Acknowledged(_) => ExecutionState::Acknowledged,
        }
    }
}

/// Runs the execute pipeline.
#[derive(Clone)]
pub struct ExecuteHandler {
    normalizer: PayloadNormalizer,
    upserter: Arc<dyn RecordUpserter>,
    auditor: Arc<dyn ExecutionAuditor>,
}

impl ExecuteHandler {
    pub fn new(
        normalizer: PayloadNormalizer,
        upserter: Arc<dyn RecordUpserter>,
        auditor: Arc<dyn ExecutionAuditor>,
    ) -> Self {
        Self {
            normalizer,
            upserter,
            auditor,
        }
    }

    /// Run one execute call to acknowledgment. Never fails.
    #[instrument(skip(self, request))]
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionReport {
        let mut states = Vec::with_capacity(5);
        let mut stage = Stage::Received;

        loop {
            states.push(stage.state());

            stage = match stage {
                Stage::Received => Stage::Normalized {
                    payload: self.normalizer.normalize(request),
                },
                Stage::Normalized { payload } => {
                    let upsert = self
                        .upserter
                        .upsert(&payload.record_key, &payload.message)
                        .await;
                    Stage::Upserted { payload, upsert }
                }
                Stage::Upserted { payload, upsert } => {
                    let audit = match &upsert {
                        Ok(_) => AuditRecord::success(&payload),
                        Err(e) => {
                            warn!(
                                record_key = %payload.record_key,
                                failure = e.kind().as_str(),
                                error = %e,
                                "Upsert failed; acknowledging anyway"
                            );
                            AuditRecord::failure(&payload, e)
                        }
                    };
                    self.auditor.record_execution(&audit).await;
                    Stage::Audited {
                        payload,
                        upsert,
                        audit,
                    }
                }
                Stage::Audited {
                    payload,
                    upsert,
                    audit,
                } => Stage::Acknowledged(ExecutionReport {
                    payload,
                    upsert,
                    audit,
                    states: Vec::new(),
                }),
                Stage::Acknowledged(mut report) => {
                    info!(
                        record_key = %report.payload.record_key,
                        correlation_id = %report.payload.correlation_id,
                        source = report.payload.source.as_str(),
                        upserted = report.upsert_succeeded(),
                        "Execution acknowledged"
                    );
                    report.states = states;
                    return report;
                }
            };
        }
    }
}

#[cfg(test)]
#[path = "execute_tests.rs"]
mod tests;
