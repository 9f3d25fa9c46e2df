//! Shared types for the return-request pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::EligibilityVerdict;
use crate::refund::RefundDecision;

// ── Case ────────────────────────────────────────────────────────────

/// Where a case currently is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStage {
    Intake,
    Extracted,
    OrderResolved,
    EligibilityResolved,
    RefundComputed,
    Notified,
    Completed,
    /// Absorbing failure state, reachable from any stage.
    Failed(FailureKind),
}

impl CaseStage {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Extracted => "extracted",
            Self::OrderResolved => "order_resolved",
            Self::EligibilityResolved => "eligibility_resolved",
            Self::RefundComputed => "refund_computed",
            Self::Notified => "notified",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

/// One end-to-end processing of a single return-request email.
///
/// Created on intake, mutated only by the pipeline as it advances `stage`,
/// terminal once Completed or Failed. One pipeline run owns it exclusively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnCase {
    pub case_id: Uuid,
    pub order_id: Option<u64>,
    pub raw_email_body: String,
    pub sender_address: Option<String>,
    pub stage: CaseStage,
    pub created_at: DateTime<Utc>,
}

impl ReturnCase {
    pub fn new(raw_email_body: &str, sender_address: Option<&str>) -> Self {
        Self {
            case_id: Uuid::new_v4(),
            order_id: None,
            raw_email_body: raw_email_body.to_string(),
            sender_address: sender_address.map(str::to_string),
            stage: CaseStage::Intake,
            created_at: Utc::now(),
        }
    }

    /// Move the case to its next stage.
    pub fn advance(&mut self, stage: CaseStage) {
        tracing::debug!(case_id = %self.case_id, stage = stage.label(), "Stage transition");
        self.stage = stage;
    }
}

// ── Failure taxonomy ────────────────────────────────────────────────

/// Why a case failed (or degraded). Variant names are the wire strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    OrderIdNotFound,
    OrderLookupFailed,
    EligibilityResolutionFailed,
    DispatchFailed,
    Timeout,
}

/// Failure kind plus human-readable detail, as emitted in the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseError {
    pub kind: FailureKind,
    pub detail: String,
}

// ── Result contract ─────────────────────────────────────────────────

/// Terminal output of one case. Always emitted, even on partial failure:
/// determined fields are populated, undetermined fields stay absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnCaseResult {
    pub case_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<EligibilityVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund: Option<RefundDecision>,
    #[serde(default)]
    pub eligibility_notice_sent: bool,
    /// Absent for ineligible cases, where no refund notice is attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_notice_sent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CaseError>,
}

impl ReturnCaseResult {
    /// Result for a case aborted before a decision was reached.
    pub fn aborted(case: &ReturnCase, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            case_id: case.case_id,
            order_id: case.order_id,
            eligible: None,
            verdict: None,
            refund: None,
            eligibility_notice_sent: false,
            refund_notice_sent: None,
            error: Some(CaseError {
                kind,
                detail: detail.into(),
            }),
        }
    }
}
