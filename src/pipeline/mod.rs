//! Return-request processing pipeline.
//!
//! One email flows through:
//! 1. order-id extraction from the raw body
//! 2. `OrderLookup::fetch()` — order + customer snapshot
//! 3. `EligibilityResolver::resolve()` — policy verdict
//! 4. refund computation (pass-through when eligible)
//! 5. notification dispatch (eligibility notice always, refund notice when eligible)
//!
//! Cases are independent units of work with no shared mutable state; the
//! pipeline holds no state across invocations.

pub mod processor;
pub mod types;

pub use processor::ReturnPipeline;
pub use types::{CaseError, CaseStage, FailureKind, ReturnCase, ReturnCaseResult};
