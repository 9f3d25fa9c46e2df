//! Return-request pipeline — drives one case from raw email to terminal result.
//!
//! Stages run strictly in order; each stage's output feeds the next:
//! 1. extract order id from the email body (no alternate patterns, no retry)
//! 2. fetch the order + customer snapshot
//! 3. resolve eligibility against the policy corpus
//! 4. compute the refund (pass-through, never fails)
//! 5. dispatch the eligibility notice, plus the refund notice when eligible
//!
//! Failures before the refund stage abort the case with a typed kind.
//! Dispatch failures degrade the result but keep the computed decision.
//! The pipeline performs no deduplication — the intake layer owns the
//! "already processed" boundary via its read/unread marking.

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::notify::{NoticeComposer, NotificationDispatcher, NotificationEnvelope};
use crate::orders::{OrderFetch, OrderLookup};
use crate::pipeline::types::{CaseError, CaseStage, FailureKind, ReturnCase, ReturnCaseResult};
use crate::policy::EligibilityResolver;
use crate::refund;

/// Return-request pipeline over injected capability handles.
pub struct ReturnPipeline {
    lookup: Arc<dyn OrderLookup>,
    resolver: EligibilityResolver,
    composer: NoticeComposer,
    dispatcher: Arc<dyn NotificationDispatcher>,
    config: PipelineConfig,
    order_id_pattern: Regex,
}

impl ReturnPipeline {
    pub fn new(
        lookup: Arc<dyn OrderLookup>,
        resolver: EligibilityResolver,
        composer: NoticeComposer,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            lookup,
            resolver,
            composer,
            dispatcher,
            config,
            order_id_pattern: Regex::new(r"(?i)order id[: ]+(\d+)").unwrap(),
        }
    }

    /// Process one return-request email to a terminal result.
    ///
    /// Always returns a `ReturnCaseResult`; there is no pending state across
    /// this boundary.
    pub async fn handle(
        &self,
        raw_email_body: &str,
        sender_address: Option<&str>,
    ) -> ReturnCaseResult {
        let mut case = ReturnCase::new(raw_email_body, sender_address);
        info!(
            case_id = %case.case_id,
            sender = sender_address.unwrap_or("unknown"),
            "Processing return request"
        );

        // Intake → Extracted
        let Some(order_id) = self.extract_order_id(raw_email_body) else {
            warn!(case_id = %case.case_id, "No order id pattern in email body");
            case.advance(CaseStage::Failed(FailureKind::OrderIdNotFound));
            return ReturnCaseResult::aborted(
                &case,
                FailureKind::OrderIdNotFound,
                "no order id pattern in email body",
            );
        };
        case.order_id = Some(order_id);
        case.advance(CaseStage::Extracted);

        // Extracted → OrderResolved
        let order = match timeout(self.config.lookup_timeout, self.lookup.fetch(order_id)).await {
            Err(_) => {
                case.advance(CaseStage::Failed(FailureKind::Timeout));
                return ReturnCaseResult::aborted(
                    &case,
                    FailureKind::Timeout,
                    format!(
                        "order lookup timed out after {:?}",
                        self.config.lookup_timeout
                    ),
                );
            }
            Ok(Err(e)) => {
                case.advance(CaseStage::Failed(FailureKind::OrderLookupFailed));
                return ReturnCaseResult::aborted(
                    &case,
                    FailureKind::OrderLookupFailed,
                    e.to_string(),
                );
            }
            Ok(Ok(OrderFetch::NotFound)) => {
                case.advance(CaseStage::Failed(FailureKind::OrderLookupFailed));
                return ReturnCaseResult::aborted(
                    &case,
                    FailureKind::OrderLookupFailed,
                    format!("order {order_id} not found"),
                );
            }
            Ok(Ok(OrderFetch::Found(order))) => order,
        };
        case.advance(CaseStage::OrderResolved);

        // OrderResolved → EligibilityResolved
        let elapsed_days = order.days_since_purchase(Utc::now().date_naive());
        let verdict = match timeout(
            self.config.resolve_timeout,
            self.resolver.resolve(&order.product_id, elapsed_days),
        )
        .await
        {
            Err(_) => {
                case.advance(CaseStage::Failed(FailureKind::Timeout));
                return ReturnCaseResult::aborted(
                    &case,
                    FailureKind::Timeout,
                    format!(
                        "eligibility resolution timed out after {:?}",
                        self.config.resolve_timeout
                    ),
                );
            }
            Ok(Err(e)) => {
                case.advance(CaseStage::Failed(FailureKind::EligibilityResolutionFailed));
                return ReturnCaseResult::aborted(
                    &case,
                    FailureKind::EligibilityResolutionFailed,
                    e.to_string(),
                );
            }
            Ok(Ok(verdict)) => verdict,
        };
        case.advance(CaseStage::EligibilityResolved);
        info!(
            case_id = %case.case_id,
            order_id,
            eligible = verdict.eligible,
            reason = %verdict.reason,
            "Eligibility resolved"
        );

        // EligibilityResolved → RefundComputed (never fails)
        let refund = refund::compute(&order, &verdict);
        case.advance(CaseStage::RefundComputed);

        // RefundComputed → Notified. The two dispatches are independent:
        // one failing never re-sends or cancels the other.
        let eligibility_envelope = self.composer.eligibility_notice(&order, &verdict).await;
        let refund_envelope = refund
            .as_ref()
            .map(|r| self.composer.refund_notice(&order, r));

        let (eligibility_sent, refund_sent) = match refund_envelope {
            Some(envelope) => {
                let (a, b) = futures::join!(
                    self.dispatch(&case, &eligibility_envelope),
                    self.dispatch(&case, &envelope)
                );
                (a, Some(b))
            }
            None => (self.dispatch(&case, &eligibility_envelope).await, None),
        };
        case.advance(CaseStage::Notified);

        let mut failures: Vec<&str> = Vec::new();
        if let Err(detail) = &eligibility_sent {
            failures.push(detail);
        }
        if let Some(Err(detail)) = &refund_sent {
            failures.push(detail);
        }
        let error = (!failures.is_empty()).then(|| CaseError {
            kind: FailureKind::DispatchFailed,
            detail: failures.join("; "),
        });

        case.advance(CaseStage::Completed);
        info!(case_id = %case.case_id, order_id, "Case completed");

        ReturnCaseResult {
            case_id: case.case_id,
            order_id: Some(order_id),
            eligible: Some(verdict.eligible),
            verdict: Some(verdict),
            refund,
            eligibility_notice_sent: eligibility_sent.is_ok(),
            refund_notice_sent: refund_sent.map(|r| r.is_ok()),
            error,
        }
    }

    /// First "order id <digits>" match in the body, if any.
    fn extract_order_id(&self, body: &str) -> Option<u64> {
        self.order_id_pattern
            .captures(body)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Dispatch one envelope within the dispatch timeout.
    ///
    /// Returns the failure detail on the error side; dispatch failures are
    /// degraded-success, so no typed error propagates from here.
    async fn dispatch(
        &self,
        case: &ReturnCase,
        envelope: &NotificationEnvelope,
    ) -> Result<(), String> {
        let outcome = timeout(
            self.config.dispatch_timeout,
            self.dispatcher
                .send(&envelope.recipient, &envelope.subject, &envelope.body),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                info!(
                    case_id = %case.case_id,
                    kind = ?envelope.kind,
                    recipient = %envelope.recipient,
                    "Notification dispatched"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(case_id = %case.case_id, kind = ?envelope.kind, error = %e, "Dispatch failed");
                Err(format!("{:?}: {e}", envelope.kind))
            }
            Err(_) => {
                warn!(case_id = %case.case_id, kind = ?envelope.kind, "Dispatch timed out");
                Err(format!(
                    "{:?}: timed out after {:?}",
                    envelope.kind, self.config.dispatch_timeout
                ))
            }
        }
    }
}

/// Build an order record purchased `days_ago` days before today.
#[cfg(test)]
fn order_purchased_days_ago(days_ago: i64) -> crate::orders::OrderRecord {
    use rust_decimal_macros::dec;

    crate::orders::OrderRecord {
        order_id: 104,
        product_id: "SKU005".into(),
        customer_id: 7,
        quantity: 1,
        price: dec!(59.99),
        currency: "USD".into(),
        purchase_date: Utc::now().date_naive() - chrono::Duration::days(days_ago),
        is_return_flagged: false,
        customer_name: "Priya".into(),
        customer_email: "priya@example.com".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::{DispatchError, LlmError, LookupError};
    use crate::llm::LlmProvider;
    use crate::notify::NoticeComposer;
    use crate::orders::OrderRecord;
    use crate::policy::corpus::InMemoryPolicyIndex;
    use crate::policy::{PolicyFragment, ResolutionPath};
    use rust_decimal_macros::dec;

    // ── Mocks ───────────────────────────────────────────────────────

    struct FixedLookup(OrderRecord);

    #[async_trait]
    impl OrderLookup for FixedLookup {
        async fn fetch(&self, _order_id: u64) -> Result<OrderFetch, LookupError> {
            Ok(OrderFetch::Found(self.0.clone()))
        }
    }

    struct NotFoundLookup;

    #[async_trait]
    impl OrderLookup for NotFoundLookup {
        async fn fetch(&self, _order_id: u64) -> Result<OrderFetch, LookupError> {
            Ok(OrderFetch::NotFound)
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl OrderLookup for FailingLookup {
        async fn fetch(&self, _order_id: u64) -> Result<OrderFetch, LookupError> {
            Err(LookupError::Transport("connection refused".into()))
        }
    }

    struct PanickingLookup;

    #[async_trait]
    impl OrderLookup for PanickingLookup {
        async fn fetch(&self, _order_id: u64) -> Result<OrderFetch, LookupError> {
            panic!("order lookup must not run for this case");
        }
    }

    struct SlowLookup;

    #[async_trait]
    impl OrderLookup for SlowLookup {
        async fn fetch(&self, _order_id: u64) -> Result<OrderFetch, LookupError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(OrderFetch::NotFound)
        }
    }

    struct FixedLlm(String);

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    /// Records every send; fails sends whose subject matches `fail_subject`.
    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<(String, String)>>,
        fail_subject: Option<String>,
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn send(
            &self,
            recipient: &str,
            subject: &str,
            _body: &str,
        ) -> Result<(), DispatchError> {
            if self.fail_subject.as_deref() == Some(subject) {
                return Err(DispatchError::SendFailed {
                    recipient: recipient.into(),
                    reason: "smtp unavailable".into(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), subject.to_string()));
            Ok(())
        }
    }

    // ── Wiring helper ───────────────────────────────────────────────

    fn pipeline_with(
        lookup: Arc<dyn OrderLookup>,
        fragments: Vec<PolicyFragment>,
        llm_reply: &str,
        dispatcher: Arc<RecordingDispatcher>,
        config: PipelineConfig,
    ) -> ReturnPipeline {
        let llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm(llm_reply.to_string()));
        let retriever = Arc::new(InMemoryPolicyIndex::new(fragments));
        let resolver = EligibilityResolver::new(retriever, llm.clone());
        let composer = NoticeComposer::new(llm, config.compose_timeout);
        ReturnPipeline::new(lookup, resolver, composer, dispatcher, config)
    }

    fn sku005_corpus() -> Vec<PolicyFragment> {
        vec![PolicyFragment::new(
            "policy",
            "SKU005 may be returned within 20 days of purchase.",
        )]
    }

    const WORDED_NOTICE: &str = "Dear Priya, here is the decision on your return.";

    // ── Extraction stage ────────────────────────────────────────────

    #[tokio::test]
    async fn missing_order_id_aborts_without_lookup() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let pipeline = pipeline_with(
            Arc::new(PanickingLookup),
            sku005_corpus(),
            WORDED_NOTICE,
            dispatcher.clone(),
            PipelineConfig::default(),
        );

        let result = pipeline
            .handle("Hello, I want to return my purchase.", Some("c@x.com"))
            .await;

        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::OrderIdNotFound);
        assert!(result.order_id.is_none());
        assert!(result.eligible.is_none());
        assert!(!result.eligibility_notice_sent);
        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extraction_takes_first_match_case_insensitively() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let pipeline = pipeline_with(
            Arc::new(FixedLookup(order_purchased_days_ago(15))),
            sku005_corpus(),
            WORDED_NOTICE,
            dispatcher,
            PipelineConfig::default(),
        );

        let result = pipeline
            .handle("Order ID: 104 (previously Order ID: 999)", None)
            .await;
        assert_eq!(result.order_id, Some(104));
    }

    // ── Lookup stage ────────────────────────────────────────────────

    #[tokio::test]
    async fn order_not_found_aborts_before_resolution() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        // Empty corpus: resolution would error if it ever ran.
        let pipeline = pipeline_with(
            Arc::new(NotFoundLookup),
            vec![],
            WORDED_NOTICE,
            dispatcher.clone(),
            PipelineConfig::default(),
        );

        let result = pipeline.handle("order id: 104", None).await;

        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::OrderLookupFailed);
        assert!(error.detail.contains("not found"));
        assert_eq!(result.order_id, Some(104));
        assert!(result.eligible.is_none());
        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookup_transport_error_carries_cause() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let pipeline = pipeline_with(
            Arc::new(FailingLookup),
            sku005_corpus(),
            WORDED_NOTICE,
            dispatcher,
            PipelineConfig::default(),
        );

        let result = pipeline.handle("order id: 104", None).await;

        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::OrderLookupFailed);
        assert!(error.detail.contains("connection refused"));
    }

    #[tokio::test]
    async fn lookup_timeout_fails_the_case() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let config = PipelineConfig {
            lookup_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let pipeline = pipeline_with(
            Arc::new(SlowLookup),
            sku005_corpus(),
            WORDED_NOTICE,
            dispatcher,
            config,
        );

        let result = pipeline.handle("order id: 104", None).await;

        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::Timeout);
        assert!(error.detail.contains("order lookup"));
    }

    // ── Full flow ───────────────────────────────────────────────────

    #[tokio::test]
    async fn eligible_case_refunds_and_sends_both_notices() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let pipeline = pipeline_with(
            Arc::new(FixedLookup(order_purchased_days_ago(15))),
            sku005_corpus(),
            WORDED_NOTICE,
            dispatcher.clone(),
            PipelineConfig::default(),
        );

        let result = pipeline.handle("order id: 104", Some("priya@example.com")).await;

        assert_eq!(result.eligible, Some(true));
        let verdict = result.verdict.unwrap();
        assert_eq!(verdict.resolution, ResolutionPath::ExactSkuMatch);
        assert_eq!(verdict.source_days, Some(20));

        let refund = result.refund.unwrap();
        assert_eq!(refund.amount, dec!(59.99));
        assert_eq!(refund.currency, "USD");

        assert!(result.eligibility_notice_sent);
        assert_eq!(result.refund_notice_sent, Some(true));
        assert!(result.error.is_none());

        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(to, _)| to == "priya@example.com"));
    }

    #[tokio::test]
    async fn ineligible_case_sends_single_notice_and_no_refund() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let pipeline = pipeline_with(
            Arc::new(FixedLookup(order_purchased_days_ago(25))),
            sku005_corpus(),
            WORDED_NOTICE,
            dispatcher.clone(),
            PipelineConfig::default(),
        );

        let result = pipeline.handle("order id: 104", None).await;

        assert_eq!(result.eligible, Some(false));
        assert!(result.refund.is_none());
        assert!(result.verdict.unwrap().reason.contains("20-day"));
        assert!(result.eligibility_notice_sent);
        assert_eq!(result.refund_notice_sent, None);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refund_notice_failure_degrades_but_keeps_decision() {
        let dispatcher = Arc::new(RecordingDispatcher {
            sent: Mutex::new(Vec::new()),
            fail_subject: Some("Refund Processing Notification".into()),
        });
        let pipeline = pipeline_with(
            Arc::new(FixedLookup(order_purchased_days_ago(15))),
            sku005_corpus(),
            WORDED_NOTICE,
            dispatcher.clone(),
            PipelineConfig::default(),
        );

        let result = pipeline.handle("order id: 104", None).await;

        assert_eq!(result.eligible, Some(true));
        assert_eq!(result.refund.as_ref().unwrap().amount, dec!(59.99));
        assert!(result.eligibility_notice_sent);
        assert_eq!(result.refund_notice_sent, Some(false));

        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::DispatchFailed);
        assert!(error.detail.contains("RefundNotice"));

        // The eligibility notice was sent exactly once — no retry on the
        // sibling dispatch failing.
        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Regarding Your Return Request");
    }

    #[tokio::test]
    async fn eligibility_notice_failure_does_not_cancel_refund_notice() {
        let dispatcher = Arc::new(RecordingDispatcher {
            sent: Mutex::new(Vec::new()),
            fail_subject: Some("Regarding Your Return Request".into()),
        });
        let pipeline = pipeline_with(
            Arc::new(FixedLookup(order_purchased_days_ago(15))),
            sku005_corpus(),
            WORDED_NOTICE,
            dispatcher.clone(),
            PipelineConfig::default(),
        );

        let result = pipeline.handle("order id: 104", None).await;

        assert_eq!(result.eligible, Some(true));
        assert!(!result.eligibility_notice_sent);
        assert_eq!(result.refund_notice_sent, Some(true));
        assert_eq!(result.error.unwrap().kind, FailureKind::DispatchFailed);

        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Refund Processing Notification");
    }

    #[tokio::test]
    async fn malformed_fallback_fails_resolution_stage() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        // Fragment mentions the SKU but no window pattern, so the LLM
        // fallback runs — and replies with prose instead of the contract.
        let pipeline = pipeline_with(
            Arc::new(FixedLookup(order_purchased_days_ago(5))),
            vec![PolicyFragment::new(
                "policy",
                "SKU005 falls under the special handling policy.",
            )],
            "It should be fine to return it.",
            dispatcher.clone(),
            PipelineConfig::default(),
        );

        let result = pipeline.handle("order id: 104", None).await;

        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::EligibilityResolutionFailed);
        assert!(result.eligible.is_none());
        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_policy_found_still_notifies_the_customer() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let pipeline = pipeline_with(
            Arc::new(FixedLookup(order_purchased_days_ago(5))),
            vec![PolicyFragment::new("policy", "Gift cards are final sale.")],
            WORDED_NOTICE,
            dispatcher.clone(),
            PipelineConfig::default(),
        );

        let result = pipeline.handle("order id: 104", None).await;

        assert_eq!(result.eligible, Some(false));
        let verdict = result.verdict.unwrap();
        assert_eq!(verdict.resolution, ResolutionPath::NoPolicyFound);
        assert!(result.refund.is_none());
        assert!(result.eligibility_notice_sent);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
    }
}
