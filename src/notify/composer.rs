//! Notice wording — LLM-worded eligibility notices, fixed refund template.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::llm::LlmProvider;
use crate::notify::{NoticeKind, NotificationEnvelope};
use crate::orders::OrderRecord;
use crate::policy::EligibilityVerdict;
use crate::refund::RefundDecision;

const ELIGIBILITY_SUBJECT: &str = "Regarding Your Return Request";
const REFUND_SUBJECT: &str = "Refund Processing Notification";

/// Composes customer-facing notice bodies.
///
/// The eligibility notice is worded by the LLM; when the model errors, times
/// out, or returns an empty reply, a deterministic template takes over so the
/// case can still notify. The refund notice is always the fixed template.
pub struct NoticeComposer {
    llm: Arc<dyn LlmProvider>,
    compose_timeout: Duration,
}

impl NoticeComposer {
    pub fn new(llm: Arc<dyn LlmProvider>, compose_timeout: Duration) -> Self {
        Self { llm, compose_timeout }
    }

    /// Render the eligibility notice for a decided case.
    pub async fn eligibility_notice(
        &self,
        order: &OrderRecord,
        verdict: &EligibilityVerdict,
    ) -> NotificationEnvelope {
        let prompt = build_wording_prompt(order, verdict);

        let body = match tokio::time::timeout(self.compose_timeout, self.llm.complete(&prompt))
            .await
        {
            Ok(Ok(reply)) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(Ok(_)) => {
                warn!(order_id = order.order_id, "Empty wording reply; using template");
                template_eligibility_body(order, verdict)
            }
            Ok(Err(e)) => {
                warn!(order_id = order.order_id, error = %e, "Wording failed; using template");
                template_eligibility_body(order, verdict)
            }
            Err(_) => {
                warn!(order_id = order.order_id, "Wording timed out; using template");
                template_eligibility_body(order, verdict)
            }
        };

        NotificationEnvelope {
            recipient: order.customer_email.clone(),
            subject: ELIGIBILITY_SUBJECT.to_string(),
            body,
            kind: NoticeKind::EligibilityNotice,
        }
    }

    /// Render the refund notice. Template only, no LLM involvement.
    pub fn refund_notice(
        &self,
        order: &OrderRecord,
        refund: &RefundDecision,
    ) -> NotificationEnvelope {
        let body = format!(
            "Dear {name},\n\n\
             We are pleased to inform you that your return request has been approved.\n\
             The amount of {amount} {currency} will be refunded to your original payment \
             method within 5-7 business days.\n\n\
             Thank you for your patience and understanding.\n\n\
             Sincerely,\n\
             The Customer Support Team",
            name = order.customer_name,
            amount = refund.amount,
            currency = refund.currency,
        );

        NotificationEnvelope {
            recipient: order.customer_email.clone(),
            subject: REFUND_SUBJECT.to_string(),
            body,
            kind: NoticeKind::RefundNotice,
        }
    }
}

/// Build the wording prompt for the eligibility notice.
fn build_wording_prompt(order: &OrderRecord, verdict: &EligibilityVerdict) -> String {
    let decision = if verdict.eligible { "accepted" } else { "rejected" };
    format!(
        "Write a customer support email about a product return request.\n\n\
         Customer Name: {name}\n\
         Order ID: {order_id}\n\
         Decision: return {decision}\n\
         Reason: {reason}\n\n\
         Requirements:\n\
         - Polite greeting\n\
         - Clearly explain if the return is accepted or rejected\n\
         - Mention the reason in plain language\n\
         - Friendly closing\n\n\
         Reply with the email body only, no subject line.",
        name = order.customer_name,
        order_id = order.order_id,
        decision = decision,
        reason = verdict.reason,
    )
}

/// Deterministic eligibility body used when the LLM is unavailable.
fn template_eligibility_body(order: &OrderRecord, verdict: &EligibilityVerdict) -> String {
    let outcome = if verdict.eligible {
        "has been accepted. You will receive a separate confirmation once your \
         refund is on its way."
    } else {
        "could not be accepted."
    };
    format!(
        "Dear {name},\n\n\
         Thank you for contacting us about order #{order_id}. \
         Your return request {outcome}\n\n\
         Decision detail: {reason}.\n\n\
         Kind regards,\n\
         Customer Support",
        name = order.customer_name,
        order_id = order.order_id,
        outcome = outcome,
        reason = verdict.reason,
    )
}
