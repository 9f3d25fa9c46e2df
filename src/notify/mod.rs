//! Customer notifications — envelopes, the dispatch boundary, and wording.

pub mod composer;

pub use composer::NoticeComposer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Which customer-facing message an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    /// Sent for every decided case: accepted or rejected, with the reason.
    EligibilityNotice,
    /// Sent only for eligible cases: amount and refund timeline.
    RefundNotice,
}

/// A rendered message ready for dispatch. Produced per case, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub kind: NoticeKind,
}

/// Capability interface over the outbound message transport.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Send one rendered message. Ack is `Ok(())`.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DispatchError>;
}
