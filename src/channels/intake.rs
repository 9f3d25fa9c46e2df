//! Email intake — polls IMAP and feeds each new message into the pipeline.
//!
//! This layer owns "already processed": messages are marked `\Seen` at fetch
//! time and de-duplicated by Message-ID within the process. The pipeline
//! itself never de-duplicates; re-handing it the same email would run a
//! second case.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::email::{EmailConfig, fetch_unseen_imap, is_sender_allowed};
use crate::pipeline::ReturnPipeline;

/// Spawn a background task that polls IMAP and runs each new email through
/// the pipeline.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_intake_poller(
    config: EmailConfig,
    pipeline: Arc<ReturnPipeline>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Return-request intake started — polling every {}s on {}",
            config.poll_interval_secs, config.imap_host
        );

        let mut seen: HashSet<String> = HashSet::new();
        let mut tick = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Intake poller shutting down");
                return;
            }

            poll_once(&config, &pipeline, &mut seen).await;
        }
    });

    (handle, shutdown_flag)
}

/// Run a single poll cycle: fetch unseen → filter → pipeline per message.
async fn poll_once(
    config: &EmailConfig,
    pipeline: &Arc<ReturnPipeline>,
    seen: &mut HashSet<String>,
) {
    let cfg = config.clone();
    let fetch_result = tokio::task::spawn_blocking(move || fetch_unseen_imap(&cfg)).await;

    let messages = match fetch_result {
        Ok(Ok(msgs)) => msgs,
        Ok(Err(e)) => {
            error!("Intake poll failed: {e}");
            return;
        }
        Err(e) => {
            error!("Intake poll task panicked: {e}");
            return;
        }
    };

    if messages.is_empty() {
        return;
    }

    debug!("Fetched {} unseen email(s)", messages.len());

    for email in messages {
        if !seen.insert(email.message_id.clone()) {
            continue;
        }

        let sender = email.sender.as_deref();
        if let Some(addr) = sender
            && !is_sender_allowed(&config.allowed_senders, addr)
        {
            warn!("Blocked return request from {addr}");
            continue;
        }

        let result = pipeline.handle(&email.body, sender).await;
        match &result.error {
            None => info!(
                case_id = %result.case_id,
                order_id = result.order_id,
                eligible = result.eligible,
                "Return request processed"
            ),
            Some(err) => warn!(
                case_id = %result.case_id,
                kind = ?err.kind,
                detail = %err.detail,
                "Return request ended with error"
            ),
        }
    }
}
