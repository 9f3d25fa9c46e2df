//! Email transport — IMAP polling for inbound requests, SMTP via lettre
//! for outbound customer notices.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders};
use uuid::Uuid;

use crate::error::{ChannelError, DispatchError};
use crate::notify::NotificationDispatcher;

// ── Configuration ───────────────────────────────────────────────────

/// Email transport configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub poll_interval_secs: u64,
    pub allowed_senders: Vec<String>,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `RETURNS_IMAP_HOST` is not set (intake disabled).
    pub fn from_env() -> Option<Self> {
        let imap_host = std::env::var("RETURNS_IMAP_HOST").ok()?;

        let imap_port: u16 = std::env::var("RETURNS_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host = std::env::var("RETURNS_SMTP_HOST")
            .unwrap_or_else(|_| imap_host.replace("imap", "smtp"));

        let smtp_port: u16 = std::env::var("RETURNS_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("RETURNS_EMAIL_USERNAME").unwrap_or_default();
        let password = std::env::var("RETURNS_EMAIL_PASSWORD").unwrap_or_default();
        let from_address =
            std::env::var("RETURNS_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        let poll_interval_secs: u64 = std::env::var("RETURNS_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let allowed_senders: Vec<String> = std::env::var("RETURNS_ALLOWED_SENDERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Some(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
            poll_interval_secs,
            allowed_senders,
        })
    }
}

// ── Outbound: SMTP dispatcher ───────────────────────────────────────

/// SMTP-backed notification dispatcher.
pub struct SmtpDispatcher {
    config: EmailConfig,
}

impl SmtpDispatcher {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), DispatchError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.clone(),
        );

        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| DispatchError::SendFailed {
                recipient: to.into(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(self.config.from_address.parse().map_err(|e| {
                DispatchError::InvalidRecipient {
                    recipient: self.config.from_address.clone(),
                    reason: format!("invalid from address: {e}"),
                }
            })?)
            .to(to.parse().map_err(|e| DispatchError::InvalidRecipient {
                recipient: to.into(),
                reason: format!("{e}"),
            })?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| DispatchError::SendFailed {
                recipient: to.into(),
                reason: format!("failed to build email: {e}"),
            })?;

        transport.send(&email).map_err(|e| DispatchError::SendFailed {
            recipient: to.into(),
            reason: format!("SMTP send failed: {e}"),
        })?;

        tracing::info!("Email sent to {to}");
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for SmtpDispatcher {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DispatchError> {
        self.send_email(recipient, subject, body)
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Check if a sender email is in the allowlist.
///
/// - Empty list → deny all
/// - `*` in list → allow all
/// - `@domain.com` or `domain.com` → domain match
/// - `user@domain.com` → exact email match
pub fn is_sender_allowed(allowed: &[String], email: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    if allowed.iter().any(|a| a == "*") {
        return true;
    }
    let email_lower = email.to_lowercase();
    allowed.iter().any(|a| {
        if a.starts_with('@') {
            email_lower.ends_with(&a.to_lowercase())
        } else if a.contains('@') {
            a.eq_ignore_ascii_case(email)
        } else {
            email_lower.ends_with(&format!("@{}", a.to_lowercase()))
        }
    })
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> Option<String> {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

// ── Inbound: IMAP fetch ─────────────────────────────────────────────

/// One unseen email pulled from the inbox.
#[derive(Debug, Clone)]
pub struct FetchedEmail {
    pub message_id: String,
    pub sender: Option<String>,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// Fetch unseen emails via raw IMAP over TLS (blocking — run in
/// `spawn_blocking`). Fetched messages are marked `\Seen`, which is the
/// de-duplication boundary for intake: a message is handed over once.
pub fn fetch_unseen_imap(config: &EmailConfig) -> Result<Vec<FetchedEmail>, ChannelError> {
    use std::sync::Arc as StdArc;

    let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))
        .map_err(|e| ChannelError::Connect(e.to_string()))?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))
        .map_err(|e| ChannelError::Connect(e.to_string()))?;

    // TLS via rustls
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = StdArc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name: rustls::pki_types::ServerName<'_> =
        rustls::pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| ChannelError::Connect(e.to_string()))?;
    let mut tls = rustls::StreamOwned::new(conn, tcp);

    // ── IMAP helpers ────────────────────────────────────────────────
    let read_line =
        |tls: &mut rustls::StreamOwned<rustls::ClientConnection, TcpStream>| -> Result<String, ChannelError> {
            let mut buf = Vec::new();
            loop {
                let mut byte = [0u8; 1];
                match std::io::Read::read(tls, &mut byte) {
                    Ok(0) => return Err(ChannelError::Protocol("connection closed".into())),
                    Ok(_) => {
                        buf.push(byte[0]);
                        if buf.ends_with(b"\r\n") {
                            return Ok(String::from_utf8_lossy(&buf).to_string());
                        }
                    }
                    Err(e) => return Err(ChannelError::Protocol(e.to_string())),
                }
            }
        };

    let send_cmd =
        |tls: &mut rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
         tag: &str,
         cmd: &str|
         -> Result<Vec<String>, ChannelError> {
            let full = format!("{tag} {cmd}\r\n");
            IoWrite::write_all(tls, full.as_bytes())
                .map_err(|e| ChannelError::Protocol(e.to_string()))?;
            IoWrite::flush(tls).map_err(|e| ChannelError::Protocol(e.to_string()))?;
            let mut lines = Vec::new();
            loop {
                let line = read_line(tls)?;
                let done = line.starts_with(tag);
                lines.push(line);
                if done {
                    break;
                }
            }
            Ok(lines)
        };

    // Read greeting
    let _greeting = read_line(&mut tls)?;

    // Login
    let login_resp = send_cmd(
        &mut tls,
        "A1",
        &format!("LOGIN \"{}\" \"{}\"", config.username, config.password),
    )?;
    if !login_resp.last().is_some_and(|l| l.contains("OK")) {
        return Err(ChannelError::AuthFailed {
            username: config.username.clone(),
        });
    }

    // Select INBOX
    let _select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;

    // Search unseen
    let search_resp = send_cmd(&mut tls, "A3", "SEARCH UNSEEN")?;
    let mut uids: Vec<&str> = Vec::new();
    for line in &search_resp {
        if line.starts_with("* SEARCH") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() > 2 {
                uids.extend_from_slice(&parts[2..]);
            }
        }
    }

    let mut results = Vec::new();
    let mut tag_counter = 4_u32;

    for uid in &uids {
        let fetch_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let fetch_resp = send_cmd(&mut tls, &fetch_tag, &format!("FETCH {uid} RFC822"))?;

        let raw: String = fetch_resp
            .iter()
            .skip(1)
            .take(fetch_resp.len().saturating_sub(2))
            .cloned()
            .collect();

        if let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) {
            let sender = extract_sender(&parsed);
            let subject = parsed.subject().unwrap_or("(no subject)").to_string();
            let body = extract_text(&parsed);
            let message_id = parsed
                .message_id()
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

            let received_at = parsed
                .date()
                .and_then(|d| {
                    chrono::NaiveDate::from_ymd_opt(
                        d.year as i32,
                        u32::from(d.month),
                        u32::from(d.day),
                    )
                    .and_then(|date| {
                        date.and_hms_opt(
                            u32::from(d.hour),
                            u32::from(d.minute),
                            u32::from(d.second),
                        )
                    })
                    .map(|n| n.and_utc())
                })
                .unwrap_or_else(Utc::now);

            results.push(FetchedEmail {
                message_id,
                sender,
                subject,
                body,
                received_at,
            });
        }

        // Mark as seen
        let store_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let _ = send_cmd(&mut tls, &store_tag, &format!("STORE {uid} +FLAGS (\\Seen)"));
    }

    // Logout
    let logout_tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &logout_tag, "LOGOUT");

    Ok(results)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Sender allowlist tests ──────────────────────────────────────

    #[test]
    fn allowlist_empty_denies_all() {
        assert!(!is_sender_allowed(&[], "anyone@example.com"));
    }

    #[test]
    fn allowlist_wildcard_allows_all() {
        let allowed = vec!["*".to_string()];
        assert!(is_sender_allowed(&allowed, "anyone@example.com"));
    }

    #[test]
    fn allowlist_exact_email_match() {
        let allowed = vec!["customer@example.com".to_string()];
        assert!(is_sender_allowed(&allowed, "customer@example.com"));
        assert!(is_sender_allowed(&allowed, "Customer@Example.COM"));
        assert!(!is_sender_allowed(&allowed, "other@example.com"));
    }

    #[test]
    fn allowlist_domain_with_at_prefix() {
        let allowed = vec!["@example.com".to_string()];
        assert!(is_sender_allowed(&allowed, "anyone@example.com"));
        assert!(!is_sender_allowed(&allowed, "anyone@other.com"));
    }

    #[test]
    fn allowlist_domain_without_at_prefix() {
        let allowed = vec!["example.com".to_string()];
        assert!(is_sender_allowed(&allowed, "anyone@example.com"));
        assert!(!is_sender_allowed(&allowed, "anyone@notexample.org"));
    }

    // ── HTML stripping tests ────────────────────────────────────────

    #[test]
    fn strip_html_basic() {
        assert_eq!(
            strip_html("<p>I want to return my order</p>"),
            "I want to return my order"
        );
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>order id:</b> <span>104</span></div>"),
            "order id: 104"
        );
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("no tags here"), "no tags here");
    }

    #[test]
    fn strip_html_whitespace_normalized() {
        assert_eq!(strip_html("a\n\n  b"), "a b");
    }
}
