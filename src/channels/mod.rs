//! Mail transport adapters — pure I/O, no decision logic.

pub mod email;
pub mod intake;

pub use email::{EmailConfig, FetchedEmail, SmtpDispatcher};
pub use intake::spawn_intake_poller;
