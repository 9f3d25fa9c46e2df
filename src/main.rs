use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use returns_assist::channels::email::EmailConfig;
use returns_assist::channels::{SmtpDispatcher, spawn_intake_poller};
use returns_assist::config::PipelineConfig;
use returns_assist::llm::{LlmBackend, LlmConfig, create_provider};
use returns_assist::notify::NoticeComposer;
use returns_assist::pipeline::ReturnPipeline;
use returns_assist::policy::{EligibilityResolver, InMemoryPolicyIndex};
use returns_assist::store::LibSqlOrderStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Read API key from environment
    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let model = std::env::var("RETURNS_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    let db_path =
        std::env::var("RETURNS_DB_PATH").unwrap_or_else(|_| "./data/returns.db".to_string());

    let policy_path = std::env::var("RETURNS_POLICY_PATH")
        .unwrap_or_else(|_| "./data/return-policy.txt".to_string());

    eprintln!("📦 Returns Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);
    eprintln!("   Database: {}", db_path);
    eprintln!("   Policy corpus: {}", policy_path);

    // LLM provider (eligibility fallback + notice wording)
    let llm_config = LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    };
    let llm = create_provider(&llm_config)?;

    // Order/customer store
    let store = Arc::new(LibSqlOrderStore::new_local(Path::new(&db_path)).await?);

    // Policy corpus
    let index = Arc::new(InMemoryPolicyIndex::from_file(Path::new(&policy_path))?);
    if index.is_empty() {
        anyhow::bail!("policy corpus at {policy_path} produced no fragments");
    }

    // Mail account
    let Some(email_config) = EmailConfig::from_env() else {
        anyhow::bail!(
            "RETURNS_IMAP_HOST not set — configure the mail account to poll for return requests"
        );
    };

    // Pipeline wiring
    let config = PipelineConfig::from_env();
    let resolver = EligibilityResolver::new(index, llm.clone());
    let composer = NoticeComposer::new(llm, config.compose_timeout);
    let dispatcher = Arc::new(SmtpDispatcher::new(email_config.clone()));
    let pipeline = Arc::new(ReturnPipeline::new(
        store, resolver, composer, dispatcher, config,
    ));

    let (poller, shutdown) = spawn_intake_poller(email_config, pipeline);

    tokio::signal::ctrl_c().await?;
    eprintln!("\nShutting down...");
    shutdown.store(true, Ordering::Relaxed);
    poller.abort();

    Ok(())
}
