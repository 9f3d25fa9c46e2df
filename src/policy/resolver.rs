//! Eligibility resolver — turns policy text into a structured verdict.
//!
//! Resolution order for `(product_id, elapsed_days)`:
//! 1. ranked retrieval, filtered to fragments literally containing the SKU
//! 2. exhaustive full-corpus scan when the ranked tier has no literal match
//! 3. window extraction near the SKU token, then anywhere in the fragment
//! 4. language-model fallback, schema-validated before use
//!
//! Pure with respect to external state: identical inputs against an
//! unchanged corpus produce an identical verdict.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ResolveError;
use crate::llm::LlmProvider;
use crate::policy::retriever::{PolicyFragment, PolicyRetriever};

/// Max candidate fragments requested from the ranked tier.
const RETRIEVAL_LIMIT: usize = 6;

/// How a verdict was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionPath {
    /// Window pattern found forward of the SKU token in the fragment.
    ExactSkuMatch,
    /// Window pattern found elsewhere in the SKU-bearing fragment.
    KeywordFallback,
    /// No fragment contains the SKU; always ineligible.
    NoPolicyFound,
    /// Fragment mentions the SKU but no window pattern; LLM decided.
    NaturalLanguageFallback,
}

/// Structured eligibility decision with justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub eligible: bool,
    pub reason: String,
    /// The return-window value used, when one was extracted from policy text.
    pub source_days: Option<u32>,
    pub resolution: ResolutionPath,
}

/// Eligibility resolver over a policy corpus and an LLM fallback.
pub struct EligibilityResolver {
    retriever: Arc<dyn PolicyRetriever>,
    fallback: Arc<dyn LlmProvider>,
    window_anywhere: Regex,
}

impl EligibilityResolver {
    pub fn new(retriever: Arc<dyn PolicyRetriever>, fallback: Arc<dyn LlmProvider>) -> Self {
        Self {
            retriever,
            fallback,
            window_anywhere: Regex::new(r"(?i)(\d+)\s+days?").unwrap(),
        }
    }

    /// Resolve return eligibility for a product against the policy corpus.
    pub async fn resolve(
        &self,
        product_id: &str,
        elapsed_days: i64,
    ) -> Result<EligibilityVerdict, ResolveError> {
        debug!(product_id, elapsed_days, "Resolving return eligibility");

        let Some(mut fragment) = self.find_sku_fragment(product_id).await? else {
            info!(product_id, "No policy fragment mentions the SKU");
            return Ok(EligibilityVerdict {
                eligible: false,
                reason: format!("policy not found for {product_id}"),
                source_days: None,
                resolution: ResolutionPath::NoPolicyFound,
            });
        };
        fragment.matched_sku = true;

        if let Some((window, resolution)) = self.extract_window(&fragment.text, product_id) {
            let eligible = elapsed_days <= i64::from(window);
            let reason = if eligible {
                format!("within the {window}-day return window")
            } else {
                format!("exceeds the {window}-day return window")
            };
            info!(product_id, window, eligible, ?resolution, "Window extracted from policy text");
            return Ok(EligibilityVerdict {
                eligible,
                reason,
                source_days: Some(window),
                resolution,
            });
        }

        warn!(product_id, "No return window in fragment; invoking language-model fallback");
        self.resolve_with_fallback(&fragment, product_id, elapsed_days)
            .await
    }

    /// Two-tier fragment search: ranked candidates first, full corpus second.
    ///
    /// Both tiers filter on literal, case-sensitive containment of the exact
    /// SKU token. First match wins; no best-match ranking across matches.
    async fn find_sku_fragment(
        &self,
        product_id: &str,
    ) -> Result<Option<PolicyFragment>, ResolveError> {
        let query = format!("Return policy for {product_id}");
        let ranked = self.retriever.search(&query, RETRIEVAL_LIMIT).await?;

        if let Some(hit) = ranked.into_iter().find(|f| f.text.contains(product_id)) {
            return Ok(Some(hit));
        }

        debug!(product_id, "Ranked tier had no literal SKU match; scanning full corpus");
        let all = self.retriever.all_fragments().await?;
        Ok(all.into_iter().find(|f| f.text.contains(product_id)))
    }

    /// Extract a return-window length in days from a fragment.
    ///
    /// Tries the SKU-proximity pattern first (window stated forward of the
    /// SKU token), then the same pattern anywhere in the fragment. The first
    /// integer matched wins; later mentions are ignored.
    fn extract_window(&self, text: &str, product_id: &str) -> Option<(u32, ResolutionPath)> {
        let near_sku = Regex::new(&format!(
            r"(?is){}.*?(\d+)\s+days?",
            regex::escape(product_id)
        ))
        .ok()?;

        if let Some(days) = first_captured_u32(&near_sku, text) {
            return Some((days, ResolutionPath::ExactSkuMatch));
        }

        first_captured_u32(&self.window_anywhere, text)
            .map(|days| (days, ResolutionPath::KeywordFallback))
    }

    /// Pose the fragment to the LLM and validate its structured reply.
    async fn resolve_with_fallback(
        &self,
        fragment: &PolicyFragment,
        product_id: &str,
        elapsed_days: i64,
    ) -> Result<EligibilityVerdict, ResolveError> {
        let prompt = build_fallback_prompt(&fragment.text, product_id, elapsed_days);
        let reply = self.fallback.complete(&prompt).await?;

        let verdict = parse_fallback_reply(&reply)?;
        info!(
            product_id,
            eligible = verdict.eligible,
            "Language-model fallback verdict accepted"
        );
        Ok(EligibilityVerdict {
            eligible: verdict.eligible,
            reason: verdict.reason,
            source_days: None,
            resolution: ResolutionPath::NaturalLanguageFallback,
        })
    }
}

/// First capture group of `re` in `text`, parsed as u32.
fn first_captured_u32(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ── Fallback prompt and reply parsing ───────────────────────────────

/// Build the fallback prompt from the fragment and the request.
fn build_fallback_prompt(fragment: &str, product_id: &str, elapsed_days: i64) -> String {
    format!(
        "You are a policy expert. Given the company's return policy context below, \
         answer if the product with the given SKU can be returned based on the days \
         since purchase.\n\n\
         POLICY CONTEXT:\n{fragment}\n\n\
         Request:\n\
         SKU ID: {product_id}\n\
         Days Since Purchase: {elapsed_days}\n\n\
         Answer STRICTLY in this JSON format only:\n\
         {{\n  \"eligible\": true/false,\n  \"reason\": \"<clear explanation>\"\n}}"
    )
}

/// The only shape the fallback is allowed to return.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FallbackVerdict {
    eligible: bool,
    reason: String,
}

/// Parse the fallback reply, rejecting anything but the exact two-field shape.
fn parse_fallback_reply(raw: &str) -> Result<FallbackVerdict, ResolveError> {
    let json_str = extract_json_object(raw);
    serde_json::from_str(&json_str).map_err(|e| ResolveError::MalformedFallback {
        detail: format!("{e}; raw reply: {}", truncate(raw, 200)),
    })
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Try to find object bounds
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
