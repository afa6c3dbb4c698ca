//! Capability classification of changed chunks.
//!
//! A [`Classifier`] turns one changed chunk into a theme, change type, claim
//! and three plain-language bullets. Classification is fallible by nature
//! (LLM timeouts, quota, malformed JSON), so the pipeline only ever calls
//! [`classify_or_fallback`], which degrades to a deterministic
//! [`fallback_classification`] instead of failing.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use capwatch_shared::{
    CapwatchError, ChangeType, ClassifierConfig, Result, SourceCategory, Theme,
};

use crate::detect::ChangedChunk;

/// Maximum characters of chunk text sent to a classifier.
pub const MAX_CLASSIFIER_INPUT_CHARS: usize = 1500;

/// Number of beginner-summary bullets a classification carries.
const SUMMARY_BULLETS: usize = 3;

/// Maximum characters of body text used as a fallback claim.
const FALLBACK_CLAIM_CHARS: usize = 200;

const FALLBACK_BULLET: &str =
    "Automatic classification was unavailable; review the linked source to assess this change.";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a classifier sees for one changed chunk.
#[derive(Debug, Clone)]
pub struct ClassifyInput<'a> {
    pub competitor: &'a str,
    pub url: &'a str,
    pub heading: &'a str,
    /// Chunk text, already capped at [`MAX_CLASSIFIER_INPUT_CHARS`].
    pub text: &'a str,
    pub source_category: SourceCategory,
}

impl<'a> ClassifyInput<'a> {
    pub fn new(
        competitor: &'a str,
        chunk: &'a ChangedChunk,
        source_category: SourceCategory,
    ) -> Self {
        Self {
            competitor,
            url: &chunk.url,
            heading: &chunk.heading,
            text: truncate_chars(&chunk.text, MAX_CLASSIFIER_INPUT_CHARS),
            source_category,
        }
    }
}

/// Result of classifying one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub theme: Theme,
    pub change_type: ChangeType,
    pub claim: String,
    pub beginner_summary: Vec<String>,
}

/// A pluggable classification backend.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Classify one changed chunk. Errors are recovered by the caller.
    async fn classify(&self, input: &ClassifyInput<'_>) -> Result<Classification>;
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Deterministic classification used whenever the classifier cannot answer.
pub fn fallback_classification(heading: &str, text: &str) -> Classification {
    let heading = heading.trim();
    let claim = if heading.is_empty() {
        truncate_chars(text.trim(), FALLBACK_CLAIM_CHARS).to_string()
    } else {
        heading.to_string()
    };

    Classification {
        theme: Theme::Unspecified,
        change_type: ChangeType::Enhancement,
        claim,
        beginner_summary: vec![FALLBACK_BULLET.to_string()],
    }
}

/// Classify with a per-call timeout, falling back on any failure.
pub async fn classify_or_fallback(
    classifier: &dyn Classifier,
    input: &ClassifyInput<'_>,
    timeout: Duration,
) -> Classification {
    match tokio::time::timeout(timeout, classifier.classify(input)).await {
        Ok(Ok(classification)) => classification,
        Ok(Err(e)) => {
            warn!(
                classifier = classifier.name(),
                url = input.url,
                heading = input.heading,
                error = %e,
                "classification failed, using fallback"
            );
            fallback_classification(input.heading, input.text)
        }
        Err(_) => {
            warn!(
                classifier = classifier.name(),
                url = input.url,
                heading = input.heading,
                timeout_secs = timeout.as_secs_f64(),
                "classification timed out, using fallback"
            );
            fallback_classification(input.heading, input.text)
        }
    }
}

/// Classifier that never calls out; every chunk gets the fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackClassifier;

#[async_trait]
impl Classifier for FallbackClassifier {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn classify(&self, _input: &ClassifyInput<'_>) -> Result<Classification> {
        Err(CapwatchError::Classification(
            "LLM classification disabled".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    theme: Option<String>,
    #[serde(default)]
    change_type: Option<String>,
    #[serde(default)]
    claim: Option<String>,
    #[serde(default)]
    beginner_summary: Vec<String>,
}

/// Parse a model reply into a [`Classification`].
///
/// A theme outside the taxonomy becomes `unspecified`. An unknown change
/// type, an empty claim, or fewer than three bullets is an error.
pub fn parse_classification(reply: &str) -> Result<Classification> {
    let raw: RawClassification = serde_json::from_str(strip_code_blocks(reply))
        .map_err(|e| CapwatchError::Classification(format!("malformed JSON: {e}")))?;

    let theme = raw
        .theme
        .as_deref()
        .and_then(|t| t.parse::<Theme>().ok())
        .unwrap_or(Theme::Unspecified);

    let change_type: ChangeType = raw
        .change_type
        .as_deref()
        .ok_or_else(|| CapwatchError::Classification("missing change_type".into()))?
        .parse()
        .map_err(|e: CapwatchError| CapwatchError::Classification(e.to_string()))?;

    let claim = raw.claim.unwrap_or_default().trim().to_string();
    if claim.is_empty() {
        return Err(CapwatchError::Classification("empty claim".into()));
    }

    let mut bullets: Vec<String> = raw
        .beginner_summary
        .into_iter()
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .collect();
    if bullets.len() < SUMMARY_BULLETS {
        return Err(CapwatchError::Classification(format!(
            "expected {SUMMARY_BULLETS} summary bullets, got {}",
            bullets.len()
        )));
    }
    bullets.truncate(SUMMARY_BULLETS);

    Ok(Classification {
        theme,
        change_type,
        claim,
        beginner_summary: bullets,
    })
}

/// Strip markdown code fences from a model reply.
fn strip_code_blocks(reply: &str) -> &str {
    reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Prefix of `s` holding at most `max` characters.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// OpenRouter
// ---------------------------------------------------------------------------

const TEMPERATURE: f64 = 0.15;
const MAX_TOKENS: u32 = 700;

/// Chat-completions classifier against an OpenAI-compatible endpoint.
pub struct OpenRouterClassifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenRouterClassifier {
    pub fn new(config: &ClassifierConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CapwatchError::config(format!("failed to build LLM client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "classification request");

        let body = json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CapwatchError::Classification(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CapwatchError::Classification(format!(
                "LLM API error ({status}): {error_text}"
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CapwatchError::Classification(format!("invalid response body: {e}")))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CapwatchError::Classification("empty completion".into()))
    }
}

#[async_trait]
impl Classifier for OpenRouterClassifier {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn classify(&self, input: &ClassifyInput<'_>) -> Result<Classification> {
        let reply = self.chat(&build_prompt(input)).await?;
        parse_classification(&reply)
    }
}

fn build_prompt(input: &ClassifyInput<'_>) -> String {
    let themes = Theme::ALL
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You analyze release notes and product documentation for ERP competitors.

Your audience: engineers joining an AI-native ERP company who may not have accounting or ERP backgrounds.

Given the following changed section from an official page, classify and summarize it for an internal capability change feed.

Return a single JSON object with EXACTLY these keys:

1. "theme": one of [{themes}]
2. "change_type": one of ["new_capability", "enhancement", "deprecation", "limitation"]
3. "claim": one precise sentence summarizing the change in product language.
4. "beginner_summary": an array of exactly 3 plain-language bullets:
   - what this means in simple terms
   - why it matters, or what problem it solves
   - the competitive insight it gives us

Explain accounting jargon (ASC 606, sub-ledger, month-end close) briefly in parentheses.

Competitor: {competitor}
Page URL: {url}
Section heading: {heading}
Source type: {category}

Changed text:
"""{text}""""#,
        competitor = input.competitor,
        url = input.url,
        heading = input.heading,
        category = input.source_category,
        text = input.text,
    )
}
