//! Gemini categorizer: one fixed prompt per transaction, a closed category
//! set, and defensive parsing of whatever the model sends back.

use futures_util::stream::{self, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use spendsmart_core::category::{Categorization, Category};
use spendsmart_core::error::{Result, SpendError};
use spendsmart_core::transaction::Transaction;

use crate::retry::{retry_with_backoff, RetryPolicy};

const DEFAULT_MODEL: &str = "gemini-pro";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// What we ask the model to return, verbatim
#[derive(Deserialize)]
struct RawCategorization {
    primary_category: Option<String>,
    subcategory: Option<String>,
    confidence: Option<f64>,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Categorize one transaction, retrying upstream outages with backoff.
    /// Errors surface so the orchestrator can fall back to `Other` without
    /// aborting the batch.
    pub async fn categorize(&self, tx: &Transaction) -> Result<Categorization> {
        let prompt = prompt_for(tx);
        let reply = retry_with_backoff(self.retry, "gemini", || self.generate(&prompt)).await?;
        parse_reply(&reply)
    }

    /// Categorize a batch with a bounded worker pool. Results come back in
    /// input order; a failed call yields Err at its own index and never
    /// disturbs the others.
    pub async fn categorize_all(
        &self,
        txns: &[Transaction],
        concurrency: usize,
    ) -> Vec<Result<Categorization>> {
        let concurrency = concurrency.max(1);
        let mut results: Vec<Result<Categorization>> = txns
            .iter()
            .map(|_| Err(SpendError::upstream("gemini", "not attempted")))
            .collect();

        let mut jobs = stream::iter(txns.iter().enumerate().map(|(i, tx)| async move {
            (i, self.categorize(tx).await)
        }))
        .buffer_unordered(concurrency);

        while let Some((i, result)) = jobs.next().await {
            results[i] = result;
        }
        results
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{BASE_URL}/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpendError::upstream("gemini", e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SpendError::upstream("gemini", format!("{status} {text}")));
        }

        let out: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| SpendError::upstream("gemini", format!("bad response body: {e}")))?;

        let mut reply = String::new();
        for candidate in out.candidates.unwrap_or_default() {
            let parts = candidate.content.and_then(|c| c.parts).unwrap_or_default();
            for part in parts {
                if let Some(t) = part.text {
                    reply.push_str(&t);
                }
            }
        }
        Ok(reply.trim().to_string())
    }
}

/// Fixed prompt: enumerate the allowed categories and demand a JSON object.
fn prompt_for(tx: &Transaction) -> String {
    format!(
        "You are an expert financial transaction categorizer.\n\
         Analyze the following transaction and categorize it accurately.\n\n\
         Available categories: {}\n\n\
         Return your response as a JSON object with this exact format:\n\
         {{\"primary_category\": \"category name\", \"subcategory\": \"specific subcategory\", \"confidence\": 0.95}}\n\n\
         Transaction details:\n\
         Name: {}\n\
         Amount: ${:.2}\n\
         Merchant: {}\n\
         Description: {}\n\
         Date: {}\n",
        Category::prompt_list(),
        tx.name,
        tx.amount().abs(),
        tx.merchant_name.as_deref().unwrap_or("N/A"),
        tx.description.as_deref().unwrap_or("N/A"),
        tx.posted.format("%Y-%m-%d"),
    )
}

/// Pull a JSON object out of a possibly chatty reply: strip markdown code
/// fences first, then fall back to grabbing the first `{...}` in the text.
fn extract_json(reply: &str) -> Option<String> {
    let trimmed = reply.trim();

    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let rest = &trimmed[start + fence.len()..];
            if let Some(end) = rest.find("```") {
                let inner = rest[..end].trim();
                if inner.starts_with('{') {
                    return Some(inner.to_string());
                }
            }
        }
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed.to_string());
    }

    let re = Regex::new(r"\{[^{}]+\}").ok()?;
    re.find(trimmed).map(|m| m.as_str().to_string())
}

/// Untrusted parse of the model's reply into the closed category set.
fn parse_reply(reply: &str) -> Result<Categorization> {
    let json = extract_json(reply)
        .ok_or_else(|| SpendError::AmbiguousCategory(reply.chars().take(120).collect()))?;

    let raw: RawCategorization = serde_json::from_str(&json)
        .map_err(|_| SpendError::AmbiguousCategory(json.chars().take(120).collect()))?;

    let label = raw.primary_category.unwrap_or_default();
    let category = Category::parse_label(&label)
        .ok_or_else(|| SpendError::AmbiguousCategory(label.clone()))?;

    Ok(Categorization {
        category,
        subcategory: raw.subcategory.unwrap_or_default(),
        confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
    })
}
