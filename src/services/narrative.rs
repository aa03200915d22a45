use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::RecommendationReasoning,
};

/// Turns structured reasoning into prose
///
/// The engine only hands over the structured reasoning.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NarrativeClient: Send + Sync {
    async fn narrate(
        &self,
        product_name: &str,
        reasoning: &RecommendationReasoning,
    ) -> AppResult<String>;

    /// Client name for logging and debugging
    fn name(&self) -> &'static str;
}

#[derive(Debug, Serialize)]
struct NarrativeRequest<'a> {
    product_name: &'a str,
    final_score: f64,
    confidence: f64,
    factors: &'a [String],
}

#[derive(Debug, Deserialize)]
struct NarrativeResponse {
    narrative: String,
}

/// Remote narrative generation service
#[derive(Clone)]
pub struct HttpNarrativeClient {
    http_client: HttpClient,
    api_url: String,
    api_key: Option<String>,
}

impl HttpNarrativeClient {
    pub fn new(api_url: String, api_key: Option<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
            api_key,
        }
    }
}

#[async_trait]
impl NarrativeClient for HttpNarrativeClient {
    async fn narrate(
        &self,
        product_name: &str,
        reasoning: &RecommendationReasoning,
    ) -> AppResult<String> {
        let url = format!("{}/v1/narratives", self.api_url.trim_end_matches('/'));
        let body = NarrativeRequest {
            product_name,
            final_score: reasoning.final_score,
            confidence: reasoning.confidence,
            factors: &reasoning.factors,
        };

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Narrative(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Narrative(format!(
                "Narrative service returned {}",
                response.status()
            )));
        }

        let parsed: NarrativeResponse = response
            .json()
            .await
            .map_err(|e| AppError::Narrative(format!("Malformed response: {}", e)))?;

        if parsed.narrative.trim().is_empty() {
            return Err(AppError::Narrative("Empty narrative".to_string()));
        }
        Ok(parsed.narrative)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Local prose built from the reasoning factors
///
/// Used when no narrative service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateNarrativeClient;

#[async_trait]
impl NarrativeClient for TemplateNarrativeClient {
    async fn narrate(
        &self,
        product_name: &str,
        reasoning: &RecommendationReasoning,
    ) -> AppResult<String> {
        let factors = reasoning
            .factors
            .iter()
            .map(|f| f.to_lowercase())
            .collect::<Vec<_>>()
            .join("; ");

        Ok(format!(
            "We picked {} for you ({:.1}/10): {}.",
            product_name, reasoning.final_score, factors
        ))
    }

    fn name(&self) -> &'static str {
        "template"
    }
}
