//! Gemini backend implementation (API key authentication).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::Error;
use crate::Result;

use super::{
    Backend, CacheRequest, Content, GeminiResponse, GenerateResponse, RequestConfig,
};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API client using API key authentication.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiClient {
    /// Create a new Gemini client with API key.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }

    fn model_url(&self, operation: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            GEMINI_API_URL, self.model, operation, self.api_key
        )
    }

    fn build_request(&self, contents: &[Content], config: &RequestConfig) -> Value {
        let mut request = json!({
            "contents": contents,
            "generationConfig": {
                "thinkingConfig": { "thinkingBudget": config.thinking_budget }
            }
        });

        if let Some(ref system) = config.system_instruction {
            request["systemInstruction"] = json!({
                "parts": [{"text": system}]
            });
        }

        if !config.tools.is_empty() {
            request["tools"] = json!([{
                "functionDeclarations": config.tools
            }]);
        }

        if let Some(ref cached) = config.cached_content {
            request["cachedContent"] = json!(cached);
        }

        request
    }

    async fn post(&self, url: String, body: Value) -> Result<Value> {
        let response = self.client.post(url).json(&body).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(Error::Backend(format!("Gemini API error: {error_text}")));
        }

        Ok(response.json().await?)
    }

    fn ttl_string(ttl: Duration) -> String {
        format!("{}s", ttl.as_secs())
    }
}

#[async_trait]
impl Backend for GeminiClient {
    async fn generate(
        &self,
        contents: &[Content],
        config: &RequestConfig,
    ) -> Result<GenerateResponse> {
        let body = self.build_request(contents, config);
        let response = self.post(self.model_url("generateContent"), body).await?;
        let response: GeminiResponse = serde_json::from_value(response)?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend("No candidates in response".to_string()))?;

        Ok(GenerateResponse {
            content: candidate.content,
            usage: response.usage_metadata,
        })
    }

    async fn count_tokens(&self, text: &str) -> Result<usize> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": text}]
            }]
        });

        let response = self.post(self.model_url("countTokens"), body).await?;
        response["totalTokens"]
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| Error::Backend("countTokens returned no totalTokens".to_string()))
    }

    async fn create_cache(&self, request: &CacheRequest) -> Result<String> {
        let mut body = json!({
            "model": format!("models/{}", request.model),
            "displayName": request.display_name,
            "systemInstruction": {
                "parts": [{"text": request.system_instruction}]
            },
            "ttl": Self::ttl_string(request.ttl)
        });

        if !request.tools.is_empty() {
            body["tools"] = json!([{
                "functionDeclarations": request.tools
            }]);
        }

        let url = format!("{}/cachedContents?key={}", GEMINI_API_URL, self.api_key);
        let response = self.post(url, body).await?;
        response["name"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Backend("cachedContents create returned no name".to_string()))
    }

    async fn refresh_cache(&self, name: &str, ttl: Duration) -> Result<()> {
        let url = format!(
            "{}/{}?updateMask=ttl&key={}",
            GEMINI_API_URL, name, self.api_key
        );
        let body = json!({ "ttl": Self::ttl_string(ttl) });

        let response = self.client.patch(url).json(&body).send().await?;
        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(Error::Backend(format!("Gemini API error: {error_text}")));
        }

        Ok(())
    }
}
