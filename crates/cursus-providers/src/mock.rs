//! Mock provider for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use cursus_core::error::ProviderError;
use cursus_core::traits::{
    InsightRequest, InsightResponse, ModelInfo, TextInsightProvider, TokenUsage,
};

/// A mock provider for exercising insight plumbing without real API calls.
///
/// Returns configurable responses based on prompt content matching, or
/// fails every call when built with [`MockProvider::unavailable`].
pub struct MockProvider {
    /// Map of prompt substring → response text.
    responses: HashMap<String, String>,
    /// Default response if no prompt matches.
    default_response: String,
    /// Fail every call with a network error.
    unavailable: bool,
    call_count: AtomicU32,
    last_request: Mutex<Option<InsightRequest>>,
}

impl MockProvider {
    /// Create a new mock provider with the given prompt→response mappings.
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            default_response: "Keep up the steady work.".to_string(),
            unavailable: false,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(HashMap::new())
        }
    }

    /// Create a mock whose every call fails as if the service were down.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(HashMap::new())
        }
    }

    /// Get the number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this provider.
    pub fn last_request(&self) -> Option<InsightRequest> {
        self.last_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl TextInsightProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &InsightRequest) -> anyhow::Result<InsightResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        if self.unavailable {
            return Err(ProviderError::NetworkError("mock provider is unavailable".into()).into());
        }

        let content = self
            .responses
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(InsightResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_response() {
        let provider = MockProvider::with_fixed_response("Revise graph algorithms.");
        let response = provider
            .generate(&InsightRequest::new("mock-model", "anything"))
            .await
            .unwrap();
        assert_eq!(response.content, "Revise graph algorithms.");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_request().unwrap().prompt, "anything");
    }

    #[tokio::test]
    async fn prompt_matching() {
        let mut responses = HashMap::new();
        responses.insert("career".to_string(), "Data engineering fits you.".to_string());
        responses.insert("statistics".to_string(), "- Admission is up.".to_string());

        let provider = MockProvider::new(responses);

        let resp = provider
            .generate(&InsightRequest::new("mock", "suggest 3 career paths"))
            .await
            .unwrap();
        assert!(resp.content.contains("Data engineering"));

        let resp = provider
            .generate(&InsightRequest::new("mock", "Analyze these school statistics"))
            .await
            .unwrap();
        assert!(resp.content.contains("Admission"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn unavailable_fails_transiently() {
        let provider = MockProvider::unavailable();
        let err = provider
            .generate(&InsightRequest::new("mock", "anything"))
            .await
            .unwrap_err();
        assert!(!err.downcast_ref::<ProviderError>().unwrap().is_permanent());
    }
}
