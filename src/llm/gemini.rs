use serde::{Deserialize, Serialize};

use super::provider::{
    AssistantInput, AssistantOutput, LlmError, LlmProvider, LlmResult, truncate_error_body,
};
use crate::http::client::{HttpClient, RequestAuth};

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(
        http: HttpClient,
        api_key: Option<String>,
        model: String,
        base_url: String,
    ) -> LlmResult<Self> {
        let api_key = api_key
            .filter(|v| !v.trim().is_empty())
            .ok_or(LlmError::MissingApiKey {
                env_var: "GEMINI_API_KEY",
            })?;

        Ok(Self {
            http,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_request(input: &AssistantInput) -> GeminiGenerateRequest {
        let generation_config = if input.temperature.is_some() || !input.stop_sequences.is_empty()
        {
            Some(GeminiGenerationConfig {
                temperature: input.temperature,
                stop_sequences: input.stop_sequences.clone(),
            })
        } else {
            None
        };

        GeminiGenerateRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: input.user_message.clone(),
                }],
            }],
            system_instruction: input
                .system_instruction
                .as_ref()
                .map(|text| GeminiSystemInstruction {
                    parts: vec![GeminiPart { text: text.clone() }],
                }),
            generation_config,
        }
    }

    fn extract_text(resp: GeminiGenerateResponse) -> LlmResult<String> {
        for candidate in resp.candidates {
            let Some(content) = candidate.content else {
                continue;
            };
            let text = content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<String>();
            if !text.trim().is_empty() {
                return Ok(text.trim().to_string());
            }
        }

        Err(LlmError::EmptyResponse)
    }
}

impl LlmProvider for GeminiProvider {
    async fn generate(&self, input: AssistantInput) -> LlmResult<AssistantOutput> {
        let payload = Self::build_request(&input);
        let resp = self
            .http
            .post_json(
                &self.endpoint(),
                RequestAuth::QueryKey(&self.api_key),
                &payload,
            )
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        if !resp.is_success() {
            return Err(LlmError::HttpStatus {
                status: resp.status,
                body: truncate_error_body(&resp.body),
            });
        }

        let parsed = serde_json::from_str::<GeminiGenerateResponse>(&resp.body)
            .map_err(|err| LlmError::Parse(err.to_string()))?;
        let text = Self::extract_text(parsed)?;
        Ok(AssistantOutput { text })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[cfg(test)]
mod tests {
    use super::GeminiProvider;
    use crate::http::client::HttpClient;
    use crate::http::debug::HttpDebugConfig;
    use crate::llm::provider::{AssistantInput, LlmError, LlmProvider};
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, key: &str) -> GeminiProvider {
        GeminiProvider::new(
            HttpClient::new(Client::new(), HttpDebugConfig::disabled()),
            Some(key.to_string()),
            "test-model".to_string(),
            server.uri(),
        )
        .expect("provider")
    }

    #[tokio::test]
    async fn generate_joins_parts_of_first_non_empty_candidate() {
        let server = MockServer::start().await;
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": ""}]}},
                {"content": {"parts": [{"text": "SELECT "}, {"text": "1"}]}}
            ]
        }"#;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_string_contains("systemInstruction"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let out = provider(&server, "test-key")
            .generate(AssistantInput {
                system_instruction: Some("system".to_string()),
                ..AssistantInput::user("hello")
            })
            .await
            .expect("success response");

        assert_eq!(out.text, "SELECT 1");
    }

    #[tokio::test]
    async fn generate_sends_temperature_and_stop_sequences() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": {
                    "temperature": 0.5,
                    "stopSequences": ["\nObservation:"]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = provider(&server, "test-key")
            .generate(AssistantInput {
                temperature: Some(0.5),
                stop_sequences: vec!["\nObservation:".to_string()],
                ..AssistantInput::user("hello")
            })
            .await
            .expect("success response");

        assert_eq!(out.text, "ok");
    }

    #[tokio::test]
    async fn generate_maps_http_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let err = provider(&server, "bad-key")
            .generate(AssistantInput::user("hello"))
            .await
            .expect_err("expected auth error");

        match err {
            LlmError::HttpStatus { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid key"));
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generate_returns_empty_response_error_when_no_text() {
        let server = MockServer::start().await;
        let body = r#"{"candidates": [{"content": {"parts": [{"text": ""}]}}, {"finishReason": "SAFETY"}]}"#;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let err = provider(&server, "test-key")
            .generate(AssistantInput::user("hello"))
            .await
            .expect_err("expected empty response error");

        assert_eq!(err, LlmError::EmptyResponse);
    }

    #[test]
    fn new_requires_api_key() {
        let err = GeminiProvider::new(
            HttpClient::new(Client::new(), HttpDebugConfig::disabled()),
            Some("   ".to_string()),
            "test-model".to_string(),
            "https://example.com".to_string(),
        )
        .expect_err("missing key should fail");

        assert_eq!(
            err,
            LlmError::MissingApiKey {
                env_var: "GEMINI_API_KEY"
            }
        );
        assert_eq!(err.to_string(), "missing GEMINI_API_KEY");
    }
}
