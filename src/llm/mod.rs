pub mod gemini;
pub mod openai;
pub mod provider;

use gemini::GeminiProvider;
use openai::OpenAiProvider;
use provider::{AssistantInput, AssistantOutput, LlmProvider, LlmResult};

#[derive(Debug, Clone)]
pub enum ConfiguredProvider {
    Gemini(GeminiProvider),
    OpenAi(OpenAiProvider),
}

impl LlmProvider for ConfiguredProvider {
    async fn generate(&self, input: AssistantInput) -> LlmResult<AssistantOutput> {
        match self {
            Self::Gemini(provider) => provider.generate(input).await,
            Self::OpenAi(provider) => provider.generate(input).await,
        }
    }
}
