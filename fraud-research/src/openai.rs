use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use fraud_core::FraudError;
use tracing::{debug, instrument};

use crate::providers::{CompletionRequest, LanguageModel};

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIClient {
    pub fn new() -> Result<Self, FraudError> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(FraudError::config("OPENAI_API_KEY environment variable not set"));
        }

        // async-openai reads OPENAI_API_KEY from env automatically
        let config = OpenAIConfig::default();
        let client = Client::with_config(config);

        Ok(Self {
            client,
            model: "gpt-4o".to_string(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn build_messages(
        request: &CompletionRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, FraudError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);

        if let Some(system) = &request.system {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system.as_str())
                    .build()
                    .map_err(|e| FraudError::internal(e.to_string()))?
                    .into(),
            );
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user.as_str())
                .build()
                .map_err(|e| FraudError::internal(e.to_string()))?
                .into(),
        );

        Ok(messages)
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    #[instrument(skip(self, request), fields(model = %self.model, json = request.json))]
    async fn complete(&self, request: CompletionRequest) -> Result<String, FraudError> {
        let messages = Self::build_messages(&request)?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(messages)
            .temperature(request.temperature);
        if request.json {
            builder.response_format(ResponseFormat::JsonObject);
        }
        let body = builder
            .build()
            .map_err(|e| FraudError::internal(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(body)
            .await
            .map_err(|e| FraudError::api(format!("OpenAI API error: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| FraudError::parse("No response from OpenAI"))?;

        debug!("OpenAI returned {} chars", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message_only_when_requested() {
        let text = OpenAIClient::build_messages(&CompletionRequest::text("hello")).unwrap();
        assert_eq!(text.len(), 1);

        let json =
            OpenAIClient::build_messages(&CompletionRequest::json("respond in JSON", "hello"))
                .unwrap();
        assert_eq!(json.len(), 2);
        assert!(matches!(json[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(json[1], ChatCompletionRequestMessage::User(_)));
    }

    #[tokio::test]
    #[ignore] // Requires API key
    async fn test_complete_live() {
        let client = OpenAIClient::new().expect("OPENAI_API_KEY not set");
        let text = client
            .complete(CompletionRequest::text("Reply with the single word: ready"))
            .await
            .expect("completion failed");
        assert!(!text.is_empty());
    }
}
