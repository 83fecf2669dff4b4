use crate::config::{LlmConfig, VoiceConfig};
use crate::prompts::{system_prompt, Language, BASIC_SYSTEM_PROMPT};
use crate::session::ConversationTurn;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use waypoint_common::{LocationContext, Result, WaypointError};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        user_input: &str,
    ) -> Result<String>;

    /// True when the provider accepts the configured key.
    async fn validate_api_key(&self) -> bool;

    async fn list_models(&self) -> Result<Vec<String>>;

    fn model(&self) -> String;
}

fn upstream(provider: &str, e: OpenAIError) -> WaypointError {
    WaypointError::Upstream(format!("{} request failed: {}", provider, e))
}

/// Chat completions against any OpenAI-compatible endpoint.
pub struct OpenAiCompatibleChat {
    provider: String,
    client: Client<OpenAIConfig>,
    has_key: bool,
    model: String,
    settings: LlmConfig,
}

impl OpenAiCompatibleChat {
    pub fn new(
        provider: impl Into<String>,
        api_key: &str,
        api_base: &str,
        model: impl Into<String>,
        settings: LlmConfig,
    ) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base.trim_end_matches('/'));

        Self {
            provider: provider.into(),
            client: Client::with_config(config),
            has_key: !api_key.is_empty(),
            model: model.into(),
            settings,
        }
    }

    pub fn groq(config: &VoiceConfig) -> Self {
        Self::new(
            "Groq",
            &config.groq.api_key,
            &config.groq.api_base,
            config.groq.model.clone(),
            config.llm.clone(),
        )
    }

    pub fn openai(config: &VoiceConfig) -> Self {
        Self::new(
            "OpenAI",
            &config.openai.api_key,
            &config.openai.api_base,
            config.openai.chat_model.clone(),
            config.llm.clone(),
        )
    }

    /// OpenAI client bound to the binary voice-chat model.
    pub fn voice_chat(config: &VoiceConfig) -> Self {
        Self::new(
            "OpenAI",
            &config.openai.api_key,
            &config.openai.api_base,
            config.voice_chat.model.clone(),
            config.llm.clone(),
        )
    }

    fn build_messages(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        user_input: &str,
    ) -> std::result::Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut messages = vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()?,
        )];

        let skip = history.len().saturating_sub(self.settings.history_window);
        for turn in &history[skip..] {
            messages.push(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.user_input.clone())
                    .build()?,
            ));
            messages.push(ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.ai_response.clone())
                    .build()?,
            ));
        }

        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_input)
                .build()?,
        ));

        Ok(messages)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        user_input: &str,
    ) -> Result<String> {
        if !self.has_key {
            return Err(WaypointError::Configuration(format!(
                "{} API key not configured",
                self.provider
            )));
        }

        let messages = self
            .build_messages(system_prompt, history, user_input)
            .map_err(|e| upstream(&self.provider, e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(self.settings.max_tokens)
            .temperature(self.settings.temperature)
            .build()
            .map_err(|e| upstream(&self.provider, e))?;

        debug!("{} completion with {}", self.provider, self.model);
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| upstream(&self.provider, e))?;

        let reply = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .unwrap_or_default();

        if reply.is_empty() {
            return Err(WaypointError::Upstream(format!(
                "{} returned an empty response",
                self.provider
            )));
        }

        Ok(reply.to_string())
    }

    async fn validate_api_key(&self) -> bool {
        if !self.has_key {
            return false;
        }
        match self.client.models().list().await {
            Ok(_) => true,
            Err(e) => {
                error!("{} API key validation failed: {}", self.provider, e);
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let models = self
            .client
            .models()
            .list()
            .await
            .map_err(|e| upstream(&self.provider, e))?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}

/// Groq with the session prompt, then OpenAI with the session prompt,
/// then OpenAI with the basic prompt.
#[derive(Clone)]
pub struct ResponseChain {
    primary: Arc<dyn ChatModel>,
    fallback: Arc<dyn ChatModel>,
}

impl ResponseChain {
    pub fn new(primary: Arc<dyn ChatModel>, fallback: Arc<dyn ChatModel>) -> Self {
        Self { primary, fallback }
    }

    pub fn primary(&self) -> &Arc<dyn ChatModel> {
        &self.primary
    }

    pub fn fallback(&self) -> &Arc<dyn ChatModel> {
        &self.fallback
    }

    pub async fn respond(
        &self,
        language: Language,
        location: Option<&LocationContext>,
        history: &[ConversationTurn],
        user_input: &str,
    ) -> Result<String> {
        let prompt = system_prompt(language, location);

        match self.primary.complete(&prompt, history, user_input).await {
            Ok(reply) => return Ok(reply),
            Err(e) => warn!("Primary model failed, falling back: {}", e),
        }

        match self.fallback.complete(&prompt, history, user_input).await {
            Ok(reply) => return Ok(reply),
            Err(e) => error!("Fallback model failed, retrying with basic prompt: {}", e),
        }

        let reply = self
            .fallback
            .complete(BASIC_SYSTEM_PROMPT, history, user_input)
            .await?;
        info!("Basic prompt fallback succeeded");
        Ok(reply)
    }
}
