//! Backend contract for language-model vendors.

use serde::{Deserialize, Serialize};
use xanadu_types::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishReason {
    Stop,
    /// Cut off by the token limit; the loop asks the model to continue.
    Length,
    #[default]
    Other,
}

impl FinishReason {
    /// Map a vendor's finish/stop reason string.
    pub fn from_vendor(reason: Option<&str>) -> Self {
        let Some(reason) = reason else {
            return FinishReason::Other;
        };
        let reason = reason.to_ascii_lowercase();
        if reason.contains("length") || reason.contains("max_tokens") {
            FinishReason::Length
        } else if reason.contains("stop") || reason == "end_turn" {
            FinishReason::Stop
        } else {
            FinishReason::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub text: String,
    pub finish: FinishReason,
}

impl ChatResponse {
    pub fn new(text: impl Into<String>, finish: FinishReason) -> Self {
        Self {
            text: text.into(),
            finish,
        }
    }

    /// A complete reply.
    pub fn stop(text: impl Into<String>) -> Self {
        Self::new(text, FinishReason::Stop)
    }
}

/// A language-model vendor.
///
/// Calls block until the vendor answers; timeouts are the backend's
/// concern. A transport or vendor error is returned as `Err` and ends the
/// agent loop like a blank reply does.
pub trait AgentBackend {
    /// Short id used in `agent model <id>:<model>`.
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }

    fn missing_config_message(&self) -> String {
        format!("{} is not configured.", self.display_name())
    }

    fn list_models(&self) -> Result<Vec<String>>;

    fn chat(&self, messages: &[ChatMessage], model: &str) -> Result<ChatResponse>;

    /// Vendor-specific cleanup applied before the reply is parsed.
    fn normalize_response(&self, text: &str) -> String {
        text.to_string()
    }
}
