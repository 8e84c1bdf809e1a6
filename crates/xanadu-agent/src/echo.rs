//! Offline backend that answers with the user's last message.

use xanadu_types::error::Result;

use crate::backend::{AgentBackend, ChatMessage, ChatResponse, Role};

pub const ECHO_BACKEND: &str = "echo";
pub const ECHO_MODEL: &str = "echo-1";

/// Replies with the most recent user turn as plain text.
///
/// Useful for trying the shell without vendor credentials: a prompt such as
/// `xanadu: help` comes straight back as a tool call.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoBackend;

impl AgentBackend for EchoBackend {
    fn id(&self) -> &str {
        ECHO_BACKEND
    }

    fn display_name(&self) -> &str {
        "Echo"
    }

    fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec![ECHO_MODEL.to_string()])
    }

    fn chat(&self, messages: &[ChatMessage], _model: &str) -> Result<ChatResponse> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        log::debug!("Echo backend replying to {} messages", messages.len());
        Ok(ChatResponse::stop(format!("Assistant: {last_user}")))
    }

    fn normalize_response(&self, text: &str) -> String {
        text.strip_prefix("Assistant:")
            .map_or(text, str::trim_start)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_last_user_turn() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
        ];
        let response = EchoBackend.chat(&messages, ECHO_MODEL).unwrap();
        assert_eq!(response.text, "Assistant: second");
        assert_eq!(EchoBackend.normalize_response(&response.text), "second");
    }

    #[test]
    fn normalize_leaves_other_text_alone() {
        assert_eq!(EchoBackend.normalize_response("plain"), "plain");
    }
}
