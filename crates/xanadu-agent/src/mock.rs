//! Scripted backend for tests: replays canned replies and records requests.

use std::cell::RefCell;
use std::collections::VecDeque;

use xanadu_types::error::{Result, XanaduError};

use crate::backend::{AgentBackend, ChatMessage, ChatResponse};

pub struct ScriptedBackend {
    id: String,
    display_name: String,
    models: Vec<String>,
    configured: bool,
    replies: RefCell<VecDeque<ChatResponse>>,
    /// Served once the queue is empty.
    fallback: Option<ChatResponse>,
    requests: RefCell<Vec<(Vec<ChatMessage>, String)>>,
}

impl ScriptedBackend {
    /// Backend `id` answering with `replies` in order, then failing.
    pub fn new<I, S>(id: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_responses(id, replies.into_iter().map(ChatResponse::stop))
    }

    pub fn from_responses(id: &str, replies: impl IntoIterator<Item = ChatResponse>) -> Self {
        let mut display_name = id.to_string();
        if let Some(first) = display_name.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        Self {
            id: id.to_string(),
            display_name,
            models: vec!["test-model".to_string()],
            configured: true,
            replies: RefCell::new(replies.into_iter().collect()),
            fallback: None,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Backend `id` answering every request with `reply`.
    pub fn repeating(id: &str, reply: ChatResponse) -> Self {
        let mut backend = Self::from_responses(id, Vec::new());
        backend.fallback = Some(reply);
        backend
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Every `(messages, model)` pair received so far.
    pub fn requests(&self) -> Vec<(Vec<ChatMessage>, String)> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl AgentBackend for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn missing_config_message(&self) -> String {
        format!("{} needs a script before it can chat.", self.display_name)
    }

    fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.models.clone())
    }

    fn chat(&self, messages: &[ChatMessage], model: &str) -> Result<ChatResponse> {
        self.requests
            .borrow_mut()
            .push((messages.to_vec(), model.to_string()));
        if let Some(reply) = self.replies.borrow_mut().pop_front() {
            return Ok(reply);
        }
        self.fallback
            .clone()
            .ok_or_else(|| XanaduError::Backend(format!("{} has no replies left", self.id)))
    }
}
