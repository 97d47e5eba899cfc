use parley_llm::{ProviderMessage, Role as ProviderRole, SessionId};

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl From<Role> for ProviderRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ProviderRole::User,
            Role::Assistant => ProviderRole::Assistant,
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn to_provider_message(&self) -> ProviderMessage {
        ProviderMessage::new(self.role.into(), self.content.clone())
    }
}

/// State of a single conversational exchange, owned by one orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub id: SessionId,
    pub model_id: String,
    pub messages: Vec<Message>,
    pub loading: bool,
    /// Last stream failure; cleared by the next accepted request or a clear.
    pub error: Option<String>,
}

impl ChatSession {
    pub fn new(id: SessionId, model_id: impl Into<String>) -> Self {
        Self {
            id,
            model_id: model_id.into(),
            messages: Vec::new(),
            loading: false,
            error: None,
        }
    }

    /// Content of the tail message when it was written by the assistant.
    pub fn latest_response(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|message| message.role == Role::Assistant)
            .map(|message| message.content.as_str())
    }

    pub fn provider_messages(&self) -> Vec<ProviderMessage> {
        self.messages
            .iter()
            .map(Message::to_provider_message)
            .collect()
    }
}
