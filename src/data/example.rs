//! Chat-formatted examples

use serde::{Deserialize, Serialize};

/// Conversation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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
}

/// A record rendered as a system → user → [assistant] conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatExample {
    pub id: String,
    pub messages: Vec<Message>,
    /// Answer label, training examples only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<u32>,
    /// Number of choices, evaluation examples only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len_choices: Option<usize>,
    /// Whether retrieved hints were injected into the user turn
    #[serde(default)]
    pub augmented: bool,
}

impl ChatExample {
    pub fn is_training(&self) -> bool {
        self.messages.last().map(|m| m.role) == Some(Role::Assistant)
    }

    /// Content of the user turn
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = Message::new(Role::Assistant, "2");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"2"}"#);
    }

    #[test]
    fn test_eval_example_skips_label() {
        let example = ChatExample {
            id: "q1".to_string(),
            messages: vec![Message::new(Role::System, "s"), Message::new(Role::User, "u")],
            label: None,
            len_choices: Some(4),
            augmented: false,
        };
        let json = serde_json::to_value(&example).unwrap();
        assert!(json.get("label").is_none());
        assert_eq!(json["len_choices"], 4);
        assert!(!example.is_training());
        assert_eq!(example.user_content(), Some("u"));
    }
}
