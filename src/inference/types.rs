use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// A tool execution result, correlated to an assistant tool call.
    Tool,
}

/// One turn in a conversation.
///
/// `content` is `None` only on assistant turns that carry nothing but tool
/// calls. `tool_call_id` and `name` are set only on `Tool` messages, linking
/// the result back to the call that produced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Assistant turn carrying tool calls. `content` is the text the model
    /// produced alongside the calls, or `None` when there was none.
    pub fn assistant_with_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    /// A tool result, correlated to the originating call by id.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// An ordered, append-only sequence of messages.
///
/// History is exactly what was sent and received: messages are never edited
/// or removed once added.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Conversation::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// A completed tool call from the model.
///
/// `arguments` stays a raw JSON string until the loop decision point; stream
/// fragments are only parseable once the response has settled.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A tool the model can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value, // JSON Schema
}

/// Represents a chunk of streamed content from the model.
#[derive(Debug)]
pub enum StreamChunk {
    Content(String),
}

/// The settled result of one chat request: everything the model produced
/// once the response (streamed or not) finished.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChatOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_is_append_only() {
        let mut conv = Conversation::new();
        conv.push_user("hello");
        conv.push(Message::assistant("hi"));
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[0].role, Role::User);
        assert_eq!(conv.messages()[1].content.as_deref(), Some("hi"));
    }

    #[test]
    fn test_assistant_with_calls_allows_null_content() {
        let msg = Message::assistant_with_calls(
            None,
            vec![ToolCall {
                id: "call_1".into(),
                name: "web_search".into(),
                arguments: r#"{"query":"cats"}"#.into(),
            }],
        );
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.len(), 1);
    }

    #[test]
    fn test_tool_result_correlates_by_id() {
        let msg = Message::tool_result("call_9", "web_search", "3 results");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_9"));
        assert_eq!(msg.name.as_deref(), Some("web_search"));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
        assert!(!json.contains("\"name\""));
    }
}
