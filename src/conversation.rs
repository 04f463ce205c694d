//! Session-scoped conversation history

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of turns fed back to the model (three exchanges)
pub const DEFAULT_CONTEXT_WINDOW: usize = 6;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when rendering the turn into a prompt
    #[must_use]
    pub const fn prompt_label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "AI",
        }
    }
}

/// One utterance in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    role: Role,
    text: String,
    created_at: DateTime<Utc>,
}

impl ConversationTurn {
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Render as a prompt line, e.g. `User: hello`
    #[must_use]
    pub fn prompt_line(&self) -> String {
        format!("{}: {}", self.role.prompt_label(), self.text)
    }
}

/// Append-only, insertion-ordered log of turns
///
/// Alternation of user and assistant turns is a convention kept by the
/// response generator, not something this store checks.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Every turn, oldest first
    #[must_use]
    pub fn full(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `size` turns, oldest first
    #[must_use]
    pub fn context_window(&self, size: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(size);
        &self.turns[start..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_with(n: usize) -> ConversationHistory {
        let mut history = ConversationHistory::new();
        for i in 0..n {
            let turn = if i % 2 == 0 {
                ConversationTurn::user(format!("u{i}"))
            } else {
                ConversationTurn::assistant(format!("a{i}"))
            };
            history.append(turn);
        }
        history
    }

    #[test]
    fn test_full_keeps_insertion_order() {
        let history = history_with(4);
        let texts: Vec<&str> = history.full().iter().map(ConversationTurn::text).collect();
        assert_eq!(texts, ["u0", "a1", "u2", "a3"]);
    }

    #[test]
    fn test_context_window_is_bounded() {
        for total in 0..20 {
            let history = history_with(total);
            let window = history.context_window(DEFAULT_CONTEXT_WINDOW);
            assert_eq!(window.len(), total.min(DEFAULT_CONTEXT_WINDOW));
            assert_eq!(history.len(), total);

            // Window is the tail of the full history, same order
            let tail = &history.full()[total - window.len()..];
            assert_eq!(window, tail);
        }
    }

    #[test]
    fn test_context_window_zero() {
        let history = history_with(3);
        assert!(history.context_window(0).is_empty());
    }

    #[test]
    fn test_prompt_line_labels() {
        assert_eq!(ConversationTurn::user("Hello").prompt_line(), "User: Hello");
        assert_eq!(ConversationTurn::assistant("Hi!").prompt_line(), "AI: Hi!");
    }
}
