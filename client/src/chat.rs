//! Chat log and mention handling
//!
//! The sender renders its own message optimistically; the server relays it
//! to everyone else only, so nothing is ever displayed twice. Mentions are
//! `@name` tokens resolved against the currently-known roster at send time.

use std::collections::VecDeque;

/// Most recent messages kept for display.
pub const CHAT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub sender_id: u32,
    pub sender_name: String,
    pub text: String,
    pub mentions: Vec<String>,
    pub timestamp: u64,
    /// True for the optimistic local append of our own message.
    pub own: bool,
}

impl ChatEntry {
    pub fn mentions_name(&self, name: &str) -> bool {
        self.mentions.iter().any(|m| m == name)
    }
}

/// Capped history of chat entries, oldest dropped first.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ChatEntry) {
        self.entries.push_back(entry);
        if self.entries.len() > CHAT_HISTORY_LIMIT {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Extracts `@name` tokens that match a currently-known participant name.
/// Unknown names are ignored; repeated mentions are reported each time they
/// appear.
pub fn extract_mentions(text: &str, known_names: &[String]) -> Vec<String> {
    let mut mentions = Vec::new();
    let mut rest = text;

    while let Some(at) = rest.find('@') {
        rest = &rest[at + 1..];
        let end = rest
            .find(|c: char| !c.is_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        let candidate = &rest[..end];
        if !candidate.is_empty() && known_names.iter().any(|n| n == candidate) {
            mentions.push(candidate.to_string());
        }
        rest = &rest[end..];
    }

    mentions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn entry(id: u32, name: &str, text: &str) -> ChatEntry {
        ChatEntry {
            sender_id: id,
            sender_name: name.to_string(),
            text: text.to_string(),
            mentions: Vec::new(),
            timestamp: 0,
            own: false,
        }
    }

    #[test]
    fn test_extract_known_mentions() {
        let known = names(&["alice", "bob"]);

        assert_eq!(
            extract_mentions("hey @bob, seen @alice?", &known),
            vec!["bob".to_string(), "alice".to_string()]
        );
    }

    #[test]
    fn test_unknown_mentions_ignored() {
        let known = names(&["alice"]);

        assert!(extract_mentions("ping @nobody", &known).is_empty());
        assert!(extract_mentions("no mentions here", &known).is_empty());
        assert!(extract_mentions("dangling @", &known).is_empty());
    }

    #[test]
    fn test_mention_token_ends_at_punctuation() {
        let known = names(&["bob"]);

        assert_eq!(extract_mentions("@bob!", &known), vec!["bob".to_string()]);
        assert_eq!(extract_mentions("(@bob)", &known), vec!["bob".to_string()]);
    }

    #[test]
    fn test_repeated_mentions_reported_each_time() {
        let known = names(&["bob"]);

        assert_eq!(
            extract_mentions("@bob @bob", &known),
            vec!["bob".to_string(), "bob".to_string()]
        );
    }

    #[test]
    fn test_underscore_names_match() {
        let known = names(&["team_lead"]);

        assert_eq!(
            extract_mentions("cc @team_lead", &known),
            vec!["team_lead".to_string()]
        );
    }

    #[test]
    fn test_history_capped() {
        let mut log = ChatLog::new();
        for i in 0..(CHAT_HISTORY_LIMIT + 10) {
            log.push(entry(1, "alice", &format!("message {}", i)));
        }

        assert_eq!(log.len(), CHAT_HISTORY_LIMIT);
        assert_eq!(
            log.entries().next().map(|e| e.text.clone()),
            Some("message 10".to_string())
        );
    }

    #[test]
    fn test_mentions_name() {
        let mut e = entry(1, "alice", "hi @bob");
        e.mentions = vec!["bob".to_string()];

        assert!(e.mentions_name("bob"));
        assert!(!e.mentions_name("carol"));
    }
}
