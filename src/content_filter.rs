//! Content filter: a list of regexes that posted messages are matched
//! against. A match is recorded as a [`BadWordPost`](crate::moderation::BadWordPost);
//! regexes flagged `delete` also remove the message.

use crate::moderation::record::BadWord;
use crate::moderation::{ModerationError, ModerationResult, RecordStore};
use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use tracing::warn;

/// The filter's regex list with compiled patterns cached by record id
#[derive(Debug, Clone)]
pub struct BadWordList {
    store: RecordStore,
    compiled: Arc<DashMap<u64, Regex>>,
}

impl BadWordList {
    #[must_use]
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            compiled: Arc::new(DashMap::new()),
        }
    }

    /// Every regex in the order it was added
    #[must_use]
    pub fn list(&self) -> Vec<BadWord> {
        self.store.filter::<BadWord>(|_| true)
    }

    /// # Errors
    /// `Validation` if the pattern does not compile or the description is
    /// empty, `AlreadyActive` if the same pattern is already listed
    pub fn add(&self, regex: &str, description: &str, delete: bool) -> ModerationResult<BadWord> {
        if description.trim().is_empty() {
            return Err(ModerationError::validation("description must not be empty"));
        }
        let compiled = Regex::new(regex)
            .map_err(|e| ModerationError::validation(format!("invalid regex: {e}")))?;
        if self.store.exists::<BadWord>(|word| word.regex == regex) {
            return Err(ModerationError::AlreadyActive(format!(
                "regex `{regex}` is already filtered"
            )));
        }

        let word = self.store.add(BadWord::new(regex, description, delete));
        self.compiled.insert(word.id, compiled);
        Ok(word)
    }

    /// # Errors
    /// `NotFound` if no regex has this id
    pub fn remove(&self, id: u64) -> ModerationResult<BadWord> {
        let word = self
            .store
            .remove::<BadWord>(id)
            .ok_or_else(|| ModerationError::record_not_found("BadWord", id))?;
        self.compiled.remove(&id);
        Ok(word)
    }

    /// Regexes that match somewhere in `content`
    #[must_use]
    pub fn matches(&self, content: &str) -> Vec<BadWord> {
        self.list()
            .into_iter()
            .filter(|word| self.is_match(word, content))
            .collect()
    }

    fn is_match(&self, word: &BadWord, content: &str) -> bool {
        if let Some(regex) = self.compiled.get(&word.id) {
            return regex.is_match(content);
        }
        // Loaded from the snapshot, not compiled yet
        match Regex::new(&word.regex) {
            Ok(regex) => {
                let matched = regex.is_match(content);
                self.compiled.insert(word.id, regex);
                matched
            }
            Err(e) => {
                warn!(bad_word_id = word.id, "Skipping stored regex that does not compile: {e}");
                false
            }
        }
    }
}

/// Summary line for an alert about a filtered message
#[must_use]
pub fn describe_matches(words: &[BadWord]) -> String {
    let descriptions: Vec<&str> = words.iter().map(|w| w.description.as_str()).collect();
    descriptions.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_validates() {
        let list = BadWordList::new(RecordStore::new());

        assert!(matches!(
            list.add("(unclosed", "broken", false),
            Err(ModerationError::Validation(_))
        ));
        assert!(matches!(
            list.add("spam", "  ", false),
            Err(ModerationError::Validation(_))
        ));

        list.add("spam", "spam", false).unwrap();
        assert!(matches!(
            list.add("spam", "again", true),
            Err(ModerationError::AlreadyActive(_))
        ));
    }

    #[test]
    fn test_matches_and_remove() {
        let list = BadWordList::new(RecordStore::new());
        let invite = list
            .add(r"discord\.gg/\w+", "invite link", true)
            .unwrap();
        list.add("(?i)free nitro", "scam", false).unwrap();

        let found = list.matches("FREE NITRO at discord.gg/abc");
        assert_eq!(found.len(), 2);
        assert_eq!(describe_matches(&found), "invite link, scam");
        assert!(list.matches("hello there").is_empty());

        list.remove(invite.id).unwrap();
        assert_eq!(list.matches("discord.gg/abc").len(), 0);
        assert!(matches!(
            list.remove(invite.id),
            Err(ModerationError::NotFound(_))
        ));
    }

    #[test]
    fn test_stored_patterns_compile_on_first_use() {
        let store = RecordStore::new();
        store.add(BadWord::new("forbidden", "word", false));
        store.add(BadWord::new("(bad", "hand edited", false));

        let list = BadWordList::new(store);
        let found = list.matches("a forbidden (bad word");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].description, "word");
    }
}
