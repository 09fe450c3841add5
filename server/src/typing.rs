//! Typing indicator state per chat room
//!
//! There is no server-side expiry: clients send `typing_stop` after an idle
//! interval, and disconnect cleanup is the backstop for clients that vanish.

use std::collections::HashSet;

use dashmap::{mapref::entry::Entry, DashMap};

pub trait TypingTracker: Send + Sync {
    /// Returns true if the user was not already marked typing in the chat.
    fn start(&self, chat_id: &str, user_id: &str) -> bool;

    /// Returns true if the user had been marked typing in the chat.
    fn stop(&self, chat_id: &str, user_id: &str) -> bool;

    /// Remove the user everywhere; returns exactly the chats they were typing in.
    fn clear_user(&self, user_id: &str) -> Vec<String>;
}

#[derive(Default)]
pub struct InMemoryTyping {
    /// chat_id -> users composing
    chats: DashMap<String, HashSet<String>>,
}

impl InMemoryTyping {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TypingTracker for InMemoryTyping {
    fn start(&self, chat_id: &str, user_id: &str) -> bool {
        self.chats
            .entry(chat_id.to_string())
            .or_default()
            .insert(user_id.to_string())
    }

    fn stop(&self, chat_id: &str, user_id: &str) -> bool {
        match self.chats.entry(chat_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(user_id);
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    fn clear_user(&self, user_id: &str) -> Vec<String> {
        let candidates: Vec<String> = self
            .chats
            .iter()
            .filter(|entry| entry.value().contains(user_id))
            .map(|entry| entry.key().clone())
            .collect();

        let mut affected: Vec<String> = candidates
            .into_iter()
            .filter(|chat_id| self.stop(chat_id, user_id))
            .collect();
        affected.sort();
        affected
    }
}
