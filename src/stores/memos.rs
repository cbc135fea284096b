//! Per-user memo namespaces holding both directions of every key/token pair.
//!
//! Each namespace is one flat map: a user key maps to its current token and
//! the token maps back to the key. Both halves are written and removed
//! together, so a key and its token always resolve to each other.

use std::collections::HashMap;

use serde::Deserialize;

use crate::persistence::Record;
use crate::stores::accounts::has_whitespace;
use crate::token::{self, TokenGenerator};
use crate::Error;

/// Candidates drawn before token allocation gives up.
pub const MAX_TOKEN_ATTEMPTS: usize = 8;

/// What happens to the previous token's reverse entry when a key is renewed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleTokens {
    /// The old token stops resolving.
    #[default]
    Invalidate,
    /// The old token keeps resolving to the key.
    Retain,
}

/// A successful mutation of one namespace. Carries enough to produce the
/// journal records and to undo the mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoChange {
    Saved {
        key: String,
        token: String,
    },
    Renewed {
        key: String,
        previous: String,
        token: String,
        invalidated: bool,
    },
}

impl MemoChange {
    /// The token the key points at after the change.
    pub fn token(&self) -> &str {
        match self {
            MemoChange::Saved { token, .. } | MemoChange::Renewed { token, .. } => token,
        }
    }

    pub fn records(&self, username: &str) -> Vec<Record> {
        match self {
            MemoChange::Saved { key, token } => pair_records(username, key, token),
            MemoChange::Renewed {
                key,
                previous,
                token,
                invalidated,
            } => {
                let mut records = pair_records(username, key, token);
                if *invalidated {
                    records.push(Record::Forget {
                        username: username.to_string(),
                        key: previous.clone(),
                    });
                }
                records
            }
        }
    }
}

fn pair_records(username: &str, key: &str, token: &str) -> Vec<Record> {
    vec![
        Record::Memo {
            username: username.to_string(),
            key: key.to_string(),
            value: token.to_string(),
        },
        Record::Memo {
            username: username.to_string(),
            key: token.to_string(),
            value: key.to_string(),
        },
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemosStore {
    namespaces: HashMap<String, HashMap<String, String>>,
}

impl MemosStore {
    pub fn new() -> Self {
        Self {
            namespaces: HashMap::new(),
        }
    }

    /// Creates an empty namespace unless one already exists.
    pub fn create_namespace(&mut self, username: &str) {
        self.namespaces.entry(username.to_string()).or_default();
    }

    pub fn has_namespace(&self, username: &str) -> bool {
        self.namespaces.contains_key(username)
    }

    pub fn drop_namespace(&mut self, username: &str) {
        self.namespaces.remove(username);
    }

    /// Stores a new key paired with a freshly generated token.
    pub fn save(
        &mut self,
        username: &str,
        key: &str,
        tokens: &dyn TokenGenerator,
    ) -> Result<MemoChange, Error> {
        if key.trim().is_empty() || has_whitespace(key) {
            return Err(Error::Validation(
                "Key must be non-empty and contain no whitespace".to_string(),
            ));
        }
        if is_reserved(key, tokens) {
            return Err(Error::Validation(
                "Key uses the reserved token format".to_string(),
            ));
        }
        let entries = self.namespaces.entry(username.to_string()).or_default();
        if entries.contains_key(key) {
            return Err(Error::KeyExists);
        }
        let token = allocate_token(entries, key, None, tokens)?;
        entries.insert(key.to_string(), token.clone());
        entries.insert(token.clone(), key.to_string());
        Ok(MemoChange::Saved {
            key: key.to_string(),
            token,
        })
    }

    /// Re-points an existing key at a new token.
    /// Tokens themselves cannot be renewed and are reported as not found,
    /// including tokens of another scheme or from an older journal.
    pub fn renew(
        &mut self,
        username: &str,
        key: &str,
        tokens: &dyn TokenGenerator,
        stale: StaleTokens,
    ) -> Result<MemoChange, Error> {
        if is_reserved(key, tokens) {
            return Err(Error::NotFound);
        }
        let entries = self.namespaces.get_mut(username).ok_or(Error::NotFound)?;
        let previous = entries.get(key).cloned().ok_or(Error::NotFound)?;
        // A key always points at a token; anything else means `key` is a token.
        if !tokens.is_token(&previous) && !token::is_token_value(&previous) {
            return Err(Error::NotFound);
        }
        let token = allocate_token(entries, key, Some(&previous), tokens)?;

        entries.insert(key.to_string(), token.clone());
        entries.insert(token.clone(), key.to_string());

        let invalidated = stale == StaleTokens::Invalidate
            && entries.get(&previous).is_some_and(|k| k == key);
        if invalidated {
            entries.remove(&previous);
        }
        Ok(MemoChange::Renewed {
            key: key.to_string(),
            previous,
            token,
            invalidated,
        })
    }

    /// Resolves a key to its token or a token to its key.
    pub fn give(&self, username: &str, lookup: &str) -> Result<&str, Error> {
        self.namespaces
            .get(username)
            .and_then(|entries| entries.get(lookup))
            .map(String::as_str)
            .ok_or(Error::NotFound)
    }

    /// Undoes a change produced by [`MemosStore::save`] or [`MemosStore::renew`].
    pub fn revert(&mut self, username: &str, change: &MemoChange) {
        let Some(entries) = self.namespaces.get_mut(username) else {
            return;
        };
        match change {
            MemoChange::Saved { key, token } => {
                entries.remove(key);
                entries.remove(token);
            }
            MemoChange::Renewed {
                key,
                previous,
                token,
                invalidated,
            } => {
                entries.remove(token);
                entries.insert(key.clone(), previous.clone());
                if *invalidated {
                    entries.insert(previous.clone(), key.clone());
                }
            }
        }
    }

    /// Sets one entry without checks. Used when replaying the journal.
    pub fn insert(&mut self, username: &str, key: &str, value: &str) {
        self.namespaces
            .entry(username.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Removes one entry without checks. Used when replaying the journal.
    pub fn remove(&mut self, username: &str, key: &str) {
        if let Some(entries) = self.namespaces.get_mut(username) {
            entries.remove(key);
        }
    }

    /// Number of entries (both directions) in a namespace.
    pub fn len(&self, username: &str) -> usize {
        self.namespaces.get(username).map_or(0, HashMap::len)
    }

    /// Iterates `(username, key, value)` over every entry of every namespace.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.namespaces.iter().flat_map(|(username, entries)| {
            entries
                .iter()
                .map(move |(k, v)| (username.as_str(), k.as_str(), v.as_str()))
        })
    }
}

fn is_reserved(key: &str, tokens: &dyn TokenGenerator) -> bool {
    tokens.is_token(key) || token::is_reserved(key)
}

fn allocate_token(
    entries: &HashMap<String, String>,
    key: &str,
    previous: Option<&str>,
    tokens: &dyn TokenGenerator,
) -> Result<String, Error> {
    for _ in 0..MAX_TOKEN_ATTEMPTS {
        let candidate = tokens.generate(key);
        if candidate != key
            && Some(candidate.as_str()) != previous
            && !entries.contains_key(&candidate)
        {
            return Ok(candidate);
        }
    }
    Err(Error::TokenExhausted(MAX_TOKEN_ATTEMPTS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{DigestTokens, RollingTokens};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out tokens from a fixed script, wrapping around.
    struct ScriptedTokens {
        script: Vec<&'static str>,
        next: AtomicUsize,
    }

    impl ScriptedTokens {
        fn new(script: Vec<&'static str>) -> Self {
            Self {
                script,
                next: AtomicUsize::new(0),
            }
        }
    }

    impl TokenGenerator for ScriptedTokens {
        fn generate(&self, _key: &str) -> String {
            let i = self.next.fetch_add(1, Ordering::SeqCst);
            self.script[i % self.script.len()].to_string()
        }

        fn is_token(&self, candidate: &str) -> bool {
            candidate.starts_with("t-")
        }
    }

    fn store_with_user() -> MemosStore {
        let mut store = MemosStore::new();
        store.create_namespace("alice");
        store
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = MemosStore::new();
        assert_eq!(store.len("alice"), 0);
        assert!(matches!(store.give("alice", "email"), Err(Error::NotFound)));
    }

    #[test]
    fn test_save_writes_both_directions() {
        let mut store = store_with_user();
        let change = store.save("alice", "email", &DigestTokens).unwrap();
        let MemoChange::Saved { key, token } = &change else {
            panic!("expected a save");
        };

        assert_eq!(key, "email");
        assert_eq!(store.give("alice", "email").unwrap(), token);
        assert_eq!(store.give("alice", token).unwrap(), "email");
        assert_eq!(store.len("alice"), 2);
    }

    #[test]
    fn test_save_duplicate_key() {
        let mut store = store_with_user();
        store.save("alice", "email", &DigestTokens).unwrap();
        assert!(matches!(
            store.save("alice", "email", &DigestTokens),
            Err(Error::KeyExists)
        ));
        assert_eq!(store.len("alice"), 2);
    }

    #[test]
    fn test_save_rejects_reserved_and_blank_keys() {
        let mut store = store_with_user();
        let tokens = ScriptedTokens::new(vec!["t-1"]);
        assert!(matches!(
            store.save("alice", "t-9", &tokens),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.save("alice", "", &tokens),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.save("alice", "two words", &tokens),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let mut store = store_with_user();
        store.create_namespace("bob");
        store.save("alice", "email", &DigestTokens).unwrap();

        assert!(store.give("bob", "email").is_err());
        store.save("bob", "email", &DigestTokens).unwrap();
        assert_ne!(
            store.give("alice", "email").unwrap(),
            store.give("bob", "email").unwrap()
        );
    }

    #[test]
    fn test_allocation_skips_collisions() {
        let mut store = store_with_user();
        // "t-1" is taken by the first save, so the second save must skip it
        let tokens = ScriptedTokens::new(vec!["t-1", "t-1", "t-2"]);
        store.save("alice", "a", &tokens).unwrap();
        store.save("alice", "b", &tokens).unwrap();

        assert_eq!(store.give("alice", "b").unwrap(), "t-2");
        assert_eq!(store.give("alice", "t-1").unwrap(), "a");
    }

    #[test]
    fn test_allocation_gives_up() {
        let mut store = store_with_user();
        let tokens = ScriptedTokens::new(vec!["t-1"]);
        store.save("alice", "a", &tokens).unwrap();

        assert!(matches!(
            store.save("alice", "b", &tokens),
            Err(Error::TokenExhausted(MAX_TOKEN_ATTEMPTS))
        ));
        assert!(store.give("alice", "b").is_err());
    }

    #[test]
    fn test_renew_invalidates_previous_token() {
        let mut store = store_with_user();
        let tokens = ScriptedTokens::new(vec!["t-1", "t-2"]);
        store.save("alice", "email", &tokens).unwrap();

        let change = store
            .renew("alice", "email", &tokens, StaleTokens::Invalidate)
            .unwrap();
        assert_eq!(
            change,
            MemoChange::Renewed {
                key: "email".to_string(),
                previous: "t-1".to_string(),
                token: "t-2".to_string(),
                invalidated: true,
            }
        );
        assert_eq!(store.give("alice", "email").unwrap(), "t-2");
        assert_eq!(store.give("alice", "t-2").unwrap(), "email");
        assert!(matches!(store.give("alice", "t-1"), Err(Error::NotFound)));
    }

    #[test]
    fn test_renew_retains_previous_token() {
        let mut store = store_with_user();
        let tokens = ScriptedTokens::new(vec!["t-1", "t-2"]);
        store.save("alice", "email", &tokens).unwrap();
        store
            .renew("alice", "email", &tokens, StaleTokens::Retain)
            .unwrap();

        assert_eq!(store.give("alice", "email").unwrap(), "t-2");
        assert_eq!(store.give("alice", "t-1").unwrap(), "email");
        assert_eq!(store.len("alice"), 3);
    }

    #[test]
    fn test_renew_never_repeats_token() {
        let mut store = store_with_user();
        // The generator offers the current token first; renew must skip it
        let tokens = ScriptedTokens::new(vec!["t-1", "t-1", "t-3"]);
        store.save("alice", "email", &tokens).unwrap();
        store
            .renew("alice", "email", &tokens, StaleTokens::Invalidate)
            .unwrap();
        assert_eq!(store.give("alice", "email").unwrap(), "t-3");
    }

    #[test]
    fn test_renew_missing_key_or_token() {
        let mut store = store_with_user();
        let tokens = ScriptedTokens::new(vec!["t-1", "t-2"]);
        assert!(matches!(
            store.renew("alice", "email", &tokens, StaleTokens::Invalidate),
            Err(Error::NotFound)
        ));

        store.save("alice", "email", &tokens).unwrap();
        assert!(matches!(
            store.renew("alice", "t-1", &tokens, StaleTokens::Invalidate),
            Err(Error::NotFound)
        ));
        assert!(matches!(
            store.renew("nobody", "email", &tokens, StaleTokens::Invalidate),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_revert_save_and_renew() {
        let mut store = store_with_user();
        let tokens = ScriptedTokens::new(vec!["t-1", "t-2"]);
        let saved = store.save("alice", "email", &tokens).unwrap();
        let before_renew = store.clone();

        let renewed = store
            .renew("alice", "email", &tokens, StaleTokens::Invalidate)
            .unwrap();
        store.revert("alice", &renewed);
        assert_eq!(store, before_renew);

        store.revert("alice", &saved);
        assert_eq!(store, store_with_user());
    }

    #[test]
    fn test_change_records() {
        let change = MemoChange::Renewed {
            key: "email".to_string(),
            previous: "t-1".to_string(),
            token: "t-2".to_string(),
            invalidated: true,
        };
        let records = change.records("alice");
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[2],
            Record::Forget {
                username: "alice".to_string(),
                key: "t-1".to_string(),
            }
        );

        let saved = MemoChange::Saved {
            key: "email".to_string(),
            token: "t-1".to_string(),
        };
        assert_eq!(saved.records("alice").len(), 2);
    }

    #[test]
    fn test_foreign_scheme_tokens_are_reserved() {
        let mut store = store_with_user();
        let rolling = RollingTokens.generate("email");
        assert!(matches!(
            store.save("alice", &rolling, &DigestTokens),
            Err(Error::Validation(_))
        ));

        let saved = store.save("alice", "email", &DigestTokens).unwrap();
        let token = saved.token().to_string();
        assert!(matches!(
            store.renew("alice", &token, &RollingTokens, StaleTokens::Invalidate),
            Err(Error::NotFound)
        ));
        assert_eq!(store.give("alice", "email").unwrap(), token);
        assert_eq!(store.give("alice", &token).unwrap(), "email");
    }

    #[test]
    fn test_renew_of_legacy_token_keeps_pairing() {
        let mut store = store_with_user();
        store.insert("alice", "email", "1234567890123");
        store.insert("alice", "1234567890123", "email");

        assert!(matches!(
            store.renew("alice", "1234567890123", &DigestTokens, StaleTokens::Invalidate),
            Err(Error::NotFound)
        ));
        assert_eq!(store.give("alice", "email").unwrap(), "1234567890123");

        let change = store
            .renew("alice", "email", &DigestTokens, StaleTokens::Invalidate)
            .unwrap();
        assert_eq!(store.give("alice", change.token()).unwrap(), "email");
        assert!(store.give("alice", "1234567890123").is_err());
        assert_eq!(store.len("alice"), 2);
    }
}
