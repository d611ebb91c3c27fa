//! Append-only per-user conversation log.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::Namespace;
use crate::store::Store;

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model")]
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" | "model" => Ok(Role::Assistant),
            _ => Err(Error::ValidationFailed("Role must be 'user' or 'assistant'".into())),
        }
    }
}

/// One stored turn, numbered by its position in the user's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub user_id: String,
    pub role: Role,
    pub message: String,
    pub sequence: u64,
}

#[derive(Serialize, Deserialize)]
struct StoredTurn {
    role: Role,
    message: String,
}

/// History log backed by store lists under `history:{user_id}`.
///
/// Errors surface as [`Error::HistoryUnavailable`]; the orchestrator decides
/// whether to swallow them.
#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn Store>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn list_key(user_id: &str) -> String {
        format!("{}{user_id}", Namespace::History.key_prefix())
    }

    pub async fn append(&self, user_id: &str, role: Role, message: &str) -> Result<(), Error> {
        let raw = serde_json::to_string(&StoredTurn { role, message: message.to_string() })?;
        self.store
            .append(&Self::list_key(user_id), &raw)
            .await
            .map_err(|e| Error::HistoryUnavailable(e.to_string()))
    }

    /// Every turn for `user_id` in insertion order.
    ///
    /// Entries that fail to decode are skipped; sequence numbers keep their
    /// original positions.
    pub async fn list(&self, user_id: &str) -> Result<Vec<HistoryTurn>, Error> {
        let raw = self
            .store
            .range(&Self::list_key(user_id))
            .await
            .map_err(|e| Error::HistoryUnavailable(e.to_string()))?;

        let turns = raw
            .iter()
            .enumerate()
            .filter_map(|(i, value)| match serde_json::from_str::<StoredTurn>(value) {
                Ok(turn) => Some(HistoryTurn {
                    user_id: user_id.to_string(),
                    role: turn.role,
                    message: turn.message,
                    sequence: i as u64,
                }),
                Err(e) => {
                    tracing::warn!(user_id, sequence = i, error = %e, "skipping undecodable history turn");
                    None
                }
            })
            .collect();

        Ok(turns)
    }

    /// The last `n` turns, oldest first.
    pub async fn recent(&self, user_id: &str, n: usize) -> Result<Vec<HistoryTurn>, Error> {
        let mut turns = self.list(user_id).await?;
        let skip = turns.len().saturating_sub(n);
        turns.drain(..skip);
        Ok(turns)
    }

    /// Number of users with at least one stored turn.
    pub async fn user_count(&self) -> Result<u64, Error> {
        self.store
            .count_prefix(&Namespace::History.key_prefix())
            .await
            .map_err(|e| Error::HistoryUnavailable(e.to_string()))
    }

    /// Delete the user's whole log. Returns `false` if there was nothing to delete.
    pub async fn clear(&self, user_id: &str) -> Result<bool, Error> {
        self.store
            .delete(&Self::list_key(user_id))
            .await
            .map_err(|e| Error::HistoryUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keyed::tests::FailingStore;
    use crate::store::{MemoryStore, SqliteStore};

    #[tokio::test]
    async fn test_append_and_list_in_order() {
        let history = HistoryStore::new(Arc::new(MemoryStore::new()));
        history.append("u1", Role::User, "Q").await.unwrap();
        history.append("u1", Role::Assistant, "A").await.unwrap();

        let turns = history.list("u1").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!((turns[0].role, turns[0].message.as_str(), turns[0].sequence), (Role::User, "Q", 0));
        assert_eq!((turns[1].role, turns[1].message.as_str(), turns[1].sequence), (Role::Assistant, "A", 1));
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let history = HistoryStore::new(Arc::new(SqliteStore::open_in_memory().await.unwrap()));
        history.append("u1", Role::User, "hello").await.unwrap();
        history.append("u2", Role::User, "other").await.unwrap();

        assert_eq!(history.list("u1").await.unwrap().len(), 1);
        assert!(history.list("nobody").await.unwrap().is_empty());
        assert_eq!(history.user_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_recent_keeps_last_n_chronologically() {
        let history = HistoryStore::new(Arc::new(MemoryStore::new()));
        for i in 0..8 {
            history.append("u1", Role::User, &format!("m{i}")).await.unwrap();
        }

        let recent = history.recent("u1", 5).await.unwrap();
        let messages: Vec<_> = recent.iter().map(|t| t.message.as_str()).collect();
        assert_eq!(messages, vec!["m3", "m4", "m5", "m6", "m7"]);

        assert_eq!(history.recent("u1", 50).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_clear() {
        let history = HistoryStore::new(Arc::new(MemoryStore::new()));
        history.append("u1", Role::User, "hello").await.unwrap();

        assert!(history.clear("u1").await.unwrap());
        assert!(history.list("u1").await.unwrap().is_empty());
        assert!(!history.clear("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_model_role_alias_and_corrupt_entries() {
        let store = Arc::new(MemoryStore::new());
        store.append("history:u1", r#"{"role":"model","message":"hi"}"#).await.unwrap();
        store.append("history:u1", "garbage").await.unwrap();
        store.append("history:u1", r#"{"role":"user","message":"yo"}"#).await.unwrap();

        let turns = HistoryStore::new(store).list("u1").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::Assistant);
        assert_eq!(turns[1].sequence, 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_history_unavailable() {
        let history = HistoryStore::new(Arc::new(FailingStore));
        let err = history.append("u1", Role::User, "x").await.unwrap_err();
        assert_eq!(err.code(), "HISTORY_UNAVAILABLE");
        assert_eq!(history.list("u1").await.unwrap_err().code(), "HISTORY_UNAVAILABLE");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!("model".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!("system".parse::<Role>().unwrap_err().code(), "VALIDATION_FAILED");
    }
}
