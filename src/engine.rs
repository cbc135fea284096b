use std::str::FromStr;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::VaultConfig;
use crate::dto::{Reply, Request};
use crate::persistence::{FlushStrategy, Journal, Record};
use crate::stores::{AccountsStore, MemosStore, StaleTokens};
use crate::token::TokenGenerator;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Register,
    Login,
    Save,
    Renew,
    Give,
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "register" => Ok(Action::Register),
            "login" => Ok(Action::Login),
            "save" => Ok(Action::Save),
            "renew" => Ok(Action::Renew),
            "give" => Ok(Action::Give),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }
}

/// Everything the vault knows: accounts plus their memo namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub accounts: AccountsStore,
    pub memos: MemosStore,
}

impl State {
    /// Rebuilds state from journal records applied in order.
    pub fn replay(records: impl IntoIterator<Item = Record>) -> Self {
        let mut state = State::default();
        for record in records {
            state.apply(record);
        }
        state
    }

    pub fn apply(&mut self, record: Record) {
        match record {
            Record::Account { username, password } => {
                self.accounts.insert(&username, &password);
                self.memos.create_namespace(&username);
            }
            Record::Memo {
                username,
                key,
                value,
            } => self.memos.insert(&username, &key, &value),
            Record::Forget { username, key } => self.memos.remove(&username, &key),
        }
    }

    /// The full state as records, accounts first, sorted for stable output.
    pub fn records(&self) -> Vec<Record> {
        let mut accounts: Vec<_> = self.accounts.iter().collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        let mut memos: Vec<_> = self.memos.iter().collect();
        memos.sort();

        accounts
            .into_iter()
            .map(|account| Record::Account {
                username: account.username.clone(),
                password: account.password.clone(),
            })
            .chain(memos.into_iter().map(|(username, key, value)| Record::Memo {
                username: username.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            }))
            .collect()
    }
}

/// The vault. Owns the in-memory state behind one lock, the journal that
/// makes it durable and the token generator.
///
/// Mutations hold the write guard across both the change and its flush, so
/// they are applied and persisted in one total order. A mutation whose flush
/// fails is undone before the error is returned.
pub struct Engine {
    state: RwLock<State>,
    journal: Journal,
    tokens: Box<dyn TokenGenerator>,
    stale_tokens: StaleTokens,
}

impl Engine {
    /// Opens the journal named by the configuration and loads it.
    pub async fn open(config: &VaultConfig) -> Result<Self, Error> {
        let journal = Journal::new(&config.data_file, config.persistence.strategy);
        Self::load(
            journal,
            config.tokens.scheme.generator(),
            config.renewal.stale_tokens,
            config.persistence.compact_on_load,
        )
        .await
    }

    /// Replays `journal` into a new engine. With `compact` set, an
    /// append-only journal is rewritten to its minimal form afterwards.
    pub async fn load(
        journal: Journal,
        tokens: Box<dyn TokenGenerator>,
        stale_tokens: StaleTokens,
        compact: bool,
    ) -> Result<Self, Error> {
        let records = journal.load().await?;
        let replayed = records.len();
        let state = State::replay(records);

        if compact && journal.strategy() == FlushStrategy::Append {
            let compacted = state.records();
            if compacted.len() < replayed {
                journal.compact(&compacted).await?;
                info!(before = replayed, after = compacted.len(), "Journal compacted");
            }
        }

        info!(accounts = state.accounts.len(), "Vault opened");
        Ok(Self {
            state: RwLock::new(state),
            journal,
            tokens,
            stale_tokens,
        })
    }

    /// A copy of the current state.
    pub async fn snapshot(&self) -> State {
        self.state.read().await.clone()
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), Error> {
        let mut state = self.state.write().await;
        state.accounts.register(username, password)?;
        // Replay may already have built a namespace from orphaned memo records
        let had_namespace = state.memos.has_namespace(username);
        state.memos.create_namespace(username);

        let changes = [Record::Account {
            username: username.to_string(),
            password: password.to_string(),
        }];
        let flushed = self.journal.flush(&changes, || state.records()).await;
        if let Err(err) = flushed {
            state.accounts.remove(username);
            if !had_namespace {
                state.memos.drop_namespace(username);
            }
            error!(username, error = %err, "Registration rolled back");
            return Err(err);
        }

        info!(username, "Account registered");
        Ok(())
    }

    pub async fn login(&self, username: &str, password: &str) -> bool {
        let authenticated = self.state.read().await.accounts.authenticate(username, password);
        debug!(username, authenticated, "Login attempt");
        authenticated
    }

    /// Stores `key` and returns the token generated for it. The value hint is
    /// accepted for interface compatibility and not stored.
    pub async fn save(
        &self,
        username: &str,
        password: &str,
        key: &str,
        _value_hint: Option<&str>,
    ) -> Result<String, Error> {
        let mut state = self.state.write().await;
        state.accounts.require_authenticated(username, password)?;
        let change = state.memos.save(username, key, self.tokens.as_ref())?;

        let changes = change.records(username);
        let flushed = self.journal.flush(&changes, || state.records()).await;
        if let Err(err) = flushed {
            state.memos.revert(username, &change);
            error!(username, error = %err, "Save rolled back");
            return Err(err);
        }

        debug!(username, "Memo saved");
        Ok(change.token().to_string())
    }

    /// Points `key` at a new token and returns it.
    pub async fn renew(&self, username: &str, password: &str, key: &str) -> Result<String, Error> {
        let mut state = self.state.write().await;
        state.accounts.require_authenticated(username, password)?;
        let change = state
            .memos
            .renew(username, key, self.tokens.as_ref(), self.stale_tokens)?;

        let changes = change.records(username);
        let flushed = self.journal.flush(&changes, || state.records()).await;
        if let Err(err) = flushed {
            state.memos.revert(username, &change);
            error!(username, error = %err, "Renewal rolled back");
            return Err(err);
        }

        debug!(username, "Memo renewed");
        Ok(change.token().to_string())
    }

    /// Resolves a key to its token or a token to its key.
    pub async fn give(&self, username: &str, password: &str, lookup: &str) -> Result<String, Error> {
        let state = self.state.read().await;
        state.accounts.require_authenticated(username, password)?;
        state.memos.give(username, lookup).map(str::to_string)
    }

    /// Runs one request. Expected failures become replies; only journal
    /// failures are returned as errors.
    pub async fn dispatch(&self, request: Request) -> Result<Reply, Error> {
        let action = match request.action.parse::<Action>() {
            Ok(action) => action,
            Err(err) => {
                warn!(error = %err, "Rejected request");
                return Ok(Reply::error("Unknown action"));
            }
        };

        let Request {
            username,
            password,
            key,
            value,
            ..
        } = &request;

        let outcome = match action {
            Action::Register => self
                .register(username, password)
                .await
                .map(|()| Reply::ok("Registered")),
            Action::Login => Ok(if self.login(username, password).await {
                Reply::ok("Login success")
            } else {
                Reply::error("Invalid login")
            }),
            Action::Save => self
                .save(username, password, key, Some(value.as_str()))
                .await
                .map(|_| Reply::ok("Saved")),
            Action::Renew => self
                .renew(username, password, key)
                .await
                .map(|_| Reply::ok("Renewed")),
            Action::Give => {
                let lookup = if value.is_empty() { key } else { value };
                self.give(username, password, lookup).await.map(Reply::result)
            }
        };

        match outcome {
            Ok(reply) => Ok(reply),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                debug!(?action, error = %err, "Request failed");
                Ok(failure_reply(action, &err))
            }
        }
    }
}

fn failure_reply(action: Action, err: &Error) -> Reply {
    match err {
        Error::Unauthorized => Reply::denied(),
        Error::AlreadyExists => Reply::exists("Username exists"),
        Error::KeyExists => Reply::error("Key exists"),
        Error::NotFound if action == Action::Renew => Reply::error("Key not found"),
        Error::NotFound => Reply::error("Not found"),
        Error::UnknownAction(_) => Reply::error("Unknown action"),
        Error::Validation(message) => Reply::error(message),
        other => Reply::error(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memo(username: &str, key: &str, value: &str) -> Record {
        Record::Memo {
            username: username.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!("give".parse::<Action>().unwrap(), Action::Give);
        assert!(matches!(
            "Give".parse::<Action>(),
            Err(Error::UnknownAction(name)) if name == "Give"
        ));
    }

    #[test]
    fn test_replay_later_records_win() {
        let state = State::replay(vec![
            Record::Account {
                username: "alice".to_string(),
                password: "old".to_string(),
            },
            memo("alice", "email", "t1"),
            memo("alice", "t1", "email"),
            Record::Account {
                username: "alice".to_string(),
                password: "new".to_string(),
            },
            memo("alice", "email", "t2"),
            memo("alice", "t2", "email"),
            Record::Forget {
                username: "alice".to_string(),
                key: "t1".to_string(),
            },
        ]);

        assert!(state.accounts.authenticate("alice", "new"));
        assert_eq!(state.memos.give("alice", "email").unwrap(), "t2");
        assert!(state.memos.give("alice", "t1").is_err());
        assert_eq!(state.memos.len("alice"), 2);
    }

    #[test]
    fn test_replay_tolerates_memos_without_account() {
        let state = State::replay(vec![memo("ghost", "k", "v")]);
        assert!(!state.accounts.contains("ghost"));
        assert_eq!(state.memos.give("ghost", "k").unwrap(), "v");
    }

    #[test]
    fn test_records_are_sorted_accounts_first() {
        let mut state = State::default();
        state.accounts.insert("bob", "pw2");
        state.accounts.insert("alice", "pw1");
        state.memos.insert("bob", "b", "1");
        state.memos.insert("alice", "z", "2");
        state.memos.insert("alice", "a", "3");

        let lines: Vec<String> = state
            .records()
            .iter()
            .map(|record| record.fields().join(" "))
            .collect();
        assert_eq!(
            lines,
            vec![
                "U alice pw1",
                "U bob pw2",
                "M alice a 3",
                "M alice z 2",
                "M bob b 1",
            ]
        );
    }

    #[test]
    fn test_failure_replies() {
        assert_eq!(failure_reply(Action::Save, &Error::Unauthorized), Reply::denied());
        assert_eq!(
            failure_reply(Action::Renew, &Error::NotFound),
            Reply::error("Key not found")
        );
        assert_eq!(
            failure_reply(Action::Give, &Error::NotFound),
            Reply::error("Not found")
        );
        assert_eq!(
            failure_reply(Action::Register, &Error::AlreadyExists).exists,
            Some(true)
        );
        assert_eq!(
            failure_reply(Action::Save, &Error::TokenExhausted(8)).status,
            crate::Status::Error
        );
    }
}
