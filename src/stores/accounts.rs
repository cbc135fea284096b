use std::collections::HashMap;

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountsStore {
    accounts: HashMap<String, Account>,
}

impl AccountsStore {
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
        }
    }

    /// Creates a new account.
    /// Both fields must be non-empty and free of whitespace, since they are
    /// persisted as whitespace-separated fields.
    pub fn register(&mut self, username: &str, password: &str) -> Result<(), Error> {
        if username.trim().is_empty() || password.trim().is_empty() {
            return Err(Error::Validation(
                "Username and password are required".to_string(),
            ));
        }
        if has_whitespace(username) || has_whitespace(password) {
            return Err(Error::Validation(
                "Username and password must not contain whitespace".to_string(),
            ));
        }
        if self.accounts.contains_key(username) {
            return Err(Error::AlreadyExists);
        }
        self.insert(username, password);
        Ok(())
    }

    /// Inserts or replaces an account without validation. Used when replaying
    /// the journal, where later records win.
    pub fn insert(&mut self, username: &str, password: &str) {
        self.accounts.insert(
            username.to_string(),
            Account {
                username: username.to_string(),
                password: password.to_string(),
            },
        );
    }

    /// Drops an account. Only used to undo a registration that could not be
    /// made durable.
    pub fn remove(&mut self, username: &str) -> Option<Account> {
        self.accounts.remove(username)
    }

    /// Exact password equality. Unknown users never authenticate.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.accounts
            .get(username)
            .is_some_and(|account| account.password == password)
    }

    pub fn require_authenticated(&self, username: &str, password: &str) -> Result<(), Error> {
        if self.authenticate(username, password) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }

    pub fn contains(&self, username: &str) -> bool {
        self.accounts.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }
}

pub(crate) fn has_whitespace(value: &str) -> bool {
    value.chars().any(char::is_whitespace)
}
