//! Durable storage for the vault.
//!
//! State is kept in a single line-oriented journal file. Every line is one
//! [`Record`]; fields are separated by spaces:
//!
//! ```text
//! U <username> <password>
//! M <username> <key> <value>
//! D <username> <key>
//! ```
//!
//! Replaying the records in order rebuilds the in-memory state, later lines
//! winning over earlier ones. `D` lines only appear in append-only journals,
//! where they retire an entry that a previous `M` line created.

mod journal;

use serde::Deserialize;

pub use journal::Journal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Account {
        username: String,
        password: String,
    },
    Memo {
        username: String,
        key: String,
        value: String,
    },
    Forget {
        username: String,
        key: String,
    },
}

impl Record {
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Record::Account { username, password } => {
                vec!["U", username.as_str(), password.as_str()]
            }
            Record::Memo {
                username,
                key,
                value,
            } => vec!["M", username.as_str(), key.as_str(), value.as_str()],
            Record::Forget { username, key } => vec!["D", username.as_str(), key.as_str()],
        }
    }

    /// Parses the fields of one journal line. Returns `None` for unknown tags
    /// and wrong field counts.
    pub fn from_fields(fields: &[&str]) -> Option<Self> {
        match fields {
            ["U", username, password] => Some(Record::Account {
                username: username.to_string(),
                password: password.to_string(),
            }),
            ["M", username, key, value] => Some(Record::Memo {
                username: username.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            }),
            ["D", username, key] => Some(Record::Forget {
                username: username.to_string(),
                key: key.to_string(),
            }),
            _ => None,
        }
    }
}

/// How a flush reaches the journal file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushStrategy {
    /// Serialize the whole state and atomically replace the file.
    #[default]
    Rewrite,
    /// Append only the records of the change that was just made.
    Append,
}
