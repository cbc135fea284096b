use serde::{Deserialize, Serialize};

/// One call into the vault. Everything except `action` and `username` may be
/// omitted and defaults to an empty string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    pub action: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Request {
    pub fn new(action: &str, username: &str, password: &str) -> Self {
        Self {
            action: action.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            key: String::new(),
            value: String::new(),
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
    /// Credentials did not match on a gated action.
    Denied,
}

/// Outcome of a dispatched request. Flat so it can be written as a CSV row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub message: Option<String>,
    pub result: Option<String>,
    pub exists: Option<bool>,
}

impl Reply {
    pub fn ok(message: &str) -> Self {
        Self {
            status: Status::Ok,
            message: Some(message.to_string()),
            result: None,
            exists: None,
        }
    }

    pub fn result(value: String) -> Self {
        Self {
            status: Status::Ok,
            message: None,
            result: Some(value),
            exists: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.to_string()),
            result: None,
            exists: None,
        }
    }

    pub fn exists(message: &str) -> Self {
        Self {
            exists: Some(true),
            ..Self::error(message)
        }
    }

    pub fn denied() -> Self {
        Self {
            status: Status::Denied,
            message: Some("Access denied".to_string()),
            result: None,
            exists: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}
