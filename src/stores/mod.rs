//! In-memory state of the vault. Provides storage for:
//! - Accounts and their credentials ([`AccountsStore`])
//! - Per-account memo namespaces of key/token pairs ([`MemosStore`])
//!
//! Stores are plain synchronous maps; the engine owns them behind a single
//! lock and makes every mutation durable before it is acknowledged.

mod accounts;
mod memos;

pub use accounts::{Account, AccountsStore};
pub use memos::{MemoChange, MemosStore, StaleTokens, MAX_TOKEN_ATTEMPTS};
