pub mod config;
mod csv_utils;
mod dto;
mod engine;
mod error;
pub mod persistence;
mod runner;
pub mod stores;
pub mod token;

pub use config::{load_config, VaultConfig};
pub use dto::{Reply, Request, Status};
pub use engine::{Engine, State};
pub use error::Error;
pub use runner::run;
