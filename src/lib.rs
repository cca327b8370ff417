//! Game server browser core: per-game discovery and probing of live servers,
//! normalized into one record type and published through a status machine.

pub mod backends;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod launcher;
pub mod models;
pub mod registry;
pub mod settings;
pub mod storage;
pub mod utils;

pub use engine::{QueryConfig, QueryEngine, UpdateRequest};
pub use error::{LaunchFailure, QueryError, RegistryError};
pub use models::game::{BackendKind, GameInfo, QueryStatus};
pub use models::server::{ProbeReply, ServerRecord};
pub use storage::memory::{GameSlot, GameTable, TableSnapshot};
