//! Persistence layer: per-user sessions and the questionnaire answer log.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::{MemoryAnswerSink, MemorySessionStore};
pub use traits::{AnswerSink, SessionStore, StoredAnswer};
