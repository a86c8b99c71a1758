//! Chat session and transcript storage (spec §4.9, C9): records sessions
//! and messages, serializing per-session appends so indices stay gap-free
//! under concurrent turns (spec §5).

mod error;
mod rest_store;
mod store;
mod types;

pub use error::SessionError;
pub use rest_store::RestSessionStore;
pub use store::SessionStore;
pub use types::{ChatSession, ListSessionsOptions, NewTurn, StoredMessage};
