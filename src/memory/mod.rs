//! Two-tier conversation memory
//!
//! - short-term: recent turns per session, expiring after a TTL
//! - long-term: every message with its embedding, recalled by similarity

pub mod long_term;
pub mod short_term;
pub mod similarity;

pub use long_term::{
    InMemoryLongTermStore, LongTermMemory, LongTermStore, NewMemoryRecord, PgLongTermStore,
};
pub use short_term::{
    ConversationTurn, InMemoryShortTermMemory, PgShortTermMemory, ShortTermMemory,
};
