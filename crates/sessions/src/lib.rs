//! Customer records and conversation history.

pub mod store;
pub mod types;

pub use {
    store::{SessionStore, SqliteSessionStore},
    types::{ConversationMessage, Customer, DeletionSummary, LeadStatus, PaymentMethod, Role},
};
