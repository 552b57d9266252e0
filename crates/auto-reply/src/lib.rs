//! Reply pipeline for the sales assistant.
//!
//! Inbound messages go through [`debounce::Debouncer`], which hands each
//! coalesced batch to [`reply::CoffeeAgent`].

pub mod debounce;
pub mod error;
pub mod format;
pub mod intent;
pub mod lead;
pub mod reply;

pub use {
    debounce::{BatchHandler, DebounceSettings, Debouncer},
    error::{Error, Result},
    intent::{Intent, IntentClassifier, IntentContext, KeywordClassifier, LlmClassifier},
    reply::{CoffeeAgent, HistoryOutbound},
};
