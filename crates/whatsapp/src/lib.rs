//! WhatsApp transport backed by the Evolution API.
//!
//! Inbound: webhook payload types and normalization into customer messages.
//! Outbound: [`EvolutionClient`] implements `ChannelOutbound`.

pub mod normalize;
pub mod outbound;
pub mod types;

pub use {
    normalize::{InboundContent, InboundMessage, WebhookError, WebhookOutcome, parse_webhook},
    outbound::EvolutionClient,
    types::WebhookEnvelope,
};
