//! Channel abstractions shared by the transport and the reply pipeline.

pub mod outbound;

pub use outbound::ChannelOutbound;
