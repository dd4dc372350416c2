//! Keystone (air-gapped, QR) integration

pub mod engine;
pub mod interaction;
pub mod registry;

pub use engine::{AirgapExchange, KeystoneSolanaEngine};
pub use interaction::{channel, AirgapInteraction, AirgapPort, AirgapRequest, ChannelInteraction, FixedRead};
