//! Hardware wallet integration
//!
//! Ledger over a live transport session, Keystone over an air-gapped QR exchange.

pub mod keystone;
pub mod ledger;

pub use keystone::{AirgapExchange, AirgapInteraction, KeystoneSolanaEngine};
pub use ledger::{LedgerRequest, LedgerTransport};
