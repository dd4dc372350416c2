//! Ledger integration
//!
//! - `transport`: the request/response session the keyring signs through
//! - `apdu` / `solana_app`: a session implementation for the Solana device app

pub mod apdu;
pub mod solana_app;
pub mod transport;

pub use solana_app::{ApduExchange, Bip32Path, SolanaLedgerApp};
pub use transport::{LedgerRequest, LedgerTransport};
