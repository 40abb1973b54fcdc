// Thin re-export module: implementation is in `blockchain/core.rs` so the
// chain can be decomposed further (block, difficulty, ledger, validation,
// fork management) without touching callers.

pub mod core;
pub use core::*;
