//! ForkChain - a single-node proof-of-work chain engine
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Blockchain
//! - [`blockchain`] - Blocks, difficulty retargeting, ledger checks and the fork manager
//! - [`transaction`] - Transaction types and validation
//! - [`mempool`] - Transaction pool
//!
//! ## Consensus & Mining
//! - [`miner`] - Block templates and cancellable proof-of-work search
//! - [`sync`] - Batch ingestion with orphan resolution
//!
//! ## Nodes
//! - [`node`] - Consumer/producer roles and the single-writer node service
//!
//! ## State Management
//! - [`cache`] - Caching of reconstructed ledger views
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;
pub mod sync;

// ============================================================================
// Nodes
// ============================================================================
pub mod node;

// ============================================================================
// State Management
// ============================================================================
pub mod cache;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
