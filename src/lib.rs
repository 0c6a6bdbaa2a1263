//! pyth-stream: Live Pyth price streaming over a Solana watch session
//!
//! This library provides the core components for:
//! - Oracle key resolution and account layout decoding
//! - Product catalog bootstrap over HTTP JSON-RPC
//! - A cancel-safe watch session over JSON-RPC pub/sub
//! - A cancellable update loop with an optional broadcast sink
//! - Re-broadcast of prices to a single WebSocket listener
//! - Structured logging and Prometheus metrics

pub mod bootstrap;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod jsonrpc;
pub mod oracle;
pub mod relay;
pub mod stream;
pub mod telemetry;
pub mod watch;
pub mod ws;
