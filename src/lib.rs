//! # Chat Core Library
//!
//! Connection and concurrency core for a distributed chat backend:
//! - Length-prefixed binary framing with incremental decoding
//! - Multi-reactor I/O thread pool spreading sockets across cores
//! - Per-connection session actors with single-flight writes
//! - Single-consumer dispatch queue for business-logic handlers
//! - Generic blocking resource pool for RPC stubs and database handles
//!
//! ## Concurrency model
//!
//! N reactor threads handle socket I/O; exactly one dispatcher thread runs
//! all business-logic handlers, serialized. Handlers may therefore share
//! state without locks among themselves, and may block (e.g. on a
//! [`pool::ResourcePool`]) without stalling any reactor. Do not spawn
//! threads or parallelize handlers without revisiting that assumption.
//!
//! ## Module Structure
//!
//! ```text
//! chat_core/
//! +-- config/     Configuration management
//! +-- protocol/   Frame type and incremental codec
//! +-- net/        Reactors, sessions, registry, acceptor
//! +-- dispatch/   Handler registry and single-consumer queue
//! +-- pool/       Blocking resource pools
//! +-- shared/     Common error types
//! ```

// Configuration module
pub mod config;

// Single-consumer message dispatch
pub mod dispatch;

// Reactors, sessions, registry, acceptor
pub mod net;

// Blocking resource pools
pub mod pool;

// Wire protocol
pub mod protocol;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
