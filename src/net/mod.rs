//! Networking Core
//!
//! Reactor pool, per-connection sessions, the live-session registry, and the
//! TCP acceptor.

pub mod reactor;
pub mod registry;
pub mod server;
pub mod session;

pub use reactor::ReactorPool;
pub use registry::SessionRegistry;
pub use server::ChatServer;
pub use session::{Session, DEFAULT_MAX_SEND_QUEUE};
