pub mod config;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod services;

pub use config::EngineConfig;
pub use error::{EngineError, StoreError};
pub use kernel::pipeline::{SessionEngine, SessionRegistry};
pub use kernel::reactor::Reactor;
