pub mod types;
pub mod tiers;
pub mod store;
pub mod preferences;

pub use types::*;
pub use tiers::*;
pub use store::*;
pub use preferences::*;
