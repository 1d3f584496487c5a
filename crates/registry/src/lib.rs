pub mod errors;
pub mod metrics;
pub mod model;
pub mod state;

pub use errors::RegistryError;
pub use model::{BindOutcome, ItemRecord, StateCounts};
pub use state::ItemRegistry;
