pub mod migrate;
pub mod state_store;

pub use migrate::{UpcasterRegistry, CURRENT_STATE_VERSION};
pub use state_store::{JsonStateStore, StateStorage};
