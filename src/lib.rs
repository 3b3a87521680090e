pub mod errors;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use errors::{KestrelError, KestrelResult};
pub use services::lifecycle::{RideFlow, RideState};
