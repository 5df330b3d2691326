mod choking_manager;
mod request_manager;

pub use choking_manager::{ChokingManager, RateTracker};
pub use request_manager::RequestManager;
