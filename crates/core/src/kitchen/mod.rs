//! Kitchen workers.
//!
//! A worker competes with its peers for pending orders through the claim
//! coordinator and walks each claimed order through
//! `preparing -> ready -> (out_for_delivery) -> completed`.

mod config;
mod runner;
mod types;

pub use config::KitchenConfig;
pub use runner::KitchenWorker;
pub use types::{KitchenError, KitchenStatus};
