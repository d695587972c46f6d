//! Domain models for the plant nursery platform

mod analytics;
mod batch;
mod location;
mod loss;
mod measurement;
mod species;
mod stage;
mod task;
mod user;

pub use analytics::*;
pub use batch::*;
pub use location::*;
pub use loss::*;
pub use measurement::*;
pub use species::*;
pub use stage::*;
pub use task::*;
pub use user::*;
