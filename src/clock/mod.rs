pub mod duration;
pub mod engine;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod side;
