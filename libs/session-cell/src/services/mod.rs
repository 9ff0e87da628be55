pub mod identity;
pub mod markers;
pub mod monitor;
