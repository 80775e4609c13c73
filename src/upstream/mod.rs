//! OpenRosa upstream access.

pub mod auth;
pub mod communicator;

pub use communicator::Communicator;
