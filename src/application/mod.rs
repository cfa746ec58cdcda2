pub mod messages;
pub mod ports;
pub mod usecases;

pub use ports::*;
