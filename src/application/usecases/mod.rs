pub mod run_tick;
pub mod scheduler;

pub use run_tick::*;
pub use scheduler::*;
