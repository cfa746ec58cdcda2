pub mod types;
pub mod observation;
pub mod rule;
pub mod watch;
pub mod policy;

pub use types::*;
pub use observation::*;
pub use rule::*;
pub use watch::*;
pub use policy::*;
