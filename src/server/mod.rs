pub mod scheduler;
pub mod shutdown;
pub mod state;

pub use scheduler::Scheduler;
pub use shutdown::wait_for_shutdown;
pub use state::{MonitorState, Snapshot};
