pub mod command;
pub mod poller;
pub mod revolver;

pub use command::{command_channel, Command, CycleSummary, SchedulerHandle};
pub use poller::{is_eligible_url, PollScheduler};
pub use revolver::RevolverAction;
