pub mod bus;

pub use bus::{EventBus, WorkflowSubscription};
