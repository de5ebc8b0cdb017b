pub mod automation_gate;

pub use automation_gate::{can_send_invitation, in_working_hours, next_send_delay};
