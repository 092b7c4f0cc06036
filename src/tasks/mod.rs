pub mod command_task;
pub mod log_task;
pub mod rpm_task;
pub mod sample_task;
