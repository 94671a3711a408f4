pub mod execution_process;
pub mod execution_process_logs;
pub mod executor_session;
pub mod image;
pub mod merge;
pub mod project;
pub mod task;
pub mod task_attempt;
