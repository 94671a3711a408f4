pub mod actions;
pub mod command;
pub mod executors;
pub mod logs;
pub mod mcp_config;
pub mod profile;
pub mod stdout_dup;
