/// The running binary's version, used to stamp worktree setup metadata and
/// surfaced to the UI so users can tell which build produced a given attempt.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
