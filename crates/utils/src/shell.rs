use std::path::PathBuf;

/// Resolves an executable name to an absolute path, honoring `PATH` and
/// platform executable extensions (`.exe`, `.cmd`, ...). Returns `None` if the
/// executable cannot be found, so callers can surface a clear "not installed"
/// error instead of a raw spawn failure.
pub fn resolve_executable_path(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Returns the `(shell, flag)` pair used to run an arbitrary command string,
/// e.g. `("sh", "-c")` on Unix or `("cmd", "/C")` on Windows.
pub fn get_shell_command() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}

/// Expands a leading `~` and any `$VAR`/`${VAR}` references in a user-supplied
/// path (e.g. a configured script or editor command).
pub fn expand_path(input: &str) -> String {
    shellexpand::full(input)
        .map(|expanded| expanded.into_owned())
        .unwrap_or_else(|_| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_shell_builtin() {
        let (shell, _flag) = get_shell_command();
        assert!(resolve_executable_path(shell).is_some());
    }

    #[test]
    fn unknown_executable_resolves_to_none() {
        assert!(resolve_executable_path("definitely-not-a-real-binary-xyz").is_none());
    }

    #[test]
    fn expand_path_handles_plain_paths() {
        assert_eq!(expand_path("/tmp/foo"), "/tmp/foo");
    }
}
