use std::path::PathBuf;

use directories::ProjectDirs;
use rust_embed::RustEmbed;

/// Notification sounds shipped inside the binary, played when a task attempt
/// finishes while the user isn't looking at it.
#[derive(RustEmbed)]
#[folder = "assets/sounds/"]
pub struct SoundAssets;

/// Misc. platform scripts shipped inside the binary (currently just the
/// Windows toast-notification helper).
#[derive(RustEmbed)]
#[folder = "assets/scripts/"]
pub struct ScriptAssets;

fn project_dirs() -> ProjectDirs {
    let app_name = if cfg!(debug_assertions) {
        "vibe-kanban-dev"
    } else {
        "vibe-kanban"
    };
    ProjectDirs::from("ai", "bloop", app_name).expect("OS didn't give us a home directory")
}

/// Directory the app stores its SQLite database and other durable state in.
/// Created on first access if missing.
pub fn asset_dir() -> PathBuf {
    let dir = project_dirs().data_dir().to_path_buf();
    let _ = std::fs::create_dir_all(&dir);
    dir
}

/// Path to the user's optional `config.json` (editor preference, GitHub auth
/// cache, analytics opt-out, etc.). May not exist.
pub fn config_path() -> PathBuf {
    asset_dir().join("config.json")
}

/// Path to the user's optional `profiles.json`, which extends/overrides the
/// embedded default executor profiles. May not exist.
pub fn profiles_path() -> PathBuf {
    asset_dir().join("profiles.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_and_profiles_paths_live_under_asset_dir() {
        assert_eq!(config_path().parent(), Some(asset_dir().as_path()));
        assert_eq!(profiles_path().parent(), Some(asset_dir().as_path()));
    }
}
