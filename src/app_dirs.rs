use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `$XDG_CONFIG_HOME/questlog/config.json` (or the platform equivalent).
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("QUESTLOG_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.json"));
        }
        ProjectDirs::from("", "", "questlog")
            .map(|proj_dirs| proj_dirs.config_dir().join("config.json"))
    }
}
