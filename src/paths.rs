//! Path resolution for rule files and session state.

use std::env;
use std::path::PathBuf;

use directories::BaseDirs;
use tracing::{debug, warn};

use crate::env::{HOOKWISE_RULES_PATH, HOOKWISE_STATE_DIR};

/// Project-local rules file, relative to the working directory.
pub const PROJECT_RULES_FILE: &str = ".claude/rules.json";

fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Global rules file under the user's home directory.
pub fn global_rules_file() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".claude").join("hooks").join("rules.json"))
}

/// Find the rules file using the resolution chain:
/// 1. `HOOKWISE_RULES_PATH` environment variable
/// 2. Project `.claude/rules.json`
/// 3. Global `~/.claude/hooks/rules.json`
pub fn find_rules_file() -> Option<PathBuf> {
    if let Ok(env_path) = env::var(HOOKWISE_RULES_PATH) {
        let path = PathBuf::from(shellexpand::tilde(&env_path).into_owned());
        if path.exists() {
            debug!("Using rules from env var: {}", path.display());
            return Some(path);
        }
        warn!(
            "{} set but file not found: {}",
            HOOKWISE_RULES_PATH, env_path
        );
    }

    let project = PathBuf::from(PROJECT_RULES_FILE);
    if project.exists() {
        debug!("Using project rules: {}", project.display());
        return Some(project);
    }

    if let Some(global) = global_rules_file()
        && global.exists()
    {
        debug!("Using global rules: {}", global.display());
        return Some(global);
    }

    debug!("No rules file found in any location");
    None
}

/// Session state directory: `HOOKWISE_STATE_DIR` override, else
/// `~/.claude/state`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = env::var(HOOKWISE_STATE_DIR) {
        return PathBuf::from(shellexpand::tilde(&dir).into_owned());
    }

    match home_dir() {
        Some(home) => home.join(".claude").join("state"),
        None => {
            warn!("No home directory found; using relative state directory");
            PathBuf::from(".claude/state")
        }
    }
}
