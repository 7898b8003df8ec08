//! # Platform-specific utilities
//!
//! Questo modulo centralizza la risoluzione dei tool esterni (ffmpeg, ffprobe,
//! cwebp) in modo cross-platform. Un eventuale `TOOLS_DIR` ha la precedenza
//! sul PATH di sistema.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::debug;

/// Converts any iterable of displayable items into an owned argument vector.
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// `args!["-b:v", kbps, "-an"]` → `Vec<String>`
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::platform::to_string_vec::<&dyn ::std::fmt::Display, _>([$(&$item as &dyn ::std::fmt::Display),*])
    };
}

/// Platform-specific command manager
pub struct PlatformCommands {
    commands: HashMap<&'static str, &'static str>,
    which_command: &'static str,
    tools_dir: Option<PathBuf>,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    fn new() -> Self {
        let mut commands = HashMap::new();
        let which_command = if cfg!(windows) {
            commands.insert("ffmpeg", "ffmpeg.exe");
            commands.insert("ffprobe", "ffprobe.exe");
            commands.insert("cwebp", "cwebp.exe");
            "where"
        } else {
            commands.insert("ffmpeg", "ffmpeg");
            commands.insert("ffprobe", "ffprobe");
            commands.insert("cwebp", "cwebp");
            "which"
        };

        let tools_dir = std::env::var_os("TOOLS_DIR")
            .map(PathBuf::from)
            .filter(|dir| dir.is_dir());
        if let Some(ref dir) = tools_dir {
            debug!("Using tools directory from TOOLS_DIR: {}", dir.display());
        }

        Self {
            commands,
            which_command,
            tools_dir,
        }
    }

    /// Get the platform-specific command name
    pub fn get_command<'a>(&self, base_name: &'a str) -> &'a str {
        self.commands.get(base_name).copied().unwrap_or(base_name)
    }

    /// Path to invoke for a tool: inside `TOOLS_DIR` when present there, bare name otherwise
    pub fn resolve(&self, base_name: &str) -> PathBuf {
        let command = self.get_command(base_name);
        if let Some(ref dir) = self.tools_dir {
            let candidate = dir.join(command);
            if candidate.is_file() {
                return candidate;
            }
        }
        PathBuf::from(command)
    }

    /// Check if a command is available on the system or in `TOOLS_DIR`
    pub async fn is_command_available(&self, base_name: &str) -> bool {
        let resolved = self.resolve(base_name);
        if resolved.is_absolute() {
            return resolved.is_file();
        }

        let result = tokio::process::Command::new(self.which_command)
            .arg(self.get_command(base_name))
            .output()
            .await;

        match result {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_commands() {
        let platform = PlatformCommands::instance();
        assert!(platform.get_command("ffmpeg").starts_with("ffmpeg"));
        assert_eq!(platform.get_command("unknown-tool"), "unknown-tool");
    }

    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        let platform = PlatformCommands::instance();
        assert!(!platform.is_command_available("definitely-not-a-real-tool-4821").await);
    }

    #[test]
    fn test_args_macro_mixes_types() {
        let kbps = 3774u32;
        let result = args!["-b:v", format!("{}k", kbps), "-bufsize", kbps * 2];
        assert_eq!(result, vec!["-b:v", "3774k", "-bufsize", "7548"]);
        assert!(to_string_vec(Vec::<&str>::new()).is_empty());
    }
}
