//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-chat\
//!   macOS:   ~/Library/Application Support/voice-chat/
//!   Linux:   ~/.config/voice-chat/
//!
//! Data dir (conversation snapshot, exports):
//!   Windows: %LOCALAPPDATA%\voice-chat\
//!   macOS:   ~/Library/Application Support/voice-chat/
//!   Linux:   ~/.local/share/voice-chat/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for runtime data.
    pub data_dir: PathBuf,
    /// Full path to the conversation snapshot record.
    pub state_file: PathBuf,
    /// Directory that HTML exports are written to.
    pub exports_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-chat";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let state_file = data_dir.join("conversation-state.json");
        let exports_dir = data_dir.join("exports");

        Self {
            config_dir,
            settings_file,
            data_dir,
            state_file,
            exports_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
