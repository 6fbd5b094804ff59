use std::path::{Path, PathBuf};

use crate::session::{BLOCK_SIZE_MAX, BLOCK_SIZE_MIN, DEFAULT_BLOCK_SIZE};

pub const DEFAULT_VIEWPORT: (u32, u32) = (800, 600);

/// User preferences, persisted as `key=value` lines.
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Mosaic cell size in display pixels (slider position)
    pub block_size: u32,
    /// Largest display copy of an opened image
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Quality used when saving as JPEG
    pub jpeg_quality: u8,
    /// Language code (e.g. "en", "ja"). Empty string = auto-detect system language.
    pub language: String,
    /// Ask before closing the window.
    pub confirm_on_exit: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            viewport_width: DEFAULT_VIEWPORT.0,
            viewport_height: DEFAULT_VIEWPORT.1,
            jpeg_quality: 90,
            language: String::new(),
            confirm_on_exit: true,
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/mosaictool/mosaictool_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\MosaicTool\mosaictool_settings.cfg
    /// On macOS:   ~/Library/Application Support/MosaicTool/mosaictool_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("mosaictool");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("mosaictool_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_else(|_| {
                    std::env::current_exe()
                        .ok()
                        .and_then(|p| p.parent().map(|d| d.to_string_lossy().into_owned()))
                        .unwrap_or_default()
                });
            let config_dir = PathBuf::from(appdata).join("MosaicTool");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("mosaictool_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("MosaicTool");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("mosaictool_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("mosaictool_settings.cfg")))
        }
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("Could not write settings {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_config_string())
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "block_size={}\n\
             viewport_width={}\n\
             viewport_height={}\n\
             jpeg_quality={}\n\
             language={}\n\
             confirm_on_exit={}\n",
            self.block_size,
            self.viewport_width,
            self.viewport_height,
            self.jpeg_quality,
            self.language,
            self.confirm_on_exit,
        )
    }

    /// Load settings from disk, or defaults if there is no readable file.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Parse `key=value` lines. Unknown keys are skipped, unparsable values
    /// keep their default, numbers are clamped to their valid range.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "block_size" => {
                    s.block_size = val
                        .parse::<u32>()
                        .map(|v| v.clamp(BLOCK_SIZE_MIN, BLOCK_SIZE_MAX))
                        .unwrap_or(DEFAULT_BLOCK_SIZE);
                }
                "viewport_width" => {
                    s.viewport_width = val
                        .parse::<u32>()
                        .map(|v| v.clamp(64, 8192))
                        .unwrap_or(DEFAULT_VIEWPORT.0);
                }
                "viewport_height" => {
                    s.viewport_height = val
                        .parse::<u32>()
                        .map(|v| v.clamp(64, 8192))
                        .unwrap_or(DEFAULT_VIEWPORT.1);
                }
                "jpeg_quality" => {
                    s.jpeg_quality = val.parse::<u8>().map(|v| v.clamp(1, 100)).unwrap_or(90);
                }
                "language" => {
                    s.language = val.to_string();
                }
                "confirm_on_exit" => {
                    s.confirm_on_exit = val == "true";
                }
                _ => {}
            }
        }
        s
    }
}
