//! Configuration and theme management for termbridge.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.termbridge/config.toml`
//! - Session tuning (queue sizes, monitor interval, exit banner)
//! - Built-in terminal themes (palette plus default colors)
//!
//! # Configuration File
//!
//! ```toml
//! # Shell launched by the termbridge binary (optional)
//! shell = "/bin/bash"
//!
//! # Theme: classic, default, dracula, solarized-dark,
//! #        solarized-light, monokai, nord
//! theme = "classic"
//!
//! log_level = "info"
//!
//! [session]
//! queue_capacity = 4096
//! read_buffer_size = 4096
//! monitor_interval_ms = 500
//! transcript_rows = 2000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine config path")]
    NoHome,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell command for the local binary
    pub shell: Option<String>,
    /// Theme name
    pub theme: String,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Session settings
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            theme: "classic".to_string(),
            log_level: "info".to_string(),
            session: SessionConfig::default(),
        }
    }
}

/// Terminal session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of each direction's byte queue
    pub queue_capacity: usize,
    /// Buffer size used by the reader, writer and dispatcher
    pub read_buffer_size: usize,
    /// Channel liveness poll interval
    pub monitor_interval_ms: u64,
    /// Lines retained by the styled transcript
    pub transcript_rows: usize,
    /// Text appended to the emulator once the session has ended
    pub exit_message: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            read_buffer_size: 4096,
            monitor_interval_ms: 500,
            transcript_rows: 2000,
            exit_message: "\r\n[Session ended - press Enter]\r\n".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }
}

impl Config {
    /// Load configuration from `~/.termbridge/config.toml`, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config: {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to `~/.termbridge/config.toml`
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(ConfigError::NoHome)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory holding the config and log files
    pub fn data_dir() -> Option<PathBuf> {
        let dir = home_dir()?.join(".termbridge");
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        Some(dir)
    }

    fn config_path() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("config.toml"))
    }

    /// Resolve the configured theme
    pub fn theme(&self) -> Theme {
        Theme::by_name(&self.theme)
    }
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from a `0xRRGGBB` literal
    pub const fn hex(rgb: u32) -> Self {
        Self::new((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Palette slots, in SGR order (30-37 then 90-97)
pub const PALETTE_SIZE: usize = 16;

/// Terminal theme: default rendition plus the 16-color ANSI palette
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub foreground: Color,
    pub background: Color,
    pub palette: [Color; PALETTE_SIZE],
}

impl Default for Theme {
    fn default() -> Self {
        Self::classic()
    }
}

impl Theme {
    /// Green on black with the primary palette
    pub fn classic() -> Self {
        Self {
            name: "classic".to_string(),
            foreground: Color::hex(0x00FF00),
            background: Color::hex(0x000000),
            palette: [
                Color::hex(0x000000),
                Color::hex(0xFF0000),
                Color::hex(0x00FF00),
                Color::hex(0xFFFF00),
                Color::hex(0x0000FF),
                Color::hex(0xFF00FF),
                Color::hex(0x00FFFF),
                Color::hex(0xFFFFFF),
                Color::hex(0x808080),
                Color::hex(0xFF8080),
                Color::hex(0x80FF80),
                Color::hex(0xFFFF80),
                Color::hex(0x8080FF),
                Color::hex(0xFF80FF),
                Color::hex(0x80FFFF),
                Color::hex(0xFFFFFF),
            ],
        }
    }

    /// VS Code style dark theme
    pub fn default_theme() -> Self {
        Self {
            name: "default".to_string(),
            foreground: Color::hex(0xD4D4D4),
            background: Color::hex(0x1E1E1E),
            palette: [
                Color::hex(0x000000),
                Color::hex(0xCD3131),
                Color::hex(0x0DBC79),
                Color::hex(0xE5E510),
                Color::hex(0x2472C8),
                Color::hex(0xBC3FBC),
                Color::hex(0x11A8CD),
                Color::hex(0xE5E5E5),
                Color::hex(0x666666),
                Color::hex(0xF14C4C),
                Color::hex(0x23D18B),
                Color::hex(0xF5F543),
                Color::hex(0x3B8EEA),
                Color::hex(0xD670D6),
                Color::hex(0x29B8DB),
                Color::hex(0xFFFFFF),
            ],
        }
    }

    pub fn dracula() -> Self {
        Self {
            name: "dracula".to_string(),
            foreground: Color::hex(0xF8F8F2),
            background: Color::hex(0x282A36),
            palette: [
                Color::hex(0x21222C),
                Color::hex(0xFF5555),
                Color::hex(0x50FA7B),
                Color::hex(0xF1FA8C),
                Color::hex(0xBD93F9),
                Color::hex(0xFF79C6),
                Color::hex(0x8BE9FD),
                Color::hex(0xF8F8F2),
                Color::hex(0x6272A4),
                Color::hex(0xFF6E6E),
                Color::hex(0x69FF94),
                Color::hex(0xFFFFA5),
                Color::hex(0xD6ACFF),
                Color::hex(0xFF92DF),
                Color::hex(0xA4FFFF),
                Color::hex(0xFFFFFF),
            ],
        }
    }

    // Both Solarized variants share one accent palette
    const SOLARIZED: [Color; PALETTE_SIZE] = [
        Color::hex(0x073642),
        Color::hex(0xDC322F),
        Color::hex(0x859900),
        Color::hex(0xB58900),
        Color::hex(0x268BD2),
        Color::hex(0xD33682),
        Color::hex(0x2AA198),
        Color::hex(0xEEE8D5),
        Color::hex(0x002B36),
        Color::hex(0xCB4B16),
        Color::hex(0x586E75),
        Color::hex(0x657B83),
        Color::hex(0x839496),
        Color::hex(0x6C71C4),
        Color::hex(0x93A1A1),
        Color::hex(0xFDF6E3),
    ];

    pub fn solarized_dark() -> Self {
        Self {
            name: "solarized-dark".to_string(),
            foreground: Color::hex(0x839496),
            background: Color::hex(0x002B36),
            palette: Self::SOLARIZED,
        }
    }

    pub fn solarized_light() -> Self {
        Self {
            name: "solarized-light".to_string(),
            foreground: Color::hex(0x657B83),
            background: Color::hex(0xFDF6E3),
            palette: Self::SOLARIZED,
        }
    }

    pub fn monokai() -> Self {
        Self {
            name: "monokai".to_string(),
            foreground: Color::hex(0xF8F8F2),
            background: Color::hex(0x272822),
            palette: [
                Color::hex(0x272822),
                Color::hex(0xF92672),
                Color::hex(0xA6E22E),
                Color::hex(0xF4BF75),
                Color::hex(0x66D9EF),
                Color::hex(0xAE81FF),
                Color::hex(0xA1EFE4),
                Color::hex(0xF8F8F2),
                Color::hex(0x75715E),
                Color::hex(0xF92672),
                Color::hex(0xA6E22E),
                Color::hex(0xF4BF75),
                Color::hex(0x66D9EF),
                Color::hex(0xAE81FF),
                Color::hex(0xA1EFE4),
                Color::hex(0xF9F8F5),
            ],
        }
    }

    pub fn nord() -> Self {
        Self {
            name: "nord".to_string(),
            foreground: Color::hex(0xD8DEE9),
            background: Color::hex(0x2E3440),
            palette: [
                Color::hex(0x3B4252),
                Color::hex(0xBF616A),
                Color::hex(0xA3BE8C),
                Color::hex(0xEBCB8B),
                Color::hex(0x81A1C1),
                Color::hex(0xB48EAD),
                Color::hex(0x88C0D0),
                Color::hex(0xE5E9F0),
                Color::hex(0x4C566A),
                Color::hex(0xBF616A),
                Color::hex(0xA3BE8C),
                Color::hex(0xEBCB8B),
                Color::hex(0x81A1C1),
                Color::hex(0xB48EAD),
                Color::hex(0x8FBCBB),
                Color::hex(0xECEFF4),
            ],
        }
    }

    /// Get theme by name
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "default" => Self::default_theme(),
            "dracula" => Self::dracula(),
            "solarized-dark" | "solarized_dark" => Self::solarized_dark(),
            "solarized-light" | "solarized_light" => Self::solarized_light(),
            "monokai" => Self::monokai(),
            "nord" => Self::nord(),
            _ => Self::classic(),
        }
    }

    /// List available themes
    pub fn list() -> Vec<&'static str> {
        vec![
            "classic",
            "default",
            "dracula",
            "solarized-dark",
            "solarized-light",
            "monokai",
            "nord",
        ]
    }

    /// Palette entry for a normal (0-7) or bright (8-15) slot
    pub fn color(&self, slot: usize) -> Option<Color> {
        self.palette.get(slot).copied()
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
