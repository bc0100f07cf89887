use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmulationMode {
    #[default]
    Auto,
    ForceDmg,
    ForceCgb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub emulation_mode: EmulationMode,
    pub boot_rom: Option<PathBuf>,
    pub frames: Option<u64>,
    /// DMG shades as 0xRRGGBB, lightest first.
    pub palette: Option<[u32; 4]>,
    /// Execute breakpoints as hex addresses.
    pub breakpoints: Vec<String>,
}

impl Config {
    /// Valid breakpoint addresses; malformed entries are skipped.
    pub fn breakpoint_addresses(&self) -> Vec<u16> {
        self.breakpoints
            .iter()
            .filter_map(|text| match parse_address(text) {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!("ignoring breakpoint {text:?} in config: {e}");
                    None
                }
            })
            .collect()
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("dotmatrix").join("config.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("dotmatrix")
            .join("config.toml");
    }

    PathBuf::from("config.toml")
}

pub fn load_from_file(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return Config::default(),
    };

    match toml::from_str::<Config>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            Config::default()
        }
    }
}

/// Parse a 16-bit address written in hex, with or without a `0x` or `$`
/// prefix.
pub fn parse_address(text: &str) -> Result<u16, String> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .or_else(|| trimmed.strip_prefix('$'))
        .unwrap_or(trimmed);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address {text:?}: {e}"))
}
