//! Daemon configuration management
//!
//! Every default is the wiring of the one supported board; a config file only
//! exists to describe a board revision with different wiring.

use anyhow::{Context, Result, anyhow};
use common::Slot;
use common::presence::MAX_SLOTS;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub gpio: GpioSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub debounce: DebounceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    #[serde(default = "DaemonSettings::default_log_level")]
    pub log_level: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl DaemonSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

/// Presence-detect line wiring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpioSettings {
    /// Label of the GPIO chip carrying the presence lines
    #[serde(default = "GpioSettings::default_chip_label")]
    pub chip_label: String,
    /// Consumer name shown by gpioinfo
    #[serde(default = "GpioSettings::default_consumer")]
    pub consumer: String,
    /// Lines in mask bit order: the first entry is bit 0
    #[serde(default = "GpioSettings::default_slots")]
    pub slots: Vec<SlotLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLine {
    pub slot: Slot,
    pub offset: u32,
}

impl Default for GpioSettings {
    fn default() -> Self {
        Self {
            chip_label: Self::default_chip_label(),
            consumer: Self::default_consumer(),
            slots: Self::default_slots(),
        }
    }
}

impl GpioSettings {
    fn default_chip_label() -> String {
        "gpio-pxa".to_string()
    }

    fn default_consumer() -> String {
        "Card reader".to_string()
    }

    fn default_slots() -> Vec<SlotLine> {
        vec![
            SlotLine { slot: Slot::Sd, offset: 100 },
            SlotLine { slot: Slot::Xd, offset: 101 },
            SlotLine { slot: Slot::Ms, offset: 102 },
            SlotLine { slot: Slot::Cf, offset: 103 },
        ]
    }

    /// Line offsets in mask bit order
    pub fn offsets(&self) -> Vec<u32> {
        self.slots.iter().map(|s| s.offset).collect()
    }

    /// Slot kinds in mask bit order
    pub fn slot_order(&self) -> Vec<Slot> {
        self.slots.iter().map(|s| s.slot).collect()
    }
}

/// USB subsystem control files for the card reader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    #[serde(default = "UsbSettings::default_quirks_path")]
    pub quirks_path: PathBuf,
    /// usb-storage quirk entry the bootloader installs for the reader
    #[serde(default = "UsbSettings::default_quirk")]
    pub quirk: String,
    #[serde(default = "UsbSettings::default_bind_path")]
    pub bind_path: PathBuf,
    /// Interface identifier written to the bind file
    #[serde(default = "UsbSettings::default_interface")]
    pub interface: String,
    #[serde(default = "UsbSettings::default_authorized_path")]
    pub authorized_path: PathBuf,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            quirks_path: Self::default_quirks_path(),
            quirk: Self::default_quirk(),
            bind_path: Self::default_bind_path(),
            interface: Self::default_interface(),
            authorized_path: Self::default_authorized_path(),
        }
    }
}

impl UsbSettings {
    fn default_quirks_path() -> PathBuf {
        PathBuf::from("/sys/module/usb_storage/parameters/quirks")
    }

    fn default_quirk() -> String {
        "058f:6366:i".to_string()
    }

    fn default_bind_path() -> PathBuf {
        PathBuf::from("/sys/bus/usb/drivers/usb-storage/bind")
    }

    fn default_interface() -> String {
        "1-1.4:1.0".to_string()
    }

    fn default_authorized_path() -> PathBuf {
        PathBuf::from("/sys/bus/usb/devices/1-1.4/authorized")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceSettings {
    /// Time the lines must stay quiet before a reading is trusted
    #[serde(default = "DebounceSettings::default_quiet_period_ms")]
    pub quiet_period_ms: u64,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            quiet_period_ms: Self::default_quiet_period_ms(),
        }
    }
}

impl DebounceSettings {
    const MAX_QUIET_PERIOD_MS: u64 = 60_000;

    fn default_quiet_period_ms() -> u64 {
        500
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonSettings::default(),
            gpio: GpioSettings::default(),
            usb: UsbSettings::default(),
            debounce: DebounceSettings::default(),
        }
    }
}

impl DaemonConfig {
    /// Configuration file to use: the explicit path, else the first existing candidate
    ///
    /// `None` means no file exists and the built-in defaults apply.
    pub fn locate(path: Option<PathBuf>) -> Option<PathBuf> {
        match path {
            Some(p) => Some(p),
            None => Self::first_existing(Self::candidate_paths()),
        }
    }

    /// Search order when no path is given
    pub fn candidate_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/card-presenced/daemon.toml"),
        ]
    }

    fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
        candidates.into_iter().find(|p| p.exists())
    }

    /// Load configuration from the specified path
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DaemonConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("card-presenced").join("daemon.toml")
        } else {
            PathBuf::from(".config/card-presenced/daemon.toml")
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.daemon.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.daemon.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.gpio.chip_label.trim().is_empty() {
            return Err(anyhow!("GPIO chip label must not be empty"));
        }

        let slots = &self.gpio.slots;
        if slots.is_empty() || slots.len() > MAX_SLOTS {
            return Err(anyhow!(
                "Between 1 and {} presence lines required, got {}",
                MAX_SLOTS,
                slots.len()
            ));
        }

        let mut kinds = HashSet::new();
        let mut offsets = HashSet::new();
        for line in slots {
            if !kinds.insert(line.slot) {
                return Err(anyhow!("Slot {} assigned to more than one line", line.slot));
            }
            if !offsets.insert(line.offset) {
                return Err(anyhow!("Line offset {} used by more than one slot", line.offset));
            }
        }

        if self.usb.quirk.is_empty() || self.usb.quirk.contains(',') {
            return Err(anyhow!(
                "Invalid quirk '{}', must be a single non-empty entry",
                self.usb.quirk
            ));
        }

        if self.usb.interface.trim().is_empty() {
            return Err(anyhow!("USB interface identifier must not be empty"));
        }

        let ms = self.debounce.quiet_period_ms;
        if ms == 0 || ms > DebounceSettings::MAX_QUIET_PERIOD_MS {
            return Err(anyhow!(
                "Invalid quiet period {}ms, must be 1-{}ms",
                ms,
                DebounceSettings::MAX_QUIET_PERIOD_MS
            ));
        }

        Ok(())
    }
}

/// Expand `~` in a user-supplied config path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.gpio.chip_label, "gpio-pxa");
        assert_eq!(config.gpio.offsets(), vec![100, 101, 102, 103]);
        assert_eq!(
            config.gpio.slot_order(),
            vec![Slot::Sd, Slot::Xd, Slot::Ms, Slot::Cf]
        );
        assert_eq!(config.usb.quirk, "058f:6366:i");
        assert_eq!(config.debounce.quiet_period(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = DaemonConfig::from_toml("").unwrap();
        assert_eq!(config.usb.interface, "1-1.4:1.0");
        assert_eq!(
            config.usb.authorized_path,
            PathBuf::from("/sys/bus/usb/devices/1-1.4/authorized")
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = DaemonConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.daemon.log_level, parsed.daemon.log_level);
        assert_eq!(config.gpio.slots, parsed.gpio.slots);
        assert_eq!(config.usb.quirks_path, parsed.usb.quirks_path);
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = DaemonConfig::default();
        config.daemon.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.daemon.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_lines() {
        let mut config = DaemonConfig::default();
        config.gpio.slots[1].offset = 100;
        assert!(config.validate().is_err());

        let mut config = DaemonConfig::default();
        config.gpio.slots[1].slot = Slot::Sd;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_slot_count() {
        let mut config = DaemonConfig::default();
        config.gpio.slots.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_quiet_period() {
        let mut config = DaemonConfig::default();
        config.debounce.quiet_period_ms = 0;
        assert!(config.validate().is_err());

        config.debounce.quiet_period_ms = 60_001;
        assert!(config.validate().is_err());

        config.debounce.quiet_period_ms = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_quirk_is_single_entry() {
        let mut config = DaemonConfig::default();
        config.usb.quirk = "058f:6366:i,1234:5678:u".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_first_existing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.toml");
        let system = dir.path().join("system.toml");

        assert_eq!(
            DaemonConfig::first_existing(vec![user.clone(), system.clone()]),
            None
        );

        fs::write(&system, "").unwrap();
        assert_eq!(
            DaemonConfig::first_existing(vec![user.clone(), system.clone()]),
            Some(system.clone())
        );

        fs::write(&user, "").unwrap();
        assert_eq!(
            DaemonConfig::first_existing(vec![user.clone(), system]),
            Some(user)
        );
    }

    #[test]
    fn test_invalid_found_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.toml");
        fs::write(
            &path,
            "[gpio]\nslots = [{ slot = \"sd\", offset = 96 }]\n\n[debounce]\nquiet_period_ms = 0\n",
        )
        .unwrap();

        let found = DaemonConfig::first_existing(vec![path.clone()]).unwrap();
        let err = DaemonConfig::load(&found).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid config file"));
    }

    #[test]
    fn test_explicit_path_is_used_even_if_missing() {
        let path = PathBuf::from("/nonexistent/card-presenced.toml");
        assert_eq!(DaemonConfig::locate(Some(path.clone())), Some(path.clone()));
        assert!(DaemonConfig::load(&path).is_err());
    }

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(
            expand_path(Path::new("/etc/card-presenced/daemon.toml")),
            PathBuf::from("/etc/card-presenced/daemon.toml")
        );
    }
}
