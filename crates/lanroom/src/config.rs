//! Server configuration, read once at startup from a TOML file written
//! by the UI layer. There is no hot reload; a changed file takes effect
//! on the next start.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lanroom_announce::AnnounceConfig;
use lanroom_protocol::GameInfo;
use lanroom_room::RoomConfig;

/// Errors while loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file is not valid: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level server configuration.
///
/// Every field has a default, so a missing file or a sparse one is fine;
/// `#[serde(default)]` fills in the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    pub room: RoomSettings,
    pub announce: AnnounceSettings,
    pub limits: LimitSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:24872".to_string(),
            room: RoomSettings::default(),
            announce: AnnounceSettings::default(),
            limits: LimitSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    pub name: String,
    pub password: Option<String>,
    pub max_members: usize,
    pub game: GameSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GameSettings {
    pub title_id: u64,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnounceSettings {
    /// Announcing is opt-in; a room without it is join-by-address only.
    pub enabled: bool,
    pub url: String,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
    /// The address published to the directory, which may differ from
    /// `bind_addr` behind NAT.
    pub public_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub handshake_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    /// Depth of each member's outbound frame queue. Overflow marks the
    /// member a slow consumer.
    pub outbound_queue_depth: usize,
    pub ban_file: PathBuf,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            name: "lanroom".to_string(),
            password: None,
            max_members: 16,
            game: GameSettings::default(),
        }
    }
}

impl Default for AnnounceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            interval_secs: 15,
            request_timeout_secs: 5,
            public_addr: String::new(),
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 5,
            idle_timeout_secs: 30,
            outbound_queue_depth: 128,
            ban_file: PathBuf::from("bans.json"),
        }
    }
}

impl ServerConfig {
    /// Loads the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// The room controller's view of this configuration.
    pub(crate) fn room_config(&self) -> RoomConfig {
        RoomConfig {
            name: self.room.name.clone(),
            password: self.room.password.clone(),
            game: GameInfo {
                title_id: self.room.game.title_id,
                name: self.room.game.name.clone(),
                version: self.room.game.version.clone(),
            },
            max_members: self.room.max_members,
        }
    }

    /// The announcer's view, or `None` when announcing is disabled.
    pub(crate) fn announce_config(&self) -> Option<AnnounceConfig> {
        if !self.announce.enabled || self.announce.url.is_empty() {
            return None;
        }
        Some(AnnounceConfig {
            url: self.announce.url.clone(),
            interval: Duration::from_secs(self.announce.interval_secs),
            request_timeout: Duration::from_secs(self.announce.request_timeout_secs),
            public_addr: self.announce.public_addr.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.room.max_members, 16);
        assert_eq!(config.limits.idle_timeout_secs, 30);
        assert!(!config.announce.enabled);
        assert!(config.announce_config().is_none());
    }

    #[test]
    fn test_partial_config_overrides_only_named_fields() {
        let config: ServerConfig = toml::from_str(
            r#"
            bind_addr = "0.0.0.0:24872"

            [room]
            name = "Friday Night"
            password = "sesame"
            max_members = 8

            [room.game]
            title_id = 0x0004000000030800
            name = "Example Quest"

            [announce]
            enabled = true
            url = "https://rooms.example.net/api/rooms"
            public_addr = "203.0.113.5:24872"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:24872");
        assert_eq!(config.room.name, "Friday Night");
        assert_eq!(config.room.max_members, 8);
        assert_eq!(config.room.game.name, "Example Quest");
        // Unnamed fields keep their defaults.
        assert_eq!(config.announce.interval_secs, 15);
        assert_eq!(config.limits.outbound_queue_depth, 128);

        let announce = config.announce_config().expect("announcing enabled");
        assert_eq!(announce.interval, Duration::from_secs(15));
    }

    #[test]
    fn test_room_config_projection() {
        let mut config = ServerConfig::default();
        config.room.name = "Test".into();
        config.room.password = Some("pw".into());

        let room = config.room_config();
        assert_eq!(room.name, "Test");
        assert_eq!(room.password.as_deref(), Some("pw"));
        assert_eq!(room.max_members, 16);
    }
}
