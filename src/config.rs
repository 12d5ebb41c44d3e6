use std::path::PathBuf;

use mac_address::MacAddress;
use serde_derive::Deserialize;
use uuid::Uuid;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub beacon: BeaconConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Which side of the beacon exchange this process plays.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Range for the configured beacon and raise warnings.
    #[default]
    Monitor,
    /// Advertise as the configured beacon.
    Beacon,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

/// Identity of the tracked (or advertised) beacon region.
#[derive(Deserialize, Debug, Clone)]
pub struct BeaconConfig {
    #[serde(default = "default_beacon_uuid")]
    pub uuid: Uuid,
    #[serde(default = "default_region_name")]
    pub name: String,
    /// When unset, any major/minor matches while ranging and 0 is advertised.
    pub major: Option<u16>,
    pub minor: Option<u16>,
    /// RSSI in dB measured one meter from the beacon.
    #[serde(default = "default_calibration_power")]
    pub calibration_power: i8,
    /// Optional hardware address pin for the tracked beacon.
    pub address: Option<MacAddress>,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        BeaconConfig {
            uuid: default_beacon_uuid(),
            name: default_region_name(),
            major: None,
            minor: None,
            calibration_power: default_calibration_power(),
            address: None,
        }
    }
}

fn default_beacon_uuid() -> Uuid {
    Uuid::from_u128(0xE2C56DB5_DFFB_48D2_B060_D0F5A71096E0)
}

fn default_region_name() -> String {
    "retreat".to_string()
}

fn default_calibration_power() -> i8 {
    -59
}

#[derive(Deserialize, Debug, Clone)]
pub struct AudioConfig {
    #[serde(default = "default_sounds_dir")]
    pub sounds_dir: PathBuf,
    /// External decoder used to play warning cues.
    #[serde(default = "default_player_command")]
    pub player_command: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            sounds_dir: default_sounds_dir(),
            player_command: default_player_command(),
        }
    }
}

fn default_sounds_dir() -> PathBuf {
    PathBuf::from("sounds")
}

fn default_player_command() -> String {
    "mpg123".to_string()
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ScanConfig {
    pub region_exit_timeout_seconds: Option<u64>,
}
