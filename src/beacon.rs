use btleplug::api::BDAddr;
use mac_address::MacAddress;
use uuid::Uuid;

use crate::config::BeaconConfig;

/// https://bitbucket.org/bluetooth-SIG/public/src/main/assigned_numbers/company_identifiers/company_identifiers.yaml
pub const APPLE_COMPANY_ID: u16 = 0x004C;

const IBEACON_TYPE: u8 = 0x02;
const IBEACON_DATA_LEN: u8 = 0x15;

/// Flags AD structure: LE general discoverable, BR/EDR not supported.
const ADV_FLAGS: [u8; 3] = [0x02, 0x01, 0x1A];

const IMMEDIATE_THRESHOLD_METERS: f64 = 0.5;
const NEAR_THRESHOLD_METERS: f64 = 4.0;
const PATH_LOSS_EXPONENT: f64 = 2.0;

/// Coarse distance bucket for a ranged beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityLevel {
    Unknown,
    Far,
    Near,
    Immediate,
}

impl ProximityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProximityLevel::Unknown => "unknown",
            ProximityLevel::Far => "far",
            ProximityLevel::Near => "near",
            ProximityLevel::Immediate => "immediate",
        }
    }
}

/// One decoded beacon frame from a manufacturer data advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconFrame {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    /// RSSI the beacon reports for a receiver one meter away.
    pub measured_power: i8,
}

/// Parse the Apple manufacturer data payload as a beacon frame.
///
/// Layout: subtype, length, 16 byte UUID, major, minor (both big endian),
/// measured power as a signed byte.
pub fn parse_frame(data: &[u8]) -> Option<BeaconFrame> {
    if data.len() < 23 || data[0] != IBEACON_TYPE || data[1] != IBEACON_DATA_LEN {
        return None;
    }
    let uuid = Uuid::from_slice(&data[2..18]).ok()?;
    Some(BeaconFrame {
        uuid,
        major: u16::from_be_bytes([data[18], data[19]]),
        minor: u16::from_be_bytes([data[20], data[21]]),
        measured_power: data[22] as i8,
    })
}

/// Log-distance estimate from the advertised calibration power.
pub fn estimate_distance_meters(rssi: i16, measured_power: i8) -> f64 {
    10f64.powf((f64::from(measured_power) - f64::from(rssi)) / (10.0 * PATH_LOSS_EXPONENT))
}

/// Bucket a sighting. No RSSI on the advertisement means we cannot rank it.
pub fn classify(rssi: Option<i16>, measured_power: i8) -> ProximityLevel {
    let Some(rssi) = rssi else {
        return ProximityLevel::Unknown;
    };
    let distance = estimate_distance_meters(rssi, measured_power);
    if distance <= IMMEDIATE_THRESHOLD_METERS {
        ProximityLevel::Immediate
    } else if distance <= NEAR_THRESHOLD_METERS {
        ProximityLevel::Near
    } else {
        ProximityLevel::Far
    }
}

/// Sighting filter for the one region this process tracks.
#[derive(Debug, Clone)]
pub struct RegionFilter {
    uuid: Uuid,
    major: Option<u16>,
    minor: Option<u16>,
    address: Option<MacAddress>,
}

impl RegionFilter {
    pub fn from_config(config: &BeaconConfig) -> Self {
        RegionFilter {
            uuid: config.uuid,
            major: config.major,
            minor: config.minor,
            address: config.address,
        }
    }

    pub fn matches_address(&self, address: &BDAddr) -> bool {
        match self.address {
            Some(pinned) => *address == BDAddr::from(pinned.bytes()),
            None => true,
        }
    }

    pub fn matches_frame(&self, frame: &BeaconFrame) -> bool {
        if frame.uuid != self.uuid {
            return false;
        }
        if self.major.is_some_and(|major| frame.major != major) {
            return false;
        }
        if self.minor.is_some_and(|minor| frame.minor != minor) {
            return false;
        }
        true
    }
}

/// Advertising bytes for the beacon role. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingPayload(Vec<u8>);

impl AdvertisingPayload {
    pub fn new(uuid: Uuid, major: u16, minor: u16, measured_power: i8) -> Self {
        let mut bytes = Vec::with_capacity(30);
        bytes.extend_from_slice(&ADV_FLAGS);
        // Manufacturer specific data AD structure wrapping the beacon frame.
        bytes.extend_from_slice(&[0x1A, 0xFF]);
        bytes.extend_from_slice(&APPLE_COMPANY_ID.to_le_bytes());
        bytes.extend_from_slice(&[IBEACON_TYPE, IBEACON_DATA_LEN]);
        bytes.extend_from_slice(uuid.as_bytes());
        bytes.extend_from_slice(&major.to_be_bytes());
        bytes.extend_from_slice(&minor.to_be_bytes());
        bytes.push(measured_power as u8);
        AdvertisingPayload(bytes)
    }

    pub fn from_config(config: &BeaconConfig) -> Self {
        AdvertisingPayload::new(
            config.uuid,
            config.major.unwrap_or(0),
            config.minor.unwrap_or(0),
            config.calibration_power,
        )
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
