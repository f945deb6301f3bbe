use serde::{Deserialize, Serialize};

/// Operational state reported by the OLT for one ONU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnuStatus {
    Logging,
    #[serde(rename = "LOS")]
    Los,
    Synchronization,
    Online,
    #[serde(rename = "Dying Gasp")]
    DyingGasp,
    #[serde(rename = "Auth Failed")]
    AuthFailed,
    Offline,
    #[default]
    Unknown,
}

impl OnuStatus {
    /// Map the raw status code from the device. Codes outside 1..=7 are Unknown.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Logging,
            2 => Self::Los,
            3 => Self::Synchronization,
            4 => Self::Online,
            5 => Self::DyingGasp,
            6 => Self::AuthFailed,
            7 => Self::Offline,
            _ => Self::Unknown,
        }
    }
}

/// Why an ONU last went offline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfflineReason {
    #[default]
    Unknown,
    #[serde(rename = "LOS")]
    Los,
    #[serde(rename = "LOSi")]
    LosI,
    #[serde(rename = "LOFi")]
    LofI,
    #[serde(rename = "sfi")]
    Sfi,
    #[serde(rename = "loai")]
    Loai,
    #[serde(rename = "loami")]
    Loami,
    AuthFail,
    PowerOff,
    #[serde(rename = "deactiveSucc")]
    DeactiveSucc,
    #[serde(rename = "deactiveFail")]
    DeactiveFail,
    Reboot,
    Shutdown,
}

impl OfflineReason {
    /// Map the raw reason code from the device. Code 1 is the device's own
    /// "unknown"; anything outside 1..=13 is treated the same way.
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => Self::Los,
            3 => Self::LosI,
            4 => Self::LofI,
            5 => Self::Sfi,
            6 => Self::Loai,
            7 => Self::Loami,
            8 => Self::AuthFail,
            9 => Self::PowerOff,
            10 => Self::DeactiveSucc,
            11 => Self::DeactiveFail,
            12 => Self::Reboot,
            13 => Self::Shutdown,
            _ => Self::Unknown,
        }
    }
}

/// One ONU as shown in a per-port listing.
/// Fields that could not be fetched or decoded are left at their default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnuSummary {
    /// Chassis position of the line card (1 or 2)
    pub board: u8,

    /// PON port on the board (1..=8)
    pub pon: u8,

    /// Slot the ONU occupies on the port (1..=128)
    pub onu_id: u32,

    pub name: String,

    pub onu_type: String,

    /// Serial number with the vendor "1," prefix removed
    pub serial_number: String,

    /// Received optical power in dBm, two decimals, e.g. "-21.50"
    pub rx_power: String,

    pub status: OnuStatus,
}

/// Full telemetry for a single ONU.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnuDetail {
    #[serde(flatten)]
    pub summary: OnuSummary,

    pub description: String,

    /// Transmitted optical power in dBm, two decimals
    pub tx_power: String,

    pub ip_address: String,

    /// "YYYY-MM-DD HH:MM:SS" as reported by the device
    pub last_online: String,

    pub last_offline: String,

    /// "D days H hours M minutes S seconds" since `last_online`
    pub uptime: String,

    /// Length of the last outage, same rendering as `uptime`
    pub last_down_time_duration: String,

    pub offline_reason: OfflineReason,

    /// Fiber distance to the OLT in meters
    pub gpon_optical_distance: String,
}

/// A slot coordinate, used for the free-slot listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OnuSlot {
    pub board: u8,
    pub pon: u8,
    pub onu_id: u32,
}

/// A window over a longer list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// 1-based page index
    pub page: usize,

    /// Effective page size after clamping
    #[serde(rename = "limit")]
    pub page_size: usize,

    pub page_count: usize,

    pub total_rows: usize,

    pub data: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&OnuStatus::DyingGasp).unwrap();
        assert_eq!(json, "\"Dying Gasp\"");

        let parsed: OnuStatus = serde_json::from_str("\"LOS\"").unwrap();
        assert_eq!(parsed, OnuStatus::Los);
    }

    #[test]
    fn test_offline_reason_table() {
        assert_eq!(OfflineReason::from_code(1), OfflineReason::Unknown);
        assert_eq!(OfflineReason::from_code(9), OfflineReason::PowerOff);
        assert_eq!(OfflineReason::from_code(13), OfflineReason::Shutdown);
        assert_eq!(OfflineReason::from_code(14), OfflineReason::Unknown);
        assert_eq!(OfflineReason::from_code(-1), OfflineReason::Unknown);
    }

    #[test]
    fn test_detail_flattens_summary() {
        let detail = OnuDetail {
            summary: OnuSummary {
                board: 1,
                pon: 2,
                onu_id: 3,
                name: "CPE-3".to_string(),
                ..Default::default()
            },
            tx_power: "2.10".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["onu_id"], 3);
        assert_eq!(value["name"], "CPE-3");
        assert_eq!(value["tx_power"], "2.10");
        assert_eq!(value["status"], "Unknown");

        let back: OnuDetail = serde_json::from_value(value).unwrap();
        assert_eq!(back, detail);
    }
}
