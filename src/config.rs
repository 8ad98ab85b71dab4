//! # Gateway Configuration
//!
//! Typed deserialization of the global configuration file. The file holds
//! three top-level objects: `SX130x_conf` for the concentrator board,
//! `gateway_conf` for the server link and beaconing, and an optional
//! `debug_conf`. Unknown keys are ignored everywhere; missing mandatory
//! keys fail fast at load time.

use std::path::Path;

use serde::Deserialize;

use crate::beacon::BeaconPlan;
use crate::constants::DEFAULT_PUSH_TIMEOUT_MS;
use crate::error::FwdError;

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "SX130x_conf")]
    pub sx130x: Sx130xConf,
    #[serde(rename = "gateway_conf")]
    pub gateway: GatewayConf,
    #[serde(rename = "debug_conf", default)]
    pub debug: DebugConf,
}

/// Concentrator board configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Sx130xConf {
    /// Link to the board: "SPI", "USB" or "MOCK"
    pub com_type: String,
    #[serde(default)]
    pub com_path: String,
    #[serde(default = "default_true")]
    pub lorawan_public: bool,
    #[serde(default)]
    pub clksrc: u8,
    #[serde(default)]
    pub full_duplex: bool,
    #[serde(default)]
    pub fine_timestamp: FineTimestampConf,
    pub radio_0: RadioConf,
    pub radio_1: RadioConf,
    #[serde(rename = "chan_multiSF_0", default)]
    pub chan_multisf_0: Option<ChanMultiSf>,
    #[serde(rename = "chan_multiSF_1", default)]
    pub chan_multisf_1: Option<ChanMultiSf>,
    #[serde(rename = "chan_multiSF_2", default)]
    pub chan_multisf_2: Option<ChanMultiSf>,
    #[serde(rename = "chan_multiSF_3", default)]
    pub chan_multisf_3: Option<ChanMultiSf>,
    #[serde(rename = "chan_multiSF_4", default)]
    pub chan_multisf_4: Option<ChanMultiSf>,
    #[serde(rename = "chan_multiSF_5", default)]
    pub chan_multisf_5: Option<ChanMultiSf>,
    #[serde(rename = "chan_multiSF_6", default)]
    pub chan_multisf_6: Option<ChanMultiSf>,
    #[serde(rename = "chan_multiSF_7", default)]
    pub chan_multisf_7: Option<ChanMultiSf>,
    #[serde(rename = "chan_Lora_std", default)]
    pub chan_lora_std: Option<ChanLoraStd>,
    #[serde(rename = "chan_FSK", default)]
    pub chan_fsk: Option<ChanFsk>,
    #[serde(default)]
    pub sx1261_conf: Sx1261Conf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FineTimestampConf {
    #[serde(default)]
    pub enable: bool,
}

/// One RF chain of the board.
#[derive(Debug, Clone, Deserialize)]
pub struct RadioConf {
    pub enable: bool,
    #[serde(rename = "type", default)]
    pub radio_type: String,
    /// Center frequency, Hz
    #[serde(default)]
    pub freq: u32,
    #[serde(default)]
    pub rssi_offset: f32,
    #[serde(default)]
    pub tx_enable: bool,
    /// Lower bound of the allowed TX range, Hz
    #[serde(default)]
    pub tx_freq_min: u32,
    /// Upper bound of the allowed TX range, Hz
    #[serde(default)]
    pub tx_freq_max: u32,
    #[serde(default)]
    pub tx_gain_lut: Vec<TxGain>,
}

impl RadioConf {
    /// Resolves a requested power against the gain LUT: the largest entry
    /// not above the request, or the weakest entry when the request
    /// undershoots the table. Returns the chosen power.
    pub fn select_power(&self, requested: i8) -> Option<i8> {
        let best = self
            .tx_gain_lut
            .iter()
            .filter(|g| g.rf_power <= requested)
            .map(|g| g.rf_power)
            .max();
        best.or_else(|| self.tx_gain_lut.iter().map(|g| g.rf_power).min())
    }

    /// True when `freq_hz` sits inside the configured TX range.
    pub fn tx_freq_in_range(&self, freq_hz: u32) -> bool {
        freq_hz >= self.tx_freq_min && freq_hz <= self.tx_freq_max
    }
}

/// One entry of a TX gain look-up table.
#[derive(Debug, Clone, Deserialize)]
pub struct TxGain {
    pub rf_power: i8,
    #[serde(default)]
    pub pa_gain: u8,
    #[serde(default)]
    pub pwr_idx: u8,
}

/// One multi-SF LoRa IF chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ChanMultiSf {
    pub enable: bool,
    #[serde(default)]
    pub radio: u8,
    #[serde(rename = "if", default)]
    pub if_hz: i32,
}

/// The LoRa service (single-SF) channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChanLoraStd {
    pub enable: bool,
    #[serde(default)]
    pub radio: u8,
    #[serde(rename = "if", default)]
    pub if_hz: i32,
    #[serde(default)]
    pub bandwidth: u32,
    #[serde(default)]
    pub spread_factor: u8,
}

/// The FSK channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChanFsk {
    pub enable: bool,
    #[serde(default)]
    pub radio: u8,
    #[serde(rename = "if", default)]
    pub if_hz: i32,
    #[serde(default)]
    pub bandwidth: u32,
    #[serde(default)]
    pub datarate: u32,
}

/// SX1261 companion radio configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sx1261Conf {
    #[serde(default)]
    pub spectral_scan: SpectralScanConf,
}

/// Background spectral scan parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SpectralScanConf {
    #[serde(default)]
    pub enable: bool,
    /// First channel, Hz
    #[serde(default)]
    pub freq_start: u32,
    /// Number of 200 kHz channels to sweep
    #[serde(default)]
    pub nb_chan: u8,
    /// Samples per scan
    #[serde(default = "default_nb_scan")]
    pub nb_scan: u16,
    /// Pause between per-channel scans, s
    #[serde(default = "default_pace")]
    pub pace_s: u32,
}

impl Default for SpectralScanConf {
    fn default() -> Self {
        SpectralScanConf {
            enable: false,
            freq_start: 0,
            nb_chan: 0,
            nb_scan: default_nb_scan(),
            pace_s: default_pace(),
        }
    }
}

/// Server link, GPS and beacon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConf {
    /// Gateway EUI as a 16-digit hex string; the concentrator EUI is used
    /// when absent
    #[serde(rename = "gateway_ID", default)]
    pub gateway_id: Option<String>,
    pub server_address: String,
    pub serv_port_up: u16,
    pub serv_port_down: u16,
    /// Seconds between PULL_DATA heartbeats
    #[serde(default = "default_keepalive")]
    pub keepalive_interval: u64,
    /// Seconds between status reports
    #[serde(default = "default_stat_interval")]
    pub stat_interval: u64,
    /// Upstream ACK collection budget, ms
    #[serde(default = "default_push_timeout")]
    pub push_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub forward_crc_valid: bool,
    #[serde(default)]
    pub forward_crc_error: bool,
    #[serde(default)]
    pub forward_crc_disabled: bool,
    #[serde(default)]
    pub gps_tty_path: Option<String>,
    #[serde(default)]
    pub ref_latitude: Option<f64>,
    #[serde(default)]
    pub ref_longitude: Option<f64>,
    #[serde(default)]
    pub ref_altitude: Option<i32>,
    /// Use the reference coordinates instead of live GPS fixes
    #[serde(default)]
    pub fake_gps: bool,
    /// Beacon period, s; 0 disables beaconing
    #[serde(default)]
    pub beacon_period: u32,
    #[serde(default = "default_beacon_freq")]
    pub beacon_freq_hz: u32,
    #[serde(default = "default_one")]
    pub beacon_freq_nb: u8,
    #[serde(default)]
    pub beacon_freq_step: u32,
    #[serde(default = "default_beacon_datarate")]
    pub beacon_datarate: u8,
    #[serde(default = "default_beacon_bw")]
    pub beacon_bw_hz: u32,
    #[serde(default = "default_beacon_power")]
    pub beacon_power: i8,
    #[serde(default)]
    pub beacon_infodesc: u8,
    /// Unacknowledged PULL_DATA count that triggers a clean shutdown;
    /// 0 disables the mechanism
    #[serde(default)]
    pub autoquit_threshold: u32,
}

/// Debugging hints; accepted so reference configuration files load, acted
/// on only where it is cheap.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConf {
    #[serde(default)]
    pub log_file: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_one() -> u8 {
    1
}

fn default_keepalive() -> u64 {
    5
}

fn default_stat_interval() -> u64 {
    30
}

fn default_push_timeout() -> u64 {
    DEFAULT_PUSH_TIMEOUT_MS
}

fn default_beacon_freq() -> u32 {
    869_525_000
}

fn default_beacon_datarate() -> u8 {
    9
}

fn default_beacon_bw() -> u32 {
    125_000
}

fn default_beacon_power() -> i8 {
    14
}

fn default_nb_scan() -> u16 {
    2000
}

fn default_pace() -> u32 {
    10
}

impl Config {
    /// Loads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Config, FwdError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FwdError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| FwdError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), FwdError> {
        match self.sx130x.com_type.as_str() {
            "SPI" | "USB" | "MOCK" => {}
            other => {
                return Err(FwdError::Config(format!("unknown com_type {other:?}")));
            }
        }
        if let Some(id) = &self.gateway.gateway_id {
            self.parse_gateway_id_str(id)?;
        }
        if self.gateway.beacon_period > 0 {
            crate::beacon::BeaconPlan::try_from(&self.gateway)?;
        }
        if self.gateway.keepalive_interval == 0 {
            return Err(FwdError::Config("keepalive_interval must be > 0".into()));
        }
        if self.gateway.stat_interval == 0 {
            return Err(FwdError::Config("stat_interval must be > 0".into()));
        }
        Ok(())
    }

    fn parse_gateway_id_str(&self, id: &str) -> Result<u64, FwdError> {
        u64::from_str_radix(id, 16)
            .map_err(|_| FwdError::Config(format!("gateway_ID {id:?} is not a hex EUI")))
    }

    /// Gateway EUI from the configuration, when one is set.
    pub fn gateway_eui(&self) -> Result<Option<u64>, FwdError> {
        match &self.gateway.gateway_id {
            Some(id) => Ok(Some(self.parse_gateway_id_str(id)?)),
            None => Ok(None),
        }
    }

    /// RF chain configuration by index.
    pub fn radio(&self, rf_chain: u8) -> Option<&RadioConf> {
        match rf_chain {
            0 => Some(&self.sx130x.radio_0),
            1 => Some(&self.sx130x.radio_1),
            _ => None,
        }
    }

    /// Beacon plan, when beaconing is enabled.
    pub fn beacon_plan(&self) -> Option<BeaconPlan> {
        if self.gateway.beacon_period == 0 {
            return None;
        }
        BeaconPlan::try_from(&self.gateway).ok()
    }
}

impl TryFrom<&GatewayConf> for BeaconPlan {
    type Error = FwdError;

    fn try_from(conf: &GatewayConf) -> Result<Self, FwdError> {
        if conf.beacon_freq_nb == 0 {
            return Err(FwdError::Config("beacon_freq_nb must be > 0".into()));
        }
        let plan = BeaconPlan {
            period_s: conf.beacon_period,
            freq_hz: conf.beacon_freq_hz,
            freq_nb: conf.beacon_freq_nb,
            freq_step_hz: conf.beacon_freq_step,
            datarate: conf.beacon_datarate,
            bw_hz: conf.beacon_bw_hz,
            power: conf.beacon_power,
            infodesc: conf.beacon_infodesc,
        };
        // Reject unsupported datarates and bandwidths at load time
        crate::beacon::beacon_payload(&plan, 0, 0.0, 0.0)?;
        crate::hal::Bandwidth::from_hz(plan.bw_hz)?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_json() -> serde_json::Value {
        serde_json::json!({
            "SX130x_conf": {
                "com_type": "MOCK",
                "com_path": "/dev/spidev0.0",
                "radio_0": {
                    "enable": true,
                    "type": "SX1250",
                    "freq": 867500000u32,
                    "tx_enable": true,
                    "tx_freq_min": 863000000u32,
                    "tx_freq_max": 870000000u32,
                    "tx_gain_lut": [
                        {"rf_power": 12, "pa_gain": 0, "pwr_idx": 15},
                        {"rf_power": 14, "pa_gain": 1, "pwr_idx": 16},
                        {"rf_power": 27, "pa_gain": 1, "pwr_idx": 22}
                    ]
                },
                "radio_1": {"enable": true, "freq": 868500000u32}
            },
            "gateway_conf": {
                "gateway_ID": "AA555A0000000101",
                "server_address": "localhost",
                "serv_port_up": 1730,
                "serv_port_down": 1730
            }
        })
    }

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config: Config = serde_json::from_value(minimal_json()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.gateway_eui().unwrap(), Some(0xAA55_5A00_0000_0101));
        assert_eq!(config.gateway.keepalive_interval, 5);
        assert_eq!(config.gateway.stat_interval, 30);
        assert!(config.gateway.forward_crc_valid);
        assert!(!config.gateway.forward_crc_error);
        assert!(config.beacon_plan().is_none());
        assert!(!config.sx130x.sx1261_conf.spectral_scan.enable);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut json = minimal_json();
        json["gateway_conf"]["brand_new_knob"] = serde_json::json!(42);
        json["SX130x_conf"]["antenna_gain"] = serde_json::json!(3);
        let config: Config = serde_json::from_value(json).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_mandatory_key_fails() {
        let mut json = minimal_json();
        json["gateway_conf"].as_object_mut().unwrap().remove("server_address");
        assert!(serde_json::from_value::<Config>(json).is_err());
    }

    #[test]
    fn test_bad_gateway_id_rejected() {
        let mut json = minimal_json();
        json["gateway_conf"]["gateway_ID"] = serde_json::json!("not-hex");
        let config: Config = serde_json::from_value(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_power_selection() {
        let config: Config = serde_json::from_value(minimal_json()).unwrap();
        let radio = config.radio(0).unwrap();
        // Exact hit
        assert_eq!(radio.select_power(14), Some(14));
        // Round down to the nearest entry
        assert_eq!(radio.select_power(20), Some(14));
        // Undershoot picks the weakest entry
        assert_eq!(radio.select_power(5), Some(12));
        assert!(radio.tx_freq_in_range(868_500_000));
        assert!(!radio.tx_freq_in_range(433_000_000));
    }

    #[test]
    fn test_beacon_plan_from_config() {
        let mut json = minimal_json();
        json["gateway_conf"]["beacon_period"] = serde_json::json!(128);
        json["gateway_conf"]["beacon_freq_nb"] = serde_json::json!(8);
        json["gateway_conf"]["beacon_freq_step"] = serde_json::json!(200000);
        let config: Config = serde_json::from_value(json).unwrap();
        config.validate().unwrap();
        let plan = config.beacon_plan().unwrap();
        assert_eq!(plan.period_s, 128);
        assert_eq!(plan.freq_nb, 8);
        assert_eq!(plan.datarate, 9);
    }

    #[test]
    fn test_unsupported_beacon_datarate_fails_validation() {
        let mut json = minimal_json();
        json["gateway_conf"]["beacon_period"] = serde_json::json!(128);
        json["gateway_conf"]["beacon_datarate"] = serde_json::json!(11);
        let config: Config = serde_json::from_value(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_json()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.sx130x.com_type, "MOCK");

        assert!(Config::load(Path::new("/nonexistent/global_conf.json")).is_err());
    }
}
