//! # Gateway Status Report
//!
//! The `stat` object merged into PUSH_DATA datagrams once per statistics
//! window: gateway time, coordinates when located, traffic counters, and
//! board temperature.

use serde::Serialize;

/// One `stat` object in its wire form.
#[derive(Debug, Clone, Serialize)]
pub struct StatReport {
    /// Gateway time, local timezone, `%F %T %Z`
    pub time: String,
    /// Latitude, degrees, when the gateway is located
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lati: Option<f64>,
    /// Longitude, degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long: Option<f64>,
    /// Altitude, meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alti: Option<i32>,
    /// Radio frames received in the window
    pub rxnb: u32,
    /// Frames with a good CRC
    pub rxok: u32,
    /// Frames forwarded upstream
    pub rxfw: u32,
    /// Percentage of PUSH_DATA datagrams acknowledged
    pub ackr: f64,
    /// PULL_RESP datagrams received
    pub dwnb: u32,
    /// Frames emitted by the radio
    pub txnb: u32,
    /// Concentrator board temperature, degrees Celsius
    pub temp: f32,
}

impl StatReport {
    /// Stamps a report with the current local time.
    pub fn stamp_now() -> String {
        chrono::Local::now().format("%F %T %Z").to_string()
    }
}
