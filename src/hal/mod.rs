//! # Concentrator HAL
//!
//! The seam between the forwarder and the radio concentrator driver. The
//! forwarder core only ever talks to the [`Concentrator`] trait: the real
//! SX130x SPI/USB driver binds here, and [`mock::MockConcentrator`] stands in
//! for it in tests and in the `MOCK` com-type.
//!
//! All counter values are microseconds of the concentrator's free-running
//! 32-bit timer; they wrap every ~71.6 minutes and must only be compared
//! through the wrap-safe helpers in [`crate::time`].

pub mod mock;
pub mod modulation;

pub use modulation::{Bandwidth, CodingRate, DataRate, Modulation, SpreadingFactor};

use crate::error::FwdError;

/// CRC status of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    Ok,
    Bad,
    NoCrc,
}

impl CrcStatus {
    /// Wire encoding used by the `stat` rxpk field: 1 = OK, -1 = fail, 0 = no CRC
    pub fn stat_code(&self) -> i8 {
        match self {
            CrcStatus::Ok => 1,
            CrcStatus::Bad => -1,
            CrcStatus::NoCrc => 0,
        }
    }
}

/// Scheduling mode of a TX packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Send as soon as possible
    Immediate,
    /// Send when the concentrator counter reaches `count_us`
    Timestamped,
    /// Send on a GPS-derived instant, pre-converted to `count_us`
    OnGps,
}

/// TX path state of one RF chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Unknown,
    Off,
    Free,
    Scheduled,
    Emitting,
}

/// State of a background spectral scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    None,
    OnGoing,
    Aborted,
    Completed,
}

/// A frame received by the concentrator
#[derive(Debug, Clone)]
pub struct RxPacket {
    /// Carrier frequency in Hz
    pub freq_hz: u32,
    /// Frequency offset measured against the channel center, Hz
    pub freq_offset: i32,
    /// IF chain the frame was demodulated on
    pub if_chain: u8,
    /// RF chain the frame was received on
    pub rf_chain: u8,
    /// Demodulator id
    pub modem_id: u8,
    pub modulation: Modulation,
    pub bandwidth: Bandwidth,
    pub datarate: DataRate,
    pub coderate: CodingRate,
    pub crc_status: CrcStatus,
    /// Counter capture at the RX-finished event, us
    pub count_us: u32,
    /// Fine timestamp, ns within the PPS second, when enabled
    pub fine_time_ns: Option<u32>,
    /// RSSI of the whole channel, dBm
    pub rssi_channel: f32,
    /// RSSI of the signal itself, dBm
    pub rssi_signal: f32,
    /// Signal to noise ratio, dB (LoRa only)
    pub snr: f32,
    pub payload: Vec<u8>,
}

/// A frame to be transmitted by the concentrator
#[derive(Debug, Clone)]
pub struct TxPacket {
    pub tx_mode: TxMode,
    /// Target counter value, us (TIMESTAMPED and ON_GPS modes)
    pub count_us: u32,
    pub rf_chain: u8,
    pub freq_hz: u32,
    /// Output power, dBm
    pub rf_power: i8,
    pub modulation: Modulation,
    pub bandwidth: Bandwidth,
    pub datarate: DataRate,
    pub coderate: CodingRate,
    /// Invert signal polarity, for downlinks
    pub invert_pol: bool,
    /// FSK frequency deviation, kHz
    pub fdev_khz: u8,
    /// Preamble length in symbols (LoRa) or bytes (FSK)
    pub preamble: u16,
    /// Do not emit a physical-layer CRC
    pub no_crc: bool,
    /// Implicit header mode
    pub no_header: bool,
    pub payload: Vec<u8>,
}

/// Result alias for HAL calls
pub type HalResult<T> = Result<T, FwdError>;

/// Contract of the radio concentrator driver.
///
/// Calls are short register transactions; the forwarder serializes them
/// behind one mutex and never holds it across network I/O.
pub trait Concentrator: Send {
    /// Configures and starts the radio. Must be called before any RX/TX.
    fn start(&mut self) -> HalResult<()>;

    /// Stops the radio and releases the board.
    fn stop(&mut self) -> HalResult<()>;

    /// Fetches up to `max` received frames from the RX FIFO.
    fn receive(&mut self, max: usize) -> HalResult<Vec<RxPacket>>;

    /// Programs one frame for transmission.
    fn send(&mut self, pkt: &TxPacket) -> HalResult<()>;

    /// Reports the TX path state of one RF chain.
    fn tx_status(&mut self, rf_chain: u8) -> HalResult<TxStatus>;

    /// Reads the free-running 32-bit microsecond counter.
    fn instcnt(&mut self) -> HalResult<u32>;

    /// Reads the counter value latched at the last GPS PPS edge.
    fn trigcnt(&mut self) -> HalResult<u32>;

    /// Reads the concentrator EUI.
    fn eui(&mut self) -> HalResult<u64>;

    /// Reads the board temperature in degrees Celsius.
    fn temperature(&mut self) -> HalResult<f32>;

    /// Starts a background spectral scan at `freq_hz` with `nb_scan` samples.
    fn spectral_scan_start(&mut self, freq_hz: u32, nb_scan: u16) -> HalResult<()>;

    /// Polls the state of the current spectral scan.
    fn spectral_scan_status(&mut self) -> HalResult<ScanStatus>;

    /// Fetches the per-level histogram of a completed scan as
    /// `(level_dbm, count)` buckets.
    fn spectral_scan_results(&mut self) -> HalResult<Vec<(i16, u16)>>;

    /// Aborts an in-progress spectral scan.
    fn spectral_scan_abort(&mut self) -> HalResult<()>;
}
