//! # Mock Concentrator
//!
//! Deterministic in-memory implementation of the [`Concentrator`] trait,
//! used by the test suite and by the `MOCK` com-type. RX frames are scripted
//! through a [`MockHandle`], transmissions are recorded for inspection, and
//! the 32-bit counter is either driven manually or derived from wall time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::FwdError;
use crate::hal::{Concentrator, HalResult, RxPacket, ScanStatus, TxPacket, TxStatus};

#[derive(Default)]
struct Shared {
    counter: AtomicU32,
    pps_counter: AtomicU32,
    refuse_send: AtomicBool,
    rx_fifo: Mutex<VecDeque<RxPacket>>,
    sent: Mutex<Vec<TxPacket>>,
    scan: Mutex<ScanState>,
}

#[derive(Default)]
struct ScanState {
    status: Option<ScanStatus>,
    freq_hz: u32,
    nb_scan: u16,
}

/// Test-side handle onto a [`MockConcentrator`].
///
/// The handle stays valid after the concentrator has been boxed and moved
/// behind the radio mutex.
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockHandle {
    /// Scripts one frame into the RX FIFO.
    pub fn push_rx(&self, pkt: RxPacket) {
        self.shared.rx_fifo.lock().unwrap().push_back(pkt);
    }

    /// Returns a copy of every packet handed to `send` so far.
    pub fn sent(&self) -> Vec<TxPacket> {
        self.shared.sent.lock().unwrap().clone()
    }

    /// Sets the free-running counter (manual clock only).
    pub fn set_counter(&self, count_us: u32) {
        self.shared.counter.store(count_us, Ordering::SeqCst);
    }

    /// Advances the free-running counter (manual clock only).
    pub fn advance(&self, us: u32) {
        self.shared.counter.fetch_add(us, Ordering::SeqCst);
    }

    /// Sets the counter value latched at the last PPS edge.
    pub fn set_pps_counter(&self, count_us: u32) {
        self.shared.pps_counter.store(count_us, Ordering::SeqCst);
    }

    /// Makes every subsequent `send` fail.
    pub fn refuse_send(&self, refuse: bool) {
        self.shared.refuse_send.store(refuse, Ordering::SeqCst);
    }
}

/// In-memory concentrator. See the module documentation.
pub struct MockConcentrator {
    started: bool,
    wall_clock: Option<Instant>,
    eui: u64,
    shared: Arc<Shared>,
}

impl MockConcentrator {
    /// Creates a mock with a manually driven counter starting at zero.
    pub fn new() -> Self {
        MockConcentrator {
            started: false,
            wall_clock: None,
            eui: 0xAA55_5A05_0000_0101,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Creates a mock whose counter follows wall time, for running the
    /// daemon without hardware.
    pub fn wall_clock() -> Self {
        MockConcentrator {
            wall_clock: Some(Instant::now()),
            ..Self::new()
        }
    }

    /// Returns a handle for scripting and inspection.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn now(&self) -> u32 {
        match self.wall_clock {
            Some(origin) => origin.elapsed().as_micros() as u32,
            None => self.shared.counter.load(Ordering::SeqCst),
        }
    }
}

impl Default for MockConcentrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Concentrator for MockConcentrator {
    fn start(&mut self) -> HalResult<()> {
        if self.started {
            return Err(FwdError::Hal("concentrator already started".into()));
        }
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> HalResult<()> {
        self.started = false;
        Ok(())
    }

    fn receive(&mut self, max: usize) -> HalResult<Vec<RxPacket>> {
        if !self.started {
            return Err(FwdError::Hal("concentrator not started".into()));
        }
        let mut fifo = self.shared.rx_fifo.lock().unwrap();
        let n = max.min(fifo.len());
        Ok(fifo.drain(..n).collect())
    }

    fn send(&mut self, pkt: &TxPacket) -> HalResult<()> {
        if !self.started {
            return Err(FwdError::Hal("concentrator not started".into()));
        }
        if self.shared.refuse_send.load(Ordering::SeqCst) {
            return Err(FwdError::Hal("TX rejected".into()));
        }
        self.shared.sent.lock().unwrap().push(pkt.clone());
        Ok(())
    }

    fn tx_status(&mut self, _rf_chain: u8) -> HalResult<TxStatus> {
        if !self.started {
            return Ok(TxStatus::Off);
        }
        Ok(TxStatus::Free)
    }

    fn instcnt(&mut self) -> HalResult<u32> {
        Ok(self.now())
    }

    fn trigcnt(&mut self) -> HalResult<u32> {
        Ok(self.shared.pps_counter.load(Ordering::SeqCst))
    }

    fn eui(&mut self) -> HalResult<u64> {
        Ok(self.eui)
    }

    fn temperature(&mut self) -> HalResult<f32> {
        Ok(25.0)
    }

    fn spectral_scan_start(&mut self, freq_hz: u32, nb_scan: u16) -> HalResult<()> {
        let mut scan = self.shared.scan.lock().unwrap();
        if scan.status == Some(ScanStatus::OnGoing) {
            return Err(FwdError::Hal("spectral scan already in progress".into()));
        }
        *scan = ScanState {
            status: Some(ScanStatus::OnGoing),
            freq_hz,
            nb_scan,
        };
        Ok(())
    }

    fn spectral_scan_status(&mut self) -> HalResult<ScanStatus> {
        let mut scan = self.shared.scan.lock().unwrap();
        // The mock scan completes on the first poll after start.
        if scan.status == Some(ScanStatus::OnGoing) {
            scan.status = Some(ScanStatus::Completed);
            return Ok(ScanStatus::OnGoing);
        }
        Ok(scan.status.unwrap_or(ScanStatus::None))
    }

    fn spectral_scan_results(&mut self) -> HalResult<Vec<(i16, u16)>> {
        let scan = self.shared.scan.lock().unwrap();
        if scan.status != Some(ScanStatus::Completed) {
            return Err(FwdError::Hal("no spectral scan results available".into()));
        }
        // A flat noise floor around -100 dBm, all samples in one bucket.
        Ok(vec![(-100, scan.nb_scan), (-80, 0), (-60, 0)])
    }

    fn spectral_scan_abort(&mut self) -> HalResult<()> {
        let mut scan = self.shared.scan.lock().unwrap();
        scan.status = Some(ScanStatus::Aborted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{Bandwidth, CodingRate, CrcStatus, DataRate, Modulation, SpreadingFactor};

    fn rx_frame() -> RxPacket {
        RxPacket {
            freq_hz: 868_100_000,
            freq_offset: 0,
            if_chain: 0,
            rf_chain: 0,
            modem_id: 0,
            modulation: Modulation::LoRa,
            bandwidth: Bandwidth::BW125,
            datarate: DataRate::Lora(SpreadingFactor::SF7),
            coderate: CodingRate::Cr4_5,
            crc_status: CrcStatus::Ok,
            count_us: 1_000,
            fine_time_ns: None,
            rssi_channel: -80.0,
            rssi_signal: -82.0,
            snr: 9.5,
            payload: vec![0x40, 0x01, 0x02],
        }
    }

    #[test]
    fn test_receive_requires_start() {
        let mut conc = MockConcentrator::new();
        assert!(conc.receive(8).is_err());
        conc.start().unwrap();
        assert!(conc.receive(8).unwrap().is_empty());
    }

    #[test]
    fn test_scripted_rx_drains_in_order() {
        let mut conc = MockConcentrator::new();
        let handle = conc.handle();
        conc.start().unwrap();

        let mut a = rx_frame();
        a.count_us = 10;
        let mut b = rx_frame();
        b.count_us = 20;
        handle.push_rx(a);
        handle.push_rx(b);

        let got = conc.receive(1).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].count_us, 10);
        let got = conc.receive(8).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].count_us, 20);
    }

    #[test]
    fn test_send_recorded_and_refusable() {
        let mut conc = MockConcentrator::new();
        let handle = conc.handle();
        conc.start().unwrap();

        let pkt = TxPacket {
            tx_mode: crate::hal::TxMode::Immediate,
            count_us: 0,
            rf_chain: 0,
            freq_hz: 869_525_000,
            rf_power: 14,
            modulation: Modulation::LoRa,
            bandwidth: Bandwidth::BW125,
            datarate: DataRate::Lora(SpreadingFactor::SF9),
            coderate: CodingRate::Cr4_5,
            invert_pol: true,
            fdev_khz: 0,
            preamble: 8,
            no_crc: false,
            no_header: false,
            payload: vec![0xAA],
        };
        conc.send(&pkt).unwrap();
        assert_eq!(handle.sent().len(), 1);

        handle.refuse_send(true);
        assert!(conc.send(&pkt).is_err());
        assert_eq!(handle.sent().len(), 1);
    }

    #[test]
    fn test_scan_lifecycle() {
        let mut conc = MockConcentrator::new();
        conc.start().unwrap();
        conc.spectral_scan_start(867_100_000, 2000).unwrap();
        assert_eq!(conc.spectral_scan_status().unwrap(), ScanStatus::OnGoing);
        assert_eq!(conc.spectral_scan_status().unwrap(), ScanStatus::Completed);
        let results = conc.spectral_scan_results().unwrap();
        assert_eq!(results[0].1, 2000);
    }
}
