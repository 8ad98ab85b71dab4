//! # Forwarder Activities
//!
//! The six long-running activities of the gateway and the shared state they
//! cooperate through. Everything mutable lives in one [`GatewayContext`]:
//! the radio behind its mutex, one JIT queue per RF chain, the GPS time
//! reference, the XTAL correction, and the statistics buckets. Activities
//! poll the shutdown flags at every loop boundary.

pub mod dispatch;
pub mod downstream;
pub mod gps_reader;
pub mod report;
pub mod spectral;
pub mod upstream;
pub mod validator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::Mutex as AsyncMutex;

use crate::beacon::BeaconPlan;
use crate::config::Config;
use crate::constants::NB_RF_CHAINS;
use crate::error::FwdError;
use crate::hal::Concentrator;
use crate::jit::JitQueue;
use crate::stats::{DownstreamStats, ReportBuffer, UpstreamStats};
use crate::time::{TimeRef, XtalFilter};

/// Two-level shutdown request shared by every activity.
///
/// *exit* drains in-flight work and stops the hardware; *quit* drops
/// everything immediately and leaves the hardware untouched.
#[derive(Debug, Default)]
pub struct Flags {
    exit: AtomicBool,
    quit: AtomicBool,
}

impl Flags {
    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::SeqCst);
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn exiting(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    pub fn quitting(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// True when any shutdown level has been requested.
    pub fn stopping(&self) -> bool {
        self.exiting() || self.quitting()
    }
}

/// Gateway coordinates, from live fixes or from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coords {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: i32,
}

/// Shared state of the running gateway.
pub struct GatewayContext {
    pub config: Config,
    /// Gateway EUI used in every datagram header
    pub eui: u64,
    /// Beacon plan, when beaconing is enabled
    pub beacon_plan: Option<BeaconPlan>,
    /// The concentrator, serialized behind one mutex. Held only for the
    /// duration of a HAL call, never across network I/O.
    pub radio: AsyncMutex<Box<dyn Concentrator>>,
    /// One JIT queue per RF chain
    pub jit: Vec<Mutex<JitQueue>>,
    /// GPS time reference, rebuilt on every PPS
    pub time_ref: Mutex<Option<TimeRef>>,
    /// Freshness verdict of the validator loop
    pub gps_ref_valid: AtomicBool,
    /// Last known gateway position
    pub coords: Mutex<Option<Coords>>,
    /// XTAL correction applied to beacon carriers
    pub xtal: Mutex<XtalFilter>,
    pub up_stats: Mutex<UpstreamStats>,
    pub down_stats: Mutex<DownstreamStats>,
    /// Status report handed from the reporter to the upstream pipeline
    pub report: Mutex<ReportBuffer>,
    /// A background spectral scan is running and may need aborting
    pub scan_in_progress: AtomicBool,
    pub flags: Flags,
}

impl GatewayContext {
    pub fn new(config: Config, eui: u64, concentrator: Box<dyn Concentrator>) -> Self {
        let beacon_plan = config.beacon_plan();
        let coords = reference_coords(&config);
        GatewayContext {
            config,
            eui,
            beacon_plan,
            radio: AsyncMutex::new(concentrator),
            jit: (0..NB_RF_CHAINS).map(|_| Mutex::new(JitQueue::new())).collect(),
            time_ref: Mutex::new(None),
            gps_ref_valid: AtomicBool::new(false),
            coords: Mutex::new(coords),
            xtal: Mutex::new(XtalFilter::new()),
            up_stats: Mutex::new(UpstreamStats::default()),
            down_stats: Mutex::new(DownstreamStats::default()),
            report: Mutex::new(ReportBuffer::default()),
            scan_in_progress: AtomicBool::new(false),
            flags: Flags::default(),
        }
    }

    /// Snapshot of the time reference, only while the validator considers
    /// it fresh.
    pub fn valid_time_ref(&self) -> Option<TimeRef> {
        if !self.gps_ref_valid.load(Ordering::SeqCst) {
            return None;
        }
        self.time_ref.lock().unwrap().clone()
    }

    /// Reads the concentrator counter under the radio mutex.
    pub async fn concentrator_now(&self) -> Result<u32, FwdError> {
        self.radio.lock().await.instcnt()
    }

    /// First RF chain allowed to transmit; beacons go out on it.
    pub fn tx_rf_chain(&self) -> Option<u8> {
        (0..NB_RF_CHAINS as u8).find(|&c| {
            self.config.radio(c).map(|r| r.tx_enable).unwrap_or(false)
        })
    }
}

fn reference_coords(config: &Config) -> Option<Coords> {
    match (config.gateway.ref_latitude, config.gateway.ref_longitude) {
        (Some(latitude), Some(longitude)) => Some(Coords {
            latitude,
            longitude,
            altitude: config.gateway.ref_altitude.unwrap_or(0),
        }),
        _ => None,
    }
}

/// Resolves the server address and opens one connected UDP socket.
async fn connect_socket(server: &str, port: u16) -> Result<UdpSocket, FwdError> {
    let mut addrs = tokio::net::lookup_host((server, port))
        .await
        .map_err(|e| FwdError::AddressResolution(format!("{server}:{port}: {e}")))?;
    let addr = addrs
        .next()
        .ok_or_else(|| FwdError::AddressResolution(format!("{server}:{port}: no address")))?;
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(addr).await?;
    Ok(socket)
}

/// Runs the complete forwarder until a shutdown is requested.
///
/// Starts the concentrator, opens both server sockets, spawns the six
/// activities plus the statistics reporter, and joins them. On *exit* the
/// radio is stopped through the HAL; on *quit* the hardware is left as is.
pub async fn run(config: Config, mut concentrator: Box<dyn Concentrator>) -> Result<(), FwdError> {
    concentrator.start()?;
    let eui = match config.gateway_eui()? {
        Some(eui) => eui,
        None => concentrator.eui()?,
    };
    info!("gateway MAC address is {eui:016X}");

    let server = config.gateway.server_address.clone();
    let sock_up = Arc::new(connect_socket(&server, config.gateway.serv_port_up).await?);
    let sock_down = Arc::new(connect_socket(&server, config.gateway.serv_port_down).await?);
    info!(
        "forwarding to {server}, ports {}/{}",
        config.gateway.serv_port_up, config.gateway.serv_port_down
    );

    let ctx = Arc::new(GatewayContext::new(config, eui, concentrator));

    tokio::spawn(signal_task(Arc::clone(&ctx)));

    let tasks = vec![
        tokio::spawn(upstream::run(Arc::clone(&ctx), Arc::clone(&sock_up))),
        tokio::spawn(downstream::run(Arc::clone(&ctx), Arc::clone(&sock_down))),
        tokio::spawn(dispatch::run(Arc::clone(&ctx))),
        tokio::spawn(gps_reader::run(Arc::clone(&ctx))),
        tokio::spawn(validator::run(Arc::clone(&ctx))),
        tokio::spawn(spectral::run(Arc::clone(&ctx))),
        tokio::spawn(report::run(Arc::clone(&ctx))),
    ];

    let mut failure = None;
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("activity failed: {e}");
                failure.get_or_insert(e);
            }
            Err(e) => error!("activity panicked: {e}"),
        }
    }

    for (chain, queue) in ctx.jit.iter().enumerate() {
        let residual = queue.lock().unwrap().len();
        if residual > 0 {
            warn!("dropping {residual} queued transmission(s) on RF chain {chain}");
        }
    }

    if !ctx.flags.quitting() {
        ctx.radio.lock().await.stop()?;
        info!("concentrator stopped");
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Escalating shutdown on SIGINT/SIGTERM: first signal drains, second
/// drops immediately.
async fn signal_task(ctx: Arc<GatewayContext>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut interrupt), Ok(mut terminate)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        error!("cannot install signal handlers");
        return;
    };

    loop {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        if ctx.flags.exiting() {
            warn!("second signal, dropping immediately");
            ctx.flags.request_quit();
            return;
        }
        info!("shutdown requested, draining");
        ctx.flags.request_exit();
    }
}
