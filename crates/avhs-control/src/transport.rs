//! Connection manager for one switcher.
//!
//! A single task owns every handle (TCP control socket, UDP companion
//! socket, multicast listener, keepalive timer) and the tally store. Callers
//! talk to it through a cloneable [`Switcher`] handle; reader tasks hand it
//! decoded packets over a channel, so all state changes happen in one place
//! and in arrival order per stream.
//!
//! Every (re)configure and teardown bumps a generation counter. Messages from
//! reader or connect tasks of an older generation are discarded, so nothing
//! started before a teardown can touch state after it.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use avhs_protocol::commands::Dispatcher;
use avhs_protocol::error::DecodeError;
use avhs_protocol::framing::{encode, encode_into, Framer};
use avhs_protocol::host::{tally_is_selected, variable_values, Action, InstanceStatus};
use avhs_protocol::status::DeviceMessage;
use avhs_protocol::tables::DeviceModelProfile;
use avhs_protocol::tally::TallyState;

use crate::config::{MulticastSettings, Settings, SwitcherConfig};
use crate::error::{SwitcherError, TransportError};
use crate::multicast;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const CONTROL_QUEUE: usize = 64;
const INBOUND_QUEUE: usize = 256;
const WRITE_QUEUE: usize = 64;

/// Which stream a packet arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Tcp,
    Multicast,
}

/// Requests from [`Switcher`] handles.
#[derive(Debug)]
enum Control {
    Configure(Box<SwitcherConfig>),
    Teardown,
    Action(Action),
    Send(String),
    SendUdp(String),
    Shutdown,
}

/// Messages from tasks spawned by the connection.
#[derive(Debug)]
pub(crate) enum Inbound {
    Connected {
        generation: u64,
        result: Result<TcpStream, TransportError>,
    },
    Packets {
        generation: u64,
        source: Source,
        packets: Vec<String>,
    },
    Closed {
        generation: u64,
        error: TransportError,
    },
}

impl Inbound {
    fn generation(&self) -> u64 {
        match self {
            Self::Connected { generation, .. }
            | Self::Packets { generation, .. }
            | Self::Closed { generation, .. } => *generation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

/// Tally as seen by the host: the store plus whether it is live.
#[derive(Debug, Clone, Default)]
pub struct TallySnapshot {
    pub profile: Option<&'static DeviceModelProfile>,
    /// Multicast listener is running
    pub multicast: bool,
    pub state: TallyState,
}

impl TallySnapshot {
    /// `XptTally` feedback.
    pub fn is_selected(&self, bus: &str, input: &str) -> bool {
        match self.profile {
            Some(profile) => tally_is_selected(profile, &self.state, bus, input),
            None => false,
        }
    }

    /// Variable values in definition order.
    pub fn variables(&self) -> Vec<(&'static str, String)> {
        match self.profile {
            Some(profile) => variable_values(profile, self.multicast, &self.state),
            None => Vec::new(),
        }
    }
}

/// Handle to a running connection task.
#[derive(Clone)]
pub struct Switcher {
    control: mpsc::Sender<Control>,
    status: watch::Receiver<InstanceStatus>,
    tally: watch::Receiver<TallySnapshot>,
}

impl Switcher {
    /// Start the connection task in the Disconnected state.
    ///
    /// `interfaces` is the host's list of local IPv4 addresses a multicast
    /// interface must be chosen from; empty disables the check.
    pub fn spawn(interfaces: Vec<Ipv4Addr>) -> (Self, JoinHandle<()>) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let (status_tx, status_rx) = watch::channel(InstanceStatus::Disconnected);
        let (tally_tx, tally_rx) = watch::channel(TallySnapshot::default());

        let connection = Connection {
            interfaces,
            generation: 0,
            phase: Phase::Disconnected,
            settings: None,
            writer: None,
            udp: None,
            keepalive: None,
            tasks: Vec::new(),
            tally: TallyState::new(),
            multicast_active: false,
            send_buf: Vec::with_capacity(64),
            inbound_tx,
            status_tx,
            tally_tx,
        };
        let handle = tokio::spawn(connection.run(control_rx, inbound_rx));

        let switcher = Self {
            control: control_tx,
            status: status_rx,
            tally: tally_rx,
        };
        (switcher, handle)
    }

    async fn request(&self, control: Control) -> Result<(), SwitcherError> {
        self.control
            .send(control)
            .await
            .map_err(|_| SwitcherError::Stopped)
    }

    /// Tear down any existing connection and connect with `config`.
    pub async fn configure(&self, config: SwitcherConfig) -> Result<(), SwitcherError> {
        self.request(Control::Configure(Box::new(config))).await
    }

    pub async fn teardown(&self) -> Result<(), SwitcherError> {
        self.request(Control::Teardown).await
    }

    /// Queue an action after checking its codes against the active model.
    pub async fn dispatch(&self, action: Action) -> Result<(), SwitcherError> {
        let profile = self.profile().ok_or(SwitcherError::NotConfigured)?;
        action.to_command(&Dispatcher::new(profile))?;
        self.request(Control::Action(action)).await
    }

    /// Send a raw command payload over TCP.
    pub async fn send_command(&self, command: impl Into<String>) -> Result<(), SwitcherError> {
        self.request(Control::Send(command.into())).await
    }

    /// Send a raw command payload over the UDP companion socket.
    pub async fn send_udp_command(&self, command: impl Into<String>) -> Result<(), SwitcherError> {
        self.request(Control::SendUdp(command.into())).await
    }

    /// Tear down and stop the task.
    pub async fn shutdown(&self) -> Result<(), SwitcherError> {
        self.request(Control::Shutdown).await
    }

    pub fn status(&self) -> InstanceStatus {
        self.status.borrow().clone()
    }

    pub fn tally(&self) -> TallySnapshot {
        self.tally.borrow().clone()
    }

    pub fn profile(&self) -> Option<&'static DeviceModelProfile> {
        self.tally.borrow().profile
    }

    pub fn status_receiver(&self) -> watch::Receiver<InstanceStatus> {
        self.status.clone()
    }

    pub fn tally_receiver(&self) -> watch::Receiver<TallySnapshot> {
        self.tally.clone()
    }
}

enum Event {
    Control(Option<Control>),
    Inbound(Inbound),
    Keepalive,
}

struct Connection {
    interfaces: Vec<Ipv4Addr>,
    generation: u64,
    phase: Phase,
    settings: Option<Settings>,
    /// Framed commands for the TCP writer task
    writer: Option<mpsc::Sender<Vec<u8>>>,
    udp: Option<UdpSocket>,
    keepalive: Option<Interval>,
    /// Connect, TCP reader/writer and multicast listener tasks of this generation
    tasks: Vec<JoinHandle<()>>,
    tally: TallyState,
    multicast_active: bool,
    send_buf: Vec<u8>,
    inbound_tx: mpsc::Sender<Inbound>,
    status_tx: watch::Sender<InstanceStatus>,
    tally_tx: watch::Sender<TallySnapshot>,
}

async fn next_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Connection {
    async fn run(
        mut self,
        mut control_rx: mpsc::Receiver<Control>,
        mut inbound_rx: mpsc::Receiver<Inbound>,
    ) {
        loop {
            let event = tokio::select! {
                control = control_rx.recv() => Event::Control(control),
                Some(inbound) = inbound_rx.recv() => Event::Inbound(inbound),
                _ = next_tick(&mut self.keepalive) => Event::Keepalive,
            };

            match event {
                Event::Control(None) | Event::Control(Some(Control::Shutdown)) => {
                    self.teardown();
                    info!("Switcher connection stopped");
                    return;
                }
                Event::Control(Some(control)) => self.handle_control(control).await,
                Event::Inbound(inbound) => self.handle_inbound(inbound),
                Event::Keepalive => self.send_keepalive(),
            }
        }
    }

    async fn handle_control(&mut self, control: Control) {
        match control {
            Control::Configure(config) => self.configure(&config).await,
            Control::Teardown => {
                self.teardown();
                self.set_status(InstanceStatus::Disconnected);
            }
            Control::Action(action) => {
                let Some(settings) = &self.settings else {
                    warn!(?action, "Action ignored, no device configured");
                    return;
                };
                match action.to_command(&Dispatcher::new(settings.profile)) {
                    Ok(command) => self.send(&command),
                    Err(e) => warn!("Action rejected: {}", e),
                }
            }
            Control::Send(command) => self.send(&command),
            Control::SendUdp(command) => self.send_udp(&command).await,
            // Handled in the run loop
            Control::Shutdown => {}
        }
    }

    /// Close every handle and cancel every task. Safe to call repeatedly.
    fn teardown(&mut self) {
        // Timer first so no tick can land on a half-closed socket.
        if self.keepalive.take().is_some() {
            debug!("Keepalive timer cancelled");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.writer = None;
        self.udp = None;
        self.multicast_active = false;
        self.generation += 1;

        if self.phase != Phase::Disconnected {
            debug!(generation = self.generation, "Connection torn down");
        }
        self.phase = Phase::Disconnected;
    }

    async fn configure(&mut self, config: &SwitcherConfig) {
        self.teardown();
        self.tally.reset();

        let settings = match config.validate(&self.interfaces) {
            Ok(settings) => settings,
            Err(e) => {
                error!("Invalid configuration: {}", e);
                self.settings = None;
                self.phase = Phase::Faulted;
                self.publish_tally();
                self.set_status(InstanceStatus::BadConfig(e.to_string()));
                return;
            }
        };

        let addr = SocketAddr::new(settings.host, settings.port);
        info!(
            model = settings.profile.name,
            device = %addr,
            multicast = settings.multicast.is_some(),
            "Connecting to switcher"
        );

        self.phase = Phase::Connecting;
        self.set_status(InstanceStatus::Connecting);

        self.udp = match open_udp(addr).await {
            Ok(socket) => Some(socket),
            Err(e) => {
                debug!("UDP network error: {}", e);
                None
            }
        };

        if let Some(multicast) = &settings.multicast {
            self.start_multicast(multicast);
        }

        let generation = self.generation;
        let tx = self.inbound_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let result = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(source)) => Err(TransportError::Connect { addr, source }),
                Err(_) => Err(TransportError::ConnectTimeout(addr)),
            };
            let _ = tx.send(Inbound::Connected { generation, result }).await;
        }));

        self.settings = Some(settings);
        self.publish_tally();
    }

    fn start_multicast(&mut self, settings: &MulticastSettings) {
        match multicast::create_multicast_listener(settings) {
            Ok(socket) => {
                info!(
                    group = %settings.group,
                    port = settings.port,
                    interface = %settings.interface,
                    "Multicast tally is enabled"
                );
                let generation = self.generation;
                let tx = self.inbound_tx.clone();
                self.tasks
                    .push(tokio::spawn(multicast::listen(socket, generation, tx)));
                self.multicast_active = true;
            }
            Err(e) => {
                warn!(
                    group = %e.group,
                    port = e.port,
                    interface = %e.interface,
                    "Error listening for multicast tally: {}",
                    e.source
                );
                if e.is_address_conflict() {
                    error!("Multicast error: only one instance per AV-HS410 can receive tally on this machine");
                }
            }
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        if inbound.generation() != self.generation {
            debug!(
                stale = inbound.generation(),
                current = self.generation,
                "Dropped message from a previous connection"
            );
            return;
        }

        match inbound {
            Inbound::Connected { result, .. } => match result {
                Ok(stream) => self.on_connected(stream),
                Err(e) => self.fault(e),
            },
            Inbound::Packets {
                source, packets, ..
            } => self.on_packets(source, &packets),
            Inbound::Closed { error, .. } => self.fault(error),
        }
    }

    fn on_connected(&mut self, stream: TcpStream) {
        let Some(settings) = &self.settings else {
            return;
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();

        let generation = self.generation;
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE);
        self.tasks.push(tokio::spawn(read_loop(
            reader,
            generation,
            self.inbound_tx.clone(),
        )));
        self.tasks.push(tokio::spawn(write_loop(
            writer,
            write_rx,
            generation,
            self.inbound_tx.clone(),
        )));
        self.writer = Some(write_tx);

        if let Some(period) = settings.profile.keepalive {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.keepalive = Some(interval);
        }

        self.phase = Phase::Connected;
        info!(device = ?peer, "Switcher connected");
        self.set_status(InstanceStatus::Ok);
    }

    /// Drop the control connection after a socket error.
    ///
    /// Write failures report UnknownError, everything else BadConfig. The
    /// multicast listener is independent of the control socket and keeps
    /// running. There is no automatic reconnect.
    fn fault(&mut self, error: TransportError) {
        if self.phase == Phase::Faulted {
            debug!("Further network error after fault: {}", error);
            return;
        }
        error!("Network error: {}", error);
        self.keepalive = None;
        self.writer = None;
        self.phase = Phase::Faulted;
        let status = match error {
            TransportError::Send(_) => InstanceStatus::UnknownError(error.to_string()),
            _ => InstanceStatus::BadConfig(error.to_string()),
        };
        self.set_status(status);
    }

    fn on_packets(&mut self, source: Source, packets: &[String]) {
        let Some(settings) = &self.settings else {
            return;
        };
        let profile = settings.profile;
        let mut changed = false;

        for packet in packets {
            debug!(?source, packet = %packet, "Received");
            let result = DeviceMessage::parse(packet)
                .and_then(|message| self.tally.apply(profile, &message));
            match result {
                Ok(Some(field)) => {
                    debug!(?field, label = self.tally.read(field), "Tally changed");
                    changed = true;
                }
                Ok(None) => {}
                Err(DecodeError::StatusUnsupported { model }) => {
                    debug!(model, "Ignoring status from a model without tally support");
                }
                Err(e) => warn!(?source, packet = %packet, "Decode error: {}", e),
            }
        }

        if changed {
            self.publish_tally();
        }
    }

    /// Queue a command for the writer task. Never waits on the socket.
    fn send(&mut self, command: &str) {
        let Some(writer) = &self.writer else {
            debug!(command, "Socket not connected");
            self.set_status(InstanceStatus::UnknownError(
                TransportError::NotConnected.to_string(),
            ));
            return;
        };

        match writer.try_send(encode(command)) {
            Ok(()) => debug!(command, "Queued command"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(command, "Send queue full, command dropped");
                self.set_status(InstanceStatus::UnknownError(
                    TransportError::QueueFull.to_string(),
                ));
            }
            // Writer hit an error; its Closed message is on the way.
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(command, "Writer stopped, command dropped");
            }
        }
    }

    async fn send_udp(&mut self, command: &str) {
        let Some(udp) = &self.udp else {
            debug!(command, "UDP socket not open");
            return;
        };
        encode_into(&mut self.send_buf, command);
        if let Err(e) = udp.send(&self.send_buf).await {
            debug!(command, "UDP send failed: {}", e);
        }
    }

    fn send_keepalive(&mut self) {
        if self.phase != Phase::Connected {
            return;
        }
        let Some(command) = self
            .settings
            .as_ref()
            .and_then(|s| Dispatcher::new(s.profile).keepalive())
        else {
            return;
        };
        self.send(command);
    }

    fn set_status(&self, status: InstanceStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            info!(?status, "Status changed");
            *current = status;
            true
        });
    }

    fn publish_tally(&self) {
        self.tally_tx.send_replace(TallySnapshot {
            profile: self.settings.as_ref().map(|s| s.profile),
            multicast: self.multicast_active,
            state: self.tally.clone(),
        });
    }
}

async fn open_udp(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let local = match addr {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

async fn read_loop(mut reader: OwnedReadHalf, generation: u64, tx: mpsc::Sender<Inbound>) {
    let mut buf = [0u8; 1500];
    let mut framer = Framer::new();

    let error = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break TransportError::ClosedByPeer,
            Ok(len) => {
                let frames = framer.feed(&buf[..len]);
                if frames.malformed > 0 {
                    debug!(dropped = frames.malformed, "Dropped malformed TCP spans");
                }
                if frames.overflowed > 0 {
                    warn!(bytes = frames.overflowed, "TCP buffer overflow, discarded pending bytes");
                }
                if frames.packets.is_empty() {
                    continue;
                }
                let inbound = Inbound::Packets {
                    generation,
                    source: Source::Tcp,
                    packets: frames.packets,
                };
                if tx.send(inbound).await.is_err() {
                    return;
                }
            }
            Err(e) => break TransportError::Receive(e),
        }
    };

    let _ = tx.send(Inbound::Closed { generation, error }).await;
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Vec<u8>>,
    generation: u64,
    tx: mpsc::Sender<Inbound>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            let error = TransportError::Send(e);
            let _ = tx.send(Inbound::Closed { generation, error }).await;
            return;
        }
    }
}
