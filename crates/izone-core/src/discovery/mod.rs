// ── Discovery service ──
//
// Finds controllers on the local network and keeps them current. One
// UDP socket receives announcements and change notifications; a scan
// loop broadcasts the discovery beacon and retries disconnected
// controllers. Controllers become visible only after their first full
// fetch succeeds.

mod socket;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{Notify, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use izone_api::datagram::DISCOVERY_BEACON;
use izone_api::{Announcement, Datagram, TransportConfig};

use crate::config::DiscoveryConfig;
use crate::controller::{Controller, Session};
use crate::error::CoreError;
use crate::listener::{Dispatch, DiscoveryEvent, Listener, ListenerSet, Notifier, dispatch_task};
use crate::sync::{lock, read, write};

const EVENT_CHANNEL_SIZE: usize = 256;

/// Largest datagram the firmware sends is well under this.
const RECEIVE_BUFFER: usize = 1500;

// ── DiscoveryService ─────────────────────────────────────────────

/// A discovery session.
///
/// Cheaply cloneable. Call [`start`](Self::start) to bind the socket and
/// begin scanning, and [`close`](Self::close) to stop every background
/// task. After `close` returns no further notifications are delivered.
#[derive(Clone)]
pub struct DiscoveryService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: DiscoveryConfig,
    session: Arc<Session>,
    listeners: ListenerSet,
    events: broadcast::Sender<DiscoveryEvent>,
    dispatch_rx: Mutex<Option<mpsc::UnboundedReceiver<Dispatch>>>,
    /// Initialized controllers by device uid.
    registry: RwLock<HashMap<String, Controller>>,
    /// Device uids announced but still initializing.
    pending: Mutex<HashSet<String>>,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    local_addr: RwLock<Option<SocketAddr>>,
    rescan: Notify,
    started: AtomicBool,
    closed: AtomicBool,
    task_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    dispatcher: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Which document a change notification refers to.
#[derive(Debug, Clone, Copy)]
enum Change {
    System,
    Zones,
}

impl DiscoveryService {
    /// Create a session. Nothing touches the network until
    /// [`start`](Self::start).
    pub fn new(config: DiscoveryConfig) -> Result<Self, CoreError> {
        let http = TransportConfig::default()
            .with_timeout(config.request_timeout)
            .build_client()?;
        let (notifier, dispatch_rx) = Notifier::channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let session = Arc::new(Session {
            http,
            http_port: config.http_port,
            request_timeout: config.request_timeout,
            reconnect_cooldown: config.reconnect_cooldown,
            poll_interval: config.poll_interval,
            notifier,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                session,
                listeners: Arc::new(RwLock::new(Vec::new())),
                events,
                dispatch_rx: Mutex::new(Some(dispatch_rx)),
                registry: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashSet::new()),
                socket: RwLock::new(None),
                local_addr: RwLock::new(None),
                rescan: Notify::new(),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                task_handles: tokio::sync::Mutex::new(Vec::new()),
                dispatcher: tokio::sync::Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Bind the socket and spawn the receive, scan, and dispatch tasks.
    ///
    /// Starting a running session is a no-op; starting a closed one
    /// fails with [`CoreError::Closed`].
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::Closed);
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let socket = match socket::bind(self.inner.config.listen_port) {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                self.inner.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let local_addr = socket.local_addr().ok();
        *write(&self.inner.local_addr) = local_addr;
        *write(&self.inner.socket) = Some(Arc::clone(&socket));

        if let Some(rx) = lock(&self.inner.dispatch_rx).take() {
            let handle = tokio::spawn(dispatch_task(
                rx,
                Arc::clone(&self.inner.listeners),
                self.inner.events.clone(),
            ));
            *self.inner.dispatcher.lock().await = Some(handle);
            self.inner.session.notifier.activate();
        }

        let cancel = self.inner.session.cancel.clone();
        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(receive_task(
            self.clone(),
            Arc::clone(&socket),
            cancel.clone(),
        )));
        handles.push(tokio::spawn(scan_task(self.clone(), socket, cancel)));

        info!(
            local_addr = ?local_addr,
            discovery_port = self.inner.config.discovery_port,
            "discovery started"
        );
        Ok(())
    }

    /// Broadcast a beacon now instead of waiting for the next scan.
    pub fn rescan(&self) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::Closed);
        }
        self.inner.rescan.notify_one();
        Ok(())
    }

    /// Stop everything. Idempotent.
    ///
    /// Scanning and receiving stop first. In-flight initializations and
    /// refreshes then run to completion or time out; a controller whose
    /// initialization finishes after this point is not registered.
    /// Queued notifications are delivered and the registry is emptied.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing discovery service");
        self.inner.session.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        write(&self.inner.socket).take();

        let tracker = &self.inner.session.tracker;
        tracker.close();
        tracker.wait().await;

        self.inner.session.notifier.shutdown();
        lock(&self.inner.dispatch_rx).take();
        if let Some(handle) = self.inner.dispatcher.lock().await.take() {
            let _ = handle.await;
        }
        write(&self.inner.registry).clear();
        info!("discovery closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Address the listening socket is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *read(&self.inner.local_addr)
    }

    // ── Observers ────────────────────────────────────────────────

    /// Register a listener. Controllers already known are announced to
    /// it as discovered.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        write(&self.inner.listeners).push(Arc::clone(&listener));
        let controllers = self.controllers();
        if !controllers.is_empty() {
            self.inner.session.notifier.replay(listener, controllers);
        }
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) -> bool {
        let mut listeners = write(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Subscribe to every notification as a stream.
    pub fn events(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.inner.events.subscribe()
    }

    // ── Registry ─────────────────────────────────────────────────

    /// Initialized controllers, ordered by device uid.
    pub fn controllers(&self) -> Vec<Controller> {
        let mut controllers: Vec<Controller> = read(&self.inner.registry).values().cloned().collect();
        controllers.sort_by(|a, b| a.device_uid().cmp(b.device_uid()));
        controllers
    }

    pub fn controller(&self, device_uid: &str) -> Option<Controller> {
        read(&self.inner.registry).get(device_uid).cloned()
    }

    /// Wait until a controller (a specific one, or any) is registered.
    pub async fn wait_for_controller(
        &self,
        device_uid: Option<&str>,
        timeout: Duration,
    ) -> Result<Controller, CoreError> {
        let mut events = self.events();
        let find = || match device_uid {
            Some(uid) => self.controller(uid),
            None => self.controllers().into_iter().next(),
        };

        let wait = async {
            loop {
                if let Some(controller) = find() {
                    return Ok(controller);
                }
                match events.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return Err(CoreError::Closed),
                }
                if self.is_closed() {
                    return Err(CoreError::Closed);
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or_else(|_| {
                Err(CoreError::NotFound {
                    device_uid: device_uid.map(str::to_owned),
                    timeout_secs: timeout.as_secs(),
                })
            })
    }

    fn controller_at(&self, ip: &str) -> Option<Controller> {
        read(&self.inner.registry)
            .values()
            .find(|c| c.device_ip() == ip)
            .cloned()
    }

    // ── Datagram handling ────────────────────────────────────────

    fn handle_datagram(&self, data: &[u8], source: SocketAddr) {
        match Datagram::parse(data) {
            Ok(Datagram::Beacon) => trace!(%source, "beacon echoed"),
            Ok(Datagram::SchedulesChanged) => trace!(%source, "schedule change ignored"),
            Ok(Datagram::SystemChanged) => self.on_change(source, Change::System),
            Ok(Datagram::ZonesChanged) => self.on_change(source, Change::Zones),
            Ok(Datagram::Announcement(announcement)) => self.on_announcement(announcement),
            Err(e) if e.is_foreign() => debug!(%source, error = %e, "datagram from another product"),
            Err(e) => warn!(%source, error = %e, "malformed datagram"),
        }
    }

    fn on_change(&self, source: SocketAddr, change: Change) {
        let Some(controller) = self.controller_at(&source.ip().to_string()) else {
            debug!(%source, ?change, "change notification from unknown controller");
            return;
        };
        trace!(device_uid = controller.device_uid(), ?change, "change notification");

        self.spawn_tracked(async move {
            let result = if controller.is_connected() {
                match change {
                    Change::System => controller.refresh_system(true).await,
                    Change::Zones => controller.refresh_zones(true).await,
                }
            } else {
                controller.reconnect(false).await.map(|_| ())
            };
            if let Err(e) = result {
                debug!(device_uid = controller.device_uid(), error = %e, "refresh after change notification failed");
            }
        });
    }

    fn on_announcement(&self, announcement: Announcement) {
        if let Some(controller) = self.controller(&announcement.device_uid) {
            controller.update_address(&announcement.address);
            if !controller.is_connected() {
                self.spawn_tracked(async move {
                    if let Err(e) = controller.reconnect(true).await {
                        debug!(device_uid = controller.device_uid(), error = %e, "reconnect after announcement failed");
                    }
                });
            }
            return;
        }

        if !lock(&self.inner.pending).insert(announcement.device_uid.clone()) {
            trace!(device_uid = %announcement.device_uid, "already initializing");
            return;
        }
        debug!(
            device_uid = %announcement.device_uid,
            address = %announcement.address,
            "new controller announced"
        );
        let service = self.clone();
        self.spawn_tracked(async move { service.add_controller(announcement).await });
    }

    async fn add_controller(&self, announcement: Announcement) {
        let Announcement {
            device_uid,
            address,
        } = announcement;

        let _pending = PendingEntry {
            pending: &self.inner.pending,
            device_uid: &device_uid,
        };

        let result = match Controller::new(
            device_uid.clone(),
            address.clone(),
            Arc::clone(&self.inner.session),
        ) {
            Ok(controller) => controller.initialize().await.map(|()| controller),
            Err(e) => Err(e),
        };

        match result {
            Ok(controller) if !self.is_closed() => {
                write(&self.inner.registry).insert(device_uid.clone(), controller.clone());
                info!(device_uid = %device_uid, address = %address, zones = controller.zone_count(), "controller discovered");
                self.inner
                    .session
                    .notifier
                    .notify(DiscoveryEvent::ControllerDiscovered(controller));
            }
            Ok(_) => debug!(device_uid = %device_uid, "initialized after close, dropped"),
            Err(e) => {
                warn!(device_uid = %device_uid, address = %address, error = %e, "controller initialization failed");
            }
        }
    }

    /// Reconnection attempts for every disconnected controller; the
    /// per-controller cool-down decides which actually go out.
    fn reconnect_disconnected(&self) {
        for controller in self.controllers() {
            if controller.is_connected() {
                continue;
            }
            self.spawn_tracked(async move {
                if let Err(e) = controller.reconnect(false).await {
                    debug!(device_uid = controller.device_uid(), error = %e, "reconnect attempt failed");
                }
            });
        }
    }

    async fn send_beacons(&self, socket: &UdpSocket) {
        let config = &self.inner.config;
        for ip in socket::broadcast_targets(config.broadcast_addresses.as_deref()) {
            let target = SocketAddrV4::new(ip, config.discovery_port);
            match socket.send_to(DISCOVERY_BEACON, target).await {
                Ok(_) => trace!(%target, "beacon sent"),
                Err(e) => debug!(%target, error = %e, "beacon send failed"),
            }
        }
    }

    /// Spawn session work that [`close`](Self::close) waits for. Every
    /// request inside is bounded by the request timeout.
    fn spawn_tracked<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return;
        }
        self.inner.session.tracker.spawn(task);
    }

    fn any_disconnected(&self) -> bool {
        read(&self.inner.registry).values().any(|c| !c.is_connected())
    }
}

/// Removes a uid from the pending set however initialization ends,
/// including by panic.
struct PendingEntry<'a> {
    pending: &'a Mutex<HashSet<String>>,
    device_uid: &'a str,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(self.device_uid);
    }
}

impl std::fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("local_addr", &self.local_addr())
            .field("controllers", &read(&self.inner.registry).len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn receive_task(service: DiscoveryService, socket: Arc<UdpSocket>, cancel: CancellationToken) {
    let mut buffer = vec![0u8; RECEIVE_BUFFER];
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = socket.recv_from(&mut buffer) => match received {
                Ok((len, source)) => service.handle_datagram(&buffer[..len], source),
                Err(e) => warn!(error = %e, "UDP receive failed"),
            }
        }
    }
}

/// Beacon, retry the disconnected, then sleep. The interval shortens
/// while any controller is disconnected.
async fn scan_task(service: DiscoveryService, socket: Arc<UdpSocket>, cancel: CancellationToken) {
    loop {
        service.send_beacons(&socket).await;
        service.reconnect_disconnected();

        let config = &service.inner.config;
        let period = if service.any_disconnected() {
            config.degraded_scan_interval
        } else {
            config.idle_scan_interval
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = service.inner.rescan.notified() => trace!("rescan requested"),
            () = tokio::time::sleep(period) => {}
        }
    }
}
