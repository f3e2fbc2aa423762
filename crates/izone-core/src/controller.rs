// ── Controller ──
//
// One iZone controller as seen by a discovery session: the cached
// system and zone documents, connection health, and the validated
// write path. Handles are cheap clones; the discovery service owns the
// registry that keeps them alive.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, OnceCell, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use izone_api::IZoneClient;
use izone_api::client::{SYSTEM_SETTINGS, ZONE_GROUP_SIZE, zone_group_resource};
use izone_api::models::ZoneCommand;

use crate::error::CoreError;
use crate::health::{ConnectionState, Health, RefreshGate};
use crate::listener::{DiscoveryEvent, Notifier};
use crate::model::{Fan, RasMode, Settings, SystemMode, ZoneMode, fan_modes_for};
use crate::power::Power;
use crate::sync::{read, write};
use crate::validate::{self, DEFAULT_TEMP_RANGE};
use crate::zone::Zone;

/// Zone-group resources only exist for zones 1 to 12.
pub const MAX_ZONES: usize = 12;

// ── Session ──────────────────────────────────────────────────────

/// Context shared by every controller of one discovery session.
pub(crate) struct Session {
    pub(crate) http: reqwest::Client,
    pub(crate) http_port: u16,
    pub(crate) request_timeout: Duration,
    pub(crate) reconnect_cooldown: Duration,
    pub(crate) poll_interval: Option<Duration>,
    pub(crate) notifier: Notifier,
    pub(crate) cancel: CancellationToken,
    pub(crate) tracker: TaskTracker,
}

// ── Controller ───────────────────────────────────────────────────

/// Handle to one discovered controller.
///
/// Accessors read the cached documents and fail with
/// [`CoreError::Connection`] while the controller is disconnected.
/// Setters validate locally, skip the request when the cached value
/// already matches, then send the command and re-fetch the affected
/// document.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

pub(crate) struct ControllerInner {
    device_uid: String,
    session: Arc<Session>,
    endpoint: RwLock<Endpoint>,
    state: RwLock<ControllerState>,
    health: Health,
    /// Set once the first full fetch succeeded; no disconnect
    /// notifications before that.
    initialised: AtomicBool,
    /// Serializes command + re-fetch sequences.
    command_lock: Mutex<()>,
    reconnect_gate: RefreshGate,
    poll_gate: RefreshGate,
    last_refresh: RwLock<Option<DateTime<Utc>>>,
    power: OnceCell<Power>,
}

struct Endpoint {
    address: String,
    client: IZoneClient,
}

#[derive(Default)]
struct ControllerState {
    system: Settings,
    zones: Vec<Settings>,
    fan_modes: Vec<Fan>,
}

impl Controller {
    pub(crate) fn new(
        device_uid: String,
        address: String,
        session: Arc<Session>,
    ) -> Result<Self, CoreError> {
        let client = IZoneClient::for_host(
            session.http.clone(),
            &address,
            session.http_port,
            session.request_timeout,
        )?;
        let reconnect_gate = RefreshGate::new(session.reconnect_cooldown);
        let poll_gate = RefreshGate::new(session.poll_interval.unwrap_or(Duration::ZERO));

        Ok(Self {
            inner: Arc::new(ControllerInner {
                device_uid,
                session,
                endpoint: RwLock::new(Endpoint { address, client }),
                state: RwLock::new(ControllerState::default()),
                health: Health::new(),
                initialised: AtomicBool::new(false),
                command_lock: Mutex::new(()),
                reconnect_gate,
                poll_gate,
                last_refresh: RwLock::new(None),
                power: OnceCell::new(),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<ControllerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ControllerInner> {
        Arc::downgrade(&self.inner)
    }

    // ── Identity ─────────────────────────────────────────────────

    /// Device identifier; stable across address changes.
    pub fn device_uid(&self) -> &str {
        &self.inner.device_uid
    }

    /// Address the controller was last announced from.
    pub fn device_ip(&self) -> String {
        read(&self.inner.endpoint).address.clone()
    }

    // ── Health ───────────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.health.current()
    }

    /// Subscribe to connection state transitions.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.health.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.health.is_connected()
    }

    /// When the system document was last fetched successfully.
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        *read(&self.inner.last_refresh)
    }

    pub(crate) fn ensure_connected(&self) -> Result<(), CoreError> {
        self.inner.health.ensure_connected(&self.inner.device_uid)
    }

    // ── Zones ────────────────────────────────────────────────────

    /// Number of zones the controller reported at initialization.
    pub fn zone_count(&self) -> usize {
        read(&self.inner.state).zones.len()
    }

    pub fn zones(&self) -> Vec<Zone> {
        (0..self.zone_count())
            .map(|index| Zone::new(index, self.downgrade()))
            .collect()
    }

    pub fn zone(&self, index: usize) -> Option<Zone> {
        (index < self.zone_count()).then(|| Zone::new(index, self.downgrade()))
    }

    pub(crate) fn with_zone<T>(
        &self,
        index: usize,
        decode: impl FnOnce(&Settings) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        self.ensure_connected()?;
        let state = read(&self.inner.state);
        let zone = state
            .zones
            .get(index)
            .ok_or_else(|| CoreError::protocol(format!("no zone at index {index}")))?;
        decode(zone)
    }

    // ── System accessors ─────────────────────────────────────────

    fn with_system<T>(
        &self,
        decode: impl FnOnce(&Settings) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        self.ensure_connected()?;
        decode(&read(&self.inner.state).system)
    }

    /// Snapshot of the raw system document.
    pub fn system_settings(&self) -> Result<Settings, CoreError> {
        self.with_system(|s| Ok(s.clone()))
    }

    pub fn is_on(&self) -> Result<bool, CoreError> {
        self.with_system(|s| switch(s, "SysOn"))
    }

    pub fn mode(&self) -> Result<SystemMode, CoreError> {
        self.with_system(|s| s.parse("SysMode"))
    }

    pub fn fan(&self) -> Result<Fan, CoreError> {
        self.with_system(|s| s.parse("SysFan"))
    }

    /// Fan speeds this controller accepts, from its fan capability group.
    pub fn fan_modes(&self) -> Vec<Fan> {
        read(&self.inner.state).fan_modes.clone()
    }

    /// Sleep timer in minutes; `0` when off.
    pub fn sleep_timer(&self) -> Result<i64, CoreError> {
        self.with_system(|s| s.integer("SleepTimer"))
    }

    /// Whether the installation has a free-air economizer.
    pub fn free_air_enabled(&self) -> Result<bool, CoreError> {
        self.with_system(|s| Ok(s.text("FreeAir").is_ok_and(|v| v != "disabled")))
    }

    /// Whether free air is currently on.
    pub fn free_air(&self) -> Result<bool, CoreError> {
        self.with_system(|s| Ok(s.text("FreeAir").is_ok_and(|v| v == "on")))
    }

    /// Supply air temperature in °C.
    pub fn temp_supply(&self) -> Result<Option<f64>, CoreError> {
        self.with_system(|s| s.reading("Supply"))
    }

    /// Unit setpoint in °C.
    pub fn temp_setpoint(&self) -> Result<Option<f64>, CoreError> {
        self.with_system(|s| s.reading("Setpoint"))
    }

    /// Return air temperature in °C.
    pub fn temp_return(&self) -> Result<Option<f64>, CoreError> {
        self.with_system(|s| s.reading("Temp"))
    }

    pub fn eco_lock(&self) -> Result<bool, CoreError> {
        self.with_system(|s| Ok(eco_lock(s)))
    }

    /// Lowest permitted setpoint.
    pub fn temp_min(&self) -> Result<f64, CoreError> {
        self.temp_range().map(|(min, _)| min)
    }

    /// Highest permitted setpoint.
    pub fn temp_max(&self) -> Result<f64, CoreError> {
        self.temp_range().map(|(_, max)| max)
    }

    pub(crate) fn temp_range(&self) -> Result<(f64, f64), CoreError> {
        self.with_system(temp_range)
    }

    /// Which sensor drives the unit.
    pub fn ras_mode(&self) -> Result<RasMode, CoreError> {
        self.with_system(|s| s.parse("RAS"))
    }

    /// The zone whose sensor is in control, 1-based as reported.
    pub fn zone_ctrl(&self) -> Result<i64, CoreError> {
        self.with_system(|s| s.integer("CtrlZone"))
    }

    pub fn zones_total(&self) -> Result<i64, CoreError> {
        self.with_system(|s| s.integer("NoOfZones"))
    }

    /// Number of constant (always-open) zones.
    pub fn zones_const(&self) -> Result<i64, CoreError> {
        self.with_system(|s| s.integer("NoOfConst"))
    }

    /// Controller hardware type, as reported.
    pub fn sys_type(&self) -> Result<String, CoreError> {
        self.with_system(|s| match s.get("SysType") {
            Some(Value::String(text)) => Ok(text.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => s.text("SysType").map(str::to_owned),
        })
    }

    // ── System setters ───────────────────────────────────────────

    pub async fn set_on(&self, on: bool) -> Result<(), CoreError> {
        if self.unchanged(self.is_on(), &on)? {
            return Ok(());
        }
        self.write_system("SystemON", json!(on_off(on))).await
    }

    pub async fn set_mode(&self, mode: SystemMode) -> Result<(), CoreError> {
        if self.unchanged(self.mode(), &mode)? {
            return Ok(());
        }
        self.write_system("SystemMODE", json!(mode.to_string())).await
    }

    pub async fn set_fan(&self, fan: Fan) -> Result<(), CoreError> {
        validate::fan(fan, &self.fan_modes())?;
        if self.unchanged(self.fan(), &fan)? {
            return Ok(());
        }
        self.write_system("SystemFAN", json!(fan.command_value())).await
    }

    pub async fn set_sleep_timer(&self, minutes: i64) -> Result<(), CoreError> {
        validate::sleep_timer(minutes)?;
        if self.unchanged(self.sleep_timer(), &minutes)? {
            return Ok(());
        }
        self.write_system("SleepTimer", json!(minutes)).await
    }

    pub async fn set_temp_setpoint(&self, value: f64) -> Result<(), CoreError> {
        let (min, max) = self.temp_range()?;
        validate::setpoint(value, min, max)?;
        if self.unchanged(self.temp_setpoint(), &Some(value))? {
            return Ok(());
        }
        self.write_system("UnitSetpoint", json!(validate::format_setpoint(value)))
            .await
    }

    pub async fn set_free_air(&self, on: bool) -> Result<(), CoreError> {
        if !self.free_air_enabled()? {
            return Err(CoreError::validation(
                "free air is not available on this controller",
            ));
        }
        if self.unchanged(self.free_air(), &on)? {
            return Ok(());
        }
        self.write_system("FreeAir", json!(on_off(on))).await
    }

    /// `true` when the cached value already equals `requested`.
    ///
    /// Connection failures propagate; an undecodable cached value
    /// counts as different so the command still goes out.
    pub(crate) fn unchanged<T: PartialEq>(
        &self,
        current: Result<T, CoreError>,
        requested: &T,
    ) -> Result<bool, CoreError> {
        match current {
            Ok(value) => Ok(value == *requested),
            Err(e) if e.is_connection() => Err(e),
            Err(_) => Ok(false),
        }
    }

    async fn write_system(&self, command: &'static str, payload: Value) -> Result<(), CoreError> {
        let _guard = self.inner.command_lock.lock().await;
        debug!(device_uid = %self.inner.device_uid, command, %payload, "sending command");
        self.send(command, payload).await?;
        settle(self.refresh_system(true).await)
    }

    // ── Zone commands ────────────────────────────────────────────

    pub(crate) async fn write_zone(
        &self,
        index: usize,
        command: &'static str,
        value: String,
    ) -> Result<(), CoreError> {
        let _guard = self.inner.command_lock.lock().await;
        debug!(device_uid = %self.inner.device_uid, zone = index, command, %value, "sending zone command");
        self.send(command, ZoneCommand::new(index, value).into())
            .await?;
        settle(self.refresh_zone_group(index, true).await)
    }

    /// Send a zone setpoint. A zone not yet in auto is first sent its
    /// current setpoint, which moves it under temperature control.
    pub(crate) async fn set_zone_setpoint(&self, index: usize, value: f64) -> Result<(), CoreError> {
        let _guard = self.inner.command_lock.lock().await;
        let mode = self.with_zone(index, |z| z.parse::<ZoneMode>("Mode")).ok();
        if mode != Some(ZoneMode::Auto) {
            let current = self.with_zone(index, |z| z.number("SetPoint"))?;
            debug!(device_uid = %self.inner.device_uid, zone = index, current, "moving zone to auto before setpoint");
            self.send(
                "ZoneCommand",
                ZoneCommand::new(index, validate::format_setpoint(current)).into(),
            )
            .await?;
        }
        debug!(device_uid = %self.inner.device_uid, zone = index, value, "sending zone setpoint");
        self.send(
            "ZoneCommand",
            ZoneCommand::new(index, validate::format_setpoint(value)).into(),
        )
        .await?;
        settle(self.refresh_zone_group(index, true).await)
    }

    /// Put a zone under temperature control.
    ///
    /// The firmware switches a zone to auto when it is sent a setpoint,
    /// so the current setpoint is sent back. Some firmware ignores the
    /// first one; it is re-sent once if the zone did not switch.
    pub(crate) async fn set_zone_auto(&self, index: usize) -> Result<(), CoreError> {
        let _guard = self.inner.command_lock.lock().await;
        for attempt in 1..=2 {
            let setpoint = self.with_zone(index, |z| z.number("SetPoint"))?;
            debug!(device_uid = %self.inner.device_uid, zone = index, setpoint, attempt, "switching zone to auto");
            self.send(
                "ZoneCommand",
                ZoneCommand::new(index, validate::format_setpoint(setpoint)).into(),
            )
            .await?;

            let refetch = self.refresh_zone_group(index, true).await;
            if refetch.is_err() {
                return settle(refetch);
            }
            let mode = self.with_zone(index, |z| z.parse::<ZoneMode>("Mode")).ok();
            if mode == Some(ZoneMode::Auto) {
                return Ok(());
            }
        }
        warn!(device_uid = %self.inner.device_uid, zone = index, "zone did not switch to auto");
        Ok(())
    }

    // ── Power monitor ────────────────────────────────────────────

    /// Power-monitor subsystem, fetched on first use.
    pub async fn power(&self) -> Result<Power, CoreError> {
        self.ensure_connected()?;
        self.inner
            .power
            .get_or_try_init(|| Power::fetch(self))
            .await
            .cloned()
    }

    // ── Transport ────────────────────────────────────────────────

    fn client(&self) -> IZoneClient {
        read(&self.inner.endpoint).client.clone()
    }

    async fn fetch<T: DeserializeOwned>(&self, resource: &str) -> Result<T, CoreError> {
        let client = self.client();
        client
            .get_resource(resource)
            .await
            .map_err(|e| self.record_failure(e))
    }

    async fn send(&self, command: &str, payload: Value) -> Result<(), CoreError> {
        let client = self.client();
        client
            .send_command(command, payload)
            .await
            .map_err(|e| self.record_failure(e))
    }

    /// A command whose response body carries data.
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        command: &str,
        payload: Value,
    ) -> Result<T, CoreError> {
        let client = self.client();
        client
            .request(command, payload)
            .await
            .map_err(|e| self.record_failure(e))
    }

    /// Route a transport error through connection health.
    fn record_failure(&self, err: izone_api::Error) -> CoreError {
        if !err.is_connection_failure() {
            return err.into();
        }
        let reason = Arc::new(err);
        if self.inner.health.fail(Arc::clone(&reason)) {
            self.inner.reconnect_gate.reset();
            if self.inner.initialised.load(Ordering::Acquire) {
                warn!(
                    device_uid = %self.inner.device_uid,
                    address = %self.device_ip(),
                    error = %reason,
                    "controller disconnected"
                );
                self.notify(DiscoveryEvent::ControllerDisconnected {
                    controller: self.clone(),
                    error: Arc::clone(&reason),
                });
            }
        }
        CoreError::Connection {
            device_uid: self.inner.device_uid.clone(),
            source: reason,
        }
    }

    fn notify(&self, event: DiscoveryEvent) {
        self.inner.session.notifier.notify(event);
    }

    fn touch(&self) {
        *write(&self.inner.last_refresh) = Some(Utc::now());
        self.inner.poll_gate.mark();
    }

    // ── Refresh ──────────────────────────────────────────────────

    pub(crate) async fn refresh_system(&self, notify: bool) -> Result<(), CoreError> {
        let document: Map<String, Value> = self.fetch(SYSTEM_SETTINGS).await?;
        let system = Settings::from(document);
        match system.device_uid() {
            Some(uid) if uid == self.inner.device_uid => {}
            other => {
                return Err(CoreError::protocol(format!(
                    "system settings from {} carry device uid {}, expected {}",
                    self.device_ip(),
                    other.unwrap_or("<missing>"),
                    self.inner.device_uid
                )));
            }
        }

        write(&self.inner.state).system = system;
        self.touch();
        if notify {
            self.notify(DiscoveryEvent::ControllerUpdated(self.clone()));
        }
        Ok(())
    }

    /// Refresh the group of zones containing `index`.
    pub(crate) async fn refresh_zone_group(&self, index: usize, notify: bool) -> Result<(), CoreError> {
        let first = index - index % ZONE_GROUP_SIZE;
        let zone_count = self.zone_count();
        if first >= zone_count {
            return Err(CoreError::protocol(format!(
                "zone {index} is beyond the {zone_count} zones of this controller"
            )));
        }
        let expected = (zone_count - first).min(ZONE_GROUP_SIZE);

        let records: Vec<Map<String, Value>> = self.fetch(&zone_group_resource(first)).await?;
        if records.len() < expected {
            return Err(CoreError::protocol(format!(
                "{} returned {} zones, expected {expected}",
                zone_group_resource(first),
                records.len()
            )));
        }

        let records: Vec<Settings> = records
            .into_iter()
            .take(expected)
            .map(Settings::from)
            .collect();
        for (offset, record) in records.iter().enumerate() {
            let slot = first + offset;
            let received = record.integer("Index").ok();
            if received != i64::try_from(slot).ok() {
                return Err(CoreError::ZoneIndexMismatch {
                    expected: slot,
                    received: record
                        .get("Index")
                        .map_or_else(|| "<missing>".to_owned(), Value::to_string),
                });
            }
        }

        {
            let mut state = write(&self.inner.state);
            for (offset, record) in records.into_iter().enumerate() {
                if let Some(zone) = state.zones.get_mut(first + offset) {
                    *zone = record;
                }
            }
        }

        if notify {
            for slot in first..first + expected {
                self.notify(DiscoveryEvent::ZoneUpdated {
                    controller: self.clone(),
                    zone: Zone::new(slot, self.downgrade()),
                });
            }
        }
        Ok(())
    }

    pub(crate) async fn refresh_zones(&self, notify: bool) -> Result<(), CoreError> {
        let groups = (0..self.zone_count()).step_by(ZONE_GROUP_SIZE);
        join_all(groups.map(|first| self.refresh_zone_group(first, notify)))
            .await
            .into_iter()
            .collect::<Result<Vec<()>, _>>()?;
        Ok(())
    }

    async fn refresh_all(&self, notify: bool) -> Result<(), CoreError> {
        let (system, zones) = tokio::join!(self.refresh_system(notify), self.refresh_zones(notify));
        system?;
        zones
    }

    /// Re-fetch everything now.
    ///
    /// A disconnected controller attempts a reconnection instead. Unless
    /// `force` is set, a refresh within the poll interval of the last one
    /// is skipped. Returns whether anything was fetched.
    pub async fn refresh(&self, force: bool) -> Result<bool, CoreError> {
        if !self.is_connected() {
            return self.reconnect(force).await;
        }
        if !self.inner.poll_gate.try_acquire(force) {
            trace!(device_uid = %self.inner.device_uid, "refresh skipped, within poll interval");
            return Ok(false);
        }
        self.refresh_all(true).await?;
        Ok(true)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// First full fetch. The controller is registered only if this
    /// succeeds.
    pub(crate) async fn initialize(&self) -> Result<(), CoreError> {
        self.refresh_system(false).await?;

        let (fan_modes, reported) = {
            let state = read(&self.inner.state);
            let fan_group = state.system.text("FanAuto").unwrap_or("disabled");
            (fan_modes_for(fan_group), state.system.integer("NoOfZones")?)
        };
        let zone_count = usize::try_from(reported)
            .ok()
            .filter(|n| *n <= MAX_ZONES)
            .ok_or_else(|| CoreError::protocol(format!("controller reports {reported} zones")))?;

        {
            let mut state = write(&self.inner.state);
            state.fan_modes = fan_modes;
            state.zones = vec![Settings::default(); zone_count];
        }
        self.refresh_zones(false).await?;

        self.inner.initialised.store(true, Ordering::Release);
        self.spawn_poll_task();
        debug!(device_uid = %self.inner.device_uid, zones = zone_count, "controller initialized");
        Ok(())
    }

    /// Try to restore a disconnected controller. Returns `true` when
    /// this call ended the outage.
    pub(crate) async fn reconnect(&self, force: bool) -> Result<bool, CoreError> {
        if self.is_connected() {
            return Ok(false);
        }
        if !self.inner.reconnect_gate.try_acquire(force) {
            trace!(device_uid = %self.inner.device_uid, "reconnect skipped, cooling down");
            return Ok(false);
        }

        debug!(device_uid = %self.inner.device_uid, address = %self.device_ip(), "attempting reconnect");
        self.refresh_all(false).await?;
        if !self.inner.health.restore() {
            return Ok(false);
        }

        info!(device_uid = %self.inner.device_uid, address = %self.device_ip(), "controller reconnected");
        self.notify(DiscoveryEvent::ControllerUpdated(self.clone()));
        for zone in self.zones() {
            self.notify(DiscoveryEvent::ZoneUpdated {
                controller: self.clone(),
                zone,
            });
        }
        self.notify(DiscoveryEvent::ControllerReconnected(self.clone()));
        Ok(true)
    }

    /// Point the controller at a new address after a re-announcement.
    pub(crate) fn update_address(&self, address: &str) {
        let mut endpoint = write(&self.inner.endpoint);
        if endpoint.address == address {
            return;
        }
        let session = &self.inner.session;
        match IZoneClient::for_host(
            session.http.clone(),
            address,
            session.http_port,
            session.request_timeout,
        ) {
            Ok(client) => {
                info!(
                    device_uid = %self.inner.device_uid,
                    old = %endpoint.address,
                    new = address,
                    "controller address changed"
                );
                endpoint.address = address.to_owned();
                endpoint.client = client;
            }
            Err(e) => warn!(device_uid = %self.inner.device_uid, address, error = %e, "ignoring unusable address"),
        }
    }

    fn spawn_poll_task(&self) {
        let Some(period) = self.inner.session.poll_interval else {
            return;
        };
        let cancel = self.inner.session.cancel.clone();
        self.inner
            .session
            .tracker
            .spawn(poll_task(self.downgrade(), period, cancel));
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("device_uid", &self.inner.device_uid)
            .field("address", &self.device_ip())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Controller {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Controller {}

// ── Background tasks ─────────────────────────────────────────────

/// Periodic refresh. Holds only a weak reference so a dropped
/// controller ends the loop.
async fn poll_task(controller: Weak<ControllerInner>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = controller.upgrade() else { break };
                let controller = Controller::from_inner(inner);
                if let Err(e) = controller.refresh(false).await {
                    debug!(device_uid = controller.device_uid(), error = %e, "periodic refresh failed");
                }
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// A failed re-fetch after a delivered command is left to connection
/// health; the command itself succeeded.
fn settle(refetch: Result<(), CoreError>) -> Result<(), CoreError> {
    match refetch {
        Err(e) if e.is_connection() => {
            debug!(error = %e, "re-fetch after command failed");
            Ok(())
        }
        other => other,
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

fn switch(settings: &Settings, key: &'static str) -> Result<bool, CoreError> {
    match settings.text(key)? {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(CoreError::InvalidState {
            key,
            value: other.to_owned(),
        }),
    }
}

fn eco_lock(settings: &Settings) -> bool {
    match settings.get("EcoLock") {
        Some(Value::Bool(locked)) => *locked,
        Some(Value::String(text)) => text == "true",
        _ => false,
    }
}

fn temp_range(settings: &Settings) -> Result<(f64, f64), CoreError> {
    if eco_lock(settings) {
        Ok((settings.number("EcoMin")?, settings.number("EcoMax")?))
    } else {
        Ok(DEFAULT_TEMP_RANGE)
    }
}
