#![allow(clippy::unwrap_used)]
// End-to-end tests: a wiremock controller announced to a live
// discovery session over loopback UDP.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use izone_core::{
    Controller, CoreError, DiscoveryConfig, DiscoveryEvent, DiscoveryService, Fan, Listener,
    SystemMode, ZoneMode, ZoneType,
};

const UID: &str = "000000001";

// ── Fixtures ────────────────────────────────────────────────────────

fn system_settings() -> Value {
    json!({
        "AirStreamDeviceUId": UID,
        "SysOn": "on",
        "SysMode": "heat",
        "SysFan": "auto",
        "SleepTimer": 0,
        "Supply": "18.5",
        "Setpoint": "22.0",
        "Temp": "21.5",
        "RAS": "zones",
        "CtrlZone": 1,
        "EcoLock": "false",
        "EcoMax": 30,
        "EcoMin": 15,
        "NoOfConst": 1,
        "NoOfZones": 6,
        "SysType": 310,
        "FreeAir": "off",
        "FanAuto": "3-speed"
    })
}

fn zone(index: usize) -> Value {
    let (kind, mode) = match index {
        1 => ("opcl", "close"),
        2 => ("const", "open"),
        5 => ("auto", "auto"),
        _ => ("auto", "open"),
    };
    let temp = if index == 3 { 0.0 } else { 20.5 };
    json!({
        "Index": index,
        "Name": format!("Zone {}", index + 1),
        "Type": kind,
        "Mode": mode,
        "SetPoint": 21.0,
        "Temp": temp,
        "MaxAir": 100,
        "MinAir": 10
    })
}

fn zone_group(first: usize) -> Value {
    Value::Array((first..first + 4).map(zone).collect())
}

async fn mount_controller(server: &MockServer, system: Value) {
    Mock::given(method("GET"))
        .and(path("/SystemSettings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(system))
        .mount(server)
        .await;
    for (route, first) in [("/Zones1_4", 0), ("/Zones5_8", 4)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_group(first)))
            .mount(server)
            .await;
    }
}

async fn accept_commands(server: &MockServer) {
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, verb: &str, route: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .collect()
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    server: MockServer,
    service: DiscoveryService,
    sender: UdpSocket,
    events: broadcast::Receiver<DiscoveryEvent>,
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    mount_controller(&server, system_settings()).await;
    start(server).await
}

async fn start(server: MockServer) -> Harness {
    let config = DiscoveryConfig {
        listen_port: 0,
        http_port: server.address().port(),
        request_timeout: Duration::from_millis(500),
        reconnect_cooldown: Duration::ZERO,
        broadcast_addresses: Some(vec![]),
        ..DiscoveryConfig::default()
    };
    let service = DiscoveryService::new(config).unwrap();
    let events = service.events();
    service.start().await.unwrap();
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    Harness {
        server,
        service,
        sender,
        events,
    }
}

impl Harness {
    async fn send(&self, payload: &[u8]) {
        let port = self.service.local_addr().unwrap().port();
        self.sender.send_to(payload, ("127.0.0.1", port)).await.unwrap();
    }

    async fn announce_from(&self, ip: &str) {
        let datagram = format!("ASPort_12107,Mac_{UID},IP_{ip},iZone,iLight,iDrate");
        self.send(datagram.as_bytes()).await;
    }

    async fn discover(&mut self) -> Controller {
        self.announce_from("127.0.0.1").await;
        let controller = self
            .service
            .wait_for_controller(Some(UID), Duration::from_secs(5))
            .await
            .unwrap();
        let event = self.next_event().await;
        assert!(matches!(event, DiscoveryEvent::ControllerDiscovered(_)));
        controller
    }

    async fn next_event(&mut self) -> DiscoveryEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .unwrap()
            .unwrap()
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_discovers_and_loads_controller() {
    let mut h = harness().await;
    let controller = h.discover().await;

    assert_eq!(controller.device_uid(), UID);
    assert_eq!(controller.device_ip(), "127.0.0.1");
    assert!(controller.is_connected());
    assert!(controller.is_on().unwrap());
    assert_eq!(controller.mode().unwrap(), SystemMode::Heat);
    assert_eq!(controller.fan().unwrap(), Fan::Auto);
    assert_eq!(
        controller.fan_modes(),
        vec![Fan::Low, Fan::Med, Fan::High, Fan::Auto]
    );
    assert_eq!(controller.temp_setpoint().unwrap(), Some(22.0));
    assert_eq!(controller.temp_supply().unwrap(), Some(18.5));
    assert_eq!((controller.temp_min().unwrap(), controller.temp_max().unwrap()), (15.0, 30.0));
    assert_eq!(controller.sys_type().unwrap(), "310");
    assert!(controller.free_air_enabled().unwrap());
    assert!(!controller.free_air().unwrap());
    assert!(controller.last_refreshed().is_some());

    assert_eq!(controller.zone_count(), 6);
    assert!(controller.zone(6).is_none());
    let zones = controller.zones();
    assert_eq!(zones[0].name().unwrap(), "Zone 1");
    assert_eq!(zones[2].zone_type().unwrap(), ZoneType::Const);
    assert_eq!(zones[3].temp_current().unwrap(), None);
    assert_eq!(zones[5].temp_current().unwrap(), Some(20.5));

    assert_eq!(requests_to(&h.server, "GET", "/Zones5_8").await.len(), 1);
    assert!(requests_to(&h.server, "GET", "/Zones9_12").await.is_empty());

    // A repeat announcement from the same address fetches nothing.
    h.announce_from("127.0.0.1").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(requests_to(&h.server, "GET", "/SystemSettings").await.len(), 1);
    assert_eq!(h.service.controllers().len(), 1);

    h.service.close().await;
}

#[tokio::test]
async fn test_address_change_keeps_identity() {
    let mut h = harness().await;
    let controller = h.discover().await;

    h.announce_from("8.8.8.4").await;
    eventually(|| controller.device_ip() == "8.8.8.4").await;

    let registered = h.service.controller(UID).unwrap();
    assert_eq!(registered, controller);
    assert_eq!(h.service.controllers().len(), 1);
    assert!(h.events.try_recv().is_err());

    h.service.close().await;
}

#[tokio::test]
async fn test_failed_initialization_is_not_registered() {
    let server = MockServer::start().await;
    let mut system = system_settings();
    system["AirStreamDeviceUId"] = json!("000000099");
    mount_controller(&server, system).await;
    let h = start(server).await;

    h.announce_from("127.0.0.1").await;
    let err = h
        .service
        .wait_for_controller(Some(UID), Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    assert!(h.service.controllers().is_empty());

    h.service.close().await;
}

#[tokio::test]
async fn test_garbled_reply_does_not_block_rediscovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/SystemSettings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{}°C", "x".repeat(199))))
        .mount(&server)
        .await;
    let mut h = start(server).await;

    h.announce_from("127.0.0.1").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(requests_to(&h.server, "GET", "/SystemSettings").await.len(), 1);
    assert!(h.service.controllers().is_empty());

    h.server.reset().await;
    mount_controller(&h.server, system_settings()).await;
    let controller = h.discover().await;
    assert_eq!(controller.device_uid(), UID);

    h.service.close().await;
}

#[tokio::test]
async fn test_zone_index_mismatch_fails_initialization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/SystemSettings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(system_settings()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Zones1_4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(zone_group(0)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Zones5_8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([zone(4), zone(7)])))
        .mount(&server)
        .await;
    let h = start(server).await;

    h.announce_from("127.0.0.1").await;
    let err = h
        .service
        .wait_for_controller(None, Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { device_uid: None, .. }));

    h.service.close().await;
}

#[tokio::test]
async fn test_zone_index_mismatch_on_refresh() {
    let mut h = harness().await;
    let controller = h.discover().await;

    h.server.reset().await;
    Mock::given(method("GET"))
        .and(path("/SystemSettings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(system_settings()))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Zones1_4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(zone_group(4)))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Zones5_8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(zone_group(4)))
        .mount(&h.server)
        .await;

    let err = controller.refresh(true).await.unwrap_err();
    assert!(matches!(err, CoreError::ZoneIndexMismatch { expected: 0, .. }));
    assert!(controller.is_connected());
    assert_eq!(controller.zones()[0].name().unwrap(), "Zone 1");

    h.service.close().await;
}

#[tokio::test]
async fn test_malformed_and_foreign_datagrams_are_ignored() {
    let mut h = harness().await;

    h.send(b"\xff\xfe garbage").await;
    h.send(b"ASPort_12107,Mac_000000002").await;
    h.send(b"ASPort_12107,Mac_000000003,IP_127.0.0.1,iLight").await;
    h.send(b"iZoneChanged_Schedules").await;
    h.send(b"IASD").await;

    let controller = h.discover().await;
    assert_eq!(controller.device_uid(), UID);
    assert_eq!(h.service.controllers().len(), 1);

    h.service.close().await;
}

// ── Change notifications and health ─────────────────────────────────

#[tokio::test]
async fn test_change_notification_refreshes_system() {
    let mut h = harness().await;
    let controller = h.discover().await;

    h.server.reset().await;
    let mut system = system_settings();
    system["SysOn"] = json!("off");
    mount_controller(&h.server, system).await;

    h.send(b"iZoneChanged_System").await;
    let event = h.next_event().await;
    assert!(matches!(event, DiscoveryEvent::ControllerUpdated(_)));
    assert!(!controller.is_on().unwrap());

    h.send(b"iZoneChanged_Zones").await;
    let event = h.next_event().await;
    assert!(matches!(event, DiscoveryEvent::ZoneUpdated { .. }));

    h.service.close().await;
}

#[tokio::test]
async fn test_disconnect_and_reconnect_fire_once() {
    let mut h = harness().await;
    let controller = h.discover().await;
    let mut state = controller.watch_connection();

    // Nothing mounted: every request answers 404.
    h.server.reset().await;
    h.send(b"iZoneChanged_System").await;
    let event = h.next_event().await;
    assert!(matches!(event, DiscoveryEvent::ControllerDisconnected { .. }));
    assert!(!controller.is_connected());
    state.changed().await.unwrap();
    assert!(!state.borrow().is_connected());

    let err = controller.mode().unwrap_err();
    assert!(err.is_connection());
    let err = controller.set_mode(SystemMode::Cool).await.unwrap_err();
    assert!(err.is_connection());
    assert!(requests_to(&h.server, "POST", "/SystemMODE").await.is_empty());

    // A failed retry stays silent.
    h.send(b"iZoneChanged_System").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    mount_controller(&h.server, system_settings()).await;
    h.announce_from("127.0.0.1").await;

    let mut seen = Vec::new();
    loop {
        let event = h.next_event().await;
        let kind = event.kind();
        seen.push(kind);
        if kind == "controller_reconnected" {
            break;
        }
    }
    assert!(!seen.contains(&"controller_disconnected"));
    assert_eq!(seen.first(), Some(&"controller_updated"));
    assert_eq!(seen.iter().filter(|k| **k == "zone_updated").count(), 6);
    assert!(controller.is_connected());
    assert_eq!(controller.mode().unwrap(), SystemMode::Heat);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.events.try_recv().is_err());

    h.service.close().await;
}

#[tokio::test]
async fn test_failed_write_disconnects_once() {
    let mut h = harness().await;
    let controller = h.discover().await;

    // A re-fetch would now see cool, but the command never lands.
    h.server.reset().await;
    let mut system = system_settings();
    system["SysMode"] = json!("cool");
    mount_controller(&h.server, system).await;
    Mock::given(method("POST"))
        .and(path("/SystemMODE"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&h.server)
        .await;

    let err = controller.set_mode(SystemMode::Cool).await.unwrap_err();
    assert!(err.is_connection());
    assert!(matches!(
        err,
        CoreError::Connection { ref source, .. }
            if matches!(source.as_ref(), izone_api::Error::Timeout { .. })
    ));
    let event = h.next_event().await;
    assert!(matches!(event, DiscoveryEvent::ControllerDisconnected { .. }));
    assert!(!controller.is_connected());

    for _ in 0..2 {
        let err = controller.set_mode(SystemMode::Cool).await.unwrap_err();
        assert!(err.is_connection());
    }
    assert!(controller.set_on(false).await.unwrap_err().is_connection());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.events.try_recv().is_err());
    assert_eq!(requests_to(&h.server, "POST", "/SystemMODE").await.len(), 1);
    // No re-fetch ran, so the cached heat mode was never replaced.
    assert!(requests_to(&h.server, "GET", "/SystemSettings").await.is_empty());

    h.server.reset().await;
    mount_controller(&h.server, system_settings()).await;
    h.announce_from("127.0.0.1").await;
    loop {
        if h.next_event().await.kind() == "controller_reconnected" {
            break;
        }
    }
    assert_eq!(controller.mode().unwrap(), SystemMode::Heat);

    h.service.close().await;
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_mode_posts_and_refetches() {
    let mut h = harness().await;
    let controller = h.discover().await;

    h.server.reset().await;
    let mut system = system_settings();
    system["SysMode"] = json!("cool");
    mount_controller(&h.server, system).await;
    accept_commands(&h.server).await;

    controller.set_mode(SystemMode::Cool).await.unwrap();
    assert_eq!(controller.mode().unwrap(), SystemMode::Cool);

    let posts = requests_to(&h.server, "POST", "/SystemMODE").await;
    assert_eq!(posts.len(), 1);
    assert_eq!(
        posts[0].body_json::<Value>().unwrap(),
        json!({"SystemMODE": "cool"})
    );

    // Already cool: nothing is sent.
    controller.set_mode(SystemMode::Cool).await.unwrap();
    assert_eq!(requests_to(&h.server, "POST", "/SystemMODE").await.len(), 1);

    h.service.close().await;
}

#[tokio::test]
async fn test_system_setters_wire_format() {
    let mut h = harness().await;
    let controller = h.discover().await;
    accept_commands(&h.server).await;

    controller.set_temp_setpoint(23.5).await.unwrap();
    controller.set_fan(Fan::Med).await.unwrap();
    controller.set_sleep_timer(90).await.unwrap();
    controller.set_free_air(true).await.unwrap();
    controller.set_on(false).await.unwrap();

    let body = |route: &'static str| {
        let server = &h.server;
        async move {
            requests_to(server, "POST", route).await[0]
                .body_json::<Value>()
                .unwrap()
        }
    };
    assert_eq!(body("/UnitSetpoint").await, json!({"UnitSetpoint": "23.5"}));
    assert_eq!(body("/SystemFAN").await, json!({"SystemFAN": "medium"}));
    assert_eq!(body("/SleepTimer").await, json!({"SleepTimer": 90}));
    assert_eq!(body("/FreeAir").await, json!({"FreeAir": "on"}));
    assert_eq!(body("/SystemON").await, json!({"SystemON": "off"}));

    h.service.close().await;
}

#[tokio::test]
async fn test_validation_rejects_without_sending() {
    let mut h = harness().await;
    let controller = h.discover().await;
    accept_commands(&h.server).await;

    for minutes in [45, 150, -30] {
        assert!(controller.set_sleep_timer(minutes).await.unwrap_err().is_validation());
    }
    for value in [22.3, 14.5, 31.0] {
        assert!(controller.set_temp_setpoint(value).await.unwrap_err().is_validation());
    }
    assert!(controller.set_fan(Fan::Top).await.unwrap_err().is_validation());

    let zone = controller.zone(0).unwrap();
    for percent in [41, -1, 105] {
        assert!(zone.set_airflow_min(percent).await.unwrap_err().is_validation());
        assert!(zone.set_airflow_max(percent).await.unwrap_err().is_validation());
    }
    let posts: Vec<Request> = h
        .server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .collect();
    assert!(posts.is_empty());

    zone.set_airflow_min(40).await.unwrap();
    let posts = requests_to(&h.server, "POST", "/AirMinCommand").await;
    assert_eq!(
        posts[0].body_json::<Value>().unwrap(),
        json!({"AirMinCommand": {"ZoneNo": "1", "Command": "40"}})
    );

    h.service.close().await;
}

#[tokio::test]
async fn test_zone_mode_rules() {
    let mut h = harness().await;
    let controller = h.discover().await;
    accept_commands(&h.server).await;
    let zones = controller.zones();

    assert!(zones[2].set_mode(ZoneMode::Close).await.unwrap_err().is_validation());
    assert!(zones[1].set_mode(ZoneMode::Auto).await.unwrap_err().is_validation());
    assert!(zones[1].set_temp_setpoint(22.0).await.unwrap_err().is_validation());

    zones[1].set_mode(ZoneMode::Open).await.unwrap();
    let posts = requests_to(&h.server, "POST", "/ZoneCommand").await;
    assert_eq!(posts.len(), 1);
    assert_eq!(
        posts[0].body_json::<Value>().unwrap(),
        json!({"ZoneCommand": {"ZoneNo": "2", "Command": "open"}})
    );

    h.service.close().await;
}

#[tokio::test]
async fn test_zone_auto_resends_setpoint_once() {
    let mut h = harness().await;
    let controller = h.discover().await;
    accept_commands(&h.server).await;

    // The mock never reports the zone as auto, so the setpoint goes twice.
    let zone = controller.zone(0).unwrap();
    zone.set_mode(ZoneMode::Auto).await.unwrap();

    let posts = requests_to(&h.server, "POST", "/ZoneCommand").await;
    assert_eq!(posts.len(), 2);
    for post in posts {
        assert_eq!(
            post.body_json::<Value>().unwrap(),
            json!({"ZoneCommand": {"ZoneNo": "1", "Command": "21.0"}})
        );
    }

    h.service.close().await;
}

#[tokio::test]
async fn test_zone_setpoint_moves_zone_to_auto_first() {
    let mut h = harness().await;
    let controller = h.discover().await;
    accept_commands(&h.server).await;
    let zones = controller.zones();

    // Zone 1 is open: its current setpoint goes first.
    zones[0].set_temp_setpoint(23.5).await.unwrap();
    let posts = requests_to(&h.server, "POST", "/ZoneCommand").await;
    let bodies: Vec<Value> = posts.iter().map(|p| p.body_json().unwrap()).collect();
    assert_eq!(
        bodies,
        vec![
            json!({"ZoneCommand": {"ZoneNo": "1", "Command": "21.0"}}),
            json!({"ZoneCommand": {"ZoneNo": "1", "Command": "23.5"}}),
        ]
    );

    // Zone 6 is already in auto: only the new value is sent.
    zones[5].set_temp_setpoint(22.0).await.unwrap();
    let posts = requests_to(&h.server, "POST", "/ZoneCommand").await;
    assert_eq!(posts.len(), 3);
    assert_eq!(
        posts[2].body_json::<Value>().unwrap(),
        json!({"ZoneCommand": {"ZoneNo": "6", "Command": "22.0"}})
    );

    h.service.close().await;
}

// ── Power monitor ───────────────────────────────────────────────────

#[tokio::test]
async fn test_power_monitor_readings() {
    let mut h = harness().await;
    let controller = h.discover().await;

    Mock::given(method("POST"))
        .and(path("/PowerRequest"))
        .and(body_json(json!({"PowerRequest": {"Type": 1, "No": 0, "No1": 0}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AirStreamDeviceUId": UID,
            "PowerMonitorConfig": {
                "Enabled": 1,
                "Voltage": 240,
                "PF": 90,
                "Devices": [{
                    "Enabled": 1,
                    "Channels": [
                        {"Name": "Solar", "GrNo": 1, "Enabled": 1, "Generate": 1},
                        {"Name": "Aircon", "GrNo": 255, "Enabled": 1},
                        {"Name": "Solar B", "GrNo": 1, "Enabled": 1, "Generate": 1}
                    ]
                }]
            }
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/PowerRequest"))
        .and(body_json(json!({"PowerRequest": {"Type": 2, "No": 0, "No1": 0}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "PowerMonitorStatus": {
                "LastReadingNo": 4,
                "Dev": [{"Ok": 1, "Batt": 3, "Ch": [{"Pwr": 1200}, {"Pwr": 800}, {"Pwr": 300}]}]
            }
        })))
        .mount(&h.server)
        .await;

    let power = controller.power().await.unwrap();
    assert!(power.enabled());
    assert_eq!(power.voltage(), 240);
    assert_eq!(power.last_reading().unwrap(), None);

    assert!(power.refresh().await.unwrap());
    assert!(!power.refresh().await.unwrap());
    assert_eq!(power.last_reading().unwrap(), Some(4));

    let devices = power.devices().unwrap();
    assert_eq!(devices[0].channels[1].power_watts, Some(800));
    assert_eq!(devices[0].channels[1].group_number, None);

    let groups = power.groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Solar");
    assert_eq!(groups[0].members, vec![(0, 0), (0, 2)]);

    // The configuration is fetched once.
    controller.power().await.unwrap();
    let config_requests = requests_to(&h.server, "POST", "/PowerRequest").await;
    assert_eq!(config_requests.len(), 3);

    h.service.close().await;
}

// ── Listeners and lifecycle ─────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
}

impl Recorder {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Listener for Recorder {
    fn controller_discovered(&self, controller: &Controller) {
        self.seen
            .lock()
            .unwrap()
            .push(format!("discovered {}", controller.device_uid()));
    }

    fn controller_updated(&self, controller: &Controller) {
        self.seen
            .lock()
            .unwrap()
            .push(format!("updated {}", controller.device_uid()));
    }
}

struct Panicker;

impl Listener for Panicker {
    fn controller_updated(&self, _controller: &Controller) {
        panic!("listener failure");
    }
}

#[tokio::test]
async fn test_late_listener_gets_replay() {
    let mut h = harness().await;
    h.discover().await;

    let recorder = Arc::new(Recorder::default());
    let listener: Arc<dyn Listener> = recorder.clone();
    h.service.add_listener(Arc::clone(&listener));
    eventually(|| recorder.seen() == vec![format!("discovered {UID}")]).await;

    assert!(h.service.remove_listener(&listener));
    assert!(!h.service.remove_listener(&listener));

    h.service.close().await;
}

#[tokio::test]
async fn test_panicking_listener_does_not_starve_others() {
    let mut h = harness().await;
    h.discover().await;

    h.service.add_listener(Arc::new(Panicker));
    let recorder = Arc::new(Recorder::default());
    h.service.add_listener(recorder.clone());

    h.send(b"iZoneChanged_System").await;
    eventually(|| recorder.seen().contains(&format!("updated {UID}"))).await;

    h.service.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent_and_final() {
    let mut h = harness().await;
    h.discover().await;

    h.service.rescan().unwrap();
    h.service.close().await;
    h.service.close().await;

    assert!(h.service.is_closed());
    assert!(h.service.controllers().is_empty());
    assert!(matches!(h.service.rescan(), Err(CoreError::Closed)));
    assert!(matches!(h.service.start().await, Err(CoreError::Closed)));
}

#[tokio::test]
async fn test_close_waits_for_initialization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/SystemSettings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(system_settings())
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;
    for (route, first) in [("/Zones1_4", 0), ("/Zones5_8", 4)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_group(first)))
            .mount(&server)
            .await;
    }
    let mut h = start(server).await;

    h.announce_from("127.0.0.1").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let began = Instant::now();
    h.service.close().await;
    assert!(began.elapsed() >= Duration::from_millis(250), "close took {:?}", began.elapsed());

    // Initialization finished, but too late to register.
    assert_eq!(requests_to(&h.server, "GET", "/Zones1_4").await.len(), 1);
    assert!(h.service.controllers().is_empty());
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let holder = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    let config = DiscoveryConfig {
        listen_port: port,
        broadcast_addresses: Some(vec![]),
        ..DiscoveryConfig::default()
    };
    let service = DiscoveryService::new(config).unwrap();
    let err = service.start().await.unwrap_err();
    assert!(matches!(err, CoreError::Bind { .. }));
    assert!(!service.is_closed());
    service.close().await;
}
