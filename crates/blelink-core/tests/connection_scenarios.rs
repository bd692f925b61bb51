//! Lifecycle scenarios for the connection manager and frame codec
//!
//! Completions are fed by hand so every interleaving is deterministic.

use blelink_core::testing::{LinkRequest, MockLink};
use blelink_core::{
    uuid_from_u16, ConnectionManager, ConnectionState, DeviceDescriptor, ErrorKind, FrameCodec,
    FrameEvent, Generation, LinkEvent, LinkMessage,
};
use uuid::Uuid;

const SERVICE: Uuid = uuid_from_u16(0x1234);
const CHARACTERISTIC: Uuid = uuid_from_u16(0x5678);

fn device_a() -> DeviceDescriptor {
    DeviceDescriptor::new("dev-a", "AA:BB:CC:DD:EE:01", "deviceA")
}

fn device_b() -> DeviceDescriptor {
    DeviceDescriptor::new("dev-b", "AA:BB:CC:DD:EE:02", "deviceB")
}

fn create_codec() -> FrameCodec<MockLink> {
    let mut codec = FrameCodec::new(ConnectionManager::new(MockLink::new()));
    codec.configure(SERVICE, CHARACTERISTIC);
    codec.take_events();
    codec
}

fn feed(codec: &mut FrameCodec<MockLink>, event: LinkEvent) {
    let generation = codec.manager().generation();
    codec.dispatch(LinkMessage::new(generation, event));
}

fn feed_stale(codec: &mut FrameCodec<MockLink>, generation: Generation, event: LinkEvent) {
    codec.dispatch(LinkMessage::new(generation, event));
}

fn handshake(codec: &mut FrameCodec<MockLink>, services: Vec<Uuid>, characteristics: Vec<Uuid>) {
    feed(codec, LinkEvent::LinkUp);
    feed(codec, LinkEvent::ServicesDiscovered { services });
    if codec.state() == ConnectionState::DiscoveringCharacteristic {
        feed(codec, LinkEvent::DetailsDiscovered { characteristics });
    }
}

fn chunk(characteristic: Uuid, value: &[u8]) -> LinkEvent {
    LinkEvent::CharacteristicChanged {
        characteristic,
        value: value.to_vec(),
    }
}

fn count_disconnected(events: &[FrameEvent]) -> usize {
    events
        .iter()
        .filter(|event| **event == FrameEvent::Disconnected)
        .count()
}

#[test]
fn test_scenario_successful_handshake() {
    let mut codec = create_codec();
    codec.connect(device_a());
    handshake(&mut codec, vec![uuid_from_u16(0x180F), SERVICE], vec![CHARACTERISTIC]);

    assert_eq!(codec.state(), ConnectionState::Ready);
    assert!(codec.is_connected());
    assert!(codec.is_ready());
    assert_eq!(
        codec.take_events().as_slice(),
        &[FrameEvent::Connected, FrameEvent::Ready]
    );
}

#[test]
fn test_scenario_missing_service() {
    let mut codec = create_codec();
    codec.set_service_uuid(uuid_from_u16(0xABCD));
    codec.take_events();

    codec.connect(device_a());
    handshake(&mut codec, vec![SERVICE], vec![CHARACTERISTIC]);

    assert_eq!(codec.state(), ConnectionState::Idle);
    assert!(!codec.is_connected());
    let events = codec.take_events();
    assert_eq!(
        events.as_slice(),
        &[
            FrameEvent::Connected,
            FrameEvent::Error {
                kind: ErrorKind::ServiceError,
                description: format!(
                    "Cannot find service {} on device deviceA!",
                    uuid_from_u16(0xABCD)
                ),
            },
            FrameEvent::Disconnected,
        ]
    );
}

#[test]
fn test_scenario_missing_characteristic() {
    let mut codec = create_codec();
    codec.connect(device_a());
    handshake(&mut codec, vec![SERVICE], vec![uuid_from_u16(0x2A19)]);

    let events = codec.take_events();
    assert!(matches!(
        events.get(1),
        Some(FrameEvent::Error {
            kind: ErrorKind::CharacteristicError,
            ..
        })
    ));
    assert_eq!(events.last(), Some(&FrameEvent::Disconnected));
    assert!(!codec.is_ready());
}

#[test]
fn test_scenario_send_hi() {
    let mut codec = create_codec();
    codec.connect(device_a());
    handshake(&mut codec, vec![SERVICE], vec![CHARACTERISTIC]);
    codec.send_message(b"hi").unwrap();

    let generation = codec.manager().generation();
    let requests = codec.manager().link().requests();
    assert_eq!(
        requests.last(),
        Some(&LinkRequest::Write {
            generation,
            characteristic: CHARACTERISTIC,
            data: vec![0x02, b'h', b'i'],
        })
    );
}

#[test]
fn test_reconnect_supersedes_ready_link() {
    let mut codec = create_codec();
    codec.connect(device_a());
    handshake(&mut codec, vec![SERVICE], vec![CHARACTERISTIC]);
    codec.take_events();
    let old_generation = codec.manager().generation();

    codec.connect(device_b());

    // Flags cleared and Disconnected published before any new-session event
    assert!(!codec.is_ready());
    assert!(!codec.is_connected());
    assert_eq!(codec.take_events().as_slice(), &[FrameEvent::Disconnected]);
    assert_eq!(codec.state(), ConnectionState::Connecting);

    // Late completions of the old session never surface
    feed_stale(&mut codec, old_generation, chunk(CHARACTERISTIC, &[0x01, b'x']));
    feed_stale(&mut codec, old_generation, LinkEvent::LinkLost);
    feed_stale(
        &mut codec,
        old_generation,
        LinkEvent::LinkFailed {
            description: "late".to_string(),
        },
    );
    assert!(codec.take_events().is_empty());
    assert_eq!(codec.state(), ConnectionState::Connecting);

    handshake(&mut codec, vec![SERVICE], vec![CHARACTERISTIC]);
    assert_eq!(
        codec.take_events().as_slice(),
        &[FrameEvent::Connected, FrameEvent::Ready]
    );
    assert_eq!(codec.connected_device(), Some(&device_b()));

    let requests = codec.manager().link().requests();
    assert!(requests.contains(&LinkRequest::Disconnect {
        generation: old_generation
    }));
}

#[test]
fn test_connect_while_connecting_discards_first_attempt() {
    let mut codec = create_codec();
    codec.connect(device_a());
    let first = codec.manager().generation();
    codec.connect(device_b());
    assert!(codec.manager().generation() > first);

    feed_stale(&mut codec, first, LinkEvent::LinkUp);
    assert_eq!(codec.state(), ConnectionState::Connecting);
    assert!(!codec.is_connected());
}

#[test]
fn test_disconnect_is_idempotent() {
    let mut codec = create_codec();
    codec.disconnect();
    assert!(codec.take_events().is_empty());

    codec.connect(device_a());
    handshake(&mut codec, vec![SERVICE], vec![CHARACTERISTIC]);
    let generation = codec.manager().generation();
    codec.disconnect();
    codec.disconnect();
    feed_stale(&mut codec, generation, LinkEvent::LinkLost);

    let events = codec.take_events();
    assert_eq!(count_disconnected(&events), 1);
    assert_eq!(codec.state(), ConnectionState::Idle);
}

#[test]
fn test_error_then_disconnect_emits_single_disconnected() {
    let mut codec = create_codec();
    codec.connect(device_a());
    feed(
        &mut codec,
        LinkEvent::LinkFailed {
            description: "Device unreachable".to_string(),
        },
    );
    codec.disconnect();

    let events = codec.take_events();
    assert_eq!(count_disconnected(&events), 1);
    assert_eq!(
        events.first(),
        Some(&FrameEvent::Error {
            kind: ErrorKind::LinkError,
            description: "Connection error: Device unreachable".to_string(),
        })
    );
}

#[test]
fn test_link_lost_while_ready() {
    let mut codec = create_codec();
    codec.connect(device_a());
    handshake(&mut codec, vec![SERVICE], vec![CHARACTERISTIC]);
    codec.take_events();

    feed(&mut codec, LinkEvent::LinkLost);
    assert_eq!(codec.take_events().as_slice(), &[FrameEvent::Disconnected]);
    assert!(codec.connected_device().is_none());
}

#[test]
fn test_notifications_from_other_characteristics_ignored() {
    let mut codec = create_codec();
    codec.connect(device_a());
    handshake(&mut codec, vec![SERVICE], vec![CHARACTERISTIC, uuid_from_u16(0x2A19)]);
    codec.take_events();

    feed(&mut codec, chunk(uuid_from_u16(0x2A19), &[0x01, b'x']));
    assert!(codec.take_events().is_empty());

    feed(&mut codec, chunk(CHARACTERISTIC, &[0x01, b'y']));
    assert_eq!(
        codec.take_events().as_slice(),
        &[FrameEvent::MessageReceived(b"y".to_vec())]
    );
}

#[test]
fn test_service_failure_after_ready() {
    let mut codec = create_codec();
    codec.connect(device_a());
    handshake(&mut codec, vec![SERVICE], vec![CHARACTERISTIC]);
    codec.take_events();

    feed(
        &mut codec,
        LinkEvent::ServiceFailed {
            description: "write rejected".to_string(),
        },
    );
    assert_eq!(
        codec.take_events().as_slice(),
        &[
            FrameEvent::Error {
                kind: ErrorKind::ServiceError,
                description: "Service error: write rejected".to_string(),
            },
            FrameEvent::Disconnected,
        ]
    );
}

#[test]
fn test_configuration_changes_published() {
    let mut codec = FrameCodec::new(ConnectionManager::new(MockLink::new()));
    codec.set_service_uuid(SERVICE);
    codec.set_service_uuid(SERVICE);
    codec.set_characteristic_uuid(CHARACTERISTIC);

    assert_eq!(
        codec.take_events().as_slice(),
        &[
            FrameEvent::ServiceUuidChanged(SERVICE),
            FrameEvent::CharacteristicUuidChanged(CHARACTERISTIC),
        ]
    );
    assert_eq!(codec.service_uuid(), SERVICE);
    assert_eq!(codec.characteristic_uuid(), CHARACTERISTIC);
}

#[test]
fn test_reconfigure_mid_handshake_keeps_attempt_targets() {
    let other_service = uuid_from_u16(0xABCD);
    let other_characteristic = uuid_from_u16(0x9999);

    let mut codec = create_codec();
    codec.connect(device_a());
    feed(&mut codec, LinkEvent::LinkUp);
    codec.configure(other_service, other_characteristic);

    feed(
        &mut codec,
        LinkEvent::ServicesDiscovered {
            services: vec![SERVICE],
        },
    );
    assert_eq!(codec.state(), ConnectionState::DiscoveringCharacteristic);

    feed(
        &mut codec,
        LinkEvent::DetailsDiscovered {
            characteristics: vec![CHARACTERISTIC],
        },
    );
    assert_eq!(codec.state(), ConnectionState::Ready);
    assert_eq!(
        codec.take_events().as_slice(),
        &[
            FrameEvent::Connected,
            FrameEvent::ServiceUuidChanged(other_service),
            FrameEvent::CharacteristicUuidChanged(other_characteristic),
            FrameEvent::Ready,
        ]
    );

    let generation = codec.manager().generation();
    assert!(codec
        .manager()
        .link()
        .requests()
        .contains(&LinkRequest::DiscoverDetails {
            generation,
            service: SERVICE,
            characteristic: CHARACTERISTIC,
        }));

    codec.send_message(b"hi").unwrap();
    assert_eq!(
        codec.manager().link().requests().last(),
        Some(&LinkRequest::Write {
            generation,
            characteristic: CHARACTERISTIC,
            data: vec![0x02, b'h', b'i'],
        })
    );
}

#[test]
fn test_reconfigured_targets_apply_to_next_connect() {
    let other_service = uuid_from_u16(0xABCD);

    let mut codec = create_codec();
    codec.connect(device_a());
    handshake(&mut codec, vec![SERVICE], vec![CHARACTERISTIC]);
    codec.set_service_uuid(other_service);
    codec.take_events();

    codec.connect(device_a());
    feed(&mut codec, LinkEvent::LinkUp);
    feed(
        &mut codec,
        LinkEvent::ServicesDiscovered {
            services: vec![SERVICE],
        },
    );

    assert_eq!(codec.state(), ConnectionState::Idle);
    assert!(codec.take_events().iter().any(|event| matches!(
        event,
        FrameEvent::Error {
            kind: ErrorKind::ServiceError,
            ..
        }
    )));
}
