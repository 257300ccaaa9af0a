//! Replication scenarios run through the codec and through pairs of
//! simulation contexts exchanging real packets.

mod common;

use common::{StillAvatar, TestWorld};
use cubesync::constants::MAX_PACKET_SIZE;
use cubesync::net::{
    Baseline, BitReader, BitWriter, EncodingTier, ObjectEncoding, ObjectUpdate, Packet, PacketError,
    StateUpdatePacket,
};
use cubesync::simulation::{Role, SimulationContext};
use cubesync::state::{Hand, ObjectDelta, ObjectState, QuantizedRotation, predict};
use cubesync::{NUM_CUBES, ReplicationConfig, SERVER_SLOT};
use glam::Quat;

fn immediate() -> ReplicationConfig {
    ReplicationConfig {
        jitter_delay_frames: 0,
        ..Default::default()
    }
}

fn linked() -> (SimulationContext, SimulationContext) {
    let mut server = SimulationContext::new(Role::Server, immediate());
    let mut client = SimulationContext::new(Role::Client { slot: 1 }, immediate());
    server.connect_peer(1, 0.0);
    client.connect_peer(SERVER_SLOT, 0.0);
    (server, client)
}

fn decode(bytes: &[u8]) -> StateUpdatePacket {
    match Packet::deserialize(bytes).unwrap() {
        Packet::StateUpdate(packet) => packet,
        other => panic!("expected state update, got {:?}", other.packet_type()),
    }
}

fn tier_of(packet: &StateUpdatePacket, id: usize) -> EncodingTier {
    packet
        .objects
        .iter()
        .find(|update| update.id as usize == id)
        .map(|update| update.encoding.tier())
        .unwrap()
}

fn encoded_bits(update: &ObjectUpdate, sequence: u16) -> usize {
    let mut writer = BitWriter::new(MAX_PACKET_SIZE);
    update.write(&mut writer, sequence).unwrap();
    writer.bits_written()
}

fn roundtrip(update: &ObjectUpdate, sequence: u16) -> ObjectUpdate {
    let mut writer = BitWriter::new(MAX_PACKET_SIZE);
    update.write(&mut writer, sequence).unwrap();
    let bytes = writer.finish();
    ObjectUpdate::read(&mut BitReader::new(&bytes), sequence).unwrap()
}

fn update(state: &ObjectState, encoding: ObjectEncoding) -> ObjectUpdate {
    ObjectUpdate {
        id: 0,
        authority_index: state.authority_index,
        ownership_sequence: state.ownership_sequence,
        authority_sequence: state.authority_sequence,
        encoding,
    }
}

/// Server to client, then the client's reply so the server sees the ack.
fn round_trip(
    server: &mut SimulationContext,
    client: &mut SimulationContext,
    server_world: &mut TestWorld,
    client_world: &mut TestWorld,
    now: f64,
) -> StateUpdatePacket {
    server.capture(server_world);
    let bytes = server.write_state_update(1, now).unwrap();
    client
        .process_packet(SERVER_SLOT, &bytes, now, client_world)
        .unwrap();

    client.capture(client_world);
    let reply = client.write_state_update(SERVER_SLOT, now).unwrap();
    server.process_packet(1, &reply, now, server_world).unwrap();
    decode(&bytes)
}

#[test]
fn test_resting_object_encodes_as_not_changed() {
    let resting = ObjectState {
        position: [300, 256, -40],
        rotation: QuantizedRotation::from_quat(Quat::from_rotation_y(1.0)),
        ..Default::default()
    };
    let baseline = Baseline {
        sequence: 40,
        frame_number: 400,
        state: resting,
    };

    let encoding = ObjectEncoding::choose(&resting, Some(&baseline), 41, 401);
    assert_eq!(encoding.tier(), EncodingTier::NotChanged);

    let sent = update(&resting, encoding);
    let received = roundtrip(&sent, 41);
    assert_eq!(received, sent);
    let decoded = received.encoding.reconstruct(Some(&baseline), 401).unwrap();
    assert_eq!(decoded, resting);

    let absolute = update(&resting, ObjectEncoding::choose(&resting, None, 41, 401));
    assert!(encoded_bits(&sent, 41) < encoded_bits(&absolute, 41));
}

#[test]
fn test_free_fall_uses_predictor() {
    let start = ObjectState {
        active: true,
        position: [0, 4096, 0],
        linear_velocity: [300, 0, -100],
        angular_velocity: [0, 200, 0],
        ..Default::default()
    };
    let baseline = Baseline {
        sequence: 7,
        frame_number: 100,
        state: start,
    };

    let exact = predict(&start, 10);
    let encoding = ObjectEncoding::choose(&exact, Some(&baseline), 9, 110);
    assert_eq!(encoding.tier(), EncodingTier::PerfectPrediction);
    assert_eq!(encoding.reconstruct(Some(&baseline), 110), Some(exact));

    let mut nudged = exact;
    nudged.position[0] += 3;
    nudged.linear_velocity[1] -= 5;
    let encoding = ObjectEncoding::choose(&nudged, Some(&baseline), 9, 110);
    assert_eq!(encoding.tier(), EncodingTier::PredictionDelta);

    let sent = update(&nudged, encoding);
    let received = roundtrip(&sent, 9);
    assert_eq!(received.encoding.reconstruct(Some(&baseline), 110), Some(nudged));

    let baseline_delta = update(
        &nudged,
        ObjectEncoding::BaselineDelta {
            baseline: 7,
            active: true,
            rotation: nudged.rotation,
            delta: ObjectDelta::between(&nudged, &start),
        },
    );
    assert!(encoded_bits(&sent, 9) < encoded_bits(&baseline_delta, 9));
}

#[test]
fn test_prediction_too_far_off_falls_back_to_baseline_delta() {
    let start = ObjectState {
        active: true,
        position: [0, 4096, 0],
        ..Default::default()
    };
    let baseline = Baseline {
        sequence: 1,
        frame_number: 0,
        state: start,
    };
    let mut current = predict(&start, 5);
    current.position[0] += 2000;

    let encoding = ObjectEncoding::choose(&current, Some(&baseline), 2, 5);
    assert_eq!(encoding.tier(), EncodingTier::BaselineDelta);
    assert_eq!(encoding.reconstruct(Some(&baseline), 5), Some(current));
}

#[test]
fn test_stale_baseline_is_never_used() {
    let state = ObjectState::default();
    let baseline = Baseline {
        sequence: 0,
        frame_number: 0,
        state,
    };
    assert_eq!(
        ObjectEncoding::choose(&state, Some(&baseline), 256, 1).tier(),
        EncodingTier::Absolute
    );
    assert_eq!(
        ObjectEncoding::choose(&state, Some(&baseline), 1, 256).tier(),
        EncodingTier::Absolute
    );
    assert_eq!(
        ObjectEncoding::choose(&state, Some(&baseline), 255, 255).tier(),
        EncodingTier::NotChanged
    );
}

#[test]
fn test_context_resting_world_settles_into_not_changed() {
    let (mut server, mut client) = linked();
    let mut server_world = TestWorld::new();
    let mut client_world = TestWorld::empty();

    let first = round_trip(&mut server, &mut client, &mut server_world, &mut client_world, 0.0);
    assert!(first
        .objects
        .iter()
        .all(|u| u.encoding.tier() == EncodingTier::Absolute));

    let second = round_trip(&mut server, &mut client, &mut server_world, &mut client_world, 0.1);
    assert_eq!(second.objects.len(), NUM_CUBES);
    for id in 0..NUM_CUBES {
        assert_eq!(tier_of(&second, id), EncodingTier::NotChanged);
        assert_eq!(client.object(id).unwrap().state, server.object(id).unwrap().state);
        assert_eq!(client_world.states[id], server.object(id).unwrap().state.motion());
    }
}

#[test]
fn test_context_free_fall_is_perfectly_predicted() {
    let (mut server, mut client) = linked();
    let mut server_world = TestWorld::new();
    let mut client_world = TestWorld::empty();
    let start = ObjectState {
        active: true,
        position: [0, 6000, 0],
        linear_velocity: [256, 0, 0],
        ..Default::default()
    };

    for frame in 0..20u32 {
        server_world.states[0] = predict(&start, frame);
        let packet = round_trip(
            &mut server,
            &mut client,
            &mut server_world,
            &mut client_world,
            frame as f64 / 60.0,
        );
        if frame >= 1 {
            assert_eq!(tier_of(&packet, 0), EncodingTier::PerfectPrediction, "frame {frame}");
        }
        assert_eq!(client.object(0).unwrap().state, server.object(0).unwrap().state);
        server.advance_frame();
        client.advance_frame();
    }
}

#[test]
fn test_client_claim_round_trip() {
    let (mut server, mut client) = linked();
    let mut server_world = TestWorld::new();
    let mut client_world = TestWorld::empty();
    round_trip(&mut server, &mut client, &mut server_world, &mut client_world, 0.0);

    // client knocks object 12 and claims it
    assert!(client.claim_authority(12));
    client_world.nudge(12, 40);
    client.capture(&mut client_world);
    let bytes = client.write_state_update(SERVER_SLOT, 0.1).unwrap();
    let claim = decode(&bytes);
    assert_eq!(claim.objects.len(), 1);
    assert_eq!(claim.objects[0].authority_index, 2);

    server.process_packet(1, &bytes, 0.1, &mut server_world).unwrap();
    assert_eq!(server.object(12).unwrap().state.authority_index, 2);
    assert_eq!(server_world.states[12], client.object(12).unwrap().state.motion());

    server.capture(&mut server_world);
    let bytes = server.write_state_update(1, 0.2).unwrap();
    let echo = decode(&bytes);
    let entry = echo.objects.iter().find(|u| u.id == 12).unwrap();
    assert_eq!(entry.authority_index, 2);
    assert_eq!(entry.authority_sequence, 1);

    assert!(!client.object(12).unwrap().confirmed);
    let applied_before = client_world.applied;
    client
        .process_packet(SERVER_SLOT, &bytes, 0.2, &mut client_world)
        .unwrap();
    assert!(client.object(12).unwrap().confirmed);
    // confirmation does not overwrite the client's own simulation
    assert_eq!(client_world.applied - applied_before, NUM_CUBES - 1);
}

#[test]
fn test_competing_claims_resolve_to_one_owner() {
    let mut server = SimulationContext::new(Role::Server, immediate());
    let mut a = SimulationContext::new(Role::Client { slot: 1 }, immediate());
    let mut b = SimulationContext::new(Role::Client { slot: 2 }, immediate());
    server.connect_peer(1, 0.0);
    server.connect_peer(2, 0.0);
    a.connect_peer(SERVER_SLOT, 0.0);
    b.connect_peer(SERVER_SLOT, 0.0);
    let mut world = TestWorld::new();
    let mut world_a = TestWorld::new();
    let mut world_b = TestWorld::new();

    a.claim_authority(3);
    b.claim_authority(3);
    let from_a = a.write_state_update(SERVER_SLOT, 0.0).unwrap();
    let from_b = b.write_state_update(SERVER_SLOT, 0.0).unwrap();
    server.process_packet(1, &from_a, 0.0, &mut world).unwrap();
    server.process_packet(2, &from_b, 0.0, &mut world).unwrap();
    assert_eq!(server.object(3).unwrap().state.authority_index, 2);

    server.capture(&mut world);
    let to_a = server.write_state_update(1, 0.1).unwrap();
    let to_b = server.write_state_update(2, 0.1).unwrap();
    a.process_packet(SERVER_SLOT, &to_a, 0.1, &mut world_a).unwrap();
    b.process_packet(SERVER_SLOT, &to_b, 0.1, &mut world_b).unwrap();

    assert!(a.object(3).unwrap().confirmed);
    assert_eq!(b.object(3).unwrap().state.authority_index, 2);
}

#[test]
fn test_grab_travels_with_avatar() {
    let (mut server, mut client) = linked();
    let mut server_world = TestWorld::new();
    let mut client_world = TestWorld::empty();
    round_trip(&mut server, &mut client, &mut server_world, &mut client_world, 0.0);

    let mut poses = StillAvatar::new(1);
    client.set_local_avatar(poses.pose.unwrap());
    assert!(client.grab(9, Hand::Left));
    client.capture(&mut client_world);

    let bytes = client.write_state_update(SERVER_SLOT, 0.1).unwrap();
    let packet = decode(&bytes);
    assert_eq!(packet.avatars.len(), 1);
    let held = packet.avatars[0].hands[Hand::Left.index()].held.unwrap();
    assert_eq!(held.object_id, 9);
    assert_eq!(held.ownership_sequence, 1);

    server.process_packet(1, &bytes, 0.1, &mut server_world).unwrap();
    let hold = server.holds().get(9).copied().unwrap();
    assert_eq!((hold.slot, hold.hand), (1, Hand::Left));
    assert_eq!(server.object(9).unwrap().state.authority_index, 2);
    assert_eq!(server.object(9).unwrap().state.ownership_sequence, 1);

    server.advance_jitter(&mut server_world, &mut poses);
    server.capture(&mut server_world);
    assert!(server.object(9).unwrap().state.active);

    assert!(client.release(9));
    let bytes = client.write_state_update(SERVER_SLOT, 0.2).unwrap();
    server.process_packet(1, &bytes, 0.2, &mut server_world).unwrap();
    assert!(!server.holds().is_held(9));
    assert_eq!(server.object(9).unwrap().state.ownership_sequence, 2);
}

#[test]
fn test_lost_baseline_drops_whole_packet() {
    let (mut server, mut client) = linked();
    let mut server_world = TestWorld::new();
    let mut client_world = TestWorld::empty();
    round_trip(&mut server, &mut client, &mut server_world, &mut client_world, 0.0);

    // a client that never saw the first packet
    let mut fresh = SimulationContext::new(Role::Client { slot: 1 }, immediate());
    let mut fresh_world = TestWorld::empty();
    fresh.connect_peer(SERVER_SLOT, 0.0);

    server.capture(&mut server_world);
    let bytes = server.write_state_update(1, 0.1).unwrap();
    let result = fresh.process_packet(SERVER_SLOT, &bytes, 0.1, &mut fresh_world);
    assert!(matches!(result, Err(PacketError::MissingBaseline { .. })));
    assert_eq!(fresh_world.applied, 0);
    assert_eq!(fresh.connection(SERVER_SLOT).unwrap().stats.packets_received, 0);
}

#[test]
fn test_reset_starts_new_epoch_on_both_ends() {
    let (mut server, mut client) = linked();
    let mut server_world = TestWorld::new();
    let mut client_world = TestWorld::empty();
    round_trip(&mut server, &mut client, &mut server_world, &mut client_world, 0.0);
    assert!(client.claim_authority(5));
    let stale = client.write_state_update(SERVER_SLOT, 0.1).unwrap();

    server.reset();
    let result = server.process_packet(1, &stale, 0.1, &mut server_world);
    assert!(matches!(result, Err(PacketError::ResetMismatch { expected: 1, received: 0 })));
    assert_eq!(server.object(5).unwrap().state.authority_index, 0);

    server.capture(&mut server_world);
    let bytes = server.write_state_update(1, 0.2).unwrap();
    let packet = decode(&bytes);
    assert_eq!(packet.header.reset_sequence, 1);
    // old baselines are gone, so everything goes out whole
    assert!(packet
        .objects
        .iter()
        .all(|u| u.encoding.tier() == EncodingTier::Absolute));

    client
        .process_packet(SERVER_SLOT, &bytes, 0.2, &mut client_world)
        .unwrap();
    assert_eq!(client.reset_sequence(), 1);
    assert_eq!(client.object(5).unwrap().state.authority_index, 0);

    let reply = client.write_state_update(SERVER_SLOT, 0.2).unwrap();
    server.process_packet(1, &reply, 0.2, &mut server_world).unwrap();
    let packet = round_trip(&mut server, &mut client, &mut server_world, &mut client_world, 0.3);
    assert_eq!(tier_of(&packet, 0), EncodingTier::NotChanged);
}

#[test]
fn test_avatar_sample_time_offset_reaches_jitter_buffer() {
    let mut server = SimulationContext::new(Role::Server, immediate());
    let mut client = SimulationContext::new(Role::Client { slot: 1 }, ReplicationConfig::default());
    server.connect_peer(1, 0.0);
    client.connect_peer(SERVER_SLOT, 0.0);
    let mut server_world = TestWorld::new();
    let mut client_world = TestWorld::empty();

    server.set_avatar_sample_time_offset(0.25);
    server.set_local_avatar(StillAvatar::new(SERVER_SLOT).pose.unwrap());
    server.capture(&mut server_world);
    let bytes = server.write_state_update(1, 0.0).unwrap();
    let packet = decode(&bytes);
    assert_eq!(packet.header.avatar_sample_time_offset, 0.25);

    client
        .process_packet(SERVER_SLOT, &bytes, 0.0, &mut client_world)
        .unwrap();
    let link = client.connection(SERVER_SLOT).unwrap();
    assert!(link.jitter.delay_frames() > 0);
    let entry = link.jitter.get_entry(packet.header.frame_number).unwrap();
    assert_eq!(entry.avatar_sample_time_offset, 0.25);
    assert_eq!(entry.avatars.len(), 1);
}
