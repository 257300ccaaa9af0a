use log::{debug, info};

use super::hold::{Hold, HoldTable};
use super::interface::{AvatarPoseSource, ObjectSimulation};
use crate::authority::{Decision, should_apply_update};
use crate::config::ReplicationConfig;
use crate::constants::{
    MAX_CLIENTS, NUM_CUBES, SERVER_SLOT, TICK_RATE, authority_index_for_slot,
};
use crate::net::connection::ConnectionData;
use crate::net::jitter::JitterEntry;
use crate::net::protocol::{Packet, PacketError, StateUpdatePacket};
use crate::net::sequence::Sequence;
use crate::state::{AvatarState, Hand, HeldObject, ObjectState, QuantizedAvatarState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client { slot: usize },
}

impl Role {
    pub fn local_slot(self) -> usize {
        match self {
            Role::Server => SERVER_SLOT,
            Role::Client { slot } => slot,
        }
    }

    pub fn is_server(self) -> bool {
        matches!(self, Role::Server)
    }
}

/// Durable per-object bookkeeping. Motion is overwritten every capture; the
/// authority fields persist.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectRecord {
    pub state: ObjectState,
    pub confirmed: bool,
    pub resting_frames: u32,
}

/// All replication state owned by one peer.
#[derive(Debug)]
pub struct SimulationContext {
    role: Role,
    config: ReplicationConfig,
    frame_number: u32,
    reset_sequence: u16,
    avatar_sample_time_offset: f32,
    objects: Vec<ObjectRecord>,
    holds: HoldTable,
    avatars: [Option<AvatarState>; MAX_CLIENTS],
    connections: [Option<ConnectionData>; MAX_CLIENTS],
}

impl SimulationContext {
    pub fn new(role: Role, config: ReplicationConfig) -> Self {
        Self {
            role,
            config,
            frame_number: 0,
            reset_sequence: 0,
            avatar_sample_time_offset: 0.0,
            objects: vec![ObjectRecord::default(); NUM_CUBES],
            holds: HoldTable::new(NUM_CUBES),
            avatars: Default::default(),
            connections: Default::default(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn local_slot(&self) -> usize {
        self.role.local_slot()
    }

    pub fn local_authority_index(&self) -> u8 {
        authority_index_for_slot(self.local_slot())
    }

    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    pub fn reset_sequence(&self) -> u16 {
        self.reset_sequence
    }

    pub fn object(&self, id: usize) -> Option<&ObjectRecord> {
        self.objects.get(id)
    }

    pub fn holds(&self) -> &HoldTable {
        &self.holds
    }

    pub fn avatar(&self, slot: usize) -> Option<&AvatarState> {
        self.avatars.get(slot)?.as_ref()
    }

    pub fn connection(&self, slot: usize) -> Option<&ConnectionData> {
        self.connections.get(slot)?.as_ref()
    }

    pub fn is_connected(&self, slot: usize) -> bool {
        self.connection(slot).is_some()
    }

    pub fn connected_slots(&self) -> Vec<usize> {
        (0..MAX_CLIENTS).filter(|&slot| self.is_connected(slot)).collect()
    }

    pub fn advance_frame(&mut self) {
        self.frame_number = self.frame_number.wrapping_add(1);
    }

    pub fn connect_peer(&mut self, slot: usize, now: f64) {
        if slot >= MAX_CLIENTS || slot == self.local_slot() {
            return;
        }
        info!("slot {slot} connected");
        self.connections[slot] = Some(ConnectionData::new(slot, &self.config, now));
    }

    /// Tears down the link to `slot`. On the server the peer's objects go
    /// back to default authority and its holds are released.
    pub fn disconnect_peer(&mut self, slot: usize) {
        if slot >= MAX_CLIENTS || self.connections[slot].take().is_none() {
            return;
        }
        info!("slot {slot} disconnected");
        self.avatars[slot] = None;

        if !self.role.is_server() {
            self.clear_authority();
            return;
        }

        for id in self.holds.held_by(slot) {
            self.holds.clear(id);
            let state = &mut self.objects[id].state;
            state.ownership_sequence = state.ownership_sequence.next();
        }
        let index = authority_index_for_slot(slot);
        for record in &mut self.objects {
            if record.state.authority_index == index {
                record.state.authority_index = 0;
                record.state.authority_sequence = record.state.authority_sequence.next();
                record.confirmed = true;
            }
        }
    }

    /// Slots whose peer has been silent longer than the configured timeout.
    /// Each one is disconnected.
    pub fn check_timeouts(&mut self, now: f64) -> Vec<usize> {
        let timeout = self.config.connection_timeout_secs;
        let timed_out: Vec<usize> = (0..MAX_CLIENTS)
            .filter(|&slot| {
                self.connections[slot]
                    .as_ref()
                    .is_some_and(|c| c.is_timed_out(now, timeout))
            })
            .collect();
        for &slot in &timed_out {
            info!("slot {slot} timed out");
            self.disconnect_peer(slot);
        }
        timed_out
    }

    /// Starts a new epoch. Every baseline on every link becomes unusable.
    pub fn reset(&mut self) {
        self.reset_sequence = self.reset_sequence.next();
        info!("simulation reset, epoch {}", self.reset_sequence);
        self.reset_links();
    }

    fn adopt_reset(&mut self, reset_sequence: u16) {
        debug!(
            "adopting epoch {reset_sequence} (was {})",
            self.reset_sequence
        );
        self.reset_sequence = reset_sequence;
        self.reset_links();
    }

    fn reset_links(&mut self) {
        for connection in self.connections.iter_mut().flatten() {
            connection.reset();
        }
        self.clear_authority();
    }

    fn clear_authority(&mut self) {
        self.holds.clear_all();
        for record in &mut self.objects {
            *record = ObjectRecord::default();
        }
    }

    pub fn avatar_sample_time_offset(&self) -> f32 {
        self.avatar_sample_time_offset
    }

    /// Sub-frame offset of the local avatar sample, sent in every packet
    /// header.
    pub fn set_avatar_sample_time_offset(&mut self, offset: f32) {
        self.avatar_sample_time_offset = offset;
    }

    pub fn set_local_avatar(&mut self, mut avatar: AvatarState) {
        avatar.client_index = self.local_slot();
        let slot = self.local_slot();
        self.avatars[slot] = Some(avatar);
    }

    /// Pulls the current state of every object from `sim`, keeping the
    /// authority fields from the record.
    pub fn capture(&mut self, sim: &mut impl ObjectSimulation) {
        self.update_held_objects(sim);

        let count = NUM_CUBES.min(sim.object_count());
        let is_server = self.role.is_server();
        for id in 0..count {
            let record = &mut self.objects[id];
            let mut state = sim.capture_object_state(id).with_authority_of(&record.state);
            if self.holds.is_held(id) {
                state.active = true;
            }
            state.canonicalize();
            record.state = state;

            let releasable =
                is_server && state.authority_index != 0 && !state.active && !self.holds.is_held(id);
            if !releasable {
                record.resting_frames = 0;
                continue;
            }
            record.resting_frames += 1;
            if record.resting_frames >= self.config.authority_release_frames {
                debug!("object {id} at rest, returning to default authority");
                record.state.authority_index = 0;
                record.state.authority_sequence = record.state.authority_sequence.next();
                record.resting_frames = 0;
                record.confirmed = true;
            }
        }
    }

    fn update_held_objects(&self, sim: &mut impl ObjectSimulation) {
        for (id, hold) in self.holds.iter() {
            let Some(avatar) = &self.avatars[hold.slot] else {
                continue;
            };
            let hand = avatar.hand(hold.hand);
            let position = hand.position + hand.rotation * hold.local_position;
            let rotation = (hand.rotation * hold.local_rotation).normalize();
            sim.set_held_transform(id, position, rotation);
        }
    }

    /// Takes local authority over `id`, as when the local player hits it.
    pub fn claim_authority(&mut self, id: usize) -> bool {
        let local_slot = self.local_slot();
        if id >= NUM_CUBES || self.holds.get(id).is_some_and(|h| h.slot != local_slot) {
            return false;
        }
        let local_index = self.local_authority_index();
        let record = &mut self.objects[id];
        if record.state.authority_index == local_index {
            return true;
        }
        record.state.authority_index = local_index;
        record.state.authority_sequence = record.state.authority_sequence.next();
        record.confirmed = self.role.is_server();
        record.resting_frames = 0;
        debug!("claimed authority over object {id}");
        true
    }

    /// Picks `id` up in `hand` of the local avatar.
    pub fn grab(&mut self, id: usize, hand: Hand) -> bool {
        let local_slot = self.local_slot();
        if id >= NUM_CUBES || self.holds.is_held(id) {
            return false;
        }
        let Some(avatar) = &self.avatars[local_slot] else {
            return false;
        };
        let hand_state = avatar.hand(hand);
        let object = self.objects[id].state.to_transform();
        let inverse = hand_state.rotation.inverse();

        self.holds.set(
            id,
            Hold {
                slot: local_slot,
                hand,
                local_position: inverse * (object.position - hand_state.position),
                local_rotation: (inverse * object.rotation).normalize(),
            },
        );

        let local_index = self.local_authority_index();
        let record = &mut self.objects[id];
        record.state.ownership_sequence = record.state.ownership_sequence.next();
        record.state.authority_index = local_index;
        record.confirmed = self.role.is_server();
        record.resting_frames = 0;
        debug!("grabbed object {id} with {hand:?} hand");
        true
    }

    /// Lets go of `id` if the local avatar holds it. Authority stays local
    /// until the object comes to rest.
    pub fn release(&mut self, id: usize) -> bool {
        let local_slot = self.local_slot();
        if !self.holds.get(id).is_some_and(|h| h.slot == local_slot) {
            return false;
        }
        self.holds.clear(id);
        let record = &mut self.objects[id];
        record.state.ownership_sequence = record.state.ownership_sequence.next();
        record.confirmed = self.role.is_server();
        debug!("released object {id}");
        true
    }

    fn outgoing_avatars(&self, peer: usize) -> Vec<QuantizedAvatarState> {
        let local_slot = self.local_slot();
        (0..MAX_CLIENTS)
            .filter(|&slot| slot != peer && (self.role.is_server() || slot == local_slot))
            .filter_map(|slot| {
                let mut avatar = self.avatars[slot]?;
                for hand in Hand::ALL {
                    avatar.hand_mut(hand).held = self.holds.find(slot, hand).and_then(|id| {
                        let hold = self.holds.get(id)?;
                        let state = &self.objects[id].state;
                        Some(HeldObject {
                            object_id: id,
                            local_position: hold.local_position,
                            local_rotation: hold.local_rotation,
                            authority_sequence: state.authority_sequence,
                            ownership_sequence: state.ownership_sequence,
                        })
                    });
                }
                Some(QuantizedAvatarState::from_avatar(&avatar))
            })
            .collect()
    }

    fn send_weight(&self, record: &ObjectRecord) -> u32 {
        let weights = &self.config.priority;
        if !record.confirmed && record.state.authority_index == self.local_authority_index() {
            weights.unconfirmed_claim
        } else if record.state.active {
            weights.active
        } else {
            weights.resting
        }
    }

    /// Builds the next state update for `peer`. Servers send every object,
    /// clients only those they have authority over.
    pub fn write_state_update(&mut self, peer: usize, now: f64) -> Result<Vec<u8>, PacketError> {
        if peer >= MAX_CLIENTS || self.connections[peer].is_none() {
            return Err(PacketError::UnknownPeer(peer));
        }

        let local_index = self.local_authority_index();
        let candidates: Vec<usize> = (0..NUM_CUBES)
            .filter(|&id| {
                self.role.is_server() || self.objects[id].state.authority_index == local_index
            })
            .collect();
        let weights: Vec<u32> = candidates
            .iter()
            .map(|&id| self.send_weight(&self.objects[id]))
            .collect();
        let avatars = self.outgoing_avatars(peer);

        let Some(connection) = self.connections[peer].as_mut() else {
            return Err(PacketError::UnknownPeer(peer));
        };
        for (&id, &weight) in candidates.iter().zip(&weights) {
            connection.accumulate_priority(id, weight);
        }
        let selected = connection.select_objects(&candidates, self.config.max_state_updates);

        let header = connection.next_header(
            self.frame_number,
            self.reset_sequence,
            self.avatar_sample_time_offset,
        );
        let sent: Vec<(usize, ObjectState)> = selected
            .iter()
            .map(|&id| (id, self.objects[id].state))
            .collect();
        let objects = sent
            .iter()
            .map(|(id, state)| connection.encode_object(*id, state, &header))
            .collect();

        let bytes = Packet::StateUpdate(StateUpdatePacket {
            header,
            avatars,
            objects,
        })
        .serialize()?;
        connection.record_sent(&header, &sent, bytes.len(), now);
        Ok(bytes)
    }

    pub fn process_packet(
        &mut self,
        from: usize,
        bytes: &[u8],
        now: f64,
        sim: &mut impl ObjectSimulation,
    ) -> Result<(), PacketError> {
        match Packet::deserialize(bytes)? {
            Packet::StateUpdate(packet) => {
                self.process_state_update(from, &packet, bytes.len(), now, sim)
            }
            other => Err(PacketError::UnexpectedPacket(other.packet_type())),
        }
    }

    /// Decodes one state update from `from`. Either every object resolves
    /// and the packet is acked and applied (or buffered), or nothing changes.
    pub fn process_state_update(
        &mut self,
        from: usize,
        packet: &StateUpdatePacket,
        bytes: usize,
        now: f64,
        sim: &mut impl ObjectSimulation,
    ) -> Result<(), PacketError> {
        let header = &packet.header;
        if from >= MAX_CLIENTS || self.connections[from].is_none() {
            return Err(PacketError::UnknownPeer(from));
        }

        if header.reset_sequence != self.reset_sequence {
            let newer_epoch = !self.role.is_server()
                && from == SERVER_SLOT
                && header.reset_sequence.greater_than(self.reset_sequence);
            if !newer_epoch {
                return Err(PacketError::ResetMismatch {
                    expected: self.reset_sequence,
                    received: header.reset_sequence,
                });
            }
            self.adopt_reset(header.reset_sequence);
        }

        let Some(connection) = self.connections[from].as_mut() else {
            return Err(PacketError::UnknownPeer(from));
        };
        connection.check_incoming(header)?;
        let objects = connection.resolve_update(packet)?;
        connection.process_acks(header, now);
        connection.record_received(header, &objects, bytes, now);

        let entry = JitterEntry {
            frame_number: header.frame_number,
            avatar_sample_time_offset: header.avatar_sample_time_offset,
            avatars: packet.avatars.iter().map(|a| a.to_avatar()).collect(),
            objects,
        };

        if connection.jitter.delay_frames() == 0 {
            self.apply_entry(from, &entry, sim);
        } else {
            connection.buffer_entry(entry);
        }
        Ok(())
    }

    /// Plays out one buffered frame per link and hands interpolated remote
    /// avatars to `poses`.
    pub fn advance_jitter(
        &mut self,
        sim: &mut impl ObjectSimulation,
        poses: &mut impl AvatarPoseSource,
    ) {
        let dt = 1.0 / TICK_RATE as f64;
        let local_slot = self.local_slot();

        for slot in 0..MAX_CLIENTS {
            let Some(connection) = self.connections[slot].as_mut() else {
                continue;
            };
            if connection.jitter.delay_frames() == 0 {
                continue;
            }
            let entry = connection.jitter.advance();
            let avatars = connection.jitter.get_interpolated_avatar_state(dt);

            if let Some(entry) = entry {
                self.apply_entry(slot, &entry, sim);
            }
            for avatar in avatars.iter().filter(|a| a.client_index != local_slot) {
                poses.apply_avatar_pose(avatar);
            }
        }

        if self.config.jitter_delay_frames == 0 {
            for avatar in self.avatars.iter().flatten() {
                if avatar.client_index != local_slot {
                    poses.apply_avatar_pose(avatar);
                }
            }
        }
    }

    fn apply_entry(&mut self, from: usize, entry: &JitterEntry, sim: &mut impl ObjectSimulation) {
        let local_slot = self.local_slot();
        for avatar in &entry.avatars {
            if avatar.client_index == local_slot || avatar.client_index >= MAX_CLIENTS {
                continue;
            }
            // a client only speaks for its own avatar
            if self.role.is_server() && avatar.client_index != from {
                continue;
            }
            self.apply_remote_avatar(from, avatar);
        }
        for (id, incoming) in &entry.objects {
            self.apply_object_update(from, *id, incoming, sim);
        }
    }

    fn apply_remote_avatar(&mut self, from: usize, avatar: &AvatarState) {
        let slot = avatar.client_index;
        let local_slot = self.local_slot();

        for hand in Hand::ALL {
            let declared = avatar.hand(hand).held.filter(|held| held.object_id < NUM_CUBES);
            if let Some(previous) = self.holds.find(slot, hand)
                && declared.is_none_or(|held| held.object_id != previous)
            {
                self.holds.clear(previous);
            }

            let Some(held) = declared else {
                continue;
            };
            let id = held.object_id;
            let incoming = ObjectState {
                authority_index: authority_index_for_slot(slot),
                authority_sequence: held.authority_sequence,
                ownership_sequence: held.ownership_sequence,
                ..Default::default()
            };
            let record = &mut self.objects[id];
            match should_apply_update(&record.state, &incoming, true, from, local_slot) {
                Decision::Apply => {
                    record.state = record.state.with_authority_of(&incoming);
                    record.confirmed = true;
                    record.resting_frames = 0;
                    self.holds.set(
                        id,
                        Hold {
                            slot,
                            hand,
                            local_position: held.local_position,
                            local_rotation: held.local_rotation,
                        },
                    );
                }
                Decision::Confirm => record.confirmed = true,
                Decision::Reject => {
                    debug!("rejected hold of object {id} by slot {slot}");
                }
            }
        }

        self.avatars[slot] = Some(*avatar);
    }

    fn apply_object_update(
        &mut self,
        from: usize,
        id: usize,
        incoming: &ObjectState,
        sim: &mut impl ObjectSimulation,
    ) {
        if id >= NUM_CUBES {
            return;
        }
        let local_slot = self.local_slot();
        let record = &mut self.objects[id];
        match should_apply_update(&record.state, incoming, false, from, local_slot) {
            Decision::Apply => {
                if self
                    .holds
                    .get(id)
                    .is_some_and(|h| authority_index_for_slot(h.slot) != incoming.authority_index)
                {
                    self.holds.clear(id);
                }
                record.state = *incoming;
                record.confirmed = true;
                record.resting_frames = 0;
                sim.apply_object_state(id, incoming, true);
            }
            Decision::Confirm => {
                if !record.confirmed {
                    debug!("authority over object {id} confirmed");
                }
                record.confirmed = true;
            }
            Decision::Reject => {}
        }
    }
}
