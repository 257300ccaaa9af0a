use super::buffer::SequenceBuffer;
use super::delta::DeltaBuffer;
use super::encoding::{ObjectEncoding, ObjectUpdate, frame_in_window};
use super::jitter::{JitterBuffer, JitterEntry};
use super::protocol::{PacketError, PacketHeader, StateUpdatePacket};
use super::sequence::Sequence;
use super::stats::NetworkStats;
use crate::config::ReplicationConfig;
use crate::constants::{DELTA_BUFFER_SIZE, NUM_CUBES, SEQUENCE_BUFFER_SIZE};
use crate::state::ObjectState;

#[derive(Debug, Default, Clone)]
struct SentPacket {
    send_time: f64,
    acked: bool,
    object_ids: Vec<u16>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ReceivedPacket;

/// Everything one peer keeps about the peer at the other end of a link.
#[derive(Debug)]
pub struct ConnectionData {
    remote_slot: usize,
    send_sequence: u16,
    sent_packets: SequenceBuffer<u16, SentPacket>,
    received_packets: SequenceBuffer<u16, ReceivedPacket>,
    send_deltas: DeltaBuffer,
    receive_deltas: DeltaBuffer,
    acked_baselines: Vec<Option<u16>>,
    priorities: Vec<u32>,
    pub jitter: JitterBuffer,
    pub last_receive_time: f64,
    pub stats: NetworkStats,
}

impl ConnectionData {
    pub fn new(remote_slot: usize, config: &ReplicationConfig, now: f64) -> Self {
        Self {
            remote_slot,
            send_sequence: 0,
            sent_packets: SequenceBuffer::new(SEQUENCE_BUFFER_SIZE),
            received_packets: SequenceBuffer::new(SEQUENCE_BUFFER_SIZE),
            send_deltas: DeltaBuffer::new(DELTA_BUFFER_SIZE),
            receive_deltas: DeltaBuffer::new(DELTA_BUFFER_SIZE),
            acked_baselines: vec![None; NUM_CUBES],
            priorities: vec![0; NUM_CUBES],
            jitter: JitterBuffer::new(config.jitter_delay_frames),
            last_receive_time: now,
            stats: NetworkStats::default(),
        }
    }

    pub fn remote_slot(&self) -> usize {
        self.remote_slot
    }

    /// Forgets every baseline and sequence, as after a simulation reset.
    pub fn reset(&mut self) {
        self.send_sequence = 0;
        self.sent_packets.reset();
        self.received_packets.reset();
        self.send_deltas.reset();
        self.receive_deltas.reset();
        self.acked_baselines.fill(None);
        self.priorities.fill(0);
        self.jitter.reset();
    }

    pub fn is_timed_out(&self, now: f64, timeout_secs: f64) -> bool {
        now - self.last_receive_time > timeout_secs
    }

    pub fn acked_baseline(&self, id: usize) -> Option<u16> {
        self.acked_baselines.get(id).copied().flatten()
    }

    pub fn next_header(
        &mut self,
        frame_number: u32,
        reset_sequence: u16,
        avatar_sample_time_offset: f32,
    ) -> PacketHeader {
        let sequence = self.send_sequence;
        self.send_sequence = sequence.next();
        let (ack, ack_bitfield) = self.received_packets.ack_bits();
        PacketHeader {
            sequence,
            ack,
            ack_bitfield,
            frame_number,
            reset_sequence,
            avatar_sample_time_offset,
        }
    }

    pub fn accumulate_priority(&mut self, id: usize, weight: u32) {
        self.priorities[id] = self.priorities[id].saturating_add(weight);
    }

    /// Highest accumulated priority first, ties by id. Only `candidates` are
    /// considered.
    pub fn select_objects(&self, candidates: &[usize], max: usize) -> Vec<usize> {
        let mut selected = candidates.to_vec();
        selected.sort_by(|&a, &b| self.priorities[b].cmp(&self.priorities[a]).then(a.cmp(&b)));
        selected.truncate(max);
        selected.sort_unstable();
        selected
    }

    /// Encodes `state` against the most recent baseline the remote acked.
    pub fn encode_object(
        &self,
        id: usize,
        state: &ObjectState,
        header: &PacketHeader,
    ) -> ObjectUpdate {
        let baseline = self
            .acked_baseline(id)
            .and_then(|sequence| {
                self.send_deltas
                    .get_object_state(sequence, header.reset_sequence, id)
            });
        ObjectUpdate {
            id: id as u16,
            authority_index: state.authority_index,
            ownership_sequence: state.ownership_sequence,
            authority_sequence: state.authority_sequence,
            encoding: ObjectEncoding::choose(
                state,
                baseline.as_ref(),
                header.sequence,
                header.frame_number,
            ),
        }
    }

    /// Remembers what went out in `header.sequence` so a later ack can turn it
    /// into a baseline.
    pub fn record_sent(
        &mut self,
        header: &PacketHeader,
        objects: &[(usize, ObjectState)],
        bytes: usize,
        now: f64,
    ) {
        self.send_deltas
            .add_packet(header.sequence, header.reset_sequence, header.frame_number);
        for (id, state) in objects {
            self.send_deltas.add_object_state(header.sequence, *id, state);
            self.priorities[*id] = 0;
        }
        // the slot being reused held a packet that was never acked
        let evicted = header.sequence.back(SEQUENCE_BUFFER_SIZE as u32);
        if self.sent_packets.find(evicted).is_some_and(|p| !p.acked) {
            self.stats.packets_dropped += 1;
        }
        self.sent_packets.insert_with(
            header.sequence,
            SentPacket {
                send_time: now,
                acked: false,
                object_ids: objects.iter().map(|(id, _)| *id as u16).collect(),
            },
        );
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;
    }

    pub fn process_acks(&mut self, header: &PacketHeader, now: f64) {
        for sequence in header.acked_sequences() {
            let Some(packet) = self.sent_packets.find_mut(sequence) else {
                continue;
            };
            if packet.acked {
                continue;
            }
            packet.acked = true;
            self.stats.packets_acked += 1;
            self.stats.update_rtt(((now - packet.send_time) * 1000.0) as f32);

            for &id in &packet.object_ids {
                let slot = &mut self.acked_baselines[id as usize];
                if slot.is_none_or(|current| sequence.greater_than(current)) {
                    *slot = Some(sequence);
                }
            }
        }
    }

    pub fn check_incoming(&self, header: &PacketHeader) -> Result<(), PacketError> {
        if self.received_packets.exists(header.sequence) {
            return Err(PacketError::Duplicate(header.sequence));
        }
        if self.received_packets.is_stale(header.sequence) {
            return Err(PacketError::Stale(header.sequence));
        }
        Ok(())
    }

    /// Rebuilds every object in `packet` from the receive-side baselines.
    /// Fails as a whole if any baseline is missing.
    pub fn resolve_update(
        &self,
        packet: &StateUpdatePacket,
    ) -> Result<Vec<(usize, ObjectState)>, PacketError> {
        let header = &packet.header;
        packet
            .objects
            .iter()
            .map(|update| {
                let id = update.id as usize;
                let baseline = match update.encoding.baseline() {
                    Some(sequence) => Some(
                        self.receive_deltas
                            .get_object_state(sequence, header.reset_sequence, id)
                            .ok_or(PacketError::MissingBaseline {
                                id: update.id,
                                baseline: sequence,
                            })?,
                    ),
                    None => None,
                };
                if let Some(baseline) = &baseline
                    && !frame_in_window(baseline, header.frame_number)
                {
                    return Err(PacketError::BaselineOutOfWindow {
                        id: update.id,
                        frames: header.frame_number.wrapping_sub(baseline.frame_number),
                    });
                }
                let state = update
                    .encoding
                    .reconstruct(baseline.as_ref(), header.frame_number)
                    .ok_or(PacketError::MissingBaseline {
                        id: update.id,
                        baseline: update.encoding.baseline().unwrap_or_default(),
                    })?;
                Ok((id, state.with_authority_of(&update.authority())))
            })
            .collect()
    }

    /// Stores a fully decoded packet so it is acked and usable as a baseline.
    pub fn record_received(
        &mut self,
        header: &PacketHeader,
        objects: &[(usize, ObjectState)],
        bytes: usize,
        now: f64,
    ) {
        self.received_packets.insert(header.sequence);
        self.receive_deltas
            .add_packet(header.sequence, header.reset_sequence, header.frame_number);
        for (id, state) in objects {
            self.receive_deltas
                .add_object_state(header.sequence, *id, state);
        }
        self.last_receive_time = now;
        self.stats.packets_received += 1;
        self.stats.bytes_received += bytes as u64;
    }

    pub fn buffer_entry(&mut self, entry: JitterEntry) -> bool {
        self.jitter.add_packet(entry)
    }
}
