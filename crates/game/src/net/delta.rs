use super::buffer::SequenceBuffer;
use crate::constants::{DELTA_BUFFER_SIZE, NUM_CUBES};
use crate::state::ObjectState;

/// Object state recorded in a past packet, usable as a delta reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub sequence: u16,
    pub frame_number: u32,
    pub state: ObjectState,
}

#[derive(Debug, Default)]
struct DeltaEntry {
    reset_sequence: u16,
    frame_number: u32,
    states: Vec<ObjectState>,
    index_by_id: Vec<Option<u8>>,
}

/// Per-packet snapshots of the object states carried by that packet.
///
/// One store per direction per connection. Lookups are keyed by
/// `(sequence, reset_sequence, id)` so a snapshot from an older reset epoch is
/// never returned.
#[derive(Debug)]
pub struct DeltaBuffer {
    entries: SequenceBuffer<u16, DeltaEntry>,
}

impl Default for DeltaBuffer {
    fn default() -> Self {
        Self::new(DELTA_BUFFER_SIZE)
    }
}

impl DeltaBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: SequenceBuffer::new(capacity),
        }
    }

    pub fn reset(&mut self) {
        self.entries.reset();
    }

    pub fn add_packet(&mut self, sequence: u16, reset_sequence: u16, frame_number: u32) -> bool {
        match self.entries.insert(sequence) {
            Some(entry) => {
                entry.reset_sequence = reset_sequence;
                entry.frame_number = frame_number;
                entry.index_by_id = vec![None; NUM_CUBES];
                true
            }
            None => false,
        }
    }

    pub fn add_object_state(&mut self, sequence: u16, id: usize, state: &ObjectState) -> bool {
        let Some(entry) = self.entries.find_mut(sequence) else {
            return false;
        };
        if id >= NUM_CUBES || entry.states.len() >= NUM_CUBES {
            return false;
        }
        match entry.index_by_id[id] {
            Some(index) => entry.states[index as usize] = *state,
            None => {
                entry.index_by_id[id] = Some(entry.states.len() as u8);
                entry.states.push(*state);
            }
        }
        true
    }

    pub fn get_packet_frame(&self, sequence: u16, reset_sequence: u16) -> Option<u32> {
        self.entries
            .find(sequence)
            .filter(|entry| entry.reset_sequence == reset_sequence)
            .map(|entry| entry.frame_number)
    }

    pub fn get_object_state(
        &self,
        sequence: u16,
        reset_sequence: u16,
        id: usize,
    ) -> Option<Baseline> {
        let entry = self.entries.find(sequence)?;
        if entry.reset_sequence != reset_sequence {
            return None;
        }
        let index = (*entry.index_by_id.get(id)?)?;
        Some(Baseline {
            sequence,
            frame_number: entry.frame_number,
            state: entry.states[index as usize],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(x: i32) -> ObjectState {
        ObjectState {
            active: true,
            position: [x, 0, 0],
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_lookup() {
        let mut buffer = DeltaBuffer::default();
        assert!(buffer.add_packet(10, 3, 500));
        assert!(buffer.add_object_state(10, 7, &state(42)));

        let baseline = buffer.get_object_state(10, 3, 7).unwrap();
        assert_eq!(baseline.state, state(42));
        assert_eq!(baseline.frame_number, 500);
        assert_eq!(baseline.sequence, 10);
        assert_eq!(buffer.get_packet_frame(10, 3), Some(500));
    }

    #[test]
    fn test_wrong_reset_sequence_fails() {
        let mut buffer = DeltaBuffer::default();
        buffer.add_packet(10, 3, 500);
        buffer.add_object_state(10, 7, &state(42));
        assert!(buffer.get_object_state(10, 4, 7).is_none());
        assert!(buffer.get_object_state(10, 2, 7).is_none());
        assert!(buffer.get_packet_frame(10, 4).is_none());
    }

    #[test]
    fn test_unknown_id_or_sequence_fails() {
        let mut buffer = DeltaBuffer::default();
        buffer.add_packet(10, 0, 1);
        buffer.add_object_state(10, 7, &state(1));
        assert!(buffer.get_object_state(10, 0, 8).is_none());
        assert!(buffer.get_object_state(11, 0, 7).is_none());
        assert!(buffer.get_object_state(10, 0, NUM_CUBES + 5).is_none());
        assert!(!buffer.add_object_state(12, 1, &state(1)));
        assert!(!buffer.add_object_state(10, NUM_CUBES, &state(1)));
    }

    #[test]
    fn test_slot_reuse_forgets_old_states() {
        let mut buffer = DeltaBuffer::new(4);
        buffer.add_packet(0, 0, 0);
        buffer.add_object_state(0, 1, &state(1));
        buffer.add_packet(4, 0, 4);
        assert!(buffer.get_object_state(0, 0, 1).is_none());
        assert!(buffer.get_object_state(4, 0, 1).is_none());
    }

    #[test]
    fn test_overwrite_same_id() {
        let mut buffer = DeltaBuffer::default();
        buffer.add_packet(1, 0, 1);
        buffer.add_object_state(1, 3, &state(1));
        buffer.add_object_state(1, 3, &state(2));
        assert_eq!(buffer.get_object_state(1, 0, 3).unwrap().state, state(2));
    }
}
