use bitflags::bitflags;
use glam::{Quat, Vec3};

use super::quantize::{
    QuantizedRotation, dequantize_unit, dequantize_vec3, quantize_unit, quantize_vec3, read_vec3,
    write_vec3,
};
use crate::constants::{
    LOCAL_POSITION_BOUND, MAX_CLIENTS, NUM_CUBES, POSITION_MAXIMUM, POSITION_MINIMUM, TRIGGER_BITS,
};
use crate::net::bitstream::{BitReader, BitWriter, StreamError};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HandFlags: u8 {
        const POINTING = 1 << 0;
        const THUMBS_UP = 1 << 1;
    }
}

const HAND_FLAG_BITS: u32 = 2;
const LOCAL_POSITION_MINIMUM: [i32; 3] = [-LOCAL_POSITION_BOUND; 3];
const LOCAL_POSITION_MAXIMUM: [i32; 3] = [LOCAL_POSITION_BOUND; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left = 0,
    Right = 1,
}

impl Hand {
    pub const ALL: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Object carried in a hand, relative to that hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldObject {
    pub object_id: usize,
    pub local_position: Vec3,
    pub local_rotation: Quat,
    pub authority_sequence: u16,
    pub ownership_sequence: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandState {
    pub position: Vec3,
    pub rotation: Quat,
    pub trigger: f32,
    pub grip: f32,
    pub flags: HandFlags,
    pub held: Option<HeldObject>,
}

impl Default for HandState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            trigger: 0.0,
            grip: 0.0,
            flags: HandFlags::empty(),
            held: None,
        }
    }
}

impl HandState {
    /// World transform of whatever this hand holds.
    pub fn held_transform(&self, held: &HeldObject) -> (Vec3, Quat) {
        (
            self.position + self.rotation * held.local_position,
            (self.rotation * held.local_rotation).normalize(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvatarState {
    pub client_index: usize,
    pub head_position: Vec3,
    pub head_rotation: Quat,
    pub hands: [HandState; 2],
}

impl AvatarState {
    pub fn new(client_index: usize) -> Self {
        Self {
            client_index,
            head_position: Vec3::ZERO,
            head_rotation: Quat::IDENTITY,
            hands: [HandState::default(); 2],
        }
    }

    pub fn hand(&self, hand: Hand) -> &HandState {
        &self.hands[hand.index()]
    }

    pub fn hand_mut(&mut self, hand: Hand) -> &mut HandState {
        &mut self.hands[hand.index()]
    }

    /// Blend between two samples. Continuous values are lerped (slerped for
    /// rotations); flags and holds switch at the midpoint.
    pub fn interpolate(a: &AvatarState, b: &AvatarState, t: f32) -> AvatarState {
        let t = t.clamp(0.0, 1.0);
        let nearest = if t < 0.5 { a } else { b };
        let mut hands = nearest.hands;
        for (index, hand) in hands.iter_mut().enumerate() {
            let from = &a.hands[index];
            let to = &b.hands[index];
            hand.position = from.position.lerp(to.position, t);
            hand.rotation = from.rotation.slerp(to.rotation, t);
            hand.trigger = from.trigger + (to.trigger - from.trigger) * t;
            hand.grip = from.grip + (to.grip - from.grip) * t;
        }
        AvatarState {
            client_index: a.client_index,
            head_position: a.head_position.lerp(b.head_position, t),
            head_rotation: a.head_rotation.slerp(b.head_rotation, t),
            hands,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuantizedHeldObject {
    pub object_id: u16,
    pub local_position: [i32; 3],
    pub local_rotation: QuantizedRotation,
    pub authority_sequence: u16,
    pub ownership_sequence: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QuantizedHandState {
    pub position: [i32; 3],
    pub rotation: QuantizedRotation,
    pub trigger: u32,
    pub grip: u32,
    pub flags: HandFlags,
    pub held: Option<QuantizedHeldObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QuantizedAvatarState {
    pub client_index: u8,
    pub head_position: [i32; 3],
    pub head_rotation: QuantizedRotation,
    pub hands: [QuantizedHandState; 2],
}

impl QuantizedHandState {
    fn from_hand(hand: &HandState) -> Self {
        Self {
            position: quantize_vec3(hand.position, POSITION_MINIMUM, POSITION_MAXIMUM),
            rotation: QuantizedRotation::from_quat(hand.rotation),
            trigger: quantize_unit(hand.trigger, TRIGGER_BITS),
            grip: quantize_unit(hand.grip, TRIGGER_BITS),
            flags: hand.flags,
            held: hand.held.map(|held| QuantizedHeldObject {
                object_id: held.object_id as u16,
                local_position: quantize_vec3(
                    held.local_position,
                    LOCAL_POSITION_MINIMUM,
                    LOCAL_POSITION_MAXIMUM,
                ),
                local_rotation: QuantizedRotation::from_quat(held.local_rotation),
                authority_sequence: held.authority_sequence,
                ownership_sequence: held.ownership_sequence,
            }),
        }
    }

    fn to_hand(&self) -> HandState {
        HandState {
            position: dequantize_vec3(self.position),
            rotation: self.rotation.to_quat(),
            trigger: dequantize_unit(self.trigger, TRIGGER_BITS),
            grip: dequantize_unit(self.grip, TRIGGER_BITS),
            flags: self.flags,
            held: self.held.map(|held| HeldObject {
                object_id: held.object_id as usize,
                local_position: dequantize_vec3(held.local_position),
                local_rotation: held.local_rotation.to_quat(),
                authority_sequence: held.authority_sequence,
                ownership_sequence: held.ownership_sequence,
            }),
        }
    }

    fn write(&self, writer: &mut BitWriter) -> Result<(), StreamError> {
        write_vec3(writer, self.position, POSITION_MINIMUM, POSITION_MAXIMUM)?;
        self.rotation.write(writer)?;
        writer.write_bits(self.trigger, TRIGGER_BITS)?;
        writer.write_bits(self.grip, TRIGGER_BITS)?;
        writer.write_bits(self.flags.bits() as u32, HAND_FLAG_BITS)?;

        writer.write_bool(self.held.is_some())?;
        if let Some(held) = &self.held {
            writer.write_unsigned(held.object_id as u32, 0, NUM_CUBES as u32 - 1)?;
            write_vec3(
                writer,
                held.local_position,
                LOCAL_POSITION_MINIMUM,
                LOCAL_POSITION_MAXIMUM,
            )?;
            held.local_rotation.write(writer)?;
            writer.write_u16(held.authority_sequence)?;
            writer.write_u16(held.ownership_sequence)?;
        }
        Ok(())
    }

    fn read(reader: &mut BitReader) -> Result<Self, StreamError> {
        let position = read_vec3(reader, POSITION_MINIMUM, POSITION_MAXIMUM)?;
        let rotation = QuantizedRotation::read(reader)?;
        let trigger = reader.read_bits(TRIGGER_BITS)?;
        let grip = reader.read_bits(TRIGGER_BITS)?;
        let flags = HandFlags::from_bits_truncate(reader.read_bits(HAND_FLAG_BITS)? as u8);

        let held = if reader.read_bool()? {
            Some(QuantizedHeldObject {
                object_id: reader.read_unsigned(0, NUM_CUBES as u32 - 1)? as u16,
                local_position: read_vec3(reader, LOCAL_POSITION_MINIMUM, LOCAL_POSITION_MAXIMUM)?,
                local_rotation: QuantizedRotation::read(reader)?,
                authority_sequence: reader.read_u16()?,
                ownership_sequence: reader.read_u16()?,
            })
        } else {
            None
        };

        Ok(Self {
            position,
            rotation,
            trigger,
            grip,
            flags,
            held,
        })
    }
}

impl QuantizedAvatarState {
    pub fn from_avatar(avatar: &AvatarState) -> Self {
        Self {
            client_index: avatar.client_index as u8,
            head_position: quantize_vec3(avatar.head_position, POSITION_MINIMUM, POSITION_MAXIMUM),
            head_rotation: QuantizedRotation::from_quat(avatar.head_rotation),
            hands: [
                QuantizedHandState::from_hand(&avatar.hands[0]),
                QuantizedHandState::from_hand(&avatar.hands[1]),
            ],
        }
    }

    pub fn to_avatar(&self) -> AvatarState {
        AvatarState {
            client_index: self.client_index as usize,
            head_position: dequantize_vec3(self.head_position),
            head_rotation: self.head_rotation.to_quat(),
            hands: [self.hands[0].to_hand(), self.hands[1].to_hand()],
        }
    }

    pub fn write(&self, writer: &mut BitWriter) -> Result<(), StreamError> {
        writer.write_unsigned(self.client_index as u32, 0, MAX_CLIENTS as u32 - 1)?;
        write_vec3(writer, self.head_position, POSITION_MINIMUM, POSITION_MAXIMUM)?;
        self.head_rotation.write(writer)?;
        for hand in &self.hands {
            hand.write(writer)?;
        }
        Ok(())
    }

    pub fn read(reader: &mut BitReader) -> Result<Self, StreamError> {
        let client_index = reader.read_unsigned(0, MAX_CLIENTS as u32 - 1)? as u8;
        let head_position = read_vec3(reader, POSITION_MINIMUM, POSITION_MAXIMUM)?;
        let head_rotation = QuantizedRotation::read(reader)?;
        let left = QuantizedHandState::read(reader)?;
        let right = QuantizedHandState::read(reader)?;
        Ok(Self {
            client_index,
            head_position,
            head_rotation,
            hands: [left, right],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_PACKET_SIZE;

    fn sample(client_index: usize, x: f32) -> AvatarState {
        let mut avatar = AvatarState::new(client_index);
        avatar.head_position = Vec3::new(x, 1.7, 0.0);
        avatar.head_rotation = Quat::from_rotation_y(x);
        avatar.hands[0].position = Vec3::new(x - 0.3, 1.2, 0.2);
        avatar.hands[0].trigger = x / 4.0;
        avatar.hands[1].position = Vec3::new(x + 0.3, 1.2, 0.2);
        avatar.hands[1].flags = HandFlags::POINTING;
        avatar
    }

    #[test]
    fn test_quantized_wire_roundtrip() {
        let mut avatar = sample(2, 1.0);
        avatar.hands[1].held = Some(HeldObject {
            object_id: 17,
            local_position: Vec3::new(0.0, 0.0, 0.1),
            local_rotation: Quat::from_rotation_z(0.5),
            authority_sequence: 3,
            ownership_sequence: 65535,
        });
        let quantized = QuantizedAvatarState::from_avatar(&avatar);

        let mut writer = BitWriter::new(MAX_PACKET_SIZE);
        quantized.write(&mut writer).unwrap();
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let decoded = QuantizedAvatarState::read(&mut reader).unwrap();
        assert_eq!(decoded, quantized);

        let restored = decoded.to_avatar();
        assert_eq!(restored.client_index, 2);
        assert!((restored.head_position - avatar.head_position).length() < 0.01);
        assert!((restored.hands[0].trigger - 0.25).abs() < 0.01);
        assert_eq!(restored.hands[1].flags, HandFlags::POINTING);
        let held = restored.hands[1].held.unwrap();
        assert_eq!(held.object_id, 17);
        assert_eq!(held.ownership_sequence, 65535);
    }

    #[test]
    fn test_hold_block_only_when_holding() {
        let empty = QuantizedAvatarState::from_avatar(&sample(0, 0.0));
        let mut holding = sample(0, 0.0);
        holding.hands[0].held = Some(HeldObject {
            object_id: 1,
            local_position: Vec3::ZERO,
            local_rotation: Quat::IDENTITY,
            authority_sequence: 0,
            ownership_sequence: 0,
        });
        let holding = QuantizedAvatarState::from_avatar(&holding);

        let bits = |state: &QuantizedAvatarState| {
            let mut writer = BitWriter::new(MAX_PACKET_SIZE);
            state.write(&mut writer).unwrap();
            writer.bits_written()
        };
        assert!(bits(&holding) > bits(&empty));
    }

    #[test]
    fn test_interpolate_clamps() {
        let a = sample(1, 0.0);
        let b = sample(1, 2.0);
        let mid = AvatarState::interpolate(&a, &b, 0.5);
        assert!((mid.head_position.x - 1.0).abs() < 1e-5);
        assert!((mid.hands[0].trigger - 0.25).abs() < 1e-5);

        let before = AvatarState::interpolate(&a, &b, -3.0);
        assert_eq!(before.head_position, a.head_position);
        let after = AvatarState::interpolate(&a, &b, 7.0);
        assert_eq!(after.head_position, b.head_position);
    }

    #[test]
    fn test_held_transform() {
        let hand = HandState {
            position: Vec3::new(1.0, 1.0, 0.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            ..Default::default()
        };
        let held = HeldObject {
            object_id: 0,
            local_position: Vec3::new(0.0, 0.0, 1.0),
            local_rotation: Quat::IDENTITY,
            authority_sequence: 0,
            ownership_sequence: 0,
        };
        let (position, _) = hand.held_transform(&held);
        assert!((position - Vec3::new(2.0, 1.0, 0.0)).length() < 1e-5);
    }
}
