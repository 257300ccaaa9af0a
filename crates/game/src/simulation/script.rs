use glam::{Quat, Vec3};

use super::interface::AvatarPoseSource;
use crate::constants::{MAX_CLIENTS, TICK_RATE};
use crate::state::{AvatarState, Hand, HandFlags};

/// Headless stand-in for a tracked player: the head bobs in place and both
/// hands sweep in slow circles. Remote poses are stored for inspection.
#[derive(Debug, Clone)]
pub struct ScriptedAvatar {
    slot: usize,
    origin: Vec3,
    frame: u32,
    remote: [Option<AvatarState>; MAX_CLIENTS],
}

impl ScriptedAvatar {
    pub fn new(slot: usize) -> Self {
        let angle = slot as f32 * std::f32::consts::TAU / MAX_CLIENTS as f32;
        Self {
            slot,
            origin: Vec3::new(angle.cos() * 2.0, 0.0, angle.sin() * 2.0),
            frame: 0,
            remote: Default::default(),
        }
    }

    pub fn remote(&self, slot: usize) -> Option<&AvatarState> {
        self.remote.get(slot)?.as_ref()
    }

    pub fn advance(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    fn pose(&self) -> AvatarState {
        let t = self.frame as f32 / TICK_RATE as f32;
        let facing = Quat::from_rotation_y(-self.origin.z.atan2(self.origin.x));

        let mut avatar = AvatarState::new(self.slot);
        avatar.head_position = self.origin + Vec3::new(0.0, 1.6 + 0.02 * (t * 2.0).sin(), 0.0);
        avatar.head_rotation = facing;

        for hand in Hand::ALL {
            let side = if hand == Hand::Left { -1.0 } else { 1.0 };
            let phase = t + side;
            let state = avatar.hand_mut(hand);
            state.position = self.origin
                + facing * Vec3::new(0.3 * side + 0.1 * phase.cos(), 1.1 + 0.1 * phase.sin(), -0.3);
            state.rotation = facing * Quat::from_rotation_z(0.2 * side * phase.sin());
            state.trigger = 0.5 + 0.5 * phase.sin();
            state.grip = 0.5 + 0.5 * phase.cos();
            state.flags = if state.trigger > 0.9 {
                HandFlags::POINTING
            } else {
                HandFlags::empty()
            };
        }
        avatar
    }
}

impl AvatarPoseSource for ScriptedAvatar {
    fn get_avatar_pose(&mut self) -> Option<AvatarState> {
        Some(self.pose())
    }

    fn apply_avatar_pose(&mut self, avatar: &AvatarState) {
        if let Some(slot) = self.remote.get_mut(avatar.client_index) {
            *slot = Some(*avatar);
        }
    }
}
