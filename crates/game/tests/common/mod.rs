#![allow(dead_code)]

use cubesync::simulation::{AvatarPoseSource, ObjectSimulation};
use cubesync::state::{AvatarState, ObjectState};
use cubesync::{MAX_CLIENTS, NUM_CUBES};
use glam::{Quat, Vec3};

/// In-memory object store standing in for a physics world.
pub struct TestWorld {
    pub states: Vec<ObjectState>,
    pub applied: usize,
}

impl TestWorld {
    pub fn new() -> Self {
        let states = (0..NUM_CUBES)
            .map(|id| ObjectState {
                position: [(id as i32 % 8) * 256, 128, (id as i32 / 8) * 256],
                ..Default::default()
            })
            .collect();
        Self { states, applied: 0 }
    }

    /// Every object at the origin, as a client before its first update.
    pub fn empty() -> Self {
        Self {
            states: vec![ObjectState::default(); NUM_CUBES],
            applied: 0,
        }
    }

    /// Slides object `id` along x, keeping it awake.
    pub fn nudge(&mut self, id: usize, units: i32) {
        let state = &mut self.states[id];
        state.active = true;
        state.position[0] = (state.position[0] + units).clamp(-8000, 8000);
        state.linear_velocity = [units * 60, 0, 0];
    }

    pub fn settle(&mut self) {
        for state in &mut self.states {
            state.active = false;
            state.linear_velocity = [0; 3];
            state.angular_velocity = [0; 3];
        }
    }
}

impl ObjectSimulation for TestWorld {
    fn object_count(&self) -> usize {
        self.states.len()
    }

    fn capture_object_state(&self, id: usize) -> ObjectState {
        self.states[id]
    }

    fn apply_object_state(&mut self, id: usize, state: &ObjectState, _smoothing: bool) {
        self.states[id] = state.motion();
        self.applied += 1;
    }

    fn set_held_transform(&mut self, id: usize, position: Vec3, rotation: Quat) {
        let state = &mut self.states[id];
        *state = ObjectState::from_transform(&cubesync::ObjectTransform {
            active: true,
            position,
            rotation,
            ..state.to_transform()
        });
    }
}

/// Fixed avatar pose; remembers whatever remote poses it is handed.
pub struct StillAvatar {
    pub pose: Option<AvatarState>,
    pub remote: [Option<AvatarState>; MAX_CLIENTS],
    pub sample_time_offset: f32,
}

impl StillAvatar {
    pub fn new(slot: usize) -> Self {
        let mut pose = AvatarState::new(slot);
        pose.head_position = Vec3::new(slot as f32, 1.6, 0.0);
        for (i, hand) in pose.hands.iter_mut().enumerate() {
            hand.position = Vec3::new(slot as f32 + i as f32 * 0.4 - 0.2, 1.0, 0.3);
        }
        Self {
            pose: Some(pose),
            remote: Default::default(),
            sample_time_offset: 0.0,
        }
    }

    pub fn none() -> Self {
        Self {
            pose: None,
            remote: Default::default(),
            sample_time_offset: 0.0,
        }
    }
}

impl AvatarPoseSource for StillAvatar {
    fn get_avatar_pose(&mut self) -> Option<AvatarState> {
        self.pose
    }

    fn avatar_sample_time_offset(&self) -> f32 {
        self.sample_time_offset
    }

    fn apply_avatar_pose(&mut self, avatar: &AvatarState) {
        if let Some(slot) = self.remote.get_mut(avatar.client_index) {
            *slot = Some(*avatar);
        }
    }
}
