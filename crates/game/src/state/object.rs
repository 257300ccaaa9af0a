use glam::{Quat, Vec3};

use super::quantize::{QuantizedRotation, dequantize_vec3, quantize_vec3};
use crate::constants::{
    ANGULAR_VELOCITY_MAXIMUM, LINEAR_VELOCITY_MAXIMUM, POSITION_MAXIMUM, POSITION_MINIMUM,
};

pub const LINEAR_VELOCITY_MINIMUM3: [i32; 3] = [-LINEAR_VELOCITY_MAXIMUM; 3];
pub const LINEAR_VELOCITY_MAXIMUM3: [i32; 3] = [LINEAR_VELOCITY_MAXIMUM; 3];
pub const ANGULAR_VELOCITY_MINIMUM3: [i32; 3] = [-ANGULAR_VELOCITY_MAXIMUM; 3];
pub const ANGULAR_VELOCITY_MAXIMUM3: [i32; 3] = [ANGULAR_VELOCITY_MAXIMUM; 3];

/// Unquantized rigid body state as the physics collaborator sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectTransform {
    pub active: bool,
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl Default for ObjectTransform {
    fn default() -> Self {
        Self {
            active: false,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }
}

/// Replicated state of one cube, fully quantized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectState {
    pub active: bool,
    pub authority_index: u8,
    pub authority_sequence: u16,
    pub ownership_sequence: u16,
    pub position: [i32; 3],
    pub rotation: QuantizedRotation,
    pub linear_velocity: [i32; 3],
    pub angular_velocity: [i32; 3],
}

fn clamp3(value: &mut [i32; 3], min: [i32; 3], max: [i32; 3]) {
    for axis in 0..3 {
        value[axis] = value[axis].clamp(min[axis], max[axis]);
    }
}

impl ObjectState {
    pub fn from_transform(transform: &ObjectTransform) -> Self {
        let mut state = Self {
            active: transform.active,
            position: quantize_vec3(transform.position, POSITION_MINIMUM, POSITION_MAXIMUM),
            rotation: QuantizedRotation::from_quat(transform.rotation),
            linear_velocity: quantize_vec3(
                transform.linear_velocity,
                LINEAR_VELOCITY_MINIMUM3,
                LINEAR_VELOCITY_MAXIMUM3,
            ),
            angular_velocity: quantize_vec3(
                transform.angular_velocity,
                ANGULAR_VELOCITY_MINIMUM3,
                ANGULAR_VELOCITY_MAXIMUM3,
            ),
            ..Self::default()
        };
        state.canonicalize();
        state
    }

    pub fn to_transform(&self) -> ObjectTransform {
        ObjectTransform {
            active: self.active,
            position: dequantize_vec3(self.position),
            rotation: self.rotation.to_quat(),
            linear_velocity: dequantize_vec3(self.linear_velocity),
            angular_velocity: dequantize_vec3(self.angular_velocity),
        }
    }

    /// Clamps every field into its wire range. Resting objects carry no velocity.
    pub fn canonicalize(&mut self) {
        clamp3(&mut self.position, POSITION_MINIMUM, POSITION_MAXIMUM);
        if self.active {
            clamp3(
                &mut self.linear_velocity,
                LINEAR_VELOCITY_MINIMUM3,
                LINEAR_VELOCITY_MAXIMUM3,
            );
            clamp3(
                &mut self.angular_velocity,
                ANGULAR_VELOCITY_MINIMUM3,
                ANGULAR_VELOCITY_MAXIMUM3,
            );
        } else {
            self.linear_velocity = [0; 3];
            self.angular_velocity = [0; 3];
        }
    }

    /// Equality of everything except the authority fields.
    pub fn same_motion(&self, other: &ObjectState) -> bool {
        self.active == other.active
            && self.position == other.position
            && self.rotation == other.rotation
            && self.linear_velocity == other.linear_velocity
            && self.angular_velocity == other.angular_velocity
    }

    /// Copy with the authority fields cleared.
    pub fn motion(&self) -> Self {
        Self {
            authority_index: 0,
            authority_sequence: 0,
            ownership_sequence: 0,
            ..*self
        }
    }

    pub fn with_authority_of(mut self, other: &ObjectState) -> Self {
        self.authority_index = other.authority_index;
        self.authority_sequence = other.authority_sequence;
        self.ownership_sequence = other.ownership_sequence;
        self
    }
}

/// Per-axis difference between a state and a reference state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectDelta {
    pub position: [i32; 3],
    pub linear_velocity: [i32; 3],
    pub angular_velocity: [i32; 3],
}

fn sub3(a: [i32; 3], b: [i32; 3]) -> [i32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn add3(a: [i32; 3], b: [i32; 3]) -> [i32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn abs_sum3(a: [i32; 3]) -> i64 {
    a.iter().map(|v| (*v as i64).abs()).sum()
}

fn within3(a: [i32; 3], bound: i32) -> bool {
    a.iter().all(|v| v.abs() <= bound)
}

impl ObjectDelta {
    pub fn between(current: &ObjectState, reference: &ObjectState) -> Self {
        Self {
            position: sub3(current.position, reference.position),
            linear_velocity: sub3(current.linear_velocity, reference.linear_velocity),
            angular_velocity: sub3(current.angular_velocity, reference.angular_velocity),
        }
    }

    /// Motion of `reference` shifted by this delta. Rotation and flags come
    /// from the reference and are overwritten by the caller as needed.
    pub fn apply(&self, reference: &ObjectState) -> ObjectState {
        ObjectState {
            position: add3(reference.position, self.position),
            linear_velocity: add3(reference.linear_velocity, self.linear_velocity),
            angular_velocity: add3(reference.angular_velocity, self.angular_velocity),
            ..*reference
        }
    }

    pub fn magnitude(&self) -> i64 {
        abs_sum3(self.position) + abs_sum3(self.linear_velocity) + abs_sum3(self.angular_velocity)
    }

    pub fn within(&self, position_bound: i32, velocity_bound: i32) -> bool {
        within3(self.position, position_bound)
            && within3(self.linear_velocity, velocity_bound)
            && within3(self.angular_velocity, velocity_bound)
    }
}
