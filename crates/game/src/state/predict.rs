//! Fixed-point ballistic extrapolation shared by sender and receiver.
//!
//! Works purely on quantized integers: positions in `1/UNITS_PER_METER` m,
//! velocities in `1/UNITS_PER_METER` m/s, with `GUARD_BITS` extra fraction bits
//! inside a step. Every step rounds back to quantized units and clamps, so
//! `predict(predict(s, a), b) == predict(s, a + b)`.

use super::object::{
    ANGULAR_VELOCITY_MAXIMUM3, ANGULAR_VELOCITY_MINIMUM3, LINEAR_VELOCITY_MAXIMUM3,
    LINEAR_VELOCITY_MINIMUM3, ObjectState,
};
use crate::constants::{POSITION_MAXIMUM, POSITION_MINIMUM, TICK_RATE, UNITS_PER_METER};

pub const GRAVITY: f32 = -9.8;
pub const LINEAR_DAMPING: f32 = 0.2;
pub const ANGULAR_DAMPING: f32 = 0.3;

const GUARD_BITS: u32 = 8;
const DRAG_BITS: u32 = 16;

/// 9.8 m/s^2 * 512 units/m / 60 frames/s, with guard bits.
const GRAVITY_PER_FRAME: i64 = -21408;

/// `1 / (1 + damping / 60)` in 16 fractional bits.
const LINEAR_DRAG: i64 = 65318;
const ANGULAR_DRAG: i64 = 65210;

#[inline]
fn to_fixed(value: i32) -> i64 {
    (value as i64) << GUARD_BITS
}

#[inline]
fn from_fixed(value: i64, min: i32, max: i32) -> i32 {
    let rounded = (value + (1 << (GUARD_BITS - 1))) >> GUARD_BITS;
    rounded.clamp(min as i64, max as i64) as i32
}

#[inline]
fn apply_drag(value: i64, factor: i64) -> i64 {
    (value * factor + (1 << (DRAG_BITS - 1))) >> DRAG_BITS
}

fn step(state: &mut ObjectState) {
    let mut linear = state.linear_velocity.map(to_fixed);
    let mut angular = state.angular_velocity.map(to_fixed);

    linear[1] += GRAVITY_PER_FRAME;
    for axis in 0..3 {
        linear[axis] = apply_drag(linear[axis], LINEAR_DRAG);
        angular[axis] = apply_drag(angular[axis], ANGULAR_DRAG);
    }

    for axis in 0..3 {
        let position = to_fixed(state.position[axis]) + linear[axis] / TICK_RATE as i64;
        state.position[axis] = from_fixed(position, POSITION_MINIMUM[axis], POSITION_MAXIMUM[axis]);
        state.linear_velocity[axis] = from_fixed(
            linear[axis],
            LINEAR_VELOCITY_MINIMUM3[axis],
            LINEAR_VELOCITY_MAXIMUM3[axis],
        );
        state.angular_velocity[axis] = from_fixed(
            angular[axis],
            ANGULAR_VELOCITY_MINIMUM3[axis],
            ANGULAR_VELOCITY_MAXIMUM3[axis],
        );
    }
}

/// Extrapolates `baseline` forward by `frames` steps. Rotation, flags and
/// authority fields are carried over untouched; resting baselines do not move.
pub fn predict(baseline: &ObjectState, frames: u32) -> ObjectState {
    let mut state = *baseline;
    if !state.active {
        return state;
    }
    for _ in 0..frames {
        step(&mut state);
    }
    state
}

/// Float view of the same constants for the physics collaborator.
pub fn gravity_units_per_frame() -> f32 {
    GRAVITY * UNITS_PER_METER as f32 / TICK_RATE as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn falling() -> ObjectState {
        ObjectState {
            active: true,
            position: [0, 4096, 0],
            linear_velocity: [256, 0, -128],
            angular_velocity: [512, 0, 0],
            ..Default::default()
        }
    }

    #[test]
    fn test_constants_match_float_model() {
        let gravity = gravity_units_per_frame() * (1 << GUARD_BITS) as f32;
        assert!((gravity - GRAVITY_PER_FRAME as f32).abs() < 1.0);

        let linear = (1 << DRAG_BITS) as f32 / (1.0 + LINEAR_DAMPING / TICK_RATE as f32);
        let angular = (1 << DRAG_BITS) as f32 / (1.0 + ANGULAR_DAMPING / TICK_RATE as f32);
        assert!((linear - LINEAR_DRAG as f32).abs() < 1.0);
        assert!((angular - ANGULAR_DRAG as f32).abs() < 1.0);
    }

    #[test]
    fn test_resting_unchanged() {
        let resting = ObjectState {
            active: false,
            position: [10, 20, 30],
            ..Default::default()
        };
        assert_eq!(predict(&resting, 100), resting);
    }

    #[test]
    fn test_zero_frames_is_identity() {
        assert_eq!(predict(&falling(), 0), falling());
    }

    #[test]
    fn test_falls_and_drags() {
        let state = predict(&falling(), 60);
        assert!(state.position[1] < 4096 - 1800, "{:?}", state.position);
        assert!(state.linear_velocity[1] < -4000);
        assert!(state.linear_velocity[0] < 256 && state.linear_velocity[0] > 150);
        // drag below half a unit per step rounds away
        assert_eq!(state.linear_velocity[2], -128);
        assert!(state.angular_velocity[0] < 512 && state.angular_velocity[0] > 300);
        assert!(state.position[0] > 0);
        assert_eq!(state.rotation, falling().rotation);
    }

    #[test]
    fn test_deterministic() {
        let a = predict(&falling(), 37);
        let b = predict(&falling(), 37);
        assert_eq!(a, b);
    }

    #[test]
    fn test_composes() {
        for (a, b) in [(1, 1), (3, 7), (10, 0), (25, 40), (200, 55)] {
            let direct = predict(&falling(), a + b);
            let split = predict(&predict(&falling(), a), b);
            assert_eq!(direct, split, "a={a} b={b}");
        }
    }

    #[test]
    fn test_clamped_at_floor() {
        let state = predict(&falling(), 600);
        assert_eq!(state.position[1], POSITION_MINIMUM[1]);
        assert!(state.linear_velocity[1] >= LINEAR_VELOCITY_MINIMUM3[1]);
    }
}
