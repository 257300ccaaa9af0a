use glam::{Quat, Vec3};
use rapier3d::prelude::RigidBodyHandle;

use super::PhysicsWorld;
use crate::simulation::ObjectSimulation;
use crate::state::{ObjectState, ObjectTransform};

pub const CUBE_HALF_EXTENT: f32 = 0.25;
const GROUND_HALF_SIZE: f32 = 15.0;
const SMOOTHING_DECAY: f32 = 0.85;

#[derive(Debug, Clone, Copy)]
struct SmoothingError {
    position: Vec3,
    rotation: Quat,
}

impl Default for SmoothingError {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Rapier-backed cube stack. Physics always runs on the corrected state;
/// corrections are eased out of the visual transform over a few frames.
pub struct CubeSimulation {
    physics: PhysicsWorld,
    cubes: Vec<RigidBodyHandle>,
    errors: Vec<SmoothingError>,
}

impl CubeSimulation {
    /// Floor at y = 0 with `count` cubes in a grid above it.
    pub fn new(count: usize) -> Self {
        let mut physics = PhysicsWorld::new();
        physics.add_ground(0.0, GROUND_HALF_SIZE);

        let columns = (count as f32).sqrt().ceil().max(1.0) as usize;
        let spacing = CUBE_HALF_EXTENT * 3.0;
        let offset = (columns as f32 - 1.0) * spacing * 0.5;
        let cubes = (0..count)
            .map(|i| {
                let position = Vec3::new(
                    (i % columns) as f32 * spacing - offset,
                    CUBE_HALF_EXTENT * 2.0 + (i / columns / columns) as f32,
                    (i / columns % columns) as f32 * spacing - offset,
                );
                physics.add_cube(position, CUBE_HALF_EXTENT)
            })
            .collect();

        Self {
            physics,
            cubes,
            errors: vec![SmoothingError::default(); count],
        }
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn step(&mut self) {
        self.physics.step();
        for error in &mut self.errors {
            error.position *= SMOOTHING_DECAY;
            error.rotation = Quat::IDENTITY.slerp(error.rotation, SMOOTHING_DECAY);
            if error.position.length_squared() < 1e-8 {
                *error = SmoothingError::default();
            }
        }
    }

    pub fn push(&mut self, id: usize, impulse: Vec3) {
        if let Some(&handle) = self.cubes.get(id) {
            self.physics.apply_impulse(handle, impulse);
        }
    }

    pub fn transform(&self, id: usize) -> ObjectTransform {
        self.cubes
            .get(id)
            .and_then(|&handle| self.physics.body_transform(handle))
            .unwrap_or_default()
    }

    /// Transform to draw: the physical one plus the remaining correction error.
    pub fn visual_transform(&self, id: usize) -> ObjectTransform {
        let mut transform = self.transform(id);
        if let Some(error) = self.errors.get(id) {
            transform.position += error.position;
            transform.rotation = (error.rotation * transform.rotation).normalize();
        }
        transform
    }
}

impl ObjectSimulation for CubeSimulation {
    fn object_count(&self) -> usize {
        self.cubes.len()
    }

    fn capture_object_state(&self, id: usize) -> ObjectState {
        ObjectState::from_transform(&self.transform(id))
    }

    fn apply_object_state(&mut self, id: usize, state: &ObjectState, smoothing: bool) {
        let Some(&handle) = self.cubes.get(id) else {
            return;
        };
        let before = self.visual_transform(id);
        let target = state.to_transform();
        self.physics.set_body_transform(handle, &target);

        self.errors[id] = if smoothing {
            SmoothingError {
                position: before.position - target.position,
                rotation: (before.rotation * target.rotation.inverse()).normalize(),
            }
        } else {
            SmoothingError::default()
        };
    }

    fn set_held_transform(&mut self, id: usize, position: Vec3, rotation: Quat) {
        if let Some(&handle) = self.cubes.get(id) {
            self.physics.set_body_pose(handle, position, rotation);
            self.errors[id] = SmoothingError::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_CUBES;

    #[test]
    fn test_cubes_settle_on_ground() {
        let mut sim = CubeSimulation::new(4);
        for _ in 0..600 {
            sim.step();
        }
        for id in 0..4 {
            let transform = sim.transform(id);
            assert!(transform.position.y > 0.0, "cube {id} fell through");
            assert!(transform.position.y < 1.0, "cube {id} floating");
        }
    }

    #[test]
    fn test_capture_is_quantized() {
        let sim = CubeSimulation::new(NUM_CUBES);
        assert_eq!(sim.object_count(), NUM_CUBES);
        let state = sim.capture_object_state(3);
        let again = ObjectState::from_transform(&state.to_transform());
        assert_eq!(state.position, again.position);
    }

    #[test]
    fn test_apply_moves_body_and_smooths_visual() {
        let mut sim = CubeSimulation::new(2);
        let mut state = sim.capture_object_state(0);
        state.position[0] += 512;
        state.active = true;
        sim.apply_object_state(0, &state, true);

        let physical = sim.transform(0);
        let visual = sim.visual_transform(0);
        assert!((physical.position.x - state.to_transform().position.x).abs() < 1e-3);
        assert!((visual.position.x - physical.position.x).abs() > 0.5);

        for _ in 0..120 {
            sim.step();
        }
        let physical = sim.transform(0);
        let visual = sim.visual_transform(0);
        assert!(visual.position.distance(physical.position) < 1e-3);
    }

    #[test]
    fn test_held_transform_pins_body() {
        let mut sim = CubeSimulation::new(1);
        let target = Vec3::new(1.0, 2.0, 0.5);
        sim.set_held_transform(0, target, Quat::IDENTITY);
        let transform = sim.transform(0);
        assert!(transform.position.distance(target) < 1e-4);
        assert_eq!(transform.linear_velocity, Vec3::ZERO);
    }
}
