use glam::{Quat, Vec3};
use rapier3d::prelude::*;

use crate::constants::TICK_RATE;
use crate::state::ObjectTransform;
use crate::state::predict::{ANGULAR_DAMPING, GRAVITY, LINEAR_DAMPING};

pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    const DT: Real = 1.0 / TICK_RATE as Real;

    pub fn new() -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = Self::DT;
        integration_parameters.min_ccd_dt = Self::DT / 100.0;

        Self {
            pipeline: PhysicsPipeline::new(),
            integration_parameters,
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: Vector::new(0.0, GRAVITY, 0.0),
        }
    }

    pub fn step(&mut self) {
        self.pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    /// Flat floor whose top face sits at `y`.
    pub fn add_ground(&mut self, y: Real, half_size: Real) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_size, 0.1, half_size)
            .translation(Vector::new(0.0, y - 0.1, 0.0))
            .friction(0.8)
            .build();
        self.colliders.insert(collider)
    }

    /// Dynamic cube damped the same way the state predictor assumes.
    pub fn add_cube(&mut self, position: Vec3, half_extent: Real) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(Vector::new(position.x, position.y, position.z))
            .linear_damping(LINEAR_DAMPING)
            .angular_damping(ANGULAR_DAMPING)
            .ccd_enabled(true)
            .build();

        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::cuboid(half_extent, half_extent, half_extent)
            .density(1.0)
            .friction(0.5)
            .restitution(0.1)
            .build();

        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        handle
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_transform(&self, handle: RigidBodyHandle) -> Option<ObjectTransform> {
        let body = self.bodies.get(handle)?;
        let t = body.translation();
        let r = body.rotation();
        let v = body.linvel();
        let w = body.angvel();
        Some(ObjectTransform {
            active: !body.is_sleeping(),
            position: Vec3::new(t.x, t.y, t.z),
            rotation: Quat::from_xyzw(r.x, r.y, r.z, r.w).normalize(),
            linear_velocity: Vec3::new(v.x, v.y, v.z),
            angular_velocity: Vec3::new(w.x, w.y, w.z),
        })
    }

    /// Teleports a body. Resting transforms put it to sleep.
    pub fn set_body_transform(&mut self, handle: RigidBodyHandle, transform: &ObjectTransform) {
        let Some(body) = self.bodies.get_mut(handle) else {
            return;
        };
        let p = transform.position;
        let r = transform.rotation;
        let v = transform.linear_velocity;
        let w = transform.angular_velocity;
        let rot = Rotation::from_xyzw(r.x, r.y, r.z, r.w).normalize();
        body.set_position(Pose::from_parts(Vector::new(p.x, p.y, p.z), rot), true);
        body.set_linvel(Vector::new(v.x, v.y, v.z), true);
        body.set_angvel(Vector::new(w.x, w.y, w.z), true);
        if !transform.active {
            body.sleep();
        }
    }

    /// Pins a body in place for this step, clearing its velocity.
    pub fn set_body_pose(&mut self, handle: RigidBodyHandle, position: Vec3, rotation: Quat) {
        if let Some(body) = self.bodies.get_mut(handle) {
            let rot =
                Rotation::from_xyzw(rotation.x, rotation.y, rotation.z, rotation.w).normalize();
            let new_pose = Pose::from_parts(Vector::new(position.x, position.y, position.z), rot);
            body.set_position(new_pose, true);
            body.set_linvel(Vector::new(0.0, 0.0, 0.0), true);
            body.set_angvel(Vector::new(0.0, 0.0, 0.0), true);
        }
    }

    pub fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse(Vector::new(impulse.x, impulse.y, impulse.z), true);
        }
    }
}
