mod sync;
mod world;

pub use sync::{CUBE_HALF_EXTENT, CubeSimulation};
pub use world::PhysicsWorld;
