pub mod authority;
pub mod config;
pub mod constants;
pub mod net;
pub mod physics;
pub mod session;
pub mod simulation;
pub mod state;

pub use authority::{Decision, should_apply_update};
pub use config::{PriorityWeights, ReplicationConfig};
pub use constants::{DEFAULT_PORT, MAX_CLIENTS, NUM_CUBES, SERVER_SLOT, TICK_RATE};
pub use net::{
    NetworkSimulator, NetworkStats, Packet, PacketError, PacketLossSimulation, SimulatedTransport,
    Transport, UdpTransport,
};
pub use physics::{CubeSimulation, PhysicsWorld};
pub use session::{ClientSession, ClientState, DisconnectReason, ServerSession, SessionEvent};
pub use simulation::{
    AvatarPoseSource, FixedTimestep, ObjectSimulation, Role, ScriptedAvatar, SimulationContext,
};
pub use state::{AvatarState, Hand, ObjectState, ObjectTransform};
