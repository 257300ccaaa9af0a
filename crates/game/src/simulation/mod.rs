mod context;
mod hold;
mod interface;
mod script;
mod tick;

pub use context::{ObjectRecord, Role, SimulationContext};
pub use hold::{Hold, HoldTable};
pub use interface::{AvatarPoseSource, ObjectSimulation};
pub use script::ScriptedAvatar;
pub use tick::FixedTimestep;
