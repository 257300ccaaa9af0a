pub mod avatar;
pub mod object;
pub mod predict;
pub mod quantize;

pub use avatar::{
    AvatarState, Hand, HandFlags, HandState, HeldObject, QuantizedAvatarState,
    QuantizedHandState, QuantizedHeldObject,
};
pub use object::{ObjectDelta, ObjectState, ObjectTransform};
pub use predict::predict;
pub use quantize::QuantizedRotation;
