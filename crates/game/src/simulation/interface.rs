use glam::{Quat, Vec3};

use crate::state::{AvatarState, ObjectState};

/// The physics world as seen by the replication layer.
pub trait ObjectSimulation {
    fn object_count(&self) -> usize;

    /// Current motion of object `id`. Authority fields are ignored.
    fn capture_object_state(&self, id: usize) -> ObjectState;

    /// Moves object `id` to `state`. With `smoothing` the visual
    /// representation eases into the correction instead of snapping.
    fn apply_object_state(&mut self, id: usize, state: &ObjectState, smoothing: bool);

    /// Pins a held object to its holder's hand for this step.
    fn set_held_transform(&mut self, id: usize, position: Vec3, rotation: Quat);
}

/// Producer of the local avatar pose and consumer of remote ones.
pub trait AvatarPoseSource {
    fn get_avatar_pose(&mut self) -> Option<AvatarState>;

    /// Seconds between the start of the frame and the moment the pose was
    /// sampled.
    fn avatar_sample_time_offset(&self) -> f32 {
        0.0
    }

    fn apply_avatar_pose(&mut self, avatar: &AvatarState);
}
