use glam::{Quat, Vec3};

use crate::state::Hand;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hold {
    pub slot: usize,
    pub hand: Hand,
    pub local_position: Vec3,
    pub local_rotation: Quat,
}

/// Object id to holder. The only record of who holds what; a hand never
/// stores its object.
#[derive(Debug, Clone)]
pub struct HoldTable {
    holders: Vec<Option<Hold>>,
}

impl HoldTable {
    pub fn new(object_count: usize) -> Self {
        Self {
            holders: vec![None; object_count],
        }
    }

    pub fn get(&self, id: usize) -> Option<&Hold> {
        self.holders.get(id)?.as_ref()
    }

    pub fn is_held(&self, id: usize) -> bool {
        self.get(id).is_some()
    }

    /// Object held in `hand` of the avatar in `slot`.
    pub fn find(&self, slot: usize, hand: Hand) -> Option<usize> {
        self.holders
            .iter()
            .position(|h| h.is_some_and(|h| h.slot == slot && h.hand == hand))
    }

    /// Records `hold` for `id`, dropping whatever that hand held before.
    pub fn set(&mut self, id: usize, hold: Hold) {
        if let Some(previous) = self.find(hold.slot, hold.hand) {
            self.holders[previous] = None;
        }
        self.holders[id] = Some(hold);
    }

    pub fn clear(&mut self, id: usize) -> Option<Hold> {
        self.holders.get_mut(id)?.take()
    }

    pub fn held_by(&self, slot: usize) -> Vec<usize> {
        self.holders
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_some_and(|h| h.slot == slot))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Hold)> {
        self.holders
            .iter()
            .enumerate()
            .filter_map(|(id, h)| h.as_ref().map(|h| (id, h)))
    }

    pub fn clear_all(&mut self) {
        self.holders.fill(None);
    }
}
