//! Arbitration between the local record of an object and an incoming update.

use crate::constants::{SERVER_SLOT, authority_index_for_slot};
use crate::net::sequence::Sequence;
use crate::state::ObjectState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Apply,
    Reject,
    /// The server agrees this client already has authority. Nothing to apply,
    /// but the claim no longer needs to be pushed.
    Confirm,
}

/// Decides whether `incoming`, sent by `from_slot` to `to_slot`, replaces the
/// receiver's `local` record. Only the authority fields of both states are
/// consulted.
pub fn should_apply_update(
    local: &ObjectState,
    incoming: &ObjectState,
    is_avatar_hold: bool,
    from_slot: usize,
    to_slot: usize,
) -> Decision {
    if incoming.ownership_sequence.greater_than(local.ownership_sequence) {
        return Decision::Apply;
    }
    if incoming.ownership_sequence.less_than(local.ownership_sequence) {
        return Decision::Reject;
    }

    if incoming.authority_sequence.greater_than(local.authority_sequence) {
        return Decision::Apply;
    }
    if incoming.authority_sequence.less_than(local.authority_sequence) {
        return Decision::Reject;
    }

    if from_slot == SERVER_SLOT {
        let own_index = authority_index_for_slot(to_slot);
        if incoming.authority_index == own_index {
            Decision::Confirm
        } else if incoming.authority_index != 0 {
            Decision::Apply
        } else if local.authority_index == own_index {
            Decision::Reject
        } else {
            Decision::Apply
        }
    } else {
        // a tie may take a free object, never one another client has
        let sender_index = authority_index_for_slot(from_slot);
        let free_or_senders = local.authority_index == 0 || local.authority_index == sender_index;
        if incoming.authority_index == sender_index && (free_or_senders || is_avatar_hold) {
            Decision::Apply
        } else {
            Decision::Reject
        }
    }
}
