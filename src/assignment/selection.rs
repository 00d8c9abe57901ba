//! Pure candidate selection

use crate::db::{Participant, ParticipantId};
use rand::Rng;

/// Everyone except the requester who has not been claimed as a recipient yet
pub fn candidate_pool(participants: &[Participant], requester_id: ParticipantId) -> Vec<&Participant> {
    participants
        .iter()
        .filter(|p| p.id != requester_id && p.santa_id.is_none())
        .collect()
}

/// Pick a recipient from the pool.
///
/// When exactly one candidate has not picked a recipient themselves, that
/// candidate is taken so isolated participants get matched before the pool
/// narrows. Otherwise the pick is uniform over the whole pool.
pub fn select_candidate<'a, R: Rng + ?Sized>(
    pool: &[&'a Participant],
    rng: &mut R,
) -> Option<&'a Participant> {
    if pool.is_empty() {
        return None;
    }

    let mut unpaired = pool.iter().copied().filter(|p| p.recipient_id.is_none());
    if let (Some(only), None) = (unpaired.next(), unpaired.next()) {
        return Some(only);
    }

    // gen_range excludes the upper bound: every index 0..len is reachable
    pool.get(rng.gen_range(0..pool.len())).copied()
}
