//! Recipient assignment
//!
//! Picks a recipient for a requesting participant and commits the
//! giver/recipient link. The claim on the candidate's `santa_id` is a
//! compare-and-set, which is the only guard against two requesters taking
//! the same candidate concurrently.

mod selection;

pub use selection::{candidate_pool, select_candidate};

use crate::db::{Participant, ParticipantId};
use crate::runtime::{ParticipantStore, StoreError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("Participant not found: {0}")]
    NotFound(ParticipantId),
    #[error("Participant already has a recipient")]
    AlreadyAssigned,
    #[error("No candidate available")]
    NoCandidateAvailable,
    #[error("Candidate was claimed concurrently")]
    ConcurrentAssignmentConflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AssignmentEngine<S> {
    store: S,
    rng: Mutex<StdRng>,
}

impl<S: ParticipantStore> AssignmentEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Engine with a reproducible random pick
    #[allow(dead_code)] // Used in tests
    pub fn with_seed(store: S, seed: u64) -> Self {
        Self {
            store,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Select a recipient for `requester_id` and commit the link.
    ///
    /// Returns the chosen recipient as it reads after the commit.
    pub async fn assign_recipient(
        &self,
        requester_id: ParticipantId,
    ) -> Result<Participant, AssignmentError> {
        let requester = self
            .store
            .find_by_id(requester_id)
            .await?
            .ok_or(AssignmentError::NotFound(requester_id))?;

        if requester.recipient_id.is_some() {
            return Err(AssignmentError::AlreadyAssigned);
        }

        let participants = self.store.find_all().await?;
        let pool = candidate_pool(&participants, requester_id);
        let candidate = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            select_candidate(&pool, &mut *rng).cloned()
        }
        .ok_or(AssignmentError::NoCandidateAvailable)?;

        tracing::debug!(
            participant_id = requester_id,
            pool_size = pool.len(),
            "Candidate selected"
        );

        self.commit(requester_id, &candidate).await?;

        tracing::info!(participant_id = requester_id, "Recipient assigned");

        let mut recipient = candidate;
        recipient.santa_id = Some(requester_id);
        Ok(recipient)
    }

    /// Claim `candidate` for the requester and link the requester to it
    pub async fn commit(
        &self,
        requester_id: ParticipantId,
        candidate: &Participant,
    ) -> Result<(), AssignmentError> {
        if self
            .store
            .commit_assignment(requester_id, candidate.id)
            .await?
        {
            Ok(())
        } else {
            tracing::warn!(
                participant_id = requester_id,
                "Candidate claimed by someone else, assignment not committed"
            );
            Err(AssignmentError::ConcurrentAssignmentConflict)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ParticipantProfile;
    use crate::runtime::testing::InMemoryStorage;
    use proptest::prelude::*;
    use std::collections::HashSet;

    const A: ParticipantId = 100;
    const B: ParticipantId = 200;
    const C: ParticipantId = 300;

    async fn storage_with(ids: &[ParticipantId]) -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        for id in ids {
            storage
                .create(&ParticipantProfile::new(*id).with_first_name(format!("P{id}")))
                .await
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_never_assigns_self() {
        for seed in 0..20 {
            let storage = storage_with(&[A, B]).await;
            let engine = AssignmentEngine::with_seed(storage.clone(), seed);

            let recipient = engine.assign_recipient(A).await.unwrap();
            assert_eq!(recipient.id, B);
            assert_eq!(recipient.santa_id, Some(A));
            assert_eq!(storage.participant(A).unwrap().recipient_id, Some(B));
            assert_eq!(storage.participant(B).unwrap().santa_id, Some(A));
        }
    }

    #[tokio::test]
    async fn test_second_request_is_already_assigned() {
        let storage = storage_with(&[A, B, C]).await;
        let engine = AssignmentEngine::with_seed(storage.clone(), 1);

        engine.assign_recipient(A).await.unwrap();
        let before = storage.participants();

        assert!(matches!(
            engine.assign_recipient(A).await,
            Err(AssignmentError::AlreadyAssigned)
        ));
        assert_eq!(storage.participants(), before);
    }

    #[tokio::test]
    async fn test_claimed_candidate_conflicts() {
        let storage = storage_with(&[A, B, C]).await;
        let engine = AssignmentEngine::with_seed(storage.clone(), 1);
        let b = storage.participant(B).unwrap();

        engine.commit(A, &b).await.unwrap();

        // C read B from a stale snapshot and tries to claim it
        assert!(matches!(
            engine.commit(C, &b).await,
            Err(AssignmentError::ConcurrentAssignmentConflict)
        ));
        assert_eq!(storage.participant(B).unwrap().santa_id, Some(A));
        assert_eq!(storage.participant(C).unwrap().recipient_id, None);
    }

    #[tokio::test]
    async fn test_lost_claim_leaves_requester_unpaired() {
        let storage = storage_with(&[A, B]).await;
        let engine = AssignmentEngine::with_seed(storage.clone(), 1);
        storage.lose_next_claim();

        assert!(matches!(
            engine.assign_recipient(A).await,
            Err(AssignmentError::ConcurrentAssignmentConflict)
        ));
        assert_eq!(storage.participant(A).unwrap().recipient_id, None);
        assert_eq!(storage.participant(B).unwrap().santa_id, None);

        // The next attempt goes through
        assert_eq!(engine.assign_recipient(A).await.unwrap().id, B);
    }

    #[tokio::test]
    async fn test_no_candidate_available() {
        let storage = storage_with(&[A]).await;
        let engine = AssignmentEngine::with_seed(storage.clone(), 1);
        assert!(matches!(
            engine.assign_recipient(A).await,
            Err(AssignmentError::NoCandidateAvailable)
        ));

        // Everyone else already claimed
        let storage = storage_with(&[A, B, C]).await;
        storage.claim_santa(B, C).await.unwrap();
        storage.claim_santa(C, B).await.unwrap();
        let engine = AssignmentEngine::with_seed(storage, 1);
        assert!(matches!(
            engine.assign_recipient(A).await,
            Err(AssignmentError::NoCandidateAvailable)
        ));
    }

    #[tokio::test]
    async fn test_unknown_requester() {
        let storage = storage_with(&[A, B]).await;
        let engine = AssignmentEngine::with_seed(storage, 1);
        assert!(matches!(
            engine.assign_recipient(C).await,
            Err(AssignmentError::NotFound(C))
        ));
    }

    #[tokio::test]
    async fn test_first_pick_is_random_over_both_candidates() {
        let mut picked = HashSet::new();
        for seed in 0..64 {
            let storage = storage_with(&[A, B, C]).await;
            let engine = AssignmentEngine::with_seed(storage, seed);
            picked.insert(engine.assign_recipient(A).await.unwrap().id);
        }
        assert_eq!(picked, HashSet::from([B, C]));
    }

    #[tokio::test]
    async fn test_three_participant_scenario() {
        for seed in 0..10 {
            let storage = storage_with(&[A, B, C]).await;
            let engine = AssignmentEngine::with_seed(storage.clone(), seed);

            // A took B
            let b = storage.participant(B).unwrap();
            engine.commit(A, &b).await.unwrap();

            // Pool for C is {A}; A has no recipient yet, so it is picked outright
            let recipient = engine.assign_recipient(C).await.unwrap();
            assert_eq!(recipient.id, A);
            assert_eq!(storage.participant(C).unwrap().recipient_id, Some(A));
            assert_eq!(storage.participant(A).unwrap().santa_id, Some(C));
            assert_eq!(storage.participant(A).unwrap().recipient_id, Some(B));
            // B never asked and stays without a recipient
            assert_eq!(storage.participant(B).unwrap().recipient_id, None);
        }
    }

    proptest! {
        #[test]
        fn prop_assignments_stay_consistent(
            count in 2usize..8,
            requests in prop::collection::vec(0usize..8, 1..24),
            seed in any::<u64>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let ids: Vec<ParticipantId> = (1..=i64::try_from(count).unwrap()).collect();
                let storage = storage_with(&ids).await;
                let engine = AssignmentEngine::with_seed(storage.clone(), seed);

                for idx in requests {
                    let requester = ids[idx % count];
                    match engine.assign_recipient(requester).await {
                        Ok(recipient) => prop_assert_ne!(recipient.id, requester),
                        Err(AssignmentError::AlreadyAssigned
                            | AssignmentError::NoCandidateAvailable) => {}
                        Err(other) => prop_assert!(false, "unexpected error: {other}"),
                    }
                }

                let all = storage.participants();
                let mut recipients = HashSet::new();
                for p in &all {
                    if let Some(r) = p.recipient_id {
                        prop_assert_ne!(r, p.id);
                        prop_assert!(recipients.insert(r), "recipient {r} assigned twice");
                        let target = all.iter().find(|q| q.id == r).unwrap();
                        prop_assert_eq!(target.santa_id, Some(p.id));
                    }
                    if let Some(s) = p.santa_id {
                        let giver = all.iter().find(|q| q.id == s).unwrap();
                        prop_assert_eq!(giver.recipient_id, Some(p.id));
                    }
                }
                Ok(())
            })?;
        }
    }
}
