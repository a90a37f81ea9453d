//! Coordinated termination for the distributed executor.
//!
//! At the end of every step each rank votes whether it wants to stop (its
//! slab saw no change). The votes are gathered at the leader, combined
//! with logical AND, and the decision is broadcast back, so all ranks stop
//! at the same timestep or none do. The round doubles as a per-step
//! barrier: no rank enters step t+1 before every rank has finished step t.

use lifering_core::error::{LifeRingError, Result};
use lifering_core::group::{GroupEndpoint, Tag};
use tracing::debug;

/// Rank that collects votes and decides.
pub const ROOT_RANK: usize = 0;

/// Tag of the per-rank vote message.
pub const TAG_VOTE: Tag = 3;

/// Tag of the leader's decision broadcast.
pub const TAG_DECISION: Tag = 4;

/// Per-worker state of the termination protocol.
///
/// The leader's vote buffer is allocated on first use and released exactly
/// once, when the group decides to stop.
#[derive(Debug, Default)]
pub struct TerminationState {
    votes: Option<Vec<u8>>,
}

impl TerminationState {
    /// Fresh state with no vote buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn votes_mut(&mut self, size: usize) -> Result<&mut Vec<u8>> {
        if self.votes.is_none() {
            let mut votes = Vec::new();
            votes.try_reserve_exact(size).map_err(|e| {
                LifeRingError::ResourceExhausted(format!("vote buffer of {size} bytes: {e}"))
            })?;
            votes.resize(size, 0);
            self.votes = Some(votes);
        }
        // Just set above if it was absent.
        self.votes.as_mut().ok_or_else(|| {
            LifeRingError::InvariantViolation("vote buffer missing after allocation".to_string())
        })
    }
}

/// Run one termination round: vote, gather, decide, broadcast.
///
/// `stop_requested` is this rank's vote. Returns the group decision: true
/// when every rank voted to stop. On a stop decision the leader's vote
/// buffer is released.
pub async fn coordinated_stop(
    endpoint: &mut GroupEndpoint,
    state: &mut TerminationState,
    stop_requested: bool,
) -> Result<bool> {
    let rank = endpoint.rank();
    let vote = stop_requested as u8;

    let decision = if rank == ROOT_RANK {
        let size = endpoint.size();
        let votes = state.votes_mut(size)?;
        endpoint.gather_at(ROOT_RANK, TAG_VOTE, vote, votes).await?;
        let unanimous = votes.iter().all(|&v| v != 0) as u8;
        endpoint
            .broadcast_from(ROOT_RANK, TAG_DECISION, unanimous)
            .await?
    } else {
        endpoint.gather_at(ROOT_RANK, TAG_VOTE, vote, &mut []).await?;
        endpoint.broadcast_from(ROOT_RANK, TAG_DECISION, 0).await?
    };

    let stop = decision != 0;
    if stop {
        state.votes = None;
        debug!(rank, "group agreed to stop");
    }
    Ok(stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifering_core::group::{GroupBroker, GroupConfig};

    async fn run_round(votes: Vec<bool>) -> Vec<bool> {
        let broker = GroupBroker::new(votes.len(), GroupConfig::default());
        let mut tasks = Vec::new();
        for (rank, vote) in votes.into_iter().enumerate() {
            let mut endpoint = broker.endpoint(rank).unwrap();
            tasks.push(tokio::spawn(async move {
                let mut state = TerminationState::new();
                coordinated_stop(&mut endpoint, &mut state, vote)
                    .await
                    .unwrap()
            }));
        }
        let mut decisions = Vec::new();
        for task in tasks {
            decisions.push(task.await.unwrap());
        }
        decisions
    }

    #[tokio::test]
    async fn unanimous_votes_stop_the_group() {
        let decisions = run_round(vec![true, true, true, true]).await;
        assert!(decisions.iter().all(|&d| d));
    }

    #[tokio::test]
    async fn one_dissenting_vote_keeps_the_group_running() {
        let decisions = run_round(vec![true, true, false, true]).await;
        assert!(decisions.iter().all(|&d| !d));
    }

    #[tokio::test]
    async fn single_rank_group_decides_alone() {
        assert_eq!(run_round(vec![true]).await, vec![true]);
        assert_eq!(run_round(vec![false]).await, vec![false]);
    }

    #[tokio::test]
    async fn vote_buffer_lives_across_rounds_and_is_freed_on_stop() {
        let broker = GroupBroker::new(1, GroupConfig::default());
        let mut endpoint = broker.endpoint(0).unwrap();
        let mut state = TerminationState::new();
        assert!(state.votes.is_none());

        assert!(!coordinated_stop(&mut endpoint, &mut state, false).await.unwrap());
        assert!(state.votes.is_some());
        assert!(!coordinated_stop(&mut endpoint, &mut state, false).await.unwrap());
        assert!(state.votes.is_some());

        assert!(coordinated_stop(&mut endpoint, &mut state, true).await.unwrap());
        assert!(state.votes.is_none());
    }
}
