use crate::types::ProofId;
use std::collections::HashSet;

/// Collapse consecutive vote updates for the same proof to the last one.
///
/// `vote_key` returns the proof a job updates the stats of, or None for any
/// other job. Jobs without a key are always kept and act as barriers: votes
/// are never merged across them.
pub(crate) fn coalesce_votes<T>(jobs: Vec<T>, vote_key: impl Fn(&T) -> Option<ProofId>) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(jobs.len());

    for job in jobs.into_iter().rev() {
        match vote_key(&job) {
            Some(proof_id) => {
                // a later update for this proof is already kept
                if seen.insert(proof_id) {
                    kept.push(job);
                }
            }
            None => {
                seen.clear();
                kept.push(job);
            }
        }
    }

    kept.reverse();
    kept
}
