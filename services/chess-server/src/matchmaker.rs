//! Component 4.F — pure pairing logic.
//!
//! Kept free of sockets and shared state so the "fair pairing" property
//! (alternating sort direction, odd one waits) can be tested directly.

use crate::account::UserId;

/// Sort `candidates` by rating (ascending if `reverse` is false, otherwise
/// descending) and pair off (0,1), (2,3), ... An odd trailing candidate is
/// returned separately to wait for the next tick.
pub fn pair_candidates(mut candidates: Vec<(UserId, i64)>, reverse: bool) -> Vec<(UserId, UserId)> {
    candidates.sort_by(|a, b| {
        if reverse {
            b.1.cmp(&a.1)
        } else {
            a.1.cmp(&b.1)
        }
    });
    candidates
        .chunks_exact(2)
        .map(|pair| (pair[0].0, pair[1].0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_consecutive_ratings_leaving_the_odd_one_out() {
        let candidates = vec![(1, 1000), (2, 900), (3, 1100), (4, 950), (5, 1050)];
        let pairs = pair_candidates(candidates, false);
        assert_eq!(pairs.len(), 2);
        // ascending: 900(2), 950(4), 1000(1), 1050(5), 1100(3) -> (2,4) crosses... verify precise pairing
        assert_eq!(pairs, vec![(2, 4), (1, 5)]);
    }

    #[test]
    fn reverse_flag_flips_sort_direction() {
        let candidates = vec![(1, 1000), (2, 900)];
        let ascending = pair_candidates(candidates.clone(), false);
        let descending = pair_candidates(candidates, true);
        assert_eq!(ascending, vec![(2, 1)]);
        assert_eq!(descending, vec![(1, 2)]);
    }

    #[test]
    fn empty_candidate_list_yields_no_pairs() {
        assert_eq!(pair_candidates(Vec::new(), false), Vec::new());
    }

    #[test]
    fn single_candidate_waits_for_next_tick() {
        assert_eq!(pair_candidates(vec![(1, 1000)], false), Vec::new());
    }
}
