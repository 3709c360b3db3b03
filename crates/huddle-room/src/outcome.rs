//! Round outcome evaluation.
//!
//! Pure functions: given the ordering players produced and their hidden
//! numbers, decide whether the ordering is non-decreasing and fold the
//! result into the room's running statistics.

use std::collections::BTreeMap;

use huddle_protocol::{OrderState, PlayerId, RoomOptions, RoundStats, RoundVerdict, Timestamp};

/// Hidden numbers by participant.
pub type HiddenValues = BTreeMap<PlayerId, u32>;

/// The result of walking an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortEvaluation {
    pub success: bool,
    /// 1-based position of the first value smaller than its predecessor.
    pub failed_at: Option<usize>,
    /// On failure, the value just before the violation. On success, the
    /// last value walked.
    pub last: Option<u32>,
}

/// Checks that `ids` are in non-decreasing order of their hidden values.
///
/// Equal neighbours are fine. Ids without a value are skipped.
///
/// ```
/// use huddle_protocol::PlayerId;
/// use huddle_room::{evaluate_sorted, HiddenValues};
///
/// let ids: Vec<_> = ["a", "b", "c"].into_iter().map(PlayerId::new).collect();
/// let values: HiddenValues = ids.iter().cloned().zip([7, 5, 9]).collect();
///
/// let eval = evaluate_sorted(&ids, &values);
/// assert!(!eval.success);
/// assert_eq!(eval.failed_at, Some(2));
/// ```
pub fn evaluate_sorted(ids: &[PlayerId], values: &HiddenValues) -> SortEvaluation {
    let mut last: Option<u32> = None;
    for (index, id) in ids.iter().enumerate() {
        let Some(&value) = values.get(id) else {
            continue;
        };
        if last.is_some_and(|prev| value < prev) {
            return SortEvaluation {
                success: false,
                failed_at: Some(index + 1),
                last,
            };
        }
        last = Some(value);
    }
    SortEvaluation {
        success: true,
        failed_at: None,
        last,
    }
}

// ---------------------------------------------------------------------------
// Sort-submit mode
// ---------------------------------------------------------------------------

/// Everything a completed sort-submit round writes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealOutcome {
    pub order: OrderState,
    pub stats: RoundStats,
    pub verdict: RoundVerdict,
}

/// Evaluates a full submitted ordering and folds it into `stats`.
pub fn build_reveal_outcome_payload(
    list: &[PlayerId],
    values: &HiddenValues,
    stats: RoundStats,
    now: Timestamp,
) -> RevealOutcome {
    let eval = evaluate_sorted(list, values);
    let mut stats = stats;
    stats.record(eval.success);

    let last_number = list.last().and_then(|id| values.get(id)).copied();
    RevealOutcome {
        order: OrderState {
            list: list.to_vec(),
            last_number,
            failed: !eval.success,
            failed_at: eval.failed_at,
            total: list.len(),
            decided_at: Some(now),
        },
        stats,
        verdict: RoundVerdict {
            success: eval.success,
            failed_at: eval.failed_at,
            finished: true,
        },
    }
}

// ---------------------------------------------------------------------------
// Sequential mode
// ---------------------------------------------------------------------------

/// The order after one more play, and whether the round ends with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayOutcome {
    pub order: OrderState,
    pub verdict: RoundVerdict,
}

/// Appends one play to a sequential round.
///
/// The first value smaller than the one before it fails the round. After
/// a failure the verdict is frozen; with `allow_continue_after_fail` the
/// remaining players still play out, otherwise the round ends at once.
/// It also ends when every expected play has been made.
pub fn build_play_outcome_payload(
    order: &OrderState,
    player: &PlayerId,
    number: u32,
    options: &RoomOptions,
    now: Timestamp,
) -> PlayOutcome {
    let mut next = order.clone();
    next.list.push(player.clone());

    if !next.failed && next.last_number.is_some_and(|prev| number < prev) {
        next.failed = true;
        next.failed_at = Some(next.list.len());
    }
    next.last_number = Some(number);

    let finished = next.is_complete() || (next.failed && !options.allow_continue_after_fail);
    if finished {
        next.decided_at = Some(now);
    }

    let verdict = RoundVerdict {
        success: !next.failed,
        failed_at: next.failed_at,
        finished,
    };
    PlayOutcome {
        order: next,
        verdict,
    }
}
