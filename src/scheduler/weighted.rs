//! Weighted two-choice selection.
//!
//! Weights are load: a higher weight means a busier candidate. Each weight is
//! also the candidate's number of "tickets" in the draw.

use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("No candidates to choose from")]
    NoCandidates,
    #[error("Total weight is zero")]
    ZeroWeight,
    #[error("Total weight does not fit in u64")]
    WeightOverflow,
}

/// The two candidates drawn for one decision. `second` is `None` when no
/// distinct second candidate can be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draw {
    pub first: usize,
    pub second: Option<usize>,
}

/// Draws two distinct indices, each with probability proportional to its weight.
///
/// A single candidate is returned without a second draw. When only one index
/// holds any weight no distinct second index can ever come up, so that index is
/// returned alone instead of resampling forever.
pub fn draw_pair<R: Rng + ?Sized>(weights: &[u64], rng: &mut R) -> Result<Draw, SchedulerError> {
    if weights.is_empty() {
        return Err(SchedulerError::NoCandidates);
    }

    let total = weights
        .iter()
        .try_fold(0u64, |acc, &w| acc.checked_add(w))
        .ok_or(SchedulerError::WeightOverflow)?;
    if total == 0 {
        return Err(SchedulerError::ZeroWeight);
    }

    let first = draw_one(weights, total, rng);

    if weights.len() == 1 || weights.iter().filter(|&&w| w > 0).count() < 2 {
        return Ok(Draw {
            first,
            second: None,
        });
    }

    let mut second = first;
    while second == first {
        second = draw_one(weights, total, rng);
    }

    Ok(Draw {
        first,
        second: Some(second),
    })
}

/// Picks the less loaded of two weighted draws. Ties go to the first draw.
pub fn weighted_two_choice<R: Rng + ?Sized>(
    weights: &[u64],
    rng: &mut R,
) -> Result<usize, SchedulerError> {
    let draw = draw_pair(weights, rng)?;

    Ok(match draw.second {
        Some(second) if weights[second] < weights[draw.first] => second,
        _ => draw.first,
    })
}

/// Maps a uniform ticket in `[0, total)` to the index owning it.
///
/// `total` is the checked sum of `weights`, so the running sum cannot overflow.
fn draw_one<R: Rng + ?Sized>(weights: &[u64], total: u64, rng: &mut R) -> usize {
    let ticket = rng.gen_range(0..total);

    let mut cumulative = 0u64;
    for (idx, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if ticket < cumulative {
            return idx;
        }
    }

    // unreachable while ticket < total
    weights.len() - 1
}
