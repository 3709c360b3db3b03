//! Hidden number dealing.
//!
//! Dealing is the one place the command path needs randomness, and
//! randomness makes transitions impossible to assert on. So it sits
//! behind the [`Dealer`] trait: production uses [`RandomDealer`], tests
//! script the exact numbers with [`SequenceDealer`], and the transition
//! code can't tell them apart.

use std::sync::Mutex;

use crate::CommandError;

/// Hands out distinct hidden numbers for a round.
pub trait Dealer: Send + Sync + 'static {
    /// Returns `count` distinct numbers from `min..=max`.
    ///
    /// # Errors
    /// [`CommandError::InvalidPayload`] if the range holds fewer than
    /// `count` numbers.
    fn deal(&self, count: usize, min: u32, max: u32) -> Result<Vec<u32>, CommandError>;
}

fn check_range(count: usize, min: u32, max: u32) -> Result<usize, CommandError> {
    if min > max {
        return Err(CommandError::invalid(format!("empty deal range {min}..={max}")));
    }
    let span = (max - min) as usize + 1;
    if count > span {
        return Err(CommandError::invalid(format!(
            "cannot deal {count} distinct numbers from {min}..={max}"
        )));
    }
    Ok(span)
}

/// Deals uniformly at random without replacement.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDealer;

impl Dealer for RandomDealer {
    fn deal(&self, count: usize, min: u32, max: u32) -> Result<Vec<u32>, CommandError> {
        let span = check_range(count, min, max)?;
        let mut rng = rand::rng();
        Ok(rand::seq::index::sample(&mut rng, span, count)
            .into_iter()
            .map(|offset| min + offset as u32)
            .collect())
    }
}

/// Deals a scripted sequence, for tests and replays.
///
/// Each deal takes the next `count` numbers from the script. Numbers are
/// handed out as-is; the script is trusted to keep them distinct.
#[derive(Debug, Default)]
pub struct SequenceDealer {
    script: Mutex<Vec<u32>>,
}

impl SequenceDealer {
    pub fn new(script: impl IntoIterator<Item = u32>) -> Self {
        let mut script: Vec<u32> = script.into_iter().collect();
        script.reverse();
        Self {
            script: Mutex::new(script),
        }
    }
}

impl Dealer for SequenceDealer {
    fn deal(&self, count: usize, min: u32, max: u32) -> Result<Vec<u32>, CommandError> {
        check_range(count, min, max)?;
        let mut script = self
            .script
            .lock()
            .map_err(|_| CommandError::invalid("dealer script poisoned"))?;
        if script.len() < count {
            return Err(CommandError::invalid("dealer script exhausted"));
        }
        Ok((0..count).filter_map(|_| script.pop()).collect())
    }
}
