//! First-of-two race between an outcome and a deadline.

use std::future::Future;
use std::time::Duration;

/// Which side of a [`first_of`] race finished first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Race<T> {
    /// The outcome settled before the deadline.
    Settled(T),
    /// The deadline elapsed first; the outcome is abandoned.
    Deadline(Duration),
}

impl<T> Race<T> {
    /// The settled value, if any.
    pub fn settled(self) -> Option<T> {
        match self {
            Race::Settled(value) => Some(value),
            Race::Deadline(_) => None,
        }
    }

    /// Whether the deadline won.
    pub fn is_deadline(&self) -> bool {
        matches!(self, Race::Deadline(_))
    }
}

/// Await `outcome` or `deadline`, whichever resolves first.
///
/// The outcome is polled first on every wake-up, so an outcome that is
/// already ready wins a tie. Losing futures are dropped; work they spawned
/// elsewhere keeps running unobserved.
pub async fn first_of<F>(outcome: F, deadline: Duration) -> Race<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        value = outcome => Race::Settled(value),
        _ = tokio::time::sleep(deadline) => Race::Deadline(deadline),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outcome_wins() {
        let race = first_of(async { 7 }, Duration::from_millis(50)).await;
        assert_eq!(race, Race::Settled(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_wins_over_pending() {
        let race = first_of(std::future::pending::<()>(), Duration::from_millis(1500)).await;
        assert!(race.is_deadline());
        assert_eq!(race, Race::Deadline(Duration::from_millis(1500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_outcome_loses() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        };
        let race = first_of(slow, Duration::from_secs(1)).await;
        assert_eq!(race.settled(), None);
    }
}
