/// Consecutive `true` weeks counted back from the most recent (last) entry.
pub fn track_streak(flags: &[bool]) -> usize {
    flags.iter().rev().take_while(|flag| **flag).count()
}

/// Streak of weeks whose score is strictly above `threshold`.
pub fn streak_above(scores: &[f64], threshold: f64) -> usize {
    let flags: Vec<bool> = scores.iter().map(|score| *score > threshold).collect();
    track_streak(&flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_from_most_recent_week() {
        assert_eq!(track_streak(&[true, true, false, true]), 1);
        assert_eq!(track_streak(&[true, true, true]), 3);
        assert_eq!(track_streak(&[true, true, false]), 0);
    }

    #[test]
    fn empty_and_all_false_are_zero() {
        assert_eq!(track_streak(&[]), 0);
        assert_eq!(track_streak(&[false, false]), 0);
    }

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(streak_above(&[80.0, 50.0, 65.5, 70.0], 65.0), 2);
        assert_eq!(streak_above(&[80.0, 70.0, 65.0], 65.0), 0);
    }
}
