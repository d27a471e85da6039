//! SM-2 review scheduling.
//!
//! Passing grades (>= 3) grow the interval 0 → 1 → 6 → `round(interval * ease)`
//! and adjust the ease factor with the usual SM-2 quadratic. A failing grade
//! resets the interval to one day and leaves the ease factor untouched, which
//! departs from canonical SM-2 on purpose.

use crate::model::Grade;

/// Lowest allowed ease factor.
pub const MIN_EASE: f64 = 1.3;
/// Highest allowed ease factor.
pub const MAX_EASE: f64 = 2.5;

/// Output of one scheduling step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub ease: f64,
    pub interval_days: u32,
}

/// Compute the next ease factor and interval after a graded attempt.
pub fn schedule(grade: Grade, prior_ease: f64, prior_interval: u32) -> Schedule {
    if !grade.is_pass() {
        return Schedule {
            ease: clamp_ease(prior_ease),
            interval_days: 1,
        };
    }

    let interval_days = match prior_interval {
        0 => 1,
        1 => 6,
        n => (f64::from(n) * prior_ease).round() as u32,
    };

    let miss = f64::from(Grade::MAX - grade.value());
    let ease = prior_ease + (0.1 - miss * (0.08 + miss * 0.02));

    Schedule {
        ease: clamp_ease(ease),
        interval_days,
    }
}

fn clamp_ease(ease: f64) -> f64 {
    ease.clamp(MIN_EASE, MAX_EASE)
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};

    use super::*;

    fn g(v: u8) -> Grade {
        Grade::new(v).unwrap()
    }

    #[test]
    fn first_pass_gives_one_day() {
        for grade in 3..=5 {
            let s = schedule(g(grade), 2.5, 0);
            assert_eq!(s.interval_days, 1);
            assert!((MIN_EASE..=MAX_EASE).contains(&s.ease));
        }
    }

    #[test]
    fn second_pass_gives_six_days() {
        for grade in 3..=5 {
            for ease in [1.3, 1.9, 2.5] {
                assert_eq!(schedule(g(grade), ease, 1).interval_days, 6);
            }
        }
    }

    #[test]
    fn later_passes_multiply_by_ease() {
        let s = schedule(g(5), 2.5, 6);
        assert_eq!(s.interval_days, 15);
        let s = schedule(g(4), 1.3, 10);
        assert_eq!(s.interval_days, 13);
    }

    #[test]
    fn failure_resets_interval_and_keeps_ease() {
        for grade in 0..3 {
            for (ease, interval) in [(2.5, 0), (1.7, 6), (1.3, 40)] {
                let s = schedule(g(grade), ease, interval);
                assert_eq!(s.interval_days, 1);
                assert_eq!(s.ease, ease);
            }
        }
    }

    #[test]
    fn ease_adjustment_matches_formula() {
        // grade 3: 0.1 - 2 * (0.08 + 2 * 0.02) = -0.14
        let s = schedule(g(3), 2.0, 6);
        assert!((s.ease - 1.86).abs() < 1e-9);
        // grade 4 leaves ease unchanged
        let s = schedule(g(4), 2.0, 6);
        assert!((s.ease - 2.0).abs() < 1e-9);
        // grade 5 is capped at the maximum
        assert_eq!(schedule(g(5), 2.5, 6).ease, MAX_EASE);
    }

    #[test]
    fn random_grade_sequences_keep_ease_in_bounds() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let mut ease = 2.5;
            let mut interval = 0;
            for _ in 0..rng.gen_range(1..60) {
                let s = schedule(g(rng.gen_range(0..=5)), ease, interval);
                assert!(
                    (MIN_EASE..=MAX_EASE).contains(&s.ease),
                    "ease escaped bounds: {}",
                    s.ease
                );
                ease = s.ease;
                // keep intervals from overflowing on long pass streaks
                interval = s.interval_days.min(10_000);
            }
        }
    }
}
