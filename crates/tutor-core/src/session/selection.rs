//! Problem and explanation-style selection.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::{Grade, Problem, Topic};

/// How many recent grades steer problem difficulty.
pub const RECENT_WINDOW: usize = 5;

/// Styles the language model may be asked for once every stored
/// explanation has been shown.
pub const ALTERNATIVE_STYLES: [&str; 4] = ["analogy", "visual", "procedural", "conceptual"];

/// Difficulty to aim for given the learner's recent grades: the pool's
/// easiest problem with no history or no passes, its hardest after a run of
/// passes, interpolated in between.
pub fn target_difficulty(pool: &[Problem], recent: &[Grade]) -> f64 {
    let Some(min) = pool.iter().map(|p| p.difficulty).min() else {
        return 0.0;
    };
    let max = pool.iter().map(|p| p.difficulty).max().unwrap_or(min);

    let window = &recent[recent.len().saturating_sub(RECENT_WINDOW)..];
    if window.is_empty() {
        return f64::from(min);
    }
    let passes = window.iter().filter(|g| g.is_pass()).count();
    let share = passes as f64 / window.len() as f64;
    f64::from(min) + share * f64::from(max - min)
}

/// Pick a problem index close to the target difficulty, at random among the
/// closest, avoiding `previous` when the pool has an alternative.
pub fn select_problem<R: Rng + ?Sized>(
    pool: &[Problem],
    recent: &[Grade],
    previous: Option<usize>,
    rng: &mut R,
) -> Option<usize> {
    if pool.is_empty() {
        return None;
    }
    let target = target_difficulty(pool, recent);
    let candidates: Vec<usize> = (0..pool.len())
        .filter(|&i| pool.len() == 1 || Some(i) != previous)
        .collect();

    let distance = |i: usize| (f64::from(pool[i].difficulty) - target).abs();
    let best = candidates
        .iter()
        .map(|&i| distance(i))
        .fold(f64::INFINITY, f64::min);
    let closest: Vec<usize> = candidates
        .into_iter()
        .filter(|&i| distance(i) - best < 1e-9)
        .collect();
    closest.choose(rng).copied()
}

/// A stored explanation style not yet shown this session.
pub fn unshown_style<'a>(topic: &'a Topic, shown: &[String]) -> Option<&'a str> {
    topic
        .explanations
        .keys()
        .find(|style| !shown.contains(style))
        .map(String::as_str)
}

/// A style to ask the language model for, different from the last one shown.
/// Styles never shown are preferred.
pub fn alternative_style(shown: &[String]) -> &'static str {
    let last = shown.last().map(String::as_str);
    ALTERNATIVE_STYLES
        .iter()
        .find(|s| !shown.iter().any(|seen| seen == *s))
        .or_else(|| ALTERNATIVE_STYLES.iter().find(|s| Some(**s) != last))
        .copied()
        .unwrap_or(ALTERNATIVE_STYLES[0])
}
