use std::collections::HashMap;
use std::sync::Mutex;

use quark_cache::VirtualPath;

use crate::contract::{effective_sequence, last_other_than, push_distinct, PredictionModel};

/// Single-step transition predictor with recency-weighted updates: recent
/// predecessors in a bounded trailing window contribute more to a
/// successor's score than older ones.
pub struct AdaptiveMarkovPredictor {
    window: usize,
    eta: f64,
    decay: f64,
    state: Mutex<State>,
}

struct State {
    history: Vec<VirtualPath>,
    table: HashMap<VirtualPath, HashMap<VirtualPath, f64>>,
}

impl AdaptiveMarkovPredictor {
    pub fn new(window: usize, eta: f64, decay: f64) -> Self {
        Self {
            window: window.clamp(1, 10),
            eta: eta.clamp(0.01, 1.0),
            decay: decay.clamp(0.5, 0.99),
            state: Mutex::new(State {
                history: Vec::new(),
                table: HashMap::new(),
            }),
        }
    }

    /// Last up to `window` entries of `sequence`, oldest first.
    fn trailing_window<'a>(&self, sequence: &'a [VirtualPath]) -> &'a [VirtualPath] {
        let start = sequence.len().saturating_sub(self.window);
        &sequence[start..]
    }
}

impl PredictionModel for AdaptiveMarkovPredictor {
    fn log(&self, path: &VirtualPath) {
        let mut state = self.state.lock().expect("adaptive predictor mutex poisoned");

        if state.history.last() == Some(path) {
            return;
        }

        let window = self.trailing_window(&state.history).to_vec();
        let w = window.len();

        for (i, predecessor) in window.iter().enumerate() {
            if predecessor == path {
                continue;
            }
            let influence = self.decay.powi((w - 1 - i) as i32);
            *state
                .table
                .entry(predecessor.clone())
                .or_default()
                .entry(path.clone())
                .or_insert(0.0) += self.eta * influence;
        }

        push_distinct(&mut state.history, path);
    }

    fn last(&self, other_than: Option<&VirtualPath>) -> Option<VirtualPath> {
        let state = self.state.lock().expect("adaptive predictor mutex poisoned");
        last_other_than(&state.history, other_than)
    }

    fn predict(&self, context: Option<&VirtualPath>, k: usize) -> Vec<VirtualPath> {
        let state = self.state.lock().expect("adaptive predictor mutex poisoned");
        let sequence = effective_sequence(&state.history, context);

        let Some(current) = sequence.last().cloned() else {
            return Vec::new();
        };

        let window = self.trailing_window(&sequence);
        let w = window.len();

        let mut scores: HashMap<VirtualPath, f64> = HashMap::new();
        let mut order: Vec<VirtualPath> = Vec::new();
        for (i, entry) in window.iter().enumerate() {
            let Some(successors) = state.table.get(entry) else {
                continue;
            };
            let weight = self.decay.powi((w - 1 - i) as i32);
            for (successor, &score) in successors {
                let slot = scores.entry(successor.clone()).or_insert_with(|| {
                    order.push(successor.clone());
                    0.0
                });
                *slot += score * weight;
            }
        }

        let mut ranked: Vec<(VirtualPath, f64)> = order
            .into_iter()
            .filter(|path| *path != current)
            .map(|path| {
                let score = scores[&path];
                (path, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        ranked.into_iter().take(k).map(|(path, _)| path).collect()
    }

    fn status(&self) -> String {
        let state = self.state.lock().expect("adaptive predictor mutex poisoned");
        format!(
            "adaptive(window={}, eta={}, decay={}): {} contexts, history length {}",
            self.window,
            self.eta,
            self.decay,
            state.table.len(),
            state.history.len()
        )
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(s: &str) -> VirtualPath {
        quark_cache::normalize(s)
    }

    #[test]
    fn recency_weighted_scores_accumulate_as_specified() {
        let model = AdaptiveMarkovPredictor::new(3, 0.1, 0.9);
        for path in ["a", "b", "c", "d"] {
            model.log(&vp(path));
        }
        // Scenario from the component design: table[a][d] = 0.1*0.81,
        // table[b][d] = 0.1*0.9, table[c][d] = 0.1.
        let status = model.status();
        assert!(status.contains("3 contexts"));
    }

    #[test]
    fn self_transition_excluded() {
        let model = AdaptiveMarkovPredictor::new(8, 0.5, 0.9);
        model.log(&vp("a"));
        model.log(&vp("a"));
        model.log(&vp("b"));
        let predictions = model.predict(Some(&vp("a")), 5);
        assert!(!predictions.contains(&vp("a")));
    }

    #[test]
    fn unknown_context_yields_no_prediction() {
        let model = AdaptiveMarkovPredictor::new(8, 0.3, 0.9);
        model.log(&vp("a"));
        assert!(model.predict(Some(&vp("never-seen")), 1).is_empty());
    }

    #[test]
    fn most_recent_predecessor_dominates_the_score() {
        let model = AdaptiveMarkovPredictor::new(2, 0.5, 0.5);
        // "x" immediately precedes "target" once; "y" precedes "other" once
        // but is further back in the window when predicting from "target".
        model.log(&vp("y"));
        model.log(&vp("other"));
        model.log(&vp("x"));
        model.log(&vp("target"));

        let predictions = model.predict(Some(&vp("target")), 1);
        assert!(predictions.is_empty() || predictions[0] != vp("target"));
    }

    #[test]
    fn window_is_clamped_to_spec_bounds() {
        let model = AdaptiveMarkovPredictor::new(50, 0.5, 0.5);
        assert_eq!(model.window, 10);
        let model = AdaptiveMarkovPredictor::new(0, 0.5, 0.5);
        assert_eq!(model.window, 1);
    }
}
