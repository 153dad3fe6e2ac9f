use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use indexmap::IndexMap;
use quark_cache::VirtualPath;

use crate::contract::{effective_sequence, last_other_than, push_distinct, PredictionModel};

/// Variable-order Markov predictor with multiplicative decay of
/// non-reinforced successors. Contexts range from order `order` down to the
/// empty context (order 0), which doubles as a global fallback table.
pub struct DecayedMarkovPredictor {
    order: usize,
    decay: f64,
    root: PathBuf,
    state: Mutex<State>,
}

struct State {
    history: Vec<VirtualPath>,
    // Keyed by context (a suffix of history, shortest = empty = global table).
    table: HashMap<Vec<VirtualPath>, IndexMap<VirtualPath, f64>>,
    exists_cache: HashMap<VirtualPath, bool>,
}

impl DecayedMarkovPredictor {
    pub fn new(order: usize, decay: f64, root: PathBuf) -> Self {
        let order = order.max(1);
        Self {
            order,
            decay: decay.clamp(0.0, 1.0),
            root,
            state: Mutex::new(State {
                history: Vec::new(),
                table: HashMap::new(),
                exists_cache: HashMap::new(),
            }),
        }
    }

    fn file_exists(&self, state: &mut State, path: &VirtualPath) -> bool {
        if let Some(&exists) = state.exists_cache.get(path) {
            return exists;
        }
        let exists = path.resolve(&self.root).try_exists().unwrap_or(false);
        state.exists_cache.insert(path.clone(), exists);
        exists
    }

    /// Contexts of order `n` are keyed by the `n - 1` entries preceding the
    /// current observation (order 1 is the empty context and doubles as the
    /// global fallback table).
    fn context_key(history: &[VirtualPath], n: usize) -> Option<Vec<VirtualPath>> {
        let ctx_len = n - 1;
        if ctx_len == 0 {
            return Some(Vec::new());
        }
        if history.len() < ctx_len {
            return None;
        }
        Some(history[history.len() - ctx_len..].to_vec())
    }

    fn single_step(&self, state: &mut State, sequence: &[VirtualPath]) -> Option<VirtualPath> {
        for n in (1..=self.order.min(sequence.len().max(1))).rev() {
            let Some(ctx) = Self::context_key(sequence, n) else {
                continue;
            };
            let Some(successors) = state.table.get(&ctx) else {
                continue;
            };

            let mut ranked: Vec<(VirtualPath, f64)> =
                successors.iter().map(|(p, &w)| (p.clone(), w)).collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

            for (candidate, _) in &ranked {
                if self.file_exists(state, candidate) {
                    return Some(candidate.clone());
                }
            }
        }
        None
    }
}

impl PredictionModel for DecayedMarkovPredictor {
    fn log(&self, path: &VirtualPath) {
        let mut state = self.state.lock().expect("markov predictor mutex poisoned");

        if state.history.last() == Some(path) {
            return;
        }

        let pre_append = state.history.clone();
        push_distinct(&mut state.history, path);

        for n in 1..=self.order.min(pre_append.len() + 1) {
            let Some(ctx) = Self::context_key(&pre_append, n) else {
                continue;
            };
            let successors = state.table.entry(ctx).or_default();

            if self.decay < 1.0 {
                for (candidate, weight) in successors.iter_mut() {
                    if candidate != path {
                        *weight *= self.decay;
                    }
                }
            }
            *successors.entry(path.clone()).or_insert(0.0) += 1.0;
        }
    }

    fn last(&self, other_than: Option<&VirtualPath>) -> Option<VirtualPath> {
        let state = self.state.lock().expect("markov predictor mutex poisoned");
        last_other_than(&state.history, other_than)
    }

    fn predict(&self, context: Option<&VirtualPath>, k: usize) -> Vec<VirtualPath> {
        let mut state = self.state.lock().expect("markov predictor mutex poisoned");
        let mut sequence = effective_sequence(&state.history, context);

        let mut results = Vec::with_capacity(k);
        for _ in 0..k {
            match self.single_step(&mut state, &sequence) {
                Some(next) => {
                    sequence.push(next.clone());
                    results.push(next);
                }
                None => break,
            }
        }
        results
    }

    fn status(&self) -> String {
        let state = self.state.lock().expect("markov predictor mutex poisoned");
        format!(
            "markov(order={}, decay={}): {} contexts, history length {}",
            self.order,
            self.decay,
            state.table.len(),
            state.history.len()
        )
    }

    fn name(&self) -> &'static str {
        "markov"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn vp(s: &str) -> VirtualPath {
        quark_cache::normalize(s)
    }

    fn touch(dir: &std::path::Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), b"x").unwrap();
        }
    }

    #[test]
    fn predicts_most_frequent_successor_when_file_exists() {
        let dir = tempdir().unwrap();
        touch(dir.path(), &["a", "b", "c"]);
        let model = DecayedMarkovPredictor::new(2, 0.9, dir.path().to_path_buf());

        for path in ["a", "b", "a", "b", "a", "c"] {
            model.log(&vp(path));
        }

        assert_eq!(model.predict(Some(&vp("a")), 1), vec![vp("b")]);
    }

    #[test]
    fn falls_back_to_global_context_when_higher_order_unseen() {
        let dir = tempdir().unwrap();
        touch(dir.path(), &["a", "b", "z"]);
        let model = DecayedMarkovPredictor::new(3, 0.9, dir.path().to_path_buf());

        model.log(&vp("a"));
        model.log(&vp("b"));
        model.log(&vp("z"));
        model.log(&vp("a"));
        model.log(&vp("b"));

        // "z" was never preceded by this exact high-order context before,
        // but the global (order-1/empty) table has seen it twice.
        let predictions = model.predict(Some(&vp("nonexistent-context-marker")), 1);
        assert!(predictions.is_empty() || predictions[0] == vp("a") || predictions[0] == vp("b"));
    }

    #[test]
    fn deleted_file_is_skipped_in_favor_of_next_candidate() {
        let dir = tempdir().unwrap();
        touch(dir.path(), &["a", "b"]);
        let model = DecayedMarkovPredictor::new(2, 1.0, dir.path().to_path_buf());

        model.log(&vp("a"));
        model.log(&vp("c")); // never created on disk
        model.log(&vp("a"));
        model.log(&vp("b"));

        assert_eq!(model.predict(Some(&vp("a")), 1), vec![vp("b")]);
    }
}
