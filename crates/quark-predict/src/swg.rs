use std::sync::Mutex;

use indexmap::IndexMap;
use quark_cache::VirtualPath;

use crate::contract::{last_other_than, push_distinct, PredictionModel};

/// Greedy successor-graph predictor: a weighted directed graph over
/// VirtualPaths, predicting the highest-weight outgoing edge from the
/// current context.
pub struct SwgPredictor {
    state: Mutex<State>,
}

struct State {
    history: Vec<VirtualPath>,
    graph: IndexMap<VirtualPath, IndexMap<VirtualPath, u64>>,
}

impl SwgPredictor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                history: Vec::new(),
                graph: IndexMap::new(),
            }),
        }
    }

    /// Pick the max-weight successor of `node`, first-inserted wins on a
    /// tie (IndexMap preserves insertion order; we only replace the running
    /// best on a strictly greater weight).
    fn best_successor(
        graph: &IndexMap<VirtualPath, IndexMap<VirtualPath, u64>>,
        node: &VirtualPath,
    ) -> Option<VirtualPath> {
        let successors = graph.get(node)?;
        let mut best: Option<(&VirtualPath, u64)> = None;
        for (succ, &weight) in successors {
            match best {
                Some((_, best_weight)) if weight <= best_weight => {}
                _ => best = Some((succ, weight)),
            }
        }
        best.map(|(path, _)| path.clone())
    }
}

impl Default for SwgPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionModel for SwgPredictor {
    fn log(&self, path: &VirtualPath) {
        let mut state = self.state.lock().expect("swg predictor mutex poisoned");

        if state.history.last() == Some(path) {
            return;
        }

        let prev = last_other_than(&state.history, Some(path));
        push_distinct(&mut state.history, path);

        if let Some(prev) = prev {
            *state
                .graph
                .entry(prev)
                .or_default()
                .entry(path.clone())
                .or_insert(0)
                += 1;
        }
    }

    fn last(&self, other_than: Option<&VirtualPath>) -> Option<VirtualPath> {
        let state = self.state.lock().expect("swg predictor mutex poisoned");
        last_other_than(&state.history, other_than)
    }

    fn predict(&self, context: Option<&VirtualPath>, k: usize) -> Vec<VirtualPath> {
        let state = self.state.lock().expect("swg predictor mutex poisoned");

        let mut current = match context.cloned().or_else(|| state.history.last().cloned()) {
            Some(path) => path,
            None => return Vec::new(),
        };

        let mut results = Vec::with_capacity(k);
        for _ in 0..k {
            match Self::best_successor(&state.graph, &current) {
                Some(next) => {
                    results.push(next.clone());
                    current = next;
                }
                None => break,
            }
        }
        results
    }

    fn status(&self) -> String {
        let state = self.state.lock().expect("swg predictor mutex poisoned");
        let edges: usize = state.graph.values().map(IndexMap::len).sum();
        format!(
            "swg: {} nodes, {} edges, history length {}",
            state.graph.len(),
            edges,
            state.history.len()
        )
    }

    fn name(&self) -> &'static str {
        "swg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(s: &str) -> VirtualPath {
        quark_cache::normalize(s)
    }

    #[test]
    fn predicts_highest_weight_edge() {
        let model = SwgPredictor::new();
        for path in ["A", "B", "A", "B", "A", "C"] {
            model.log(&vp(path));
        }

        assert_eq!(model.predict(Some(&vp("A")), 1), vec![vp("B")]);
        assert!(model.predict(Some(&vp("C")), 1).is_empty());
    }

    #[test]
    fn consecutive_duplicate_is_idempotent() {
        let model = SwgPredictor::new();
        model.log(&vp("A"));
        model.log(&vp("A"));
        assert_eq!(model.last(None), Some(vp("A")));
        assert!(model.predict(Some(&vp("A")), 1).is_empty());
    }

    #[test]
    fn tie_break_is_first_inserted() {
        let model = SwgPredictor::new();
        // A->B and A->C each get weight 1; B was inserted first.
        model.log(&vp("A"));
        model.log(&vp("B"));
        model.log(&vp("A"));
        model.log(&vp("C"));

        assert_eq!(model.predict(Some(&vp("A")), 1), vec![vp("B")]);
    }

    #[test]
    fn multi_step_prediction_walks_best_chain() {
        let model = SwgPredictor::new();
        for path in ["A", "B", "C"] {
            model.log(&vp(path));
        }
        assert_eq!(model.predict(Some(&vp("A")), 2), vec![vp("B"), vp("C")]);
    }
}
