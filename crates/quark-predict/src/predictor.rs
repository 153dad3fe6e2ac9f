use std::path::PathBuf;

use quark_cache::VirtualPath;

use crate::adaptive::AdaptiveMarkovPredictor;
use crate::contract::PredictionModel;
use crate::markov::DecayedMarkovPredictor;
use crate::swg::SwgPredictor;

/// The set of prediction algorithms Quark can run, selected at mount time.
/// A tagged enum rather than `Box<dyn PredictionModel>` keeps dispatch
/// monomorphic and lets callers match on which model they asked for.
pub enum Predictor {
    Swg(SwgPredictor),
    Markov(DecayedMarkovPredictor),
    Adaptive(AdaptiveMarkovPredictor),
}

impl Predictor {
    pub fn swg() -> Self {
        Predictor::Swg(SwgPredictor::new())
    }

    pub fn markov(order: usize, decay: f64, root: PathBuf) -> Self {
        Predictor::Markov(DecayedMarkovPredictor::new(order, decay, root))
    }

    pub fn adaptive(window: usize, eta: f64, decay: f64) -> Self {
        Predictor::Adaptive(AdaptiveMarkovPredictor::new(window, eta, decay))
    }

    fn inner(&self) -> &dyn PredictionModel {
        match self {
            Predictor::Swg(p) => p,
            Predictor::Markov(p) => p,
            Predictor::Adaptive(p) => p,
        }
    }
}

impl PredictionModel for Predictor {
    fn log(&self, path: &VirtualPath) {
        self.inner().log(path)
    }

    fn last(&self, other_than: Option<&VirtualPath>) -> Option<VirtualPath> {
        self.inner().last(other_than)
    }

    fn predict(&self, context: Option<&VirtualPath>, k: usize) -> Vec<VirtualPath> {
        self.inner().predict(context, k)
    }

    fn status(&self) -> String {
        self.inner().status()
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(s: &str) -> VirtualPath {
        quark_cache::normalize(s)
    }

    #[test]
    fn dispatches_to_selected_variant() {
        let predictor = Predictor::swg();
        assert_eq!(predictor.name(), "swg");

        predictor.log(&vp("a"));
        predictor.log(&vp("b"));
        assert_eq!(predictor.predict(Some(&vp("a")), 1), vec![vp("b")]);
    }
}
