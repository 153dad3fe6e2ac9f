use std::path::PathBuf;

use clap::ValueEnum;

/// Default memory budget: 4 GiB, matching the reference cache manager.
pub const DEFAULT_MEMORY_BUDGET: u64 = 4 * 1024 * 1024 * 1024;

pub const DEFAULT_MARKOV_ORDER: usize = 3;
pub const DEFAULT_MARKOV_DECAY: f64 = 0.95;
pub const DEFAULT_ADAPTIVE_WINDOW: usize = 5;
pub const DEFAULT_ADAPTIVE_ETA: f64 = 0.1;
pub const DEFAULT_ADAPTIVE_DECAY: f64 = 0.9;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PredictorKind {
    Swg,
    Markov,
    Adaptive,
}

/// Everything the read-path integrator and the predictor need to start a
/// mount. Built once from CLI flags; the root directory is then treated as
/// immutable for the lifetime of the mount.
#[derive(Debug, Clone)]
pub struct QuarkConfig {
    pub root: PathBuf,
    pub mountpoint: PathBuf,
    pub memory_budget: u64,
    pub prefetch_enabled: bool,
    pub predictor: PredictorKind,
    pub markov_order: usize,
    pub markov_decay: f64,
    pub adaptive_window: usize,
    pub adaptive_eta: f64,
    pub adaptive_decay: f64,
}

impl QuarkConfig {
    pub fn build_predictor(&self) -> quark_predict::Predictor {
        use quark_predict::Predictor;

        match self.predictor {
            PredictorKind::Swg => Predictor::swg(),
            PredictorKind::Markov => {
                Predictor::markov(self.markov_order, self.markov_decay, self.root.clone())
            }
            PredictorKind::Adaptive => {
                Predictor::adaptive(self.adaptive_window, self.adaptive_eta, self.adaptive_decay)
            }
        }
    }
}
