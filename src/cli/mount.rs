use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use clap::Parser;
use fuser::MountOption;
use quark_cache::{spawn_fetch_worker, ByteCache};
use quark_predict::PredictionModel;

use crate::config::{
    PredictorKind, QuarkConfig, DEFAULT_ADAPTIVE_DECAY, DEFAULT_ADAPTIVE_ETA,
    DEFAULT_ADAPTIVE_WINDOW, DEFAULT_MARKOV_DECAY, DEFAULT_MARKOV_ORDER, DEFAULT_MEMORY_BUDGET,
};
use crate::control;
use crate::fuse_fs::QuarkFilesystem;
use crate::integrator::ReadIntegrator;

/// Mount a predictive prefetch pass-through filesystem.
#[derive(Debug, Parser)]
pub struct MountCommand {
    /// Backing directory whose contents are exposed through the mount.
    pub root: PathBuf,

    /// Directory to mount the filesystem at.
    pub mountpoint: PathBuf,

    /// Memory budget for the prefetch cache, in bytes.
    #[clap(long, default_value_t = DEFAULT_MEMORY_BUDGET)]
    pub memory_budget: u64,

    /// Enable speculative prefetch on startup (disabled by default so
    /// operators can measure baseline behavior).
    #[clap(long)]
    pub prefetch: bool,

    /// Access predictor to drive prefetch decisions.
    #[clap(long, value_enum, default_value_t = PredictorKind::Swg)]
    pub predictor: PredictorKind,

    /// Markov predictor context order.
    #[clap(long, default_value_t = DEFAULT_MARKOV_ORDER)]
    pub markov_order: usize,

    /// Markov predictor decay factor.
    #[clap(long, default_value_t = DEFAULT_MARKOV_DECAY)]
    pub markov_decay: f64,

    /// Adaptive predictor trailing history window, clamped to [1, 10].
    #[clap(long, default_value_t = DEFAULT_ADAPTIVE_WINDOW)]
    pub adaptive_window: usize,

    /// Adaptive predictor learning rate, clamped to [0.01, 1.0].
    #[clap(long, default_value_t = DEFAULT_ADAPTIVE_ETA)]
    pub adaptive_eta: f64,

    /// Adaptive predictor recency decay, clamped to [0.5, 0.99].
    #[clap(long, default_value_t = DEFAULT_ADAPTIVE_DECAY)]
    pub adaptive_decay: f64,
}

impl MountCommand {
    pub fn run(self) -> anyhow::Result<()> {
        let root = self
            .root
            .canonicalize()
            .with_context(|| format!("failed to resolve root directory {}", self.root.display()))?;

        let config = QuarkConfig {
            root: root.clone(),
            mountpoint: self.mountpoint.clone(),
            memory_budget: self.memory_budget,
            prefetch_enabled: self.prefetch,
            predictor: self.predictor,
            markov_order: self.markov_order,
            markov_decay: self.markov_decay,
            adaptive_window: self.adaptive_window,
            adaptive_eta: self.adaptive_eta,
            adaptive_decay: self.adaptive_decay,
        };

        let predictor = Arc::new(config.build_predictor());
        log::info!("Optimizer: {}", predictor.name());

        let cache = Arc::new(ByteCache::new(config.memory_budget as usize));
        let (fetch_queue, _fetch_handle) = spawn_fetch_worker(root.clone(), cache.clone());

        let integrator = ReadIntegrator::new(
            root,
            cache,
            predictor,
            fetch_queue,
            config.prefetch_enabled,
        );

        let control_integrator = integrator.clone();
        thread::spawn(move || {
            control::run(BufReader::new(std::io::stdin()), &control_integrator);
        });

        let filesystem = QuarkFilesystem::new(config.root.clone(), integrator);

        let options = vec![
            MountOption::FSName("quark".to_owned()),
            MountOption::AutoUnmount,
        ];

        log::info!(
            "Mounting {} at {}",
            config.root.display(),
            config.mountpoint.display()
        );

        fuser::mount2(filesystem, &config.mountpoint, &options)
            .with_context(|| format!("failed to mount at {}", config.mountpoint.display()))
    }
}
