/*!
Pluggable online access predictors for Quark's prefetch pipeline.

Each predictor consumes a stream of observed reads via [`PredictionModel::log`]
and answers "what will be read next" via [`PredictionModel::predict`]. They
share no state with each other or with `quark-cache`; a mount picks exactly
one via [`Predictor`] and feeds it every cache-miss-triggering read.
*/

mod adaptive;
mod contract;
mod markov;
mod predictor;
mod swg;

pub use adaptive::AdaptiveMarkovPredictor;
pub use contract::PredictionModel;
pub use markov::DecayedMarkovPredictor;
pub use predictor::Predictor;
pub use swg::SwgPredictor;
