use quark_cache::VirtualPath;

/// Shared contract every access predictor implements. See the module-level
/// docs of [`crate`] for the design rationale (tagged variant instead of a
/// class hierarchy).
pub trait PredictionModel: Send + Sync {
    /// Record an observed access. Appends to history if `path` differs from
    /// the most recent entry; updates model state. Idempotent on immediate
    /// duplicates.
    fn log(&self, path: &VirtualPath);

    /// Most recent observed access, optionally skipping a given path by
    /// walking history backward until a distinct entry is found.
    fn last(&self, other_than: Option<&VirtualPath>) -> Option<VirtualPath>;

    /// Produce up to `k` likely-next paths, best first. An empty vector
    /// means the model lacks sufficient evidence. If `context` is given and
    /// is not the current history tail, it is treated as the "just now"
    /// observation without being logged.
    fn predict(&self, context: Option<&VirtualPath>, k: usize) -> Vec<VirtualPath>;

    /// Human-readable diagnostic dump.
    fn status(&self) -> String;

    /// Short identifier for logging, e.g. at startup.
    fn name(&self) -> &'static str;
}

/// Append `path` to `history` unless it repeats the immediately preceding
/// entry. Returns whether an append happened.
pub(crate) fn push_distinct(history: &mut Vec<VirtualPath>, path: &VirtualPath) -> bool {
    if history.last() == Some(path) {
        return false;
    }
    history.push(path.clone());
    true
}

/// Walk `history` backward for the most recent entry, optionally skipping
/// one specific path.
pub(crate) fn last_other_than(
    history: &[VirtualPath],
    other_than: Option<&VirtualPath>,
) -> Option<VirtualPath> {
    match other_than {
        None => history.last().cloned(),
        Some(skip) => history.iter().rev().find(|p| *p != skip).cloned(),
    }
}

/// The "just now" observation a predictor reasons from: the logged history
/// with `context` appended only if it's not already the tail.
pub(crate) fn effective_sequence(
    history: &[VirtualPath],
    context: Option<&VirtualPath>,
) -> Vec<VirtualPath> {
    let mut seq = history.to_vec();
    if let Some(c) = context {
        if seq.last() != Some(c) {
            seq.push(c.clone());
        }
    }
    seq
}
