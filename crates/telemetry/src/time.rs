use crate::sinks::SimilarityMetricsSink;
use std::time::Instant;

/// RAII timer that records a `checkAndAdmit` call's duration on drop,
/// regardless of which return path was taken.
pub struct CheckTimer<'a> {
    sink: &'a dyn SimilarityMetricsSink,
    asset_type: String,
    start: Instant,
}

impl<'a> CheckTimer<'a> {
    pub fn new(sink: &'a dyn SimilarityMetricsSink, asset_type: impl Into<String>) -> Self {
        Self {
            sink,
            asset_type: asset_type.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for CheckTimer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_check_duration(&self.asset_type, self.start.elapsed().as_secs_f64());
    }
}
