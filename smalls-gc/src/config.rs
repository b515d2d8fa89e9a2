/// Tuning knobs for the collector. Defaults match the values the runtime
/// has shipped with since the collector was first generational.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GCConfig {
    /// Number of young-generation survivals before an object promotes to
    /// the old generation.
    pub promotion_threshold: u8,
    /// Fraction of committed bytes that, once exceeded by old-generation
    /// bytes, starts a major cycle.
    pub major_threshold_percent: f32,
    /// Default unit budget for one incremental step when the caller does
    /// not specify one.
    pub incremental_work_budget: u32,
}

impl Default for GCConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: 2,
            major_threshold_percent: 0.8,
            incremental_work_budget: 100,
        }
    }
}
