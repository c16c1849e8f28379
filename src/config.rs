/// Tunables for query execution.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Records materialized per fetch round-trip.
    pub batch_size: usize,
    /// Per-source record cap when a stage chain runs.
    pub pipeline_cap: usize,
    /// Bounded result window for paginated search.
    pub max_window: usize,
    pub default_page_size: usize,
    /// Distinct values kept per facet field.
    pub facet_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            batch_size: 1000,
            pipeline_cap: 10_000,
            max_window: 1000,
            default_page_size: 50,
            facet_limit: 20,
        }
    }
}
