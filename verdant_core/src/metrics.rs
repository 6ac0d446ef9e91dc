use std::time::Duration;

/// Summary counters for one spawner or placement run.
///
/// `seed_attempts` counts every candidate the simulation tried to place;
/// `seed_rejections` counts the ones that were discarded before indexing or
/// lost their overlap fight.
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    pub tiles_requested: u32,
    pub tiles_completed: u32,
    pub cancelled: bool,
    pub total_instances: usize,
    pub seed_attempts: u64,
    pub seed_rejections: u64,
    pub duration: Duration,
}
