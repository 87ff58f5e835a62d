use hf_solver::TerminationStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchStage {
    Solving,
    Feasible,
    Infeasible,
    Indeterminate,
    Converged,
}

/// One step of a horizon search, reported to the caller's callback.
#[derive(Debug, Clone)]
pub struct SearchProgressEvent {
    pub stage: SearchStage,
    pub iteration: usize,
    pub tf: f64,
    pub tf_min: f64,
    pub tf_max: f64,
    pub status: Option<TerminationStatus>,
    pub elapsed_wall_s: f64,
}

impl SearchProgressEvent {
    pub fn width(&self) -> f64 {
        self.tf_max - self.tf_min
    }
}
