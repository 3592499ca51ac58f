use std::time::Duration;

use tracing::{info, trace, warn};

use crate::{
    datatypes::StepResult,
    error::{DynelError, DynelResult},
    mesh::Mesh,
};

/// Frame delay at unit animation speed, roughly 60 fps
pub const BASE_FRAME_MS: f64 = 16.0;

/// Largest strain component for which frozen element geometry is trusted
pub const SMALL_STRAIN_LIMIT: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Sweeps stop once the largest nodal increment is at or below this
    pub convergence_threshold: f64,
    pub max_iterations: usize,
    /// Fraction of each raw increment applied, in (0, 1]
    pub damping: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            convergence_threshold: 1e-6,
            max_iterations: 10_000,
            damping: 0.8,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> DynelResult<()> {
        check_threshold(self.convergence_threshold)?;
        check_max_iterations(self.max_iterations)?;
        check_damping(self.damping)
    }
}

fn check_threshold(threshold: f64) -> DynelResult<()> {
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(DynelError::InvalidConfig(format!(
            "convergence threshold must be positive, got {threshold}"
        )));
    }
    Ok(())
}

fn check_max_iterations(max_iterations: usize) -> DynelResult<()> {
    if max_iterations == 0 {
        return Err(DynelError::InvalidConfig(
            "max iterations must be at least 1".to_owned(),
        ));
    }
    Ok(())
}

fn check_damping(damping: f64) -> DynelResult<()> {
    if !(damping > 0.0 && damping <= 1.0) {
        return Err(DynelError::InvalidConfig(format!(
            "damping must be in (0, 1], got {damping}"
        )));
    }
    Ok(())
}

fn frame_delay(animation_speed: f64) -> DynelResult<Duration> {
    if !(animation_speed.is_finite() && animation_speed > 0.0) {
        return Err(DynelError::InvalidConfig(format!(
            "animation speed must be positive, got {animation_speed}"
        )));
    }
    Ok(Duration::from_secs_f64(BASE_FRAME_MS / animation_speed / 1000.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Idle,
    Running,
    Paused,
    Converged,
    MaxIterationsReached,
}

/// Yield point of the drive loop, called once after every step.
///
/// The host may pause, resume or reset the solver from here; the loop
/// observes the new state before the next step.
pub trait FramePacer {
    fn yield_frame(&mut self, frame: Duration, solver: &mut GaussSeidel, mesh: &mut Mesh);
}

/// Blocks the thread for the frame delay
pub struct SleepPacer;

impl FramePacer for SleepPacer {
    fn yield_frame(&mut self, frame: Duration, _solver: &mut GaussSeidel, _mesh: &mut Mesh) {
        std::thread::sleep(frame);
    }
}

/// Returns immediately, for headless runs
pub struct NoDelay;

impl FramePacer for NoDelay {
    fn yield_frame(&mut self, _frame: Duration, _solver: &mut GaussSeidel, _mesh: &mut Mesh) {}
}

impl<F> FramePacer for F
where
    F: FnMut(Duration, &mut GaussSeidel, &mut Mesh),
{
    fn yield_frame(&mut self, frame: Duration, solver: &mut GaussSeidel, mesh: &mut Mesh) {
        self(frame, solver, mesh)
    }
}

/// Damped nodal Gauss-Seidel relaxation.
///
/// Each sweep visits the nodes in ascending id order and moves every free
/// node by `damping · Δu`, where `Δu` solves its lumped 2x2 system against
/// the current out of balance force. Later nodes see the updates of earlier
/// ones within the same sweep.
#[derive(Debug, Clone)]
pub struct GaussSeidel {
    config: SolverConfig,
    is_running: bool,
    is_paused: bool,
    current_iteration: usize,
    current_error: f64,
    outcome: Option<SolverState>,
}

impl Default for GaussSeidel {
    fn default() -> Self {
        GaussSeidel::with_config(SolverConfig::default())
    }
}

impl GaussSeidel {
    pub fn new(config: SolverConfig) -> DynelResult<GaussSeidel> {
        config.validate()?;
        Ok(GaussSeidel::with_config(config))
    }

    fn with_config(config: SolverConfig) -> GaussSeidel {
        GaussSeidel {
            config,
            is_running: false,
            is_paused: false,
            current_iteration: 0,
            current_error: f64::INFINITY,
            outcome: None,
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn running(&self) -> bool {
        self.is_running
    }

    pub fn paused(&self) -> bool {
        self.is_paused
    }

    pub fn iterations(&self) -> usize {
        self.current_iteration
    }

    pub fn error(&self) -> f64 {
        self.current_error
    }

    pub fn state(&self) -> SolverState {
        match (self.is_running, self.is_paused) {
            (true, true) => SolverState::Paused,
            (true, false) => SolverState::Running,
            (false, _) => self.outcome.unwrap_or(SolverState::Idle),
        }
    }

    pub fn set_convergence_threshold(&mut self, threshold: f64) -> DynelResult<()> {
        check_threshold(threshold)?;
        self.config.convergence_threshold = threshold;
        Ok(())
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> DynelResult<()> {
        check_max_iterations(max_iterations)?;
        self.config.max_iterations = max_iterations;
        Ok(())
    }

    pub fn set_damping(&mut self, damping: f64) -> DynelResult<()> {
        check_damping(damping)?;
        self.config.damping = damping;
        Ok(())
    }

    /// Enters the running state and zeroes every nodal displacement.
    /// Positions and loads are left untouched.
    pub fn start(&mut self, mesh: &mut Mesh) {
        self.is_running = true;
        self.is_paused = false;
        self.current_iteration = 0;
        self.current_error = f64::INFINITY;
        self.outcome = None;

        mesh.clear_displacements();
    }

    /// Runs one relaxation sweep.
    ///
    /// Returns `None` without touching the mesh unless the solver is running
    /// and not paused.
    pub fn step(&mut self, mesh: &mut Mesh) -> Option<StepResult> {
        if !self.is_running || self.is_paused {
            return None;
        }

        let max_displacement = self.sweep(mesh);
        self.current_iteration += 1;
        self.current_error = max_displacement;

        let converged = max_displacement <= self.config.convergence_threshold;
        let max_reached = self.current_iteration >= self.config.max_iterations;

        if converged || max_reached {
            self.is_running = false;
            self.outcome = Some(if converged {
                SolverState::Converged
            } else {
                SolverState::MaxIterationsReached
            });
        }

        trace!(
            iteration = self.current_iteration,
            error = max_displacement,
            "relaxation sweep"
        );

        Some(StepResult {
            converged,
            iterations: self.current_iteration,
            error: max_displacement,
            running: self.is_running,
            max_displacement,
        })
    }

    /// Returns the largest raw (undamped) axis increment applied
    fn sweep(&self, mesh: &mut Mesh) -> f64 {
        let damping = self.config.damping;
        let mut max_displacement: f64 = 0.0;

        for rank in 0..mesh.get_nodes().len() {
            let index = mesh.sweep_index(rank);
            let Some(delta) = mesh.displacement_increment_at(index) else {
                continue;
            };
            let node = mesh.node_at_mut(index);

            if !node.fixed_x {
                node.position.x += damping * delta.x;
                node.displacement.x += damping * delta.x;
                max_displacement = max_displacement.max(delta.x.abs());
            }
            if !node.fixed_y {
                node.position.y += damping * delta.y;
                node.displacement.y += damping * delta.y;
                max_displacement = max_displacement.max(delta.y.abs());
            }
        }

        max_displacement
    }

    /// Toggles the paused flag. Progress is kept.
    pub fn pause(&mut self) {
        self.is_paused = !self.is_paused;
    }

    /// Stops the solver and puts every node back at its original position
    /// with no load and no displacement
    pub fn reset(&mut self, mesh: &mut Mesh) {
        self.is_running = false;
        self.is_paused = false;
        self.current_iteration = 0;
        self.current_error = f64::INFINITY;
        self.outcome = None;

        mesh.restore_original_state();
    }

    /// Starts the solver and drives it to termination.
    ///
    /// Does nothing and returns `Ok(None)` when the solver is already
    /// running. See [`GaussSeidel::drive`] for the loop itself.
    pub fn solve<U, S, P>(
        &mut self,
        mesh: &mut Mesh,
        on_update: U,
        on_status: S,
        animation_speed: f64,
        pacer: &mut P,
    ) -> DynelResult<Option<StepResult>>
    where
        U: FnMut(&Mesh),
        S: FnMut(&StepResult),
        P: FramePacer,
    {
        if self.is_running {
            return Ok(None);
        }
        frame_delay(animation_speed)?;

        self.start(mesh);
        self.drive(mesh, on_update, on_status, animation_speed, pacer)
    }

    /// Steps an already started solver until it converges, reaches the
    /// iteration limit, or is stopped from the pacer.
    ///
    /// After each completed step `on_update` then `on_status` are called, and
    /// the pacer is handed a frame of `16 ms / animation_speed`. While paused
    /// no step is taken but the pacer keeps being called, so a pacer that
    /// never resumes a paused solver keeps the loop alive.
    ///
    /// # Returns
    /// The last step result, if any step ran
    pub fn drive<U, S, P>(
        &mut self,
        mesh: &mut Mesh,
        mut on_update: U,
        mut on_status: S,
        animation_speed: f64,
        pacer: &mut P,
    ) -> DynelResult<Option<StepResult>>
    where
        U: FnMut(&Mesh),
        S: FnMut(&StepResult),
        P: FramePacer,
    {
        let frame = frame_delay(animation_speed)?;
        let mut last: Option<StepResult> = None;

        while self.is_running {
            if let Some(result) = self.step(mesh) {
                on_update(mesh);
                on_status(&result);
                last = Some(result);

                if result.converged {
                    info!(
                        "solver converged after {} iterations with error {:.3e}",
                        result.iterations, result.error
                    );
                    break;
                }
                if result.iterations >= self.config.max_iterations {
                    info!(
                        "solver stopped at max iterations ({}) with error {:.3e}",
                        result.iterations, result.error
                    );
                    break;
                }
            }

            pacer.yield_frame(frame, self, mesh);
        }

        self.is_running = false;

        let violations = mesh.small_strain_violations(SMALL_STRAIN_LIMIT);
        if !violations.is_empty() {
            warn!(
                elements = violations.len(),
                limit = SMALL_STRAIN_LIMIT,
                "strain exceeds the small strain limit, element geometry is frozen at creation"
            );
        }

        Ok(last)
    }
}
