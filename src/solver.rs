//! The constraint solver. Bodies connected by touching contacts and joints
//! are grouped into islands, each of which is solved independently.

use crate::{body::Velocity, math::Vec2};

pub(crate) mod contact_solver;
pub(crate) mod island;

/// Parameters of a single simulation step.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TimeStep {
    pub dt: f64,
    pub inv_dt: f64,
    /// `dt * inv_dt` of the previous step, used to scale warm starting impulses
    /// when the timestep changes.
    pub dt_ratio: f64,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub warm_starting: bool,
}

/// Center of mass position and angle of a body in the solver.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Position {
    pub c: Vec2,
    pub a: f64,
}

/// Mass properties of a body the solver needs.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SolverBody {
    pub local_center: Vec2,
    pub inv_mass: f64,
    pub inv_inertia: f64,
}

/// View into an island's working buffers, indexed by island-local body index.
#[derive(Debug)]
pub(crate) struct SolverData<'a> {
    pub step: TimeStep,
    pub bodies: &'a [SolverBody],
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}
