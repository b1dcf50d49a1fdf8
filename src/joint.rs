//! Joints constrain the relative motion of two bodies.
//!
//! Each joint type has a definition struct that is turned into a [`Joint`]
//! by [`World::create_joint`][crate::World::create_joint].
//! Anchors are given in the local space of each body.

use crate::{
    body::BodyKey,
    math::{Rotor2, Vec2},
    solver::{SolverBody, SolverData},
};

use thunderdome as td;

pub mod distance;
pub use distance::{DistanceJoint, DistanceJointDef};

pub mod mouse;
pub use mouse::{MouseJoint, MouseJointDef};

pub mod prismatic;
pub use prismatic::{PrismaticJoint, PrismaticJointDef};

pub mod revolute;
pub use revolute::{RevoluteJoint, RevoluteJointDef};

pub mod weld;
pub use weld::{WeldJoint, WeldJointDef};

/// Key type to look up a joint stored in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JointKey(pub(crate) td::Index);

impl JointKey {
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

/// Definition of any kind of joint.
#[derive(Clone, Copy, Debug)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Weld(WeldJointDef),
    Mouse(MouseJointDef),
}

macro_rules! impl_from_def {
    ($($variant:ident($def:ty)),* $(,)?) => {
        $(
            impl From<$def> for JointDef {
                fn from(def: $def) -> Self {
                    JointDef::$variant(def)
                }
            }
        )*
    };
}
impl_from_def!(
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Weld(WeldJointDef),
    Mouse(MouseJointDef),
);

impl JointDef {
    pub fn bodies(&self) -> (BodyKey, BodyKey) {
        match self {
            JointDef::Distance(d) => (d.body_a, d.body_b),
            JointDef::Revolute(d) => (d.body_a, d.body_b),
            JointDef::Prismatic(d) => (d.body_a, d.body_b),
            JointDef::Weld(d) => (d.body_a, d.body_b),
            JointDef::Mouse(d) => (d.body_a, d.body_b),
        }
    }

    pub fn collide_connected(&self) -> bool {
        match self {
            JointDef::Distance(d) => d.collide_connected,
            JointDef::Revolute(d) => d.collide_connected,
            JointDef::Prismatic(d) => d.collide_connected,
            JointDef::Weld(d) => d.collide_connected,
            JointDef::Mouse(d) => d.collide_connected,
        }
    }
}

/// Type-specific state of a joint.
#[derive(Clone, Copy, Debug)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Weld(WeldJoint),
    Mouse(MouseJoint),
}

/// Island indices and mass properties of the two bodies,
/// cached at the start of the velocity solve.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct JointBodies {
    pub index_a: usize,
    pub index_b: usize,
    pub local_center_a: Vec2,
    pub local_center_b: Vec2,
    pub inv_mass_a: f64,
    pub inv_mass_b: f64,
    pub inv_i_a: f64,
    pub inv_i_b: f64,
}

impl JointBodies {
    fn new(index_a: usize, index_b: usize, bodies: &[SolverBody]) -> Self {
        let a = &bodies[index_a];
        let b = &bodies[index_b];
        Self {
            index_a,
            index_b,
            local_center_a: a.local_center,
            local_center_b: b.local_center,
            inv_mass_a: a.inv_mass,
            inv_mass_b: b.inv_mass,
            inv_i_a: a.inv_inertia,
            inv_i_b: b.inv_inertia,
        }
    }

    /// Anchor offsets from the centers of mass, rotated to world space.
    #[inline]
    pub fn offsets(
        &self,
        angle_a: f64,
        angle_b: f64,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
    ) -> (Vec2, Vec2) {
        let r_a = Rotor2::from_angle(angle_a) * (local_anchor_a - self.local_center_a);
        let r_b = Rotor2::from_angle(angle_b) * (local_anchor_b - self.local_center_b);
        (r_a, r_b)
    }
}

/// A constraint between two bodies.
#[derive(Clone, Copy, Debug)]
pub struct Joint {
    pub(crate) body_a: BodyKey,
    pub(crate) body_b: BodyKey,
    pub(crate) collide_connected: bool,
    pub(crate) kind: JointKind,
    pub(crate) solver_bodies: JointBodies,
    pub(crate) in_island: bool,
    pub user_data: u64,
}

impl Joint {
    pub(crate) fn new(body_a: BodyKey, body_b: BodyKey, collide_connected: bool, kind: JointKind) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected,
            kind,
            solver_bodies: JointBodies::default(),
            in_island: false,
            user_data: 0,
        }
    }

    #[inline]
    pub fn body_a(&self) -> BodyKey {
        self.body_a
    }

    #[inline]
    pub fn body_b(&self) -> BodyKey {
        self.body_b
    }

    /// Get the body connected to the given one by this joint.
    pub fn other_body(&self, body: BodyKey) -> BodyKey {
        if body == self.body_a {
            self.body_b
        } else {
            self.body_a
        }
    }

    #[inline]
    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    #[inline]
    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Mutable access to type-specific settings like motors and limits.
    #[inline]
    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// Anchor points in the local space of body A and body B.
    /// For a mouse joint, the first anchor is the target in world space.
    pub fn local_anchors(&self) -> (Vec2, Vec2) {
        match &self.kind {
            JointKind::Distance(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Revolute(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Prismatic(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Weld(j) => (j.local_anchor_a, j.local_anchor_b),
            JointKind::Mouse(j) => (j.target, j.local_anchor_b),
        }
    }

    /// Reaction force on body B at the anchor, given the inverse of the last timestep.
    pub fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        match &self.kind {
            JointKind::Distance(j) => j.reaction_force(inv_dt),
            JointKind::Revolute(j) => j.reaction_force(inv_dt),
            JointKind::Prismatic(j) => j.reaction_force(inv_dt),
            JointKind::Weld(j) => j.reaction_force(inv_dt),
            JointKind::Mouse(j) => j.reaction_force(inv_dt),
        }
    }

    /// Reaction torque on body B, given the inverse of the last timestep.
    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        match &self.kind {
            JointKind::Distance(_) | JointKind::Mouse(_) => 0.0,
            JointKind::Revolute(j) => j.reaction_torque(inv_dt),
            JointKind::Prismatic(j) => j.reaction_torque(inv_dt),
            JointKind::Weld(j) => j.reaction_torque(inv_dt),
        }
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        index_a: usize,
        index_b: usize,
        data: &mut SolverData,
    ) {
        self.solver_bodies = JointBodies::new(index_a, index_b, data.bodies);
        let b = &self.solver_bodies;
        match &mut self.kind {
            JointKind::Distance(j) => j.init_velocity_constraints(b, data),
            JointKind::Revolute(j) => j.init_velocity_constraints(b, data),
            JointKind::Prismatic(j) => j.init_velocity_constraints(b, data),
            JointKind::Weld(j) => j.init_velocity_constraints(b, data),
            JointKind::Mouse(j) => j.init_velocity_constraints(b, data),
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let b = &self.solver_bodies;
        match &mut self.kind {
            JointKind::Distance(j) => j.solve_velocity_constraints(b, data),
            JointKind::Revolute(j) => j.solve_velocity_constraints(b, data),
            JointKind::Prismatic(j) => j.solve_velocity_constraints(b, data),
            JointKind::Weld(j) => j.solve_velocity_constraints(b, data),
            JointKind::Mouse(j) => j.solve_velocity_constraints(b, data),
        }
    }

    /// Returns true if the position error is within tolerance.
    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let b = &self.solver_bodies;
        match &mut self.kind {
            JointKind::Distance(j) => j.solve_position_constraints(b, data),
            JointKind::Revolute(j) => j.solve_position_constraints(b, data),
            JointKind::Prismatic(j) => j.solve_position_constraints(b, data),
            JointKind::Weld(j) => j.solve_position_constraints(b, data),
            JointKind::Mouse(_) => true,
        }
    }
}

/// Convert a frequency and damping ratio into linear spring stiffness and damping
/// for the reduced mass of two bodies. Static bodies should pass a mass of zero.
pub fn linear_stiffness(frequency_hz: f64, damping_ratio: f64, mass_a: f64, mass_b: f64) -> (f64, f64) {
    let mass = reduced(mass_a, mass_b);
    let omega = 2.0 * std::f64::consts::PI * frequency_hz;
    (mass * omega * omega, 2.0 * mass * damping_ratio * omega)
}

/// Like [`linear_stiffness`], but for rotational inertia.
pub fn angular_stiffness(
    frequency_hz: f64,
    damping_ratio: f64,
    inertia_a: f64,
    inertia_b: f64,
) -> (f64, f64) {
    let inertia = reduced(inertia_a, inertia_b);
    let omega = 2.0 * std::f64::consts::PI * frequency_hz;
    (inertia * omega * omega, 2.0 * inertia * damping_ratio * omega)
}

fn reduced(a: f64, b: f64) -> f64 {
    if a > 0.0 && b > 0.0 {
        a * b / (a + b)
    } else if a > 0.0 {
        a
    } else {
        b
    }
}

/// Soft constraint coefficients for a spring with the given stiffness and damping.
/// Returns `(gamma, bias_factor)` such that the bias is `C * bias_factor`.
pub(crate) fn soft_coefficients(stiffness: f64, damping: f64, dt: f64) -> (f64, f64) {
    let gamma = dt * (damping + dt * stiffness);
    let gamma = if gamma != 0.0 { 1.0 / gamma } else { 0.0 };
    (gamma, dt * stiffness * gamma)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stiffness_of_static_pair_uses_the_moving_mass() {
        let (k, d) = linear_stiffness(1.0, 0.5, 2.0, 0.0);
        let omega = 2.0 * std::f64::consts::PI;
        assert!((k - 2.0 * omega * omega).abs() < 1e-9);
        assert!((d - 2.0 * omega).abs() < 1e-9);

        let (k_pair, _) = linear_stiffness(1.0, 0.5, 2.0, 2.0);
        assert!((k_pair - omega * omega).abs() < 1e-9);
    }

    #[test]
    fn soft_coefficients_vanish_without_spring() {
        assert_eq!(soft_coefficients(0.0, 0.0, 0.1), (0.0, 0.0));
        let (gamma, bias) = soft_coefficients(100.0, 10.0, 0.1);
        assert!((gamma - 1.0 / (0.1 * (10.0 + 10.0))).abs() < 1e-12);
        assert!((bias - 0.1 * 100.0 * gamma).abs() < 1e-12);
    }
}
