//! Drags a point on body B toward a world-space target with a soft spring.
//! Body A is only used as a reference for the joint graph, usually a static ground body.

use super::{linear_stiffness, soft_coefficients, JointBodies};
use crate::{
    body::BodyKey,
    math::{self as m, Mat22, Vec2},
    solver::SolverData,
};

#[derive(Clone, Copy, Debug)]
pub struct MouseJointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    /// Initial target in world space. Also the point on body B that gets dragged.
    pub target: Vec2,
    /// Upper bound on the force applied, usually some multiple of the body's weight.
    pub max_force: f64,
    pub frequency_hz: f64,
    pub damping_ratio: f64,
    pub collide_connected: bool,
}

impl MouseJointDef {
    pub fn new(body_a: BodyKey, body_b: BodyKey, target: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            target,
            max_force: 1000.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
            collide_connected: false,
        }
    }

    pub fn with_max_force(mut self, max_force: f64) -> Self {
        self.max_force = max_force;
        self
    }

    pub fn with_spring(mut self, frequency_hz: f64, damping_ratio: f64) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MouseJoint {
    pub(crate) target: Vec2,
    pub(crate) local_anchor_b: Vec2,
    max_force: f64,
    frequency_hz: f64,
    damping_ratio: f64,

    // solver state
    impulse: Vec2,
    r_b: Vec2,
    mass: Mat22,
    c: Vec2,
    gamma: f64,
}

impl MouseJoint {
    /// `local_anchor_b` is the target point in body B's local space at creation.
    pub(crate) fn new(def: &MouseJointDef, local_anchor_b: Vec2) -> Self {
        Self {
            target: def.target,
            local_anchor_b,
            max_force: def.max_force.max(0.0),
            frequency_hz: def.frequency_hz.max(0.0),
            damping_ratio: def.damping_ratio.max(0.0),
            impulse: Vec2::zero(),
            r_b: Vec2::zero(),
            mass: Mat22::default(),
            c: Vec2::zero(),
            gamma: 0.0,
        }
    }

    #[inline]
    pub fn target(&self) -> Vec2 {
        self.target
    }

    /// Move the target. Bodies are woken when modifying the joint through the world.
    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    #[inline]
    pub fn max_force(&self) -> f64 {
        self.max_force
    }

    pub fn set_max_force(&mut self, max_force: f64) {
        self.max_force = max_force.max(0.0);
    }

    pub fn set_spring(&mut self, frequency_hz: f64, damping_ratio: f64) {
        self.frequency_hz = frequency_hz.max(0.0);
        self.damping_ratio = damping_ratio.max(0.0);
    }

    pub(crate) fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        inv_dt * self.impulse
    }

    pub(crate) fn init_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData) {
        let pos_b = data.positions[b.index_b];
        let mut vel_b = data.velocities[b.index_b];
        let (m_b, i_b) = (b.inv_mass_b, b.inv_i_b);

        let mass = if m_b > 0.0 { 1.0 / m_b } else { 0.0 };
        let (stiffness, damping) = linear_stiffness(self.frequency_hz, self.damping_ratio, mass, 0.0);
        let (gamma, beta) = soft_coefficients(stiffness, damping, data.step.dt);
        self.gamma = gamma;

        let (_, r_b) = b.offsets(0.0, pos_b.a, Vec2::zero(), self.local_anchor_b);
        self.r_b = r_b;

        let k = Mat22::new(
            Vec2::new(m_b + i_b * r_b.y * r_b.y + gamma, -i_b * r_b.x * r_b.y),
            Vec2::new(-i_b * r_b.x * r_b.y, m_b + i_b * r_b.x * r_b.x + gamma),
        );
        self.mass = k.inverse();

        self.c = beta * (pos_b.c + r_b - self.target);

        // a little rotational damping keeps dragged bodies from spinning up
        vel_b.angular *= 0.98;

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            vel_b.linear += m_b * self.impulse;
            vel_b.angular += i_b * m::cross(r_b, self.impulse);
        } else {
            self.impulse = Vec2::zero();
        }

        data.velocities[b.index_b] = vel_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData) {
        let mut vel_b = data.velocities[b.index_b];
        let (m_b, i_b) = (b.inv_mass_b, b.inv_i_b);

        let cdot = vel_b.linear + m::cross_sv(vel_b.angular, self.r_b);
        let impulse = self.mass.mul_vec(-(cdot + self.c + self.gamma * self.impulse));

        let old = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        if self.impulse.mag_sq() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.mag();
        }
        let impulse = self.impulse - old;

        vel_b.linear += m_b * impulse;
        vel_b.angular += i_b * m::cross(self.r_b, impulse);

        data.velocities[b.index_b] = vel_b;
    }
}
