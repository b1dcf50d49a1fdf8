//! Keeps two anchor points at a distance, rigidly or like a spring,
//! with optional minimum and maximum lengths.

use super::{soft_coefficients, JointBodies};
use crate::{
    body::{BodyKey, Velocity},
    math::{self as m, Vec2},
    settings::LINEAR_SLOP,
    solver::SolverData,
};

#[derive(Clone, Copy, Debug)]
pub struct DistanceJointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Rest length of the spring, or the fixed length of a rigid joint.
    pub length: f64,
    pub min_length: f64,
    pub max_length: f64,
    /// Linear stiffness in N/m. Zero makes the joint rigid between min and max length.
    pub stiffness: f64,
    /// Linear damping in N*s/m.
    pub damping: f64,
    pub collide_connected: bool,
}

impl DistanceJointDef {
    /// A rigid rod of the given length between two anchors.
    pub fn new(
        body_a: BodyKey,
        body_b: BodyKey,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        length: f64,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            length,
            min_length: length,
            max_length: length,
            stiffness: 0.0,
            damping: 0.0,
            collide_connected: false,
        }
    }

    /// Allow the length to vary between the given limits.
    pub fn with_limits(mut self, min_length: f64, max_length: f64) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self
    }

    /// Make the joint a spring with unlimited length.
    /// Call [`with_limits`][Self::with_limits] afterwards to bound it.
    pub fn with_spring(mut self, stiffness: f64, damping: f64) -> Self {
        self.stiffness = stiffness;
        self.damping = damping;
        self.min_length = 0.0;
        self.max_length = f64::MAX;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DistanceJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    length: f64,
    min_length: f64,
    max_length: f64,
    stiffness: f64,
    damping: f64,

    // solver state
    impulse: f64,
    lower_impulse: f64,
    upper_impulse: f64,
    gamma: f64,
    bias: f64,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    current_length: f64,
    soft_mass: f64,
    mass: f64,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> Self {
        let length = def.length.max(LINEAR_SLOP);
        let min_length = def.min_length.max(LINEAR_SLOP);
        let max_length = def.max_length.max(min_length);
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length,
            min_length,
            max_length,
            stiffness: def.stiffness,
            damping: def.damping,
            impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
            u: Vec2::zero(),
            r_a: Vec2::zero(),
            r_b: Vec2::zero(),
            current_length: 0.0,
            soft_mass: 0.0,
            mass: 0.0,
        }
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Change the rest length. Limits are widened to contain it.
    pub fn set_length(&mut self, length: f64) {
        self.impulse = 0.0;
        self.length = length.max(LINEAR_SLOP);
        self.min_length = self.min_length.min(self.length);
        self.max_length = self.max_length.max(self.length);
    }

    #[inline]
    pub fn min_length(&self) -> f64 {
        self.min_length
    }

    #[inline]
    pub fn max_length(&self) -> f64 {
        self.max_length
    }

    pub fn set_spring(&mut self, stiffness: f64, damping: f64) {
        self.stiffness = stiffness;
        self.damping = damping;
    }

    /// Distance between the anchors at the start of the last step.
    #[inline]
    pub fn current_length(&self) -> f64 {
        self.current_length
    }

    pub(crate) fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        inv_dt * (self.impulse + self.lower_impulse - self.upper_impulse) * self.u
    }

    fn is_rigid(&self) -> bool {
        self.min_length >= self.max_length
    }

    pub(crate) fn init_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData) {
        let pos_a = data.positions[b.index_a];
        let pos_b = data.positions[b.index_b];
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);

        let (r_a, r_b) = b.offsets(pos_a.a, pos_b.a, self.local_anchor_a, self.local_anchor_b);
        self.r_a = r_a;
        self.r_b = r_b;
        self.u = pos_b.c + r_b - pos_a.c - r_a;

        self.current_length = self.u.mag();
        if self.current_length > LINEAR_SLOP {
            self.u /= self.current_length;
        } else {
            self.u = Vec2::zero();
            self.mass = 0.0;
            self.impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }

        let cr_a = m::cross(r_a, self.u);
        let cr_b = m::cross(r_b, self.u);
        let mut inv_mass = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.stiffness > 0.0 && !self.is_rigid() {
            let c = self.current_length - self.length;
            let (gamma, bias_factor) = soft_coefficients(self.stiffness, self.damping, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;
            inv_mass += gamma;
            self.soft_mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            // rigid constraint
            self.gamma = 0.0;
            self.bias = 0.0;
            self.soft_mass = self.mass;
        }

        if data.step.warm_starting {
            let ratio = data.step.dt_ratio;
            self.impulse *= ratio;
            self.lower_impulse *= ratio;
            self.upper_impulse *= ratio;

            let p = (self.impulse + self.lower_impulse - self.upper_impulse) * self.u;
            vel_a.linear -= m_a * p;
            vel_a.angular -= i_a * m::cross(r_a, p);
            vel_b.linear += m_b * p;
            vel_b.angular += i_b * m::cross(r_b, p);
        } else {
            self.impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData) {
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);
        let (r_a, r_b, u) = (self.r_a, self.r_b, self.u);

        let apply = |impulse: f64, vel_a: &mut Velocity, vel_b: &mut Velocity| {
            let p = impulse * u;
            vel_a.linear -= m_a * p;
            vel_a.angular -= i_a * m::cross(r_a, p);
            vel_b.linear += m_b * p;
            vel_b.angular += i_b * m::cross(r_b, p);
        };
        let cdot = |vel_a: &Velocity, vel_b: &Velocity| {
            let vp_a = vel_a.linear + m::cross_sv(vel_a.angular, r_a);
            let vp_b = vel_b.linear + m::cross_sv(vel_b.angular, r_b);
            u.dot(vp_b - vp_a)
        };

        if !self.is_rigid() {
            if self.stiffness > 0.0 {
                // spring
                let impulse =
                    -self.soft_mass * (cdot(&vel_a, &vel_b) + self.bias + self.gamma * self.impulse);
                self.impulse += impulse;
                apply(impulse, &mut vel_a, &mut vel_b);
            }

            // lower limit
            {
                let c = self.current_length - self.min_length;
                let bias = c.max(0.0) * data.step.inv_dt;
                let impulse = -self.mass * (cdot(&vel_a, &vel_b) + bias);
                let old = self.lower_impulse;
                self.lower_impulse = (old + impulse).max(0.0);
                apply(self.lower_impulse - old, &mut vel_a, &mut vel_b);
            }

            // upper limit
            {
                let c = self.max_length - self.current_length;
                let bias = c.max(0.0) * data.step.inv_dt;
                let impulse = -self.mass * (-cdot(&vel_a, &vel_b) + bias);
                let old = self.upper_impulse;
                self.upper_impulse = (old + impulse).max(0.0);
                apply(-(self.upper_impulse - old), &mut vel_a, &mut vel_b);
            }
        } else {
            let impulse = -self.mass * cdot(&vel_a, &vel_b);
            self.impulse += impulse;
            apply(impulse, &mut vel_a, &mut vel_b);
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, b: &JointBodies, data: &mut SolverData) -> bool {
        let mut pos_a = data.positions[b.index_a];
        let mut pos_b = data.positions[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);

        let (r_a, r_b) = b.offsets(pos_a.a, pos_b.a, self.local_anchor_a, self.local_anchor_b);
        let mut u = pos_b.c + r_b - pos_a.c - r_a;
        let length = m::normalize_len(&mut u);

        let c = if self.is_rigid() {
            length - self.min_length
        } else if length < self.min_length {
            length - self.min_length
        } else if self.max_length < length {
            length - self.max_length
        } else {
            return true;
        };

        let impulse = -self.mass * c;
        let p = impulse * u;
        pos_a.c -= m_a * p;
        pos_a.a -= i_a * m::cross(r_a, p);
        pos_b.c += m_b * p;
        pos_b.a += i_b * m::cross(r_b, p);

        data.positions[b.index_a] = pos_a;
        data.positions[b.index_b] = pos_b;

        c.abs() < LINEAR_SLOP
    }
}
