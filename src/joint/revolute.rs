//! A hinge that pins two bodies together at a shared point,
//! with optional angle limits and a motor.

use super::JointBodies;
use crate::{
    body::BodyKey,
    math::{self as m, Mat22, Vec2},
    settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_ANGULAR_CORRECTION},
    solver::SolverData,
};

#[derive(Clone, Copy, Debug)]
pub struct RevoluteJointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Angle of body B minus angle of body A when the joint angle is zero.
    pub reference_angle: f64,
    pub enable_limit: bool,
    pub lower_angle: f64,
    pub upper_angle: f64,
    pub enable_motor: bool,
    /// Target relative angular velocity in radians per second.
    pub motor_speed: f64,
    pub max_motor_torque: f64,
    pub collide_connected: bool,
}

impl RevoluteJointDef {
    pub fn new(body_a: BodyKey, body_b: BodyKey, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_reference_angle(mut self, angle: f64) -> Self {
        self.reference_angle = angle;
        self
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower.min(upper);
        self.upper_angle = lower.max(upper);
        self
    }

    pub fn with_motor(mut self, speed: f64, max_torque: f64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    reference_angle: f64,
    enable_limit: bool,
    lower_angle: f64,
    upper_angle: f64,
    enable_motor: bool,
    motor_speed: f64,
    max_motor_torque: f64,

    // solver state
    impulse: Vec2,
    motor_impulse: f64,
    lower_impulse: f64,
    upper_impulse: f64,
    r_a: Vec2,
    r_b: Vec2,
    k: Mat22,
    angle: f64,
    axial_mass: f64,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle.min(def.upper_angle),
            upper_angle: def.lower_angle.max(def.upper_angle),
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            impulse: Vec2::zero(),
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            r_a: Vec2::zero(),
            r_b: Vec2::zero(),
            k: Mat22::default(),
            angle: 0.0,
            axial_mass: 0.0,
        }
    }

    #[inline]
    pub fn reference_angle(&self) -> f64 {
        self.reference_angle
    }

    #[inline]
    pub fn is_limit_enabled(&self) -> bool {
        self.enable_limit
    }

    pub fn enable_limit(&mut self, enable: bool) {
        if enable != self.enable_limit {
            self.enable_limit = enable;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
    }

    #[inline]
    pub fn limits(&self) -> (f64, f64) {
        (self.lower_angle, self.upper_angle)
    }

    pub fn set_limits(&mut self, lower: f64, upper: f64) {
        if lower != self.lower_angle || upper != self.upper_angle {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
            self.lower_angle = lower.min(upper);
            self.upper_angle = lower.max(upper);
        }
    }

    #[inline]
    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn enable_motor(&mut self, enable: bool) {
        self.enable_motor = enable;
    }

    #[inline]
    pub fn motor_speed(&self) -> f64 {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: f64) {
        self.motor_speed = speed;
    }

    pub fn set_max_motor_torque(&mut self, torque: f64) {
        self.max_motor_torque = torque;
    }

    /// Motor torque applied in the last step, given its inverse timestep.
    pub fn motor_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.motor_impulse
    }

    /// Joint angle at the start of the last step.
    #[inline]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub(crate) fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        inv_dt * self.impulse
    }

    pub(crate) fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * (self.motor_impulse + self.lower_impulse - self.upper_impulse)
    }

    fn point_mass_matrix(r_a: Vec2, r_b: Vec2, b: &JointBodies) -> Mat22 {
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);
        let ex_x = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
        let ey_x = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
        let ey_y = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
        Mat22::new(Vec2::new(ex_x, ey_x), Vec2::new(ey_x, ey_y))
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
        self.k = Self::point_mass_matrix(r_a, r_b, b);

        self.axial_mass = i_a + i_b;
        let fixed_rotation = self.axial_mass == 0.0;
        if self.axial_mass > 0.0 {
            self.axial_mass = 1.0 / self.axial_mass;
        }

        self.angle = pos_b.a - pos_a.a - self.reference_angle;
        if !self.enable_limit || fixed_rotation {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            let ratio = data.step.dt_ratio;
            self.impulse *= ratio;
            self.motor_impulse *= ratio;
            self.lower_impulse *= ratio;
            self.upper_impulse *= ratio;

            let axial_impulse = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.impulse;
            vel_a.linear -= m_a * p;
            vel_a.angular -= i_a * (m::cross(r_a, p) + axial_impulse);
            vel_b.linear += m_b * p;
            vel_b.angular += i_b * (m::cross(r_b, p) + axial_impulse);
        } else {
            self.impulse = Vec2::zero();
            self.motor_impulse = 0.0;
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
        let fixed_rotation = i_a + i_b == 0.0;
        let step = data.step;

        if self.enable_motor && !fixed_rotation {
            let cdot = vel_b.angular - vel_a.angular - self.motor_speed;
            let impulse = -self.axial_mass * cdot;
            let old = self.motor_impulse;
            let max_impulse = step.dt * self.max_motor_torque;
            self.motor_impulse = m::clamp(old + impulse, -max_impulse, max_impulse);
            let impulse = self.motor_impulse - old;
            vel_a.angular -= i_a * impulse;
            vel_b.angular += i_b * impulse;
        }

        if self.enable_limit && !fixed_rotation {
            // lower limit
            {
                let c = self.angle - self.lower_angle;
                let cdot = vel_b.angular - vel_a.angular;
                let impulse = -self.axial_mass * (cdot + c.max(0.0) * step.inv_dt);
                let old = self.lower_impulse;
                self.lower_impulse = (old + impulse).max(0.0);
                let impulse = self.lower_impulse - old;
                vel_a.angular -= i_a * impulse;
                vel_b.angular += i_b * impulse;
            }
            // upper limit, with the sign of the constraint flipped
            {
                let c = self.upper_angle - self.angle;
                let cdot = vel_a.angular - vel_b.angular;
                let impulse = -self.axial_mass * (cdot + c.max(0.0) * step.inv_dt);
                let old = self.upper_impulse;
                self.upper_impulse = (old + impulse).max(0.0);
                let impulse = self.upper_impulse - old;
                vel_a.angular += i_a * impulse;
                vel_b.angular -= i_b * impulse;
            }
        }

        // point to point
        {
            let cdot = vel_b.linear + m::cross_sv(vel_b.angular, self.r_b)
                - vel_a.linear
                - m::cross_sv(vel_a.angular, self.r_a);
            let impulse = self.k.solve(-cdot);
            self.impulse += impulse;

            vel_a.linear -= m_a * impulse;
            vel_a.angular -= i_a * m::cross(self.r_a, impulse);
            vel_b.linear += m_b * impulse;
            vel_b.angular += i_b * m::cross(self.r_b, impulse);
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, b: &JointBodies, data: &mut SolverData) -> bool {
        let mut pos_a = data.positions[b.index_a];
        let mut pos_b = data.positions[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);
        let fixed_rotation = i_a + i_b == 0.0;

        let mut angular_error = 0.0;
        if self.enable_limit && !fixed_rotation {
            let angle = pos_b.a - pos_a.a - self.reference_angle;
            let c = if (self.upper_angle - self.lower_angle).abs() < 2.0 * ANGULAR_SLOP {
                // treat as an equality constraint
                m::clamp(angle - self.lower_angle, -MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION)
            } else if angle <= self.lower_angle {
                m::clamp(angle - self.lower_angle + ANGULAR_SLOP, -MAX_ANGULAR_CORRECTION, 0.0)
            } else if angle >= self.upper_angle {
                m::clamp(angle - self.upper_angle - ANGULAR_SLOP, 0.0, MAX_ANGULAR_CORRECTION)
            } else {
                0.0
            };

            let limit_impulse = -self.axial_mass * c;
            pos_a.a -= i_a * limit_impulse;
            pos_b.a += i_b * limit_impulse;
            angular_error = c.abs();
        }

        let (r_a, r_b) = b.offsets(pos_a.a, pos_b.a, self.local_anchor_a, self.local_anchor_b);
        let c = pos_b.c + r_b - pos_a.c - r_a;
        let position_error = c.mag();

        let k = Self::point_mass_matrix(r_a, r_b, b);
        let impulse = -k.solve(c);

        pos_a.c -= m_a * impulse;
        pos_a.a -= i_a * m::cross(r_a, impulse);
        pos_b.c += m_b * impulse;
        pos_b.a += i_b * m::cross(r_b, impulse);

        data.positions[b.index_a] = pos_a;
        data.positions[b.index_b] = pos_b;

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}
