//! Lets body B slide along an axis fixed in body A, without relative rotation.
//! Supports translation limits and a linear motor.

use super::JointBodies;
use crate::{
    body::{BodyKey, Velocity},
    math::{self as m, uv, Mat22, Mat33, Rotor2, Vec2},
    settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_LINEAR_CORRECTION},
    solver::SolverData,
};

#[derive(Clone, Copy, Debug)]
pub struct PrismaticJointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Translation axis in body A's local space. Normalized on creation.
    pub local_axis_a: Vec2,
    pub reference_angle: f64,
    pub enable_limit: bool,
    pub lower_translation: f64,
    pub upper_translation: f64,
    pub enable_motor: bool,
    pub motor_speed: f64,
    pub max_motor_force: f64,
    pub collide_connected: bool,
}

impl PrismaticJointDef {
    pub fn new(
        body_a: BodyKey,
        body_b: BodyKey,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        local_axis_a: Vec2,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            local_axis_a,
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_reference_angle(mut self, angle: f64) -> Self {
        self.reference_angle = angle;
        self
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower.min(upper);
        self.upper_translation = lower.max(upper);
        self
    }

    pub fn with_motor(mut self, speed: f64, max_force: f64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_force = max_force;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PrismaticJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    local_x_axis: Vec2,
    local_y_axis: Vec2,
    reference_angle: f64,
    enable_limit: bool,
    lower_translation: f64,
    upper_translation: f64,
    enable_motor: bool,
    motor_speed: f64,
    max_motor_force: f64,

    // solver state
    impulse: Vec2,
    motor_impulse: f64,
    lower_impulse: f64,
    upper_impulse: f64,
    axis: Vec2,
    perp: Vec2,
    s1: f64,
    s2: f64,
    a1: f64,
    a2: f64,
    k: Mat22,
    translation: f64,
    axial_mass: f64,
}

/// Lever arms of the slide axis and its perpendicular.
struct Arms {
    axis: Vec2,
    perp: Vec2,
    a1: f64,
    a2: f64,
    s1: f64,
    s2: f64,
    d: Vec2,
}

impl PrismaticJoint {
    pub(crate) fn new(def: &PrismaticJointDef) -> Self {
        let mut axis = def.local_axis_a;
        if m::normalize_len(&mut axis) == 0.0 {
            axis = Vec2::unit_x();
        }
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_x_axis: axis,
            local_y_axis: m::left_normal(axis),
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_translation: def.lower_translation.min(def.upper_translation),
            upper_translation: def.lower_translation.max(def.upper_translation),
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_force: def.max_motor_force,
            impulse: Vec2::zero(),
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            axis: Vec2::zero(),
            perp: Vec2::zero(),
            s1: 0.0,
            s2: 0.0,
            a1: 0.0,
            a2: 0.0,
            k: Mat22::default(),
            translation: 0.0,
            axial_mass: 0.0,
        }
    }

    /// The normalized slide axis in body A's local space.
    #[inline]
    pub fn local_axis_a(&self) -> Vec2 {
        self.local_x_axis
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
        (self.lower_translation, self.upper_translation)
    }

    pub fn set_limits(&mut self, lower: f64, upper: f64) {
        if lower != self.lower_translation || upper != self.upper_translation {
            self.lower_translation = lower.min(upper);
            self.upper_translation = lower.max(upper);
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
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

    pub fn set_max_motor_force(&mut self, force: f64) {
        self.max_motor_force = force;
    }

    pub fn motor_force(&self, inv_dt: f64) -> f64 {
        inv_dt * self.motor_impulse
    }

    /// Translation along the axis at the start of the last step.
    /// Only tracked while the limit is enabled.
    #[inline]
    pub fn translation(&self) -> f64 {
        self.translation
    }

    pub(crate) fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
        inv_dt * (self.impulse.x * self.perp + axial * self.axis)
    }

    pub(crate) fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.impulse.y
    }

    fn arms(&self, c_a: Vec2, angle_a: f64, c_b: Vec2, r_a: Vec2, r_b: Vec2) -> Arms {
        let q_a = Rotor2::from_angle(angle_a);
        let d = c_b + r_b - c_a - r_a;
        let axis = q_a * self.local_x_axis;
        let perp = q_a * self.local_y_axis;
        Arms {
            axis,
            perp,
            a1: m::cross(d + r_a, axis),
            a2: m::cross(r_b, axis),
            s1: m::cross(d + r_a, perp),
            s2: m::cross(r_b, perp),
            d,
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData) {
        let pos_a = data.positions[b.index_a];
        let pos_b = data.positions[b.index_b];
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);

        let (r_a, r_b) = b.offsets(pos_a.a, pos_b.a, self.local_anchor_a, self.local_anchor_b);
        let arms = self.arms(pos_a.c, pos_a.a, pos_b.c, r_a, r_b);
        self.axis = arms.axis;
        self.perp = arms.perp;
        self.a1 = arms.a1;
        self.a2 = arms.a2;
        self.s1 = arms.s1;
        self.s2 = arms.s2;

        self.axial_mass = m_a + m_b + i_a * self.a1 * self.a1 + i_b * self.a2 * self.a2;
        if self.axial_mass > 0.0 {
            self.axial_mass = 1.0 / self.axial_mass;
        }

        let k11 = m_a + m_b + i_a * self.s1 * self.s1 + i_b * self.s2 * self.s2;
        let k12 = i_a * self.s1 + i_b * self.s2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            // bodies with fixed rotation
            k22 = 1.0;
        }
        self.k = Mat22::new(Vec2::new(k11, k12), Vec2::new(k12, k22));

        if self.enable_limit {
            self.translation = self.axis.dot(arms.d);
        } else {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            let ratio = data.step.dt_ratio;
            self.impulse *= ratio;
            self.motor_impulse *= ratio;
            self.lower_impulse *= ratio;
            self.upper_impulse *= ratio;

            let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.impulse.x * self.perp + axial * self.axis;
            let l_a = self.impulse.x * self.s1 + self.impulse.y + axial * self.a1;
            let l_b = self.impulse.x * self.s2 + self.impulse.y + axial * self.a2;

            vel_a.linear -= m_a * p;
            vel_a.angular -= i_a * l_a;
            vel_b.linear += m_b * p;
            vel_b.angular += i_b * l_b;
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
        let step = data.step;
        let (axis, a1, a2) = (self.axis, self.a1, self.a2);

        let axial_cdot = |vel_a: &Velocity, vel_b: &Velocity| {
            axis.dot(vel_b.linear - vel_a.linear) + a2 * vel_b.angular - a1 * vel_a.angular
        };

        if self.enable_motor {
            let cdot = axial_cdot(&vel_a, &vel_b);
            let impulse = self.axial_mass * (self.motor_speed - cdot);
            let old = self.motor_impulse;
            let max_impulse = step.dt * self.max_motor_force;
            self.motor_impulse = m::clamp(old + impulse, -max_impulse, max_impulse);
            let impulse = self.motor_impulse - old;

            vel_a.linear -= m_a * impulse * axis;
            vel_a.angular -= i_a * impulse * a1;
            vel_b.linear += m_b * impulse * axis;
            vel_b.angular += i_b * impulse * a2;
        }

        if self.enable_limit {
            // lower limit
            {
                let c = self.translation - self.lower_translation;
                let cdot = axial_cdot(&vel_a, &vel_b);
                let impulse = -self.axial_mass * (cdot + c.max(0.0) * step.inv_dt);
                let old = self.lower_impulse;
                self.lower_impulse = (old + impulse).max(0.0);
                let impulse = self.lower_impulse - old;

                vel_a.linear -= m_a * impulse * axis;
                vel_a.angular -= i_a * impulse * a1;
                vel_b.linear += m_b * impulse * axis;
                vel_b.angular += i_b * impulse * a2;
            }
            // upper limit, with the sign of the constraint flipped
            {
                let c = self.upper_translation - self.translation;
                let cdot = -axial_cdot(&vel_a, &vel_b);
                let impulse = -self.axial_mass * (cdot + c.max(0.0) * step.inv_dt);
                let old = self.upper_impulse;
                self.upper_impulse = (old + impulse).max(0.0);
                let impulse = self.upper_impulse - old;

                vel_a.linear += m_a * impulse * axis;
                vel_a.angular += i_a * impulse * a1;
                vel_b.linear -= m_b * impulse * axis;
                vel_b.angular -= i_b * impulse * a2;
            }
        }

        // perpendicular and angular constraint
        {
            let cdot = Vec2::new(
                self.perp.dot(vel_b.linear - vel_a.linear) + self.s2 * vel_b.angular
                    - self.s1 * vel_a.angular,
                vel_b.angular - vel_a.angular,
            );
            let df = self.k.solve(-cdot);
            self.impulse += df;

            let p = df.x * self.perp;
            let l_a = df.x * self.s1 + df.y;
            let l_b = df.x * self.s2 + df.y;

            vel_a.linear -= m_a * p;
            vel_a.angular -= i_a * l_a;
            vel_b.linear += m_b * p;
            vel_b.angular += i_b * l_b;
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, b: &JointBodies, data: &mut SolverData) -> bool {
        let mut pos_a = data.positions[b.index_a];
        let mut pos_b = data.positions[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);

        let (r_a, r_b) = b.offsets(pos_a.a, pos_b.a, self.local_anchor_a, self.local_anchor_b);
        let Arms {
            axis,
            perp,
            a1,
            a2,
            s1,
            s2,
            d,
        } = self.arms(pos_a.c, pos_a.a, pos_b.c, r_a, r_b);

        let c1 = Vec2::new(perp.dot(d), pos_b.a - pos_a.a - self.reference_angle);
        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let mut limit_error = None;
        if self.enable_limit {
            let translation = axis.dot(d);
            let (lower, upper) = (self.lower_translation, self.upper_translation);
            if (upper - lower).abs() < 2.0 * LINEAR_SLOP {
                let c2 = translation - lower;
                linear_error = linear_error.max(c2.abs());
                limit_error = Some(m::clamp(c2, -MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION));
            } else if translation <= lower {
                linear_error = linear_error.max(lower - translation);
                limit_error = Some(m::clamp(translation - lower, -MAX_LINEAR_CORRECTION, 0.0));
            } else if translation >= upper {
                linear_error = linear_error.max(translation - upper);
                limit_error = Some(m::clamp(translation - upper, 0.0, MAX_LINEAR_CORRECTION));
            }
        }

        let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
        let k12 = i_a * s1 + i_b * s2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            k22 = 1.0;
        }

        let impulse = match limit_error {
            Some(c2) => {
                let k13 = i_a * s1 * a1 + i_b * s2 * a2;
                let k23 = i_a * a1 + i_b * a2;
                let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
                let k = Mat33 {
                    ex: uv::DVec3::new(k11, k12, k13),
                    ey: uv::DVec3::new(k12, k22, k23),
                    ez: uv::DVec3::new(k13, k23, k33),
                };
                k.solve33(-uv::DVec3::new(c1.x, c1.y, c2))
            }
            None => {
                let k = Mat22::new(Vec2::new(k11, k12), Vec2::new(k12, k22));
                let i = k.solve(-c1);
                uv::DVec3::new(i.x, i.y, 0.0)
            }
        };

        let p = impulse.x * perp + impulse.z * axis;
        let l_a = impulse.x * s1 + impulse.y + impulse.z * a1;
        let l_b = impulse.x * s2 + impulse.y + impulse.z * a2;

        pos_a.c -= m_a * p;
        pos_a.a -= i_a * l_a;
        pos_b.c += m_b * p;
        pos_b.a += i_b * l_b;

        data.positions[b.index_a] = pos_a;
        data.positions[b.index_b] = pos_b;

        linear_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}
