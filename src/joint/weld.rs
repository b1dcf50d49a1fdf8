//! Glues two bodies together, optionally with a soft angular spring.

use super::{soft_coefficients, JointBodies};
use crate::{
    body::BodyKey,
    math::{self as m, uv, Mat33, Vec2},
    settings::{ANGULAR_SLOP, LINEAR_SLOP},
    solver::SolverData,
};

#[derive(Clone, Copy, Debug)]
pub struct WeldJointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f64,
    /// Angular stiffness in N*m. Zero makes the weld rigid.
    pub stiffness: f64,
    /// Angular damping in N*m*s.
    pub damping: f64,
    pub collide_connected: bool,
}

impl WeldJointDef {
    pub fn new(body_a: BodyKey, body_b: BodyKey, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            reference_angle: 0.0,
            stiffness: 0.0,
            damping: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_reference_angle(mut self, angle: f64) -> Self {
        self.reference_angle = angle;
        self
    }

    pub fn with_spring(mut self, stiffness: f64, damping: f64) -> Self {
        self.stiffness = stiffness;
        self.damping = damping;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WeldJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    reference_angle: f64,
    stiffness: f64,
    damping: f64,

    // solver state
    impulse: uv::DVec3,
    gamma: f64,
    bias: f64,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat33,
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            stiffness: def.stiffness,
            damping: def.damping,
            impulse: uv::DVec3::zero(),
            gamma: 0.0,
            bias: 0.0,
            r_a: Vec2::zero(),
            r_b: Vec2::zero(),
            mass: Mat33::default(),
        }
    }

    #[inline]
    pub fn reference_angle(&self) -> f64 {
        self.reference_angle
    }

    #[inline]
    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    #[inline]
    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn set_spring(&mut self, stiffness: f64, damping: f64) {
        self.stiffness = stiffness;
        self.damping = damping;
    }

    pub(crate) fn reaction_force(&self, inv_dt: f64) -> Vec2 {
        inv_dt * Vec2::new(self.impulse.x, self.impulse.y)
    }

    pub(crate) fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.impulse.z
    }

    fn mass_matrix(r_a: Vec2, r_b: Vec2, b: &JointBodies) -> Mat33 {
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);
        let ex_x = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
        let ey_x = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
        let ez_x = -r_a.y * i_a - r_b.y * i_b;
        let ey_y = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
        let ez_y = r_a.x * i_a + r_b.x * i_b;
        let ez_z = i_a + i_b;
        Mat33 {
            ex: uv::DVec3::new(ex_x, ey_x, ez_x),
            ey: uv::DVec3::new(ey_x, ey_y, ez_y),
            ez: uv::DVec3::new(ez_x, ez_y, ez_z),
        }
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
        let k = Self::mass_matrix(r_a, r_b, b);

        if self.stiffness > 0.0 {
            self.mass = k.inverse22();

            let c = pos_b.a - pos_a.a - self.reference_angle;
            let (gamma, bias_factor) = soft_coefficients(self.stiffness, self.damping, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;

            let inv_m = i_a + i_b + gamma;
            self.mass.ez.z = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else {
            self.mass = if k.ez.z == 0.0 {
                k.inverse22()
            } else {
                k.sym_inverse33()
            };
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p = Vec2::new(self.impulse.x, self.impulse.y);
            vel_a.linear -= m_a * p;
            vel_a.angular -= i_a * (m::cross(r_a, p) + self.impulse.z);
            vel_b.linear += m_b * p;
            vel_b.angular += i_b * (m::cross(r_b, p) + self.impulse.z);
        } else {
            self.impulse = uv::DVec3::zero();
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, b: &JointBodies, data: &mut SolverData) {
        let mut vel_a = data.velocities[b.index_a];
        let mut vel_b = data.velocities[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);
        let (r_a, r_b) = (self.r_a, self.r_b);

        if self.stiffness > 0.0 {
            let cdot2 = vel_b.angular - vel_a.angular;
            let impulse2 = -self.mass.ez.z * (cdot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;
            vel_a.angular -= i_a * impulse2;
            vel_b.angular += i_b * impulse2;

            let cdot1 = vel_b.linear + m::cross_sv(vel_b.angular, r_b)
                - vel_a.linear
                - m::cross_sv(vel_a.angular, r_a);
            let impulse1 = -self.mass.mul_vec2(cdot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            vel_a.linear -= m_a * impulse1;
            vel_a.angular -= i_a * m::cross(r_a, impulse1);
            vel_b.linear += m_b * impulse1;
            vel_b.angular += i_b * m::cross(r_b, impulse1);
        } else {
            let cdot1 = vel_b.linear + m::cross_sv(vel_b.angular, r_b)
                - vel_a.linear
                - m::cross_sv(vel_a.angular, r_a);
            let cdot2 = vel_b.angular - vel_a.angular;
            let impulse = -self.mass.mul_vec3(uv::DVec3::new(cdot1.x, cdot1.y, cdot2));
            self.impulse += impulse;

            let p = Vec2::new(impulse.x, impulse.y);
            vel_a.linear -= m_a * p;
            vel_a.angular -= i_a * (m::cross(r_a, p) + impulse.z);
            vel_b.linear += m_b * p;
            vel_b.angular += i_b * (m::cross(r_b, p) + impulse.z);
        }

        data.velocities[b.index_a] = vel_a;
        data.velocities[b.index_b] = vel_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, b: &JointBodies, data: &mut SolverData) -> bool {
        let mut pos_a = data.positions[b.index_a];
        let mut pos_b = data.positions[b.index_b];
        let (m_a, m_b, i_a, i_b) = (b.inv_mass_a, b.inv_mass_b, b.inv_i_a, b.inv_i_b);

        let (r_a, r_b) = b.offsets(pos_a.a, pos_b.a, self.local_anchor_a, self.local_anchor_b);
        let k = Self::mass_matrix(r_a, r_b, b);
        let c1 = pos_b.c + r_b - pos_a.c - r_a;
        let position_error = c1.mag();

        let (impulse, angular_error) = if self.stiffness > 0.0 {
            // the angular part is handled by the spring
            let p = -k.solve22(c1);
            (uv::DVec3::new(p.x, p.y, 0.0), 0.0)
        } else {
            let c2 = pos_b.a - pos_a.a - self.reference_angle;
            let impulse = if k.ez.z > 0.0 {
                -k.solve33(uv::DVec3::new(c1.x, c1.y, c2))
            } else {
                let p = -k.solve22(c1);
                uv::DVec3::new(p.x, p.y, 0.0)
            };
            (impulse, c2.abs())
        };

        let p = Vec2::new(impulse.x, impulse.y);
        pos_a.c -= m_a * p;
        pos_a.a -= i_a * (m::cross(r_a, p) + impulse.z);
        pos_b.c += m_b * p;
        pos_b.a += i_b * (m::cross(r_b, p) + impulse.z);

        data.positions[b.index_a] = pos_a;
        data.positions[b.index_b] = pos_b;

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}
