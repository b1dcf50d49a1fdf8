//! Sequential impulse solver for contact constraints.

use super::{Position, SolverBody, TimeStep};
use crate::{
    body::Velocity,
    collision::{Manifold, ManifoldKind, WorldManifold},
    contact::{ContactImpulse, ContactKey},
    math::{self as m, Mat22, Pose, Rotor2, Vec2},
    settings::{
        BAUMGARTE, LINEAR_SLOP, MAX_CONDITION_NUMBER, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS,
    },
};

/// A touching contact as copied into an island.
#[derive(Clone, Debug)]
pub(crate) struct ContactEntry {
    pub key: ContactKey,
    pub manifold: Manifold,
    pub friction: f64,
    pub restitution: f64,
    pub threshold: f64,
    pub radius_a: f64,
    pub radius_b: f64,
    pub index_a: usize,
    pub index_b: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct VelocityPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f64,
    tangent_impulse: f64,
    normal_mass: f64,
    tangent_mass: f64,
    velocity_bias: f64,
}

#[derive(Clone, Copy, Debug)]
struct VelocityConstraint {
    points: [VelocityPoint; MAX_MANIFOLD_POINTS],
    point_count: usize,
    normal: Vec2,
    normal_mass: Mat22,
    k: Mat22,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_i_a: f64,
    inv_i_b: f64,
    friction: f64,
    restitution: f64,
    threshold: f64,
}

#[derive(Clone, Copy, Debug)]
struct PositionConstraint {
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    point_count: usize,
    local_normal: Vec2,
    local_point: Vec2,
    kind: ManifoldKind,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f64,
    inv_mass_b: f64,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_i_a: f64,
    inv_i_b: f64,
    radius_a: f64,
    radius_b: f64,
}

#[derive(Clone, Debug)]
pub(crate) struct ContactSolver {
    velocity_constraints: Vec<VelocityConstraint>,
    position_constraints: Vec<PositionConstraint>,
    block_solve: bool,
}

#[inline]
fn solver_pose(position: &Position, local_center: Vec2) -> Pose {
    let rotation = Rotor2::from_angle(position.a);
    Pose::new(position.c - rotation * local_center, rotation)
}

impl ContactSolver {
    pub fn new(
        step: &TimeStep,
        contacts: &[ContactEntry],
        bodies: &[SolverBody],
        block_solve: bool,
    ) -> Self {
        let mut velocity_constraints = Vec::with_capacity(contacts.len());
        let mut position_constraints = Vec::with_capacity(contacts.len());

        for contact in contacts {
            let body_a = &bodies[contact.index_a];
            let body_b = &bodies[contact.index_b];
            let manifold = &contact.manifold;

            let mut vc = VelocityConstraint {
                points: [VelocityPoint::default(); MAX_MANIFOLD_POINTS],
                point_count: manifold.point_count(),
                normal: Vec2::zero(),
                normal_mass: Mat22::default(),
                k: Mat22::default(),
                index_a: contact.index_a,
                index_b: contact.index_b,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                friction: contact.friction,
                restitution: contact.restitution,
                threshold: contact.threshold,
            };
            let mut pc = PositionConstraint {
                local_points: [Vec2::zero(); MAX_MANIFOLD_POINTS],
                point_count: manifold.point_count(),
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                kind: manifold.kind,
                index_a: contact.index_a,
                index_b: contact.index_b,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                local_center_a: body_a.local_center,
                local_center_b: body_b.local_center,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                radius_a: contact.radius_a,
                radius_b: contact.radius_b,
            };

            for (i, mp) in manifold.points.iter().enumerate() {
                if step.warm_starting {
                    vc.points[i].normal_impulse = step.dt_ratio * mp.normal_impulse;
                    vc.points[i].tangent_impulse = step.dt_ratio * mp.tangent_impulse;
                }
                pc.local_points[i] = mp.local_point;
            }

            velocity_constraints.push(vc);
            position_constraints.push(pc);
        }

        Self {
            velocity_constraints,
            position_constraints,
            block_solve,
        }
    }

    /// Compute the effective masses and restitution biases
    /// from the positions at the start of the step.
    pub fn initialize_velocity_constraints(
        &mut self,
        contacts: &[ContactEntry],
        positions: &[Position],
        velocities: &[Velocity],
    ) {
        for ((vc, pc), contact) in self
            .velocity_constraints
            .iter_mut()
            .zip(&self.position_constraints)
            .zip(contacts)
        {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let pos_a = positions[vc.index_a];
            let pos_b = positions[vc.index_b];
            let vel_a = velocities[vc.index_a];
            let vel_b = velocities[vc.index_b];

            let pose_a = solver_pose(&pos_a, pc.local_center_a);
            let pose_b = solver_pose(&pos_b, pc.local_center_b);
            let wm = WorldManifold::new(
                &contact.manifold,
                &pose_a,
                pc.radius_a,
                &pose_b,
                pc.radius_b,
            );

            vc.normal = wm.normal;
            let tangent = m::cross_vs(vc.normal, 1.0);

            for (vcp, point) in vc.points[..vc.point_count].iter_mut().zip(wm.points) {
                vcp.r_a = point - pos_a.c;
                vcp.r_b = point - pos_b.c;

                let rn_a = m::cross(vcp.r_a, vc.normal);
                let rn_b = m::cross(vcp.r_b, vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = m::cross(vcp.r_a, tangent);
                let rt_b = m::cross(vcp.r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // restitution bias
                vcp.velocity_bias = 0.0;
                let rel_vel = vc.normal.dot(
                    vel_b.linear + m::cross_sv(vel_b.angular, vcp.r_b)
                        - vel_a.linear
                        - m::cross_sv(vel_a.angular, vcp.r_a),
                );
                if rel_vel < -vc.threshold {
                    vcp.velocity_bias = -vc.restitution * rel_vel;
                }
            }

            if vc.point_count == 2 && self.block_solve {
                let vcp1 = vc.points[0];
                let vcp2 = vc.points[1];

                let rn1_a = m::cross(vcp1.r_a, vc.normal);
                let rn1_b = m::cross(vcp1.r_b, vc.normal);
                let rn2_a = m::cross(vcp2.r_a, vc.normal);
                let rn2_b = m::cross(vcp2.r_b, vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Mat22::new(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = vc.k.inverse();
                } else {
                    // the points are nearly redundant, solve just one
                    vc.point_count = 1;
                }
            }
        }
    }

    /// Apply the impulses carried over from the previous step.
    pub fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let tangent = m::cross_vs(vc.normal, 1.0);
            let mut vel_a = velocities[vc.index_a];
            let mut vel_b = velocities[vc.index_b];

            for vcp in &vc.points[..vc.point_count] {
                let p = vcp.normal_impulse * vc.normal + vcp.tangent_impulse * tangent;
                vel_a.angular -= vc.inv_i_a * m::cross(vcp.r_a, p);
                vel_a.linear -= vc.inv_mass_a * p;
                vel_b.angular += vc.inv_i_b * m::cross(vcp.r_b, p);
                vel_b.linear += vc.inv_mass_b * p;
            }

            velocities[vc.index_a] = vel_a;
            velocities[vc.index_b] = vel_b;
        }
    }

    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let mut vel_a = velocities[vc.index_a];
            let mut vel_b = velocities[vc.index_b];

            let normal = vc.normal;
            let tangent = m::cross_vs(normal, 1.0);
            let friction = vc.friction;

            // friction first, because non-penetration is more important
            for vcp in &mut vc.points[..vc.point_count] {
                let dv = vel_b.linear + m::cross_sv(vel_b.angular, vcp.r_b)
                    - vel_a.linear
                    - m::cross_sv(vel_a.angular, vcp.r_a);

                let vt = dv.dot(tangent);
                let lambda = vcp.tangent_mass * -vt;

                let max_friction = friction * vcp.normal_impulse;
                let new_impulse = m::clamp(vcp.tangent_impulse + lambda, -max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = lambda * tangent;
                vel_a.linear -= m_a * p;
                vel_a.angular -= i_a * m::cross(vcp.r_a, p);
                vel_b.linear += m_b * p;
                vel_b.angular += i_b * m::cross(vcp.r_b, p);
            }

            if vc.point_count == 1 || !self.block_solve {
                for vcp in &mut vc.points[..vc.point_count] {
                    let dv = vel_b.linear + m::cross_sv(vel_b.angular, vcp.r_b)
                        - vel_a.linear
                        - m::cross_sv(vel_a.angular, vcp.r_a);

                    let vn = dv.dot(normal);
                    let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                    // clamp the accumulated impulse
                    let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                    let lambda = new_impulse - vcp.normal_impulse;
                    vcp.normal_impulse = new_impulse;

                    let p = lambda * normal;
                    vel_a.linear -= m_a * p;
                    vel_a.angular -= i_a * m::cross(vcp.r_a, p);
                    vel_b.linear += m_b * p;
                    vel_b.angular += i_b * m::cross(vcp.r_b, p);
                }
            } else {
                solve_block(vc, &mut vel_a, &mut vel_b);
            }

            velocities[vc.index_a] = vel_a;
            velocities[vc.index_b] = vel_b;
        }
    }

    /// Accumulated impulses of each contact, in the order contacts were given.
    pub fn impulses(&self) -> impl '_ + Iterator<Item = ContactImpulse> {
        self.velocity_constraints.iter().zip(&self.position_constraints).map(|(vc, pc)| {
            let mut impulse = ContactImpulse {
                count: pc.point_count,
                ..Default::default()
            };
            for (i, vcp) in vc.points[..pc.point_count].iter().enumerate() {
                impulse.normal_impulses[i] = vcp.normal_impulse;
                impulse.tangent_impulses[i] = vcp.tangent_impulse;
            }
            impulse
        })
    }

    /// Push bodies apart to fix remaining overlap.
    /// Returns true if the overlap is within tolerance.
    pub fn solve_position_constraints(&self, positions: &mut [Position]) -> bool {
        let mut min_separation: f64 = 0.0;

        for pc in &self.position_constraints {
            let (m_a, m_b, i_a, i_b) = (pc.inv_mass_a, pc.inv_mass_b, pc.inv_i_a, pc.inv_i_b);
            let mut pos_a = positions[pc.index_a];
            let mut pos_b = positions[pc.index_b];

            for point_idx in 0..pc.point_count {
                let pose_a = solver_pose(&pos_a, pc.local_center_a);
                let pose_b = solver_pose(&pos_b, pc.local_center_b);
                let (normal, point, separation) = position_manifold(pc, &pose_a, &pose_b, point_idx);

                let r_a = point - pos_a.c;
                let r_b = point - pos_b.c;

                min_separation = min_separation.min(separation);

                // prevent large corrections and allow some slop
                let c = m::clamp(
                    BAUMGARTE * (separation + LINEAR_SLOP),
                    -MAX_LINEAR_CORRECTION,
                    0.0,
                );

                let rn_a = m::cross(r_a, normal);
                let rn_b = m::cross(r_b, normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };

                let p = impulse * normal;
                pos_a.c -= m_a * p;
                pos_a.a -= i_a * m::cross(r_a, p);
                pos_b.c += m_b * p;
                pos_b.a += i_b * m::cross(r_b, p);
            }

            positions[pc.index_a] = pos_a;
            positions[pc.index_b] = pos_b;
        }

        // can't expect the separation to go above -LINEAR_SLOP
        // because the correction always leaves some slop
        min_separation >= -3.0 * LINEAR_SLOP
    }
}

/// Solve both normal constraints of a two-point manifold at once
/// as a linear complementarity problem, by trying each case
/// of which impulses are active in turn.
fn solve_block(vc: &mut VelocityConstraint, vel_a: &mut Velocity, vel_b: &mut Velocity) {
    let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
    let normal = vc.normal;
    let [cp1, cp2] = &mut vc.points;

    let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);

    let rel_vel = |vel_a: &Velocity, vel_b: &Velocity, cp: &VelocityPoint| {
        vel_b.linear + m::cross_sv(vel_b.angular, cp.r_b)
            - vel_a.linear
            - m::cross_sv(vel_a.angular, cp.r_a)
    };
    let vn1 = rel_vel(vel_a, vel_b, cp1).dot(normal);
    let vn2 = rel_vel(vel_a, vel_b, cp2).dot(normal);

    let b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias) - vc.k.mul_vec(a);

    let mut apply = |x: Vec2, cp1: &mut VelocityPoint, cp2: &mut VelocityPoint| {
        let d = x - a;
        let p1 = d.x * normal;
        let p2 = d.y * normal;
        vel_a.linear -= m_a * (p1 + p2);
        vel_a.angular -= i_a * (m::cross(cp1.r_a, p1) + m::cross(cp2.r_a, p2));
        vel_b.linear += m_b * (p1 + p2);
        vel_b.angular += i_b * (m::cross(cp1.r_b, p1) + m::cross(cp2.r_b, p2));
        cp1.normal_impulse = x.x;
        cp2.normal_impulse = x.y;
    };

    // case 1: both constraints active
    let x = -vc.normal_mass.mul_vec(b);
    if x.x >= 0.0 && x.y >= 0.0 {
        apply(x, cp1, cp2);
        return;
    }

    // case 2: only the first one active
    let x = Vec2::new(-cp1.normal_mass * b.x, 0.0);
    let vn2 = vc.k.ex.y * x.x + b.y;
    if x.x >= 0.0 && vn2 >= 0.0 {
        apply(x, cp1, cp2);
        return;
    }

    // case 3: only the second one active
    let x = Vec2::new(0.0, -cp2.normal_mass * b.y);
    let vn1 = vc.k.ey.x * x.y + b.x;
    if x.y >= 0.0 && vn1 >= 0.0 {
        apply(x, cp1, cp2);
        return;
    }

    // case 4: neither active
    if b.x >= 0.0 && b.y >= 0.0 {
        apply(Vec2::zero(), cp1, cp2);
    }

    // no solution, give up on this iteration
}

/// Evaluate one point of a position constraint at the current poses.
/// Returns the normal from A to B, the contact point and the separation.
fn position_manifold(
    pc: &PositionConstraint,
    pose_a: &Pose,
    pose_b: &Pose,
    index: usize,
) -> (Vec2, Vec2, f64) {
    match pc.kind {
        ManifoldKind::Circles => {
            let point_a = *pose_a * pc.local_point;
            let point_b = *pose_b * pc.local_points[0];
            let mut normal = point_b - point_a;
            m::normalize_len(&mut normal);
            let point = 0.5 * (point_a + point_b);
            let separation = (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldKind::FaceA => {
            let normal = pose_a.rotation * pc.local_normal;
            let plane_point = *pose_a * pc.local_point;
            let clip_point = *pose_b * pc.local_points[index];
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldKind::FaceB => {
            let normal = pose_b.rotation * pc.local_normal;
            let plane_point = *pose_b * pc.local_point;
            let clip_point = *pose_a * pc.local_points[index];
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            // point the normal from A to B
            (-normal, clip_point, separation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{ContactId, ManifoldPoint, PointBuf};
    use thunderdome as td;

    fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    /// A unit-mass circle of radius 0.5 falling onto static ground,
    /// with the contact expressed as a face of the ground.
    fn falling_contact(depth: f64) -> (Vec<ContactEntry>, Vec<SolverBody>, Vec<Position>) {
        let mut points = PointBuf::default();
        points.push(ManifoldPoint {
            local_point: Vec2::zero(),
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            id: ContactId::default(),
        });
        let manifold = Manifold {
            points,
            local_normal: Vec2::unit_y(),
            local_point: Vec2::zero(),
            kind: ManifoldKind::FaceA,
        };
        let mut arena = td::Arena::new();
        let entry = ContactEntry {
            key: ContactKey(arena.insert(())),
            manifold,
            friction: 0.5,
            restitution: 0.0,
            threshold: 1.0,
            radius_a: 0.0,
            radius_b: 0.5,
            index_a: 0,
            index_b: 1,
        };
        let bodies = vec![
            SolverBody::default(),
            SolverBody {
                local_center: Vec2::zero(),
                inv_mass: 1.0,
                inv_inertia: 0.0,
            },
        ];
        let positions = vec![
            Position::default(),
            Position {
                c: Vec2::new(0.0, 0.5 - depth),
                a: 0.0,
            },
        ];
        (vec![entry], bodies, positions)
    }

    #[test]
    fn approaching_velocity_is_removed() {
        let (contacts, bodies, positions) = falling_contact(0.0);
        let mut velocities = vec![
            Velocity::default(),
            Velocity {
                linear: Vec2::new(1.0, -2.0),
                angular: 0.0,
            },
        ];
        let mut solver = ContactSolver::new(&step(), &contacts, &bodies, true);
        solver.initialize_velocity_constraints(&contacts, &positions, &velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }
        assert!(velocities[1].linear.y.abs() < 1e-9);
        // friction is strong enough to stop the sliding
        assert!(velocities[1].linear.x.abs() < 1e-9);
        assert_eq!(velocities[0], Velocity::default());

        let impulse = solver.impulses().next().unwrap();
        assert_eq!(impulse.count, 1);
        assert!((impulse.normal_impulses[0] - 2.0).abs() < 1e-9);
        assert!((impulse.tangent_impulses[0] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn separating_velocity_is_kept() {
        let (contacts, bodies, positions) = falling_contact(0.0);
        let mut velocities = vec![
            Velocity::default(),
            Velocity {
                linear: Vec2::new(0.0, 3.0),
                angular: 0.0,
            },
        ];
        let mut solver = ContactSolver::new(&step(), &contacts, &bodies, true);
        solver.initialize_velocity_constraints(&contacts, &positions, &velocities);
        solver.solve_velocity_constraints(&mut velocities);
        assert_eq!(velocities[1].linear, Vec2::new(0.0, 3.0));
    }

    #[test]
    fn overlap_is_pushed_out() {
        let (contacts, bodies, mut positions) = falling_contact(0.1);
        let solver = ContactSolver::new(&step(), &contacts, &bodies, true);
        let mut solved = false;
        for _ in 0..20 {
            solved = solver.solve_position_constraints(&mut positions);
            if solved {
                break;
            }
        }
        assert!(solved);
        assert!(positions[1].c.y > 0.5 - 3.0 * LINEAR_SLOP);
        assert_eq!(positions[0], Position::default());
    }
}
