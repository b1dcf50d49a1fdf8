//! Time of impact between two moving convex shapes
//! using conservative advancement with a separating axis root finder.

use super::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::{
    math::{self as m, Pose, Sweep, Vec2},
    settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, MAX_TOI_ITERATIONS},
};

#[derive(Clone, Copy, Debug)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Defines the sweep interval `[0, t_max]`.
    pub t_max: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToiState {
    Unknown,
    /// The root finder ran out of iterations.
    Failed,
    /// The shapes were already overlapping at the start.
    Overlapped,
    /// The shapes touch at the returned time.
    Touching,
    /// The shapes never touch within the interval.
    Separated,
}

#[derive(Clone, Copy, Debug)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f64,
}

#[derive(Clone, Copy, Debug)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

/// A separating axis between the two shapes, built from the GJK simplex
/// and evaluated at different times along the sweeps.
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f64,
    ) -> Self {
        let pose_a = sweep_a.pose_at(t1);
        let pose_b = sweep_b.pose_at(t1);

        let mut f = SeparationFunction {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: Vec2::zero(),
            axis: Vec2::zero(),
        };

        if cache.count == 1 {
            let point_a = pose_a * proxy_a.vertex(cache.index_a[0]);
            let point_b = pose_b * proxy_b.vertex(cache.index_b[0]);
            f.axis = point_b - point_a;
            m::normalize_len(&mut f.axis);
        } else if cache.index_a[0] == cache.index_a[1] {
            // two points on B and one on A
            f.kind = SeparationKind::FaceB;
            let local_b1 = proxy_b.vertex(cache.index_b[0]);
            let local_b2 = proxy_b.vertex(cache.index_b[1]);

            f.axis = m::cross_vs(local_b2 - local_b1, 1.0);
            m::normalize_len(&mut f.axis);
            let normal = pose_b.rotation * f.axis;

            f.local_point = 0.5 * (local_b1 + local_b2);
            let point_b = pose_b * f.local_point;
            let point_a = pose_a * proxy_a.vertex(cache.index_a[0]);

            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        } else {
            // two points on A and one or two points on B
            f.kind = SeparationKind::FaceA;
            let local_a1 = proxy_a.vertex(cache.index_a[0]);
            let local_a2 = proxy_a.vertex(cache.index_a[1]);

            f.axis = m::cross_vs(local_a2 - local_a1, 1.0);
            m::normalize_len(&mut f.axis);
            let normal = pose_a.rotation * f.axis;

            f.local_point = 0.5 * (local_a1 + local_a2);
            let point_a = pose_a * f.local_point;
            let point_b = pose_b * proxy_b.vertex(cache.index_b[0]);

            if (point_b - point_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        }
        f
    }

    fn poses(&self, t: f64) -> (Pose, Pose) {
        (self.sweep_a.pose_at(t), self.sweep_b.pose_at(t))
    }

    /// Find the deepest points at time `t`, returning their indices and the separation.
    fn find_min_separation(&self, t: f64) -> (usize, usize, f64) {
        let (pose_a, pose_b) = self.poses(t);
        match self.kind {
            SeparationKind::Points => {
                let axis_a = m::inv_rotate(pose_a.rotation, self.axis);
                let axis_b = m::inv_rotate(pose_b.rotation, -self.axis);
                let index_a = self.proxy_a.support(axis_a);
                let index_b = self.proxy_b.support(axis_b);
                let point_a = pose_a * self.proxy_a.vertex(index_a);
                let point_b = pose_b * self.proxy_b.vertex(index_b);
                (index_a, index_b, (point_b - point_a).dot(self.axis))
            }
            SeparationKind::FaceA => {
                let normal = pose_a.rotation * self.axis;
                let point_a = pose_a * self.local_point;
                let axis_b = m::inv_rotate(pose_b.rotation, -normal);
                let index_b = self.proxy_b.support(axis_b);
                let point_b = pose_b * self.proxy_b.vertex(index_b);
                (usize::MAX, index_b, (point_b - point_a).dot(normal))
            }
            SeparationKind::FaceB => {
                let normal = pose_b.rotation * self.axis;
                let point_b = pose_b * self.local_point;
                let axis_a = m::inv_rotate(pose_a.rotation, -normal);
                let index_a = self.proxy_a.support(axis_a);
                let point_a = pose_a * self.proxy_a.vertex(index_a);
                (index_a, usize::MAX, (point_a - point_b).dot(normal))
            }
        }
    }

    /// Separation of the given points at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f64) -> f64 {
        let (pose_a, pose_b) = self.poses(t);
        match self.kind {
            SeparationKind::Points => {
                let point_a = pose_a * self.proxy_a.vertex(index_a);
                let point_b = pose_b * self.proxy_b.vertex(index_b);
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = pose_a.rotation * self.axis;
                let point_a = pose_a * self.local_point;
                let point_b = pose_b * self.proxy_b.vertex(index_b);
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = pose_b.rotation * self.axis;
                let point_b = pose_b * self.local_point;
                let point_a = pose_a * self.proxy_a.vertex(index_a);
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Compute the upper bound on time before two shapes penetrate.
///
/// Time is represented as a fraction in `[0, t_max]`.
/// This uses a swept separating axis and may miss some intermediate,
/// non-tunneling collisions. With `t_max` at 1 this never misses
/// a collision that would cause tunneling.
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;

    // large rotations can make the root finder fail, so normalize the sweep angles
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0;
    let mut iter = 0;

    // prepare input for the distance query
    let mut cache = SimplexCache::default();
    let mut dist_input = DistanceInput {
        proxy_a: *proxy_a,
        proxy_b: *proxy_b,
        pose_a: Pose::identity(),
        pose_b: Pose::identity(),
        use_radii: false,
    };

    // the outer loop progressively attempts to compute new separating axes,
    // terminating when an axis is repeated (no progress is made)
    loop {
        let (pose_a, pose_b) = (sweep_a.pose_at(t1), sweep_b.pose_at(t1));

        // get the distance between shapes, which also gives the separating axis
        dist_input.pose_a = pose_a;
        dist_input.pose_b = pose_b;
        let dist_output = distance(&mut cache, &dist_input);

        // if the shapes are overlapped, give up on continuous collision
        if dist_output.distance <= 0.0 {
            return ToiOutput {
                state: ToiState::Overlapped,
                t: 0.0,
            };
        }

        if dist_output.distance < target + tolerance {
            // victory!
            return ToiOutput {
                state: ToiState::Touching,
                t: t1,
            };
        }

        let f = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // compute the TOI on the separating axis by successively
        // resolving the deepest point, looping at most once per vertex
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iter = 0;
        loop {
            // find the deepest point at t2 and store the witness point indices
            let (index_a, index_b, mut s2) = f.find_min_separation(t2);

            // is the final configuration separated?
            if s2 > target + tolerance {
                return ToiOutput {
                    state: ToiState::Separated,
                    t: t_max,
                };
            }

            // has the separation reached tolerance?
            if s2 > target - tolerance {
                // advance the sweeps
                t1 = t2;
                break;
            }

            // compute the initial separation of the witness points
            let mut s1 = f.evaluate(index_a, index_b, t1);

            // check for initial overlap. This might happen if the root finder
            // runs out of iterations
            if s1 < target - tolerance {
                return ToiOutput {
                    state: ToiState::Failed,
                    t: t1,
                };
            }

            // check for touching
            if s1 <= target + tolerance {
                // victory! t1 should hold the TOI (could be 0.0)
                return ToiOutput {
                    state: ToiState::Touching,
                    t: t1,
                };
            }

            // 1D root of f(t) - target = 0, mixing the secant rule and bisection
            let mut root_iter = 0;
            let (mut a1, mut a2) = (t1, t2);
            loop {
                let t = if root_iter & 1 == 1 {
                    // secant rule to improve convergence
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    // bisection to guarantee progress
                    0.5 * (a1 + a2)
                };
                root_iter += 1;

                let s = f.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    // t2 holds a tentative value for t1
                    t2 = t;
                    break;
                }

                // ensure we continue to bracket the root
                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iter == 50 {
                    break;
                }
            }

            push_back_iter += 1;
            if push_back_iter == MAX_POLYGON_VERTICES {
                done = true;
                break;
            }
        }

        iter += 1;
        if done {
            return ToiOutput {
                state: ToiState::Failed,
                t: t1,
            };
        }
        if iter == MAX_TOI_ITERATIONS {
            // root finder got stuck, semi-victory
            return ToiOutput {
                state: ToiState::Failed,
                t: t1,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Circle, Polygon, Shape};

    fn sweep(from: Vec2, to: Vec2, a0: f64, a: f64) -> Sweep {
        Sweep {
            local_center: Vec2::zero(),
            c0: from,
            c: to,
            a0,
            a,
        }
    }

    #[test]
    fn fast_circle_hits_thin_box() {
        let wall = Shape::from(Polygon::new_box(0.05, 2.0).unwrap());
        let ball = Shape::from(Circle::new(0.25));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&wall, 0),
            proxy_b: DistanceProxy::new(&ball, 0),
            sweep_a: sweep(Vec2::zero(), Vec2::zero(), 0.0, 0.0),
            // passes through the wall completely during the step
            sweep_b: sweep(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0), 0.0, 0.0),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);
        // contact when the ball's edge reaches the wall's face
        let x_at_toi = -5.0 + 10.0 * out.t;
        let total_radius = 0.25 + crate::settings::POLYGON_RADIUS;
        let expected = -0.05 - total_radius + 3.0 * LINEAR_SLOP;
        assert!((x_at_toi - expected).abs() < 2.0 * LINEAR_SLOP, "{}", x_at_toi);
    }

    #[test]
    fn parallel_motion_is_separated() {
        let b = Shape::from(Polygon::new_box(0.5, 0.5).unwrap());
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&b, 0),
            proxy_b: DistanceProxy::new(&b, 0),
            sweep_a: sweep(Vec2::zero(), Vec2::new(5.0, 0.0), 0.0, 0.0),
            sweep_b: sweep(Vec2::new(0.0, 3.0), Vec2::new(5.0, 3.0), 0.0, 1.0),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.t, 1.0);
    }

    #[test]
    fn initial_overlap_reported() {
        let b = Shape::from(Polygon::new_box(0.5, 0.5).unwrap());
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&b, 0),
            proxy_b: DistanceProxy::new(&b, 0),
            sweep_a: sweep(Vec2::zero(), Vec2::zero(), 0.0, 0.0),
            sweep_b: sweep(Vec2::new(0.2, 0.0), Vec2::new(3.0, 0.0), 0.0, 0.0),
            t_max: 1.0,
        };
        assert_eq!(time_of_impact(&input).state, ToiState::Overlapped);
    }
}
