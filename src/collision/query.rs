//! Intersection queries for points and rays vs. bounding boxes and shapes.

use super::{Ray, AABB};
use crate::math::{self as m, Pose, Vec2};

/// Ray-cast input. The ray extends from `p1` to `p1 + max_fraction * (p2 - p1)`.
#[derive(Clone, Copy, Debug)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f64,
}

/// Ray-cast output. The hit point is `p1 + fraction * (p2 - p1)`.
#[derive(Clone, Copy, Debug)]
pub struct RayCastOutput {
    pub normal: m::Unit<Vec2>,
    pub fraction: f64,
}

/// Find the distance along a ray where it enters an AABB, if it does so at all.
/// A ray starting inside the box hits at `t = 0`.
pub fn ray_aabb(ray: Ray, aabb: AABB) -> Option<f64> {
    let mut t_min = f64::MIN;
    let mut t_max = f64::MAX;

    for (start, dir, lo, hi) in [
        (ray.start.x, ray.dir.x, aabb.min.x, aabb.max.x),
        (ray.start.y, ray.dir.y, aabb.min.y, aabb.max.y),
    ] {
        if dir.abs() < f64::EPSILON {
            // parallel to this slab
            if start < lo || start > hi {
                return None;
            }
        } else {
            let inv_d = 1.0 / dir;
            let mut t1 = (lo - start) * inv_d;
            let mut t2 = (hi - start) * inv_d;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
    }

    if t_max < 0.0 {
        return None;
    }
    Some(t_min.max(0.0))
}

//
// point queries
//

pub fn point_in_circle(point: Vec2, pose: &Pose, center: Vec2, radius: f64) -> bool {
    let center = *pose * center;
    (point - center).mag_sq() <= radius * radius
}

pub fn point_in_polygon(point: Vec2, pose: &Pose, vertices: &[Vec2], normals: &[Vec2]) -> bool {
    let local = m::inv_transform_point(pose, point);
    vertices
        .iter()
        .zip(normals)
        .all(|(v, n)| n.dot(local - *v) <= 0.0)
}

//
// ray casts against shapes
//

/// Ray cast against a circle. Rays starting inside the circle don't hit.
pub fn ray_circle(
    input: &RayCastInput,
    pose: &Pose,
    center: Vec2,
    radius: f64,
) -> Option<RayCastOutput> {
    // collision test from Real-Time Collision Detection, section 5.3.2
    let position = *pose * center;
    let s = input.p1 - position;
    let b = s.mag_sq() - radius * radius;

    let r = input.p2 - input.p1;
    let c = s.dot(r);
    let rr = r.mag_sq();
    let sigma = c * c - rr * b;

    // negative discriminant means a miss, tiny ray length means no direction
    if sigma < 0.0 || rr < f64::EPSILON {
        return None;
    }

    // smallest root of the intersection quadratic
    let a = -(c + sigma.sqrt());
    if 0.0 <= a && a <= input.max_fraction * rr {
        let fraction = a / rr;
        let normal = m::Unit::new_normalize(s + fraction * r);
        return Some(RayCastOutput { normal, fraction });
    }
    None
}

/// Ray cast against a convex polygon given in local space.
/// Rays starting inside the polygon don't hit.
pub fn ray_polygon(
    input: &RayCastInput,
    pose: &Pose,
    vertices: &[Vec2],
    normals: &[Vec2],
) -> Option<RayCastOutput> {
    // put the ray into the polygon's frame of reference
    let p1 = m::inv_transform_point(pose, input.p1);
    let p2 = m::inv_transform_point(pose, input.p2);
    let d = p2 - p1;

    let (mut lower, mut upper) = (0.0, input.max_fraction);
    let mut index = None;

    for (i, (v, n)) in vertices.iter().zip(normals).enumerate() {
        // p = p1 + a * d
        // dot(normal, p - v) = 0
        // dot(normal, p1 - v) + a * dot(normal, d) = 0
        let numerator = n.dot(*v - p1);
        let denominator = n.dot(d);

        if denominator == 0.0 {
            if numerator < 0.0 {
                return None;
            }
        } else if denominator < 0.0 && numerator < lower * denominator {
            // the segment enters this half-space
            lower = numerator / denominator;
            index = Some(i);
        } else if denominator > 0.0 && numerator < upper * denominator {
            // the segment exits this half-space
            upper = numerator / denominator;
        }

        if upper < lower {
            return None;
        }
    }

    debug_assert!(0.0 <= lower && lower <= input.max_fraction);

    index.map(|i| RayCastOutput {
        normal: pose.rotation * m::Unit::new_unchecked(normals[i]),
        fraction: lower,
    })
}

/// Ray cast against a two-sided line segment given in local space.
pub fn ray_segment(
    input: &RayCastInput,
    pose: &Pose,
    v1: Vec2,
    v2: Vec2,
) -> Option<RayCastOutput> {
    let p1 = m::inv_transform_point(pose, input.p1);
    let p2 = m::inv_transform_point(pose, input.p2);
    let d = p2 - p1;

    let e = v2 - v1;
    let normal = m::Unit::try_new(m::right_normal(e), f64::EPSILON)?;

    // q = p1 + t * d
    // dot(normal, q - v1) = 0
    let numerator = normal.dot(v1 - p1);
    let denominator = normal.dot(d);
    if denominator == 0.0 {
        return None;
    }

    let t = numerator / denominator;
    if t < 0.0 || input.max_fraction < t {
        return None;
    }

    let q = p1 + t * d;
    // q = v1 + s * e, s must be within [0, 1]
    let rr = e.mag_sq();
    if rr == 0.0 {
        return None;
    }
    let s = (q - v1).dot(e) / rr;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }

    // normal faces against the ray
    let local_normal = if numerator > 0.0 { -normal } else { normal };
    Some(RayCastOutput {
        normal: pose.rotation * local_normal,
        fraction: t,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(p1: Vec2, p2: Vec2) -> RayCastInput {
        RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        }
    }

    #[test]
    fn ray_aabb_entry() {
        let aabb = AABB::new(Vec2::new(1.0, -1.0), Vec2::new(2.0, 1.0));
        let hit = ray_aabb(Ray::between(Vec2::zero(), Vec2::new(4.0, 0.0)), aabb);
        assert_eq!(hit, Some(0.25));
        // starting inside
        let inside = ray_aabb(Ray::between(Vec2::new(1.5, 0.0), Vec2::new(4.0, 0.0)), aabb);
        assert_eq!(inside, Some(0.0));
        // pointing away
        let away = ray_aabb(Ray::between(Vec2::zero(), Vec2::new(-4.0, 0.0)), aabb);
        assert_eq!(away, None);
        // parallel and outside the slab
        let parallel = ray_aabb(
            Ray::between(Vec2::new(0.0, 2.0), Vec2::new(4.0, 2.0)),
            aabb,
        );
        assert_eq!(parallel, None);
    }

    #[test]
    fn ray_hits_circle_front() {
        let pose = m::pose_from(Vec2::new(5.0, 0.0), 0.0);
        let out = ray_circle(
            &input(Vec2::zero(), Vec2::new(10.0, 0.0)),
            &pose,
            Vec2::zero(),
            1.0,
        )
        .expect("should hit");
        assert!((out.fraction - 0.4).abs() < 1e-12);
        assert!((*out.normal - Vec2::new(-1.0, 0.0)).mag() < 1e-12);
    }

    #[test]
    fn ray_hits_rotated_box() {
        let verts = [
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ];
        let normals = [
            Vec2::new(0.0, -1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(-1.0, 0.0),
        ];
        let pose = m::pose_from(Vec2::new(0.0, 5.0), std::f64::consts::FRAC_PI_2);
        let out = ray_polygon(
            &input(Vec2::zero(), Vec2::new(0.0, 10.0)),
            &pose,
            &verts,
            &normals,
        )
        .expect("should hit");
        assert!((out.fraction - 0.4).abs() < 1e-9);
        assert!((*out.normal - Vec2::new(0.0, -1.0)).mag() < 1e-9);

        let miss = ray_polygon(
            &input(Vec2::new(3.0, 0.0), Vec2::new(3.0, 10.0)),
            &pose,
            &verts,
            &normals,
        );
        assert!(miss.is_none());
    }

    #[test]
    fn ray_hits_segment_from_both_sides() {
        let pose = Pose::identity();
        let (v1, v2) = (Vec2::new(-1.0, 1.0), Vec2::new(1.0, 1.0));
        let up = ray_segment(&input(Vec2::zero(), Vec2::new(0.0, 2.0)), &pose, v1, v2)
            .expect("should hit from below");
        assert!((up.fraction - 0.5).abs() < 1e-12);
        assert!(up.normal.y < 0.0);

        let down = ray_segment(
            &input(Vec2::new(0.0, 2.0), Vec2::new(0.0, 0.0)),
            &pose,
            v1,
            v2,
        )
        .expect("should hit from above");
        assert!(down.normal.y > 0.0);
    }
}
