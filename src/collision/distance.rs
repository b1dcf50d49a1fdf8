//! Closest points between convex shapes with the GJK algorithm.

use crate::{
    math::{self as m, Pose, Vec2},
    settings::{MAX_POLYGON_VERTICES, POLYGON_RADIUS},
    shape::Shape,
};

/// A convex shape reduced to its core vertices and a radius,
/// which is all the GJK algorithm needs.
#[derive(Clone, Copy, Debug)]
pub struct DistanceProxy {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f64,
}

impl DistanceProxy {
    /// Create a proxy for a child of a shape.
    pub fn new(shape: &Shape, child: usize) -> Self {
        match shape {
            Shape::Circle(c) => Self::from_points(&[c.center], c.radius),
            Shape::Polygon(p) => Self::from_points(p.vertices(), p.radius()),
            Shape::Edge(e) => Self::from_points(&[e.v1, e.v2], POLYGON_RADIUS),
            Shape::Chain(c) => {
                let e = c.child_edge(child);
                Self::from_points(&[e.v1, e.v2], POLYGON_RADIUS)
            }
        }
    }

    pub fn from_points(points: &[Vec2], radius: f64) -> Self {
        let mut vertices = [Vec2::zero(); MAX_POLYGON_VERTICES];
        let count = points.len().min(MAX_POLYGON_VERTICES);
        vertices[..count].copy_from_slice(&points[..count]);
        Self {
            vertices,
            count,
            radius,
        }
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    #[inline]
    pub fn vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }

    /// Index of the vertex furthest along a direction.
    pub fn support(&self, dir: Vec2) -> usize {
        let mut best = 0;
        let mut best_value = self.vertices[0].dot(dir);
        for (i, v) in self.vertices().iter().enumerate().skip(1) {
            let value = v.dot(dir);
            if value > best_value {
                best = i;
                best_value = value;
            }
        }
        best
    }
}

/// Warm starting information for GJK, carried over between calls
/// on the same pair of shapes. Set `count` to zero on the first call.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimplexCache {
    /// Length or area of the cached simplex.
    pub metric: f64,
    pub count: usize,
    pub index_a: [usize; 3],
    pub index_b: [usize; 3],
}

#[derive(Clone, Copy, Debug)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub pose_a: Pose,
    pub pose_b: Pose,
    /// Include the shapes' radii in the result.
    pub use_radii: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DistanceOutput {
    /// Closest point on shape A.
    pub point_a: Vec2,
    /// Closest point on shape B.
    pub point_b: Vec2,
    pub distance: f64,
    /// Number of GJK iterations used.
    pub iterations: usize,
}

//
// simplex
//

#[derive(Clone, Copy, Debug, Default)]
struct SimplexVertex {
    /// Support point in proxy A.
    w_a: Vec2,
    /// Support point in proxy B.
    w_b: Vec2,
    /// `w_b - w_a`
    w: Vec2,
    /// Barycentric coordinate for the closest point.
    a: f64,
    index_a: usize,
    index_b: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn from_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        pose_a: &Pose,
        proxy_b: &DistanceProxy,
        pose_b: &Pose,
    ) -> Self {
        let mut s = Simplex {
            count: cache.count,
            ..Default::default()
        };
        let make_vertex = |index_a: usize, index_b: usize| {
            let w_a = *pose_a * proxy_a.vertex(index_a);
            let w_b = *pose_b * proxy_b.vertex(index_b);
            SimplexVertex {
                w_a,
                w_b,
                w: w_b - w_a,
                a: 0.0,
                index_a,
                index_b,
            }
        };
        for i in 0..s.count {
            s.v[i] = make_vertex(cache.index_a[i], cache.index_b[i]);
        }

        // flush the cache if the metric changed a lot
        if s.count > 1 {
            let metric1 = cache.metric;
            let metric2 = s.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f64::EPSILON {
                s.count = 0;
            }
        }

        if s.count == 0 {
            s.v[0] = make_vertex(0, 0);
            s.v[0].a = 1.0;
            s.count = 1;
        }
        s
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a;
            cache.index_b[i] = self.v[i].index_b;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = m::cross(e12, -self.v[0].w);
                if sgn > 0.0 {
                    // origin is left of e12
                    m::cross_sv(1.0, e12)
                } else {
                    m::cross_vs(e12, 1.0)
                }
            }
            _ => Vec2::zero(),
        }
    }

    fn closest_point(&self) -> Vec2 {
        match self.count {
            1 => self.v[0].w,
            2 => self.v[0].a * self.v[0].w + self.v[1].a * self.v[1].w,
            _ => Vec2::zero(),
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.count {
            1 => (self.v[0].w_a, self.v[0].w_b),
            2 => (
                self.v[0].a * self.v[0].w_a + self.v[1].a * self.v[1].w_a,
                self.v[0].a * self.v[0].w_b + self.v[1].a * self.v[1].w_b,
            ),
            3 => {
                let p = self.v[0].a * self.v[0].w_a
                    + self.v[1].a * self.v[1].w_a
                    + self.v[2].a * self.v[2].w_a;
                (p, p)
            }
            _ => (Vec2::zero(), Vec2::zero()),
        }
    }

    fn metric(&self) -> f64 {
        match self.count {
            2 => (self.v[0].w - self.v[1].w).mag(),
            3 => m::cross(self.v[1].w - self.v[0].w, self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    // Solve a line segment using barycentric coordinates.
    //
    // p = a1 * w1 + a2 * w2
    // a1 + a2 = 1
    //
    // The vector from the origin to the closest point on the line is
    // perpendicular to the line.
    // e12 = w2 - w1
    // dot(p, e) = 0
    // a1 * dot(w1, e) + a2 * dot(w2, e) = 0
    //
    // 2-by-2 linear system
    // [1      1     ][a1] = [1]
    // [w1.e12 w2.e12][a2] = [0]
    //
    // Define
    // d12_1 =  dot(w2, e12)
    // d12_2 = -dot(w1, e12)
    // d12 = d12_1 + d12_2
    //
    // Solution
    // a1 = d12_1 / d12
    // a2 = d12_2 / d12
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            // a2 <= 0, so we clamp it to 0
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            // a1 <= 0, so we clamp it to 0
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // must be in e12 region.
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    // Possible regions:
    // - points[2]
    // - edge points[0]-points[2]
    // - edge points[1]-points[2]
    // - inside the triangle
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        // Edge12
        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        // Edge13
        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        // Edge23
        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        // Triangle123
        let n123 = m::cross(e12, e13);

        let d123_1 = n123 * m::cross(w2, w3);
        let d123_2 = n123 * m::cross(w3, w1);
        let d123_3 = n123 * m::cross(w1, w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv_d12 = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv_d12;
            self.v[1].a = d12_2 * inv_d12;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv_d13 = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv_d13;
            self.v[2].a = d13_2 * inv_d13;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv_d23 = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv_d23;
            self.v[2].a = d23_2 * inv_d23;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // must be in triangle123
        let inv_d123 = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv_d123;
        self.v[1].a = d123_2 * inv_d123;
        self.v[2].a = d123_3 * inv_d123;
        self.count = 3;
    }
}

const MAX_GJK_ITERATIONS: usize = 20;

/// Compute the closest points between two shapes.
///
/// Supports any combination of circles, polygons and edges.
/// The cache warm starts the computation and is updated with the final simplex.
/// Overlapping shapes give zero distance.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;
    let pose_a = &input.pose_a;
    let pose_b = &input.pose_b;

    let mut simplex = Simplex::from_cache(cache, proxy_a, pose_a, proxy_b, pose_b);

    // vertices of the last simplex, to detect cycling
    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iter = 0;
    while iter < MAX_GJK_ITERATIONS {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // if we have 3 points, the origin is in the corresponding triangle
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        // ensure the search direction is numerically fit
        if d.mag_sq() < f64::EPSILON * f64::EPSILON {
            // the origin is probably contained by a line segment
            // or triangle, thus the shapes are overlapped
            break;
        }

        // new support point in the direction of `d`, computed in local space
        let index_a = proxy_a.support(m::inv_rotate(pose_a.rotation, -d));
        let index_b = proxy_b.support(m::inv_rotate(pose_b.rotation, d));
        let w_a = *pose_a * proxy_a.vertex(index_a);
        let w_b = *pose_b * proxy_b.vertex(index_b);
        simplex.v[simplex.count] = SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 0.0,
            index_a,
            index_b,
        };

        iter += 1;

        // duplicate support point means no progress can be made
        let duplicate = (0..save_count).any(|i| save_a[i] == index_a && save_b[i] == index_b);
        if duplicate {
            break;
        }

        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = (point_b - point_a).mag();
    simplex.write_cache(cache);

    if input.use_radii {
        if dist < f64::EPSILON {
            // shapes are too close to safely compute normal
            let p = 0.5 * (point_a + point_b);
            point_a = p;
            point_b = p;
            dist = 0.0;
        } else {
            // move the witness points to the outer surface
            let r_a = proxy_a.radius;
            let r_b = proxy_b.radius;
            dist = (dist - r_a - r_b).max(0.0);
            let normal = (point_b - point_a).normalized();
            point_a += r_a * normal;
            point_b -= r_b * normal;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations: iter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Circle, Polygon};

    fn boxes_at(offset: Vec2, angle: f64) -> DistanceInput {
        let b = Shape::from(Polygon::new_box(1.0, 1.0).unwrap());
        DistanceInput {
            proxy_a: DistanceProxy::new(&b, 0),
            proxy_b: DistanceProxy::new(&b, 0),
            pose_a: Pose::identity(),
            pose_b: m::pose_from(offset, angle),
            use_radii: false,
        }
    }

    #[test]
    fn separated_boxes() {
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &boxes_at(Vec2::new(5.0, 0.5), 0.0));
        assert!((out.distance - 3.0).abs() < 1e-9);
        assert!((out.point_a.x - 1.0).abs() < 1e-9);
        assert!((out.point_b.x - 4.0).abs() < 1e-9);

        // warm started call gives the same answer
        let again = distance(&mut cache, &boxes_at(Vec2::new(5.0, 0.5), 0.0));
        assert!((again.distance - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rotated_box_corner_distance() {
        let mut cache = SimplexCache::default();
        let out = distance(
            &mut cache,
            &boxes_at(Vec2::new(4.0, 0.0), std::f64::consts::FRAC_PI_4),
        );
        // corner of the diamond is sqrt(2) from its center
        let expected = 4.0 - 1.0 - 2.0f64.sqrt();
        assert!((out.distance - expected).abs() < 1e-9);
    }

    #[test]
    fn overlapping_gives_zero() {
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &boxes_at(Vec2::new(1.0, 0.3), 0.3));
        assert!(out.distance < 1e-9);
    }

    #[test]
    fn circles_with_radii() {
        let c = Shape::from(Circle::new(0.5));
        let input = DistanceInput {
            proxy_a: DistanceProxy::new(&c, 0),
            proxy_b: DistanceProxy::new(&c, 0),
            pose_a: Pose::identity(),
            pose_b: m::pose_from(Vec2::new(0.0, 3.0), 0.0),
            use_radii: true,
        };
        let out = distance(&mut SimplexCache::default(), &input);
        assert!((out.distance - 2.0).abs() < 1e-12);
        assert!((out.point_a - Vec2::new(0.0, 0.5)).mag() < 1e-12);
        assert!((out.point_b - Vec2::new(0.0, 2.5)).mag() < 1e-12);
    }
}
