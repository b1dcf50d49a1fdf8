//! Geometric shapes that fixtures are made of.
//!
//! Shapes are defined in the local space of their body.
//! Polygons and edges carry a small skin radius so that
//! contacts are created slightly before the actual surfaces touch.

use crate::{
    collision::{query, RayCastInput, RayCastOutput, AABB},
    error::{PhysicsError, Result},
    math::{self as m, Pose, Vec2},
    settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS},
};

/// The physical shape of a fixture.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum Shape {
    Circle(Circle),
    Polygon(Polygon),
    Edge(Edge),
    Chain(Chain),
}

/// Discriminant of [`Shape`], used to dispatch collision algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeKind {
    Circle,
    Edge,
    Polygon,
    Chain,
}

/// Mass properties computed from a shape and a density.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct MassData {
    pub mass: f64,
    /// Center of mass relative to the body origin.
    #[cfg_attr(feature = "serde-types", serde(with = "m::serde_vec2"))]
    pub center: Vec2,
    /// Rotational inertia about the body origin.
    pub inertia: f64,
}

//
// Circle
//

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Circle {
    #[cfg_attr(feature = "serde-types", serde(with = "m::serde_vec2", default))]
    pub center: Vec2,
    pub radius: f64,
}

impl Circle {
    /// A circle centered at the body origin.
    pub fn new(radius: f64) -> Self {
        Self {
            center: Vec2::zero(),
            radius,
        }
    }

    pub fn with_center(mut self, center: Vec2) -> Self {
        self.center = center;
        self
    }
}

//
// Polygon
//

/// A solid convex polygon with counterclockwise winding.
///
/// Construction computes the convex hull of the given points,
/// so the input order doesn't matter.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(into = "PolygonPoints", try_from = "PolygonPoints")
)]
pub struct Polygon {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    centroid: Vec2,
    radius: f64,
}

/// Serialized form of a polygon, just the hull points.
#[cfg(feature = "serde-types")]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
struct PolygonPoints(Vec<[f64; 2]>);

#[cfg(feature = "serde-types")]
impl From<Polygon> for PolygonPoints {
    fn from(poly: Polygon) -> Self {
        PolygonPoints(poly.vertices().iter().map(|v| [v.x, v.y]).collect())
    }
}

#[cfg(feature = "serde-types")]
impl TryFrom<PolygonPoints> for Polygon {
    type Error = PhysicsError;

    fn try_from(points: PolygonPoints) -> Result<Self> {
        let points: Vec<Vec2> = points.0.iter().map(|p| Vec2::new(p[0], p[1])).collect();
        Polygon::new(&points)
    }
}

impl Polygon {
    /// Create a convex polygon from the convex hull of a set of points.
    ///
    /// Points closer than half the linear slop are welded together.
    /// Fails if fewer than 3 distinct points remain, if there are more than
    /// [`MAX_POLYGON_VERTICES`] points, or if the hull is degenerate (collinear).
    pub fn new(points: &[Vec2]) -> Result<Self> {
        if points.len() < 3 {
            return Err(PhysicsError::InvalidGeometry(
                "polygon needs at least 3 points",
            ));
        }
        if !points.iter().all(|p| m::is_finite_vec(*p)) {
            return Err(PhysicsError::InvalidGeometry("polygon point is not finite"));
        }

        // weld close points
        let weld_dist_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
        let mut unique: Vec<Vec2> = Vec::with_capacity(points.len());
        for &p in points {
            if unique.iter().all(|u| (p - *u).mag_sq() >= weld_dist_sq) {
                unique.push(p);
            }
        }
        if unique.len() < 3 {
            return Err(PhysicsError::InvalidGeometry(
                "polygon points are too close together",
            ));
        }

        let hull = convex_hull(&unique);
        if hull.len() < 3 {
            return Err(PhysicsError::InvalidGeometry("polygon points are collinear"));
        }
        // only the hull has to fit, extra input points may be welded or interior
        if hull.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::InvalidGeometry("polygon has too many vertices"));
        }

        let mut poly = Polygon {
            vertices: [Vec2::zero(); MAX_POLYGON_VERTICES],
            normals: [Vec2::zero(); MAX_POLYGON_VERTICES],
            count: hull.len(),
            centroid: Vec2::zero(),
            radius: POLYGON_RADIUS,
        };
        for (i, &v) in hull.iter().enumerate() {
            poly.vertices[i] = v;
        }
        for i in 0..poly.count {
            let edge = poly.vertices[(i + 1) % poly.count] - poly.vertices[i];
            poly.normals[i] = m::right_normal(edge).normalized();
        }
        poly.centroid = polygon_centroid(&poly.vertices[..poly.count]);
        Ok(poly)
    }

    /// An axis-aligned box centered on the body origin, given its half width and half height.
    pub fn new_box(hw: f64, hh: f64) -> Result<Self> {
        Self::new_oriented_box(hw, hh, Vec2::zero(), 0.0)
    }

    /// A box with the given half extents, offset and rotated in body space.
    pub fn new_oriented_box(hw: f64, hh: f64, center: Vec2, angle: f64) -> Result<Self> {
        if !(hw > 0.0 && hh > 0.0 && hw.is_finite() && hh.is_finite()) {
            return Err(PhysicsError::InvalidGeometry(
                "box half extents must be positive",
            ));
        }
        let pose = m::pose_from(center, angle);
        let corners = [
            Vec2::new(-hw, -hh),
            Vec2::new(hw, -hh),
            Vec2::new(hw, hh),
            Vec2::new(-hw, hh),
        ]
        .map(|c| pose * c);
        Self::new(&corners)
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    /// Outward unit normals, `normals()[i]` belongs to the edge from vertex `i` to `i + 1`.
    #[inline]
    pub fn normals(&self) -> &[Vec2] {
        &self.normals[..self.count]
    }

    #[inline]
    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    fn compute_mass(&self, density: f64) -> MassData {
        // Polygon mass, centroid, and inertia.
        // Let rho be the polygon density in mass per unit area.
        // Then:
        // mass = rho * int(dA)
        // centroid.x = (1/mass) * rho * int(x * dA)
        // centroid.y = (1/mass) * rho * int(y * dA)
        // I = rho * int((x*x + y*y) * dA)
        //
        // The polygon is split into triangles fanning out from a reference point
        // inside it, and each triangle is integrated separately.

        // the first vertex as the reference point keeps the numbers small
        let s = self.vertices[0];

        let mut center = Vec2::zero();
        let mut area = 0.0;
        let mut inertia = 0.0;
        const INV3: f64 = 1.0 / 3.0;

        for i in 0..self.count {
            let e1 = self.vertices[i] - s;
            let e2 = self.vertices[(i + 1) % self.count] - s;
            let d = m::cross(e1, e2);

            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += triangle_area * INV3 * (e1 + e2);

            let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * INV3 * d) * (int_x2 + int_y2);
        }

        let mass = density * area;
        let center = center / area;
        let world_center = center + s;
        // shift to center of mass, then to the body origin
        let inertia = density * inertia
            + mass * (world_center.dot(world_center) - center.dot(center));

        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }
}

/// Gift wrapping convex hull. Returns counterclockwise vertices
/// with collinear points removed.
fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    // rightmost point is on the hull, lowest y breaks ties
    let mut start = 0;
    for (i, p) in points.iter().enumerate().skip(1) {
        let best = points[start];
        if p.x > best.x || (p.x == best.x && p.y < best.y) {
            start = i;
        }
    }

    let mut hull: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if hull.len() > points.len() {
            // numerical trouble, bail out with what we have
            break;
        }
        hull.push(current);

        let mut next = if current == 0 { 1 } else { 0 };
        for candidate in 0..points.len() {
            if candidate == current || candidate == next {
                continue;
            }
            let r = points[next] - points[current];
            let v = points[candidate] - points[current];
            let c = m::cross(r, v);
            // candidate is to the right of the current edge, or collinear and farther away
            if c < 0.0 || (c == 0.0 && v.mag_sq() > r.mag_sq()) {
                next = candidate;
            }
        }

        current = next;
        if current == start {
            break;
        }
    }

    let mut hull: Vec<Vec2> = hull.into_iter().map(|i| points[i]).collect();

    // drop collinear points
    let mut i = 0;
    while hull.len() >= 3 && i < hull.len() {
        let n = hull.len();
        let prev = hull[(i + n - 1) % n];
        let next = hull[(i + 1) % n];
        let edge = next - prev;
        let offset = hull[i] - prev;
        let dist = m::cross(edge, offset).abs() / edge.mag().max(f64::EPSILON);
        if dist < 2.0 * LINEAR_SLOP {
            hull.remove(i);
        } else {
            i += 1;
        }
    }
    hull
}

fn polygon_centroid(vertices: &[Vec2]) -> Vec2 {
    let origin = vertices[0];
    let mut center = Vec2::zero();
    let mut area = 0.0;
    const INV3: f64 = 1.0 / 3.0;
    for i in 1..vertices.len() - 1 {
        let e1 = vertices[i] - origin;
        let e2 = vertices[i + 1] - origin;
        let a = 0.5 * m::cross(e1, e2);
        center += a * INV3 * (e1 + e2);
        area += a;
    }
    origin + center / area
}

//
// Edge and chain
//

/// A line segment. Edges have no volume, so they can only collide with
/// solid shapes and contribute no mass.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    #[cfg_attr(feature = "serde-types", serde(with = "m::serde_vec2"))]
    pub v1: Vec2,
    #[cfg_attr(feature = "serde-types", serde(with = "m::serde_vec2"))]
    pub v2: Vec2,
}

impl Edge {
    pub fn new(v1: Vec2, v2: Vec2) -> Self {
        Self { v1, v2 }
    }

    /// Outward normal on the right side of the edge direction.
    pub fn normal(&self) -> Vec2 {
        m::right_normal(self.v2 - self.v1).normalized()
    }
}

/// A sequence of edges, either open or looped back to the start.
/// Each edge is a separate child for collision purposes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Chain {
    #[cfg_attr(feature = "serde-types", serde(with = "serde_points"))]
    vertices: Vec<Vec2>,
    looped: bool,
}

#[cfg(feature = "serde-types")]
mod serde_points {
    use super::Vec2;

    pub fn serialize<S: serde::Serializer>(v: &[Vec2], s: S) -> Result<S::Ok, S::Error> {
        use serde::Serialize;
        v.iter()
            .map(|p| [p.x, p.y])
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Vec<Vec2>, D::Error> {
        use serde::Deserialize;
        Vec::<[f64; 2]>::deserialize(d).map(|ps| ps.iter().map(|p| Vec2::new(p[0], p[1])).collect())
    }
}

impl Chain {
    /// An open chain through the given points.
    pub fn new_open(vertices: Vec<Vec2>) -> Self {
        Self {
            vertices,
            looped: false,
        }
    }

    /// A closed loop through the given points, with an edge from the last point back to the first.
    pub fn new_loop(vertices: Vec<Vec2>) -> Self {
        Self {
            vertices,
            looped: true,
        }
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    #[inline]
    pub fn is_loop(&self) -> bool {
        self.looped
    }

    pub fn edge_count(&self) -> usize {
        match (self.looped, self.vertices.len()) {
            (_, 0 | 1) => 0,
            (true, n) => n,
            (false, n) => n - 1,
        }
    }

    /// Get one edge of the chain.
    pub fn child_edge(&self, index: usize) -> Edge {
        let n = self.vertices.len();
        Edge::new(self.vertices[index], self.vertices[(index + 1) % n])
    }

    pub fn edges(&self) -> impl '_ + Iterator<Item = Edge> {
        (0..self.edge_count()).map(|i| self.child_edge(i))
    }
}

//
// Shape interface
//

impl From<Circle> for Shape {
    fn from(c: Circle) -> Self {
        Shape::Circle(c)
    }
}
impl From<Polygon> for Shape {
    fn from(p: Polygon) -> Self {
        Shape::Polygon(p)
    }
}
impl From<Edge> for Shape {
    fn from(e: Edge) -> Self {
        Shape::Edge(e)
    }
}
impl From<Chain> for Shape {
    fn from(c: Chain) -> Self {
        Shape::Chain(c)
    }
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Circle(_) => ShapeKind::Circle,
            Shape::Polygon(_) => ShapeKind::Polygon,
            Shape::Edge(_) => ShapeKind::Edge,
            Shape::Chain(_) => ShapeKind::Chain,
        }
    }

    /// Radius of the rounded skin around the shape's core geometry.
    pub fn radius(&self) -> f64 {
        match self {
            Shape::Circle(c) => c.radius,
            Shape::Polygon(p) => p.radius,
            Shape::Edge(_) | Shape::Chain(_) => POLYGON_RADIUS,
        }
    }

    /// Number of child primitives. Only chains have more than one.
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(c) => c.edge_count(),
            _ => 1,
        }
    }

    /// Check that the geometry is usable for simulation.
    pub fn validate(&self) -> Result<()> {
        match self {
            Shape::Circle(c) => {
                if !(c.radius > 0.0 && c.radius.is_finite()) {
                    return Err(PhysicsError::InvalidGeometry(
                        "circle radius must be positive",
                    ));
                }
                if !m::is_finite_vec(c.center) {
                    return Err(PhysicsError::InvalidGeometry("circle center is not finite"));
                }
            }
            // polygons can only be constructed valid
            Shape::Polygon(_) => {}
            Shape::Edge(e) => {
                if !(m::is_finite_vec(e.v1) && m::is_finite_vec(e.v2)) {
                    return Err(PhysicsError::InvalidGeometry("edge vertex is not finite"));
                }
                if (e.v2 - e.v1).mag_sq() <= LINEAR_SLOP * LINEAR_SLOP {
                    return Err(PhysicsError::InvalidGeometry("edge is too short"));
                }
            }
            Shape::Chain(c) => {
                let min_count = if c.looped { 3 } else { 2 };
                if c.vertices.len() < min_count {
                    return Err(PhysicsError::InvalidGeometry("chain has too few vertices"));
                }
                if !c.vertices.iter().all(|v| m::is_finite_vec(*v)) {
                    return Err(PhysicsError::InvalidGeometry("chain vertex is not finite"));
                }
                if c
                    .edges()
                    .any(|e| (e.v2 - e.v1).mag_sq() <= LINEAR_SLOP * LINEAR_SLOP)
                {
                    return Err(PhysicsError::InvalidGeometry(
                        "chain vertices are too close together",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Compute the world-space AABB of a child primitive.
    pub fn compute_aabb(&self, pose: &Pose, child: usize) -> AABB {
        match self {
            Shape::Circle(c) => {
                AABB::from_center(*pose * c.center, Vec2::broadcast(c.radius))
            }
            Shape::Polygon(p) => {
                let mut verts = p.vertices().iter().map(|v| *pose * *v);
                let first = verts.next().unwrap_or(pose.translation);
                verts
                    .fold(AABB::from_point(first), |acc, v| {
                        acc.union(&AABB::from_point(v))
                    })
                    .padded(p.radius)
            }
            Shape::Edge(e) => edge_aabb(pose, e),
            Shape::Chain(c) => edge_aabb(pose, &c.child_edge(child)),
        }
    }

    /// Compute mass properties with the given density (mass per unit area).
    /// Edges and chains have no area and thus no mass.
    pub fn compute_mass(&self, density: f64) -> MassData {
        match self {
            Shape::Circle(c) => {
                let mass = density * std::f64::consts::PI * c.radius * c.radius;
                MassData {
                    mass,
                    center: c.center,
                    // inertia about the local origin
                    inertia: mass * (0.5 * c.radius * c.radius + c.center.mag_sq()),
                }
            }
            Shape::Polygon(p) => p.compute_mass(density),
            Shape::Edge(_) | Shape::Chain(_) => MassData::default(),
        }
    }

    /// Test a world point for containment. Edges and chains contain nothing.
    pub fn test_point(&self, pose: &Pose, point: Vec2) -> bool {
        match self {
            Shape::Circle(c) => query::point_in_circle(point, pose, c.center, c.radius),
            Shape::Polygon(p) => query::point_in_polygon(point, pose, p.vertices(), p.normals()),
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }

    /// Cast a ray against a child primitive.
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        pose: &Pose,
        child: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(c) => query::ray_circle(input, pose, c.center, c.radius),
            Shape::Polygon(p) => query::ray_polygon(input, pose, p.vertices(), p.normals()),
            Shape::Edge(e) => query::ray_segment(input, pose, e.v1, e.v2),
            Shape::Chain(c) => {
                let e = c.child_edge(child);
                query::ray_segment(input, pose, e.v1, e.v2)
            }
        }
    }

    /// Smallest distance from the shape's center to its surface,
    /// used to decide whether a body moved fast enough to need continuous collision.
    pub fn min_extent(&self) -> f64 {
        match self {
            Shape::Circle(c) => c.radius,
            Shape::Polygon(p) => {
                let min_face = p
                    .vertices()
                    .iter()
                    .zip(p.normals())
                    .map(|(v, n)| n.dot(*v - p.centroid))
                    .fold(f64::MAX, f64::min);
                min_face + p.radius
            }
            Shape::Edge(_) | Shape::Chain(_) => POLYGON_RADIUS,
        }
    }
}

fn edge_aabb(pose: &Pose, e: &Edge) -> AABB {
    let v1 = *pose * e.v1;
    let v2 = *pose * e.v2;
    AABB::new(v1.min_by_component(v2), v1.max_by_component(v2)).padded(POLYGON_RADIUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_mass_properties() {
        let b = Polygon::new_box(1.0, 0.5).unwrap();
        let md = Shape::from(b).compute_mass(2.0);
        // 2 x 1 box
        assert!((md.mass - 4.0).abs() < 1e-12);
        assert!(md.center.mag() < 1e-12);
        // m (w^2 + h^2) / 12
        assert!((md.inertia - 4.0 * (4.0 + 1.0) / 12.0).abs() < 1e-12);

        // offset box: parallel axis theorem
        let offset = Polygon::new_oriented_box(1.0, 0.5, Vec2::new(3.0, 0.0), 0.0).unwrap();
        let md_off = Shape::from(offset).compute_mass(2.0);
        assert!((md_off.center - Vec2::new(3.0, 0.0)).mag() < 1e-12);
        assert!((md_off.inertia - (md.inertia + 4.0 * 9.0)).abs() < 1e-9);
    }

    #[test]
    fn hull_is_counterclockwise_and_drops_interior_points() {
        let points = [
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, -1.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(-1.0, 1.0),
            // collinear with the bottom edge
            Vec2::new(0.0, -1.0),
        ];
        let poly = Polygon::new(&points).unwrap();
        assert_eq!(poly.vertices().len(), 4);
        for (i, v) in poly.vertices().iter().enumerate() {
            let next = poly.vertices()[(i + 1) % 4];
            let after = poly.vertices()[(i + 2) % 4];
            assert!(m::cross(next - *v, after - next) > 0.0);
        }
        for n in poly.normals() {
            assert!((n.mag() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn vertex_limit_applies_to_the_hull() {
        // 12 input points: an octagon, a duplicate corner and three interior points
        let mut points: Vec<Vec2> = (0..8)
            .map(|i| m::rotate_angle(Vec2::unit_x(), i as f64 * std::f64::consts::PI / 4.0))
            .collect();
        points.push(points[3]);
        points.extend([Vec2::zero(), Vec2::new(0.2, 0.1), Vec2::new(-0.3, 0.4)]);
        let poly = Polygon::new(&points).unwrap();
        assert_eq!(poly.vertices().len(), MAX_POLYGON_VERTICES);
        assert!(poly.centroid.mag() < 1e-12);

        let decagon: Vec<Vec2> = (0..10)
            .map(|i| m::rotate_angle(Vec2::unit_x(), i as f64 * std::f64::consts::PI / 5.0))
            .collect();
        assert!(matches!(
            Polygon::new(&decagon),
            Err(PhysicsError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn degenerate_polygons_rejected() {
        let collinear = [Vec2::zero(), Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert!(matches!(
            Polygon::new(&collinear),
            Err(PhysicsError::InvalidGeometry(_))
        ));
        let welded = [Vec2::zero(), Vec2::new(1e-4, 0.0), Vec2::new(0.0, 1e-4)];
        assert!(Polygon::new(&welded).is_err());
        assert!(Polygon::new(&[Vec2::zero(), Vec2::unit_x()]).is_err());
        assert!(Polygon::new_box(0.0, 1.0).is_err());
        assert!(Shape::Circle(Circle::new(-1.0)).validate().is_err());
        assert!(Shape::Chain(Chain::new_loop(vec![Vec2::zero(), Vec2::unit_x()]))
            .validate()
            .is_err());
    }

    #[test]
    fn chain_children() {
        let pts = vec![Vec2::zero(), Vec2::unit_x(), Vec2::one()];
        let open = Shape::Chain(Chain::new_open(pts.clone()));
        let looped = Shape::Chain(Chain::new_loop(pts));
        assert_eq!(open.child_count(), 2);
        assert_eq!(looped.child_count(), 3);
        if let Shape::Chain(c) = &looped {
            assert_eq!(c.child_edge(2), Edge::new(Vec2::one(), Vec2::zero()));
        }
        assert_eq!(open.compute_mass(1.0), MassData::default());
    }

    #[test]
    fn rotated_box_aabb_and_point_test() {
        let shape = Shape::from(Polygon::new_box(1.0, 1.0).unwrap());
        let pose = m::pose_from(Vec2::new(2.0, 0.0), std::f64::consts::FRAC_PI_4);
        let aabb = shape.compute_aabb(&pose, 0);
        let half_diag = 2.0f64.sqrt() + POLYGON_RADIUS;
        assert!((aabb.max.x - (2.0 + half_diag)).abs() < 1e-9);
        assert!((aabb.min.y + half_diag).abs() < 1e-9);

        assert!(shape.test_point(&pose, Vec2::new(2.0, 1.3)));
        assert!(!shape.test_point(&pose, Vec2::new(3.0, 1.0)));
        assert!((shape.min_extent() - (1.0 + POLYGON_RADIUS)).abs() < 1e-12);
    }
}
