//! Contact manifold generation between pairs of shapes.
//!
//! Every algorithm here expects the shapes in a canonical order
//! (polygon before circle, edge before anything solid).
//! [`collide`] swaps the arguments and flips the result when they come in the other order.

use super::manifold::{ContactFeature, ContactId, FeatureKind, Manifold, ManifoldKind, ManifoldPoint};
use crate::{
    math::{self as m, Pose, Vec2},
    settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS},
    shape::{Circle, Edge, Shape, ShapeKind},
};

/// Whether two kinds of shapes can produce contacts at all.
/// Edges and chains have no volume and never collide with each other.
pub fn can_collide(a: ShapeKind, b: ShapeKind) -> bool {
    let is_thin = |k| matches!(k, ShapeKind::Edge | ShapeKind::Chain);
    !(is_thin(a) && is_thin(b))
}

/// Whether a pair of shape kinds must be swapped to be in canonical order.
pub fn needs_swap(a: ShapeKind, b: ShapeKind) -> bool {
    rank(a) > rank(b)
}

fn rank(kind: ShapeKind) -> u8 {
    match kind {
        ShapeKind::Edge | ShapeKind::Chain => 0,
        ShapeKind::Polygon => 1,
        ShapeKind::Circle => 2,
    }
}

/// Compute the contact manifold between children of two shapes.
///
/// An empty manifold means the shapes are separated.
pub fn collide(
    shape_a: &Shape,
    child_a: usize,
    pose_a: &Pose,
    shape_b: &Shape,
    child_b: usize,
    pose_b: &Pose,
) -> Manifold {
    if !can_collide(shape_a.kind(), shape_b.kind()) {
        return Manifold::default();
    }
    if needs_swap(shape_a.kind(), shape_b.kind()) {
        return flip_manifold(collide_ordered(
            shape_b, child_b, pose_b, shape_a, child_a, pose_a,
        ));
    }
    collide_ordered(shape_a, child_a, pose_a, shape_b, child_b, pose_b)
}

// shape B is never a chain in canonical order, so its child index goes unused
fn collide_ordered(
    shape_a: &Shape,
    child_a: usize,
    pose_a: &Pose,
    shape_b: &Shape,
    _child_b: usize,
    pose_b: &Pose,
) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle(ca), Shape::Circle(cb)) => circle_circle(ca, pose_a, cb, pose_b),
        (Shape::Polygon(pa), Shape::Circle(cb)) => {
            polygon_circle(&PolyView::of_polygon(pa), pose_a, cb, pose_b)
        }
        (Shape::Polygon(pa), Shape::Polygon(pb)) => polygon_polygon(
            &PolyView::of_polygon(pa),
            pose_a,
            &PolyView::of_polygon(pb),
            pose_b,
        ),
        (Shape::Edge(e), Shape::Circle(cb)) => edge_circle(e, pose_a, cb, pose_b),
        (Shape::Chain(c), Shape::Circle(cb)) => {
            edge_circle(&c.child_edge(child_a), pose_a, cb, pose_b)
        }
        (Shape::Edge(e), Shape::Polygon(pb)) => polygon_polygon(
            &PolyView::of_edge(e),
            pose_a,
            &PolyView::of_polygon(pb),
            pose_b,
        ),
        (Shape::Chain(c), Shape::Polygon(pb)) => polygon_polygon(
            &PolyView::of_edge(&c.child_edge(child_a)),
            pose_a,
            &PolyView::of_polygon(pb),
            pose_b,
        ),
        _ => Manifold::default(),
    }
}

/// Express a manifold computed for (B, A) as one for (A, B).
fn flip_manifold(mut manifold: Manifold) -> Manifold {
    match manifold.kind {
        ManifoldKind::Circles => {
            if let Some(p) = manifold.points.iter_mut().next() {
                std::mem::swap(&mut manifold.local_point, &mut p.local_point);
            }
        }
        ManifoldKind::FaceA => manifold.kind = ManifoldKind::FaceB,
        ManifoldKind::FaceB => manifold.kind = ManifoldKind::FaceA,
    }
    for p in manifold.points.iter_mut() {
        p.id = ContactId(p.id.0.flipped());
    }
    manifold
}

//
// CIRCLE <-> CIRCLE
//

fn circle_circle(circle_a: &Circle, pose_a: &Pose, circle_b: &Circle, pose_b: &Pose) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = *pose_a * circle_a.center;
    let p_b = *pose_b * circle_b.center;

    let dist_sq = (p_b - p_a).mag_sq();
    let r_sum = circle_a.radius + circle_b.radius;
    if dist_sq > r_sum * r_sum {
        return manifold;
    }

    manifold.kind = ManifoldKind::Circles;
    manifold.local_point = circle_a.center;
    manifold.local_normal = Vec2::zero();
    manifold.points.push(ManifoldPoint {
        local_point: circle_b.center,
        ..Default::default()
    });
    manifold
}

//
// POLYGON <-> CIRCLE
//

fn polygon_circle(poly_a: &PolyView, pose_a: &Pose, circle_b: &Circle, pose_b: &Pose) -> Manifold {
    let mut manifold = Manifold::default();

    // circle position in the frame of the polygon
    let c = m::inv_transform_point(pose_a, *pose_b * circle_b.center);

    let radius = poly_a.radius + circle_b.radius;
    let count = poly_a.count;
    let vertices = &poly_a.vertices[..count];
    let normals = &poly_a.normals[..count];

    // find the min separating edge
    let mut normal_index = 0;
    let mut separation = f64::MIN;
    for (i, (v, n)) in vertices.iter().zip(normals).enumerate() {
        let s = n.dot(c - *v);
        if s > radius {
            // early out
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    // vertices of the reference edge
    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % count];

    let push_face = |manifold: &mut Manifold, normal: Vec2, point: Vec2| {
        manifold.kind = ManifoldKind::FaceA;
        manifold.local_normal = normal;
        manifold.local_point = point;
        manifold.points.push(ManifoldPoint {
            local_point: circle_b.center,
            ..Default::default()
        });
    };

    // center is inside the polygon
    if separation < f64::EPSILON {
        push_face(&mut manifold, normals[normal_index], 0.5 * (v1 + v2));
        return manifold;
    }

    // barycentric coordinates
    let u1 = (c - v1).dot(v2 - v1);
    let u2 = (c - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if (c - v1).mag_sq() > radius * radius {
            return manifold;
        }
        push_face(&mut manifold, (c - v1).normalized(), v1);
    } else if u2 <= 0.0 {
        if (c - v2).mag_sq() > radius * radius {
            return manifold;
        }
        push_face(&mut manifold, (c - v2).normalized(), v2);
    } else {
        let face_center = 0.5 * (v1 + v2);
        let s = (c - face_center).dot(normals[normal_index]);
        if s > radius {
            return manifold;
        }
        push_face(&mut manifold, normals[normal_index], face_center);
    }
    manifold
}

//
// EDGE <-> CIRCLE
//

fn edge_circle(edge_a: &Edge, pose_a: &Pose, circle_b: &Circle, pose_b: &Pose) -> Manifold {
    let mut manifold = Manifold::default();

    // circle in the frame of the edge
    let q = m::inv_transform_point(pose_a, *pose_b * circle_b.center);

    let (a, b) = (edge_a.v1, edge_a.v2);
    let e = b - a;

    // barycentric coordinates
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = POLYGON_RADIUS + circle_b.radius;

    let vertex_contact = |manifold: &mut Manifold, p: Vec2, index: u8| {
        manifold.kind = ManifoldKind::Circles;
        manifold.local_normal = Vec2::zero();
        manifold.local_point = p;
        manifold.points.push(ManifoldPoint {
            local_point: circle_b.center,
            id: ContactId(ContactFeature {
                index_a: index,
                index_b: 0,
                kind_a: FeatureKind::Vertex,
                kind_b: FeatureKind::Vertex,
            }),
            ..Default::default()
        });
    };

    // region A
    if v <= 0.0 {
        if (q - a).mag_sq() > radius * radius {
            return manifold;
        }
        vertex_contact(&mut manifold, a, 0);
        return manifold;
    }

    // region B
    if u <= 0.0 {
        if (q - b).mag_sq() > radius * radius {
            return manifold;
        }
        vertex_contact(&mut manifold, b, 1);
        return manifold;
    }

    // region AB
    let den = e.mag_sq();
    debug_assert!(den > 0.0);
    let p = (1.0 / den) * (u * a + v * b);
    if (q - p).mag_sq() > radius * radius {
        return manifold;
    }

    let mut n = m::left_normal(e);
    if n.dot(q - a) < 0.0 {
        n = -n;
    }
    n.normalize();

    manifold.kind = ManifoldKind::FaceA;
    manifold.local_normal = n;
    manifold.local_point = a;
    manifold.points.push(ManifoldPoint {
        local_point: circle_b.center,
        id: ContactId(ContactFeature {
            index_a: 0,
            index_b: 0,
            kind_a: FeatureKind::Face,
            kind_b: FeatureKind::Vertex,
        }),
        ..Default::default()
    });
    manifold
}

//
// POLYGON <-> POLYGON
//

/// Vertices and normals of a convex polygon, or an edge treated as
/// a two-sided polygon with two vertices.
struct PolyView {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    radius: f64,
}

impl PolyView {
    fn of_polygon(poly: &crate::shape::Polygon) -> Self {
        let mut view = PolyView {
            vertices: [Vec2::zero(); MAX_POLYGON_VERTICES],
            normals: [Vec2::zero(); MAX_POLYGON_VERTICES],
            count: poly.vertices().len(),
            radius: poly.radius(),
        };
        view.vertices[..view.count].copy_from_slice(poly.vertices());
        view.normals[..view.count].copy_from_slice(poly.normals());
        view
    }

    fn of_edge(edge: &Edge) -> Self {
        let mut view = PolyView {
            vertices: [Vec2::zero(); MAX_POLYGON_VERTICES],
            normals: [Vec2::zero(); MAX_POLYGON_VERTICES],
            count: 2,
            radius: POLYGON_RADIUS,
        };
        let n = edge.normal();
        view.vertices[0] = edge.v1;
        view.vertices[1] = edge.v2;
        view.normals[0] = n;
        view.normals[1] = -n;
        view
    }

    fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    fn normals(&self) -> &[Vec2] {
        &self.normals[..self.count]
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct ClipVertex {
    v: Vec2,
    id: ContactFeature,
}

/// Find the max separation between poly1 and poly2 using edge normals from poly1.
fn find_max_separation(poly1: &PolyView, pose1: &Pose, poly2: &PolyView, pose2: &Pose) -> (usize, f64) {
    let mut best_index = 0;
    let mut max_separation = f64::MIN;
    for (i, (v1, n1)) in poly1.vertices().iter().zip(poly1.normals()).enumerate() {
        // normal and vertex of poly1 in the frame of poly2
        let n = m::inv_rotate(pose2.rotation, pose1.rotation * *n1);
        let v = m::inv_transform_point(pose2, *pose1 * *v1);

        // deepest point of poly2 along the normal
        let si = poly2
            .vertices()
            .iter()
            .map(|v2| n.dot(*v2 - v))
            .fold(f64::MAX, f64::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// Find the edge of poly2 most anti-parallel to the reference edge of poly1.
fn find_incident_edge(
    poly1: &PolyView,
    pose1: &Pose,
    edge1: usize,
    poly2: &PolyView,
    pose2: &Pose,
) -> [ClipVertex; 2] {
    // reference edge normal in the frame of poly2
    let normal1 = m::inv_rotate(pose2.rotation, pose1.rotation * poly1.normals[edge1]);

    let mut index = 0;
    let mut min_dot = f64::MAX;
    for (i, n2) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(*n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % poly2.count;
    let clip_vertex = |i: usize| ClipVertex {
        v: *pose2 * poly2.vertices[i],
        id: ContactFeature {
            index_a: edge1 as u8,
            index_b: i as u8,
            kind_a: FeatureKind::Face,
            kind_b: FeatureKind::Vertex,
        },
    };
    [clip_vertex(i1), clip_vertex(i2)]
}

/// Sutherland-Hodgman clipping of a segment against a half-plane.
/// Returns the clipped points, which are fewer than 2 if the segment was clipped away.
fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f64,
    vertex_index_a: usize,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    // distance of end points to the line
    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    // points behind the plane are kept
    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // the points are on different sides of the plane
    if distance0 * distance1 < 0.0 && count < 2 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count] = ClipVertex {
            v: v_in[0].v + interp * (v_in[1].v - v_in[0].v),
            // the clipped point is where a vertex of A hits a face of B
            id: ContactFeature {
                index_a: vertex_index_a as u8,
                index_b: v_in[0].id.index_b,
                kind_a: FeatureKind::Vertex,
                kind_b: FeatureKind::Face,
            },
        };
        count += 1;
    }

    (v_out, count)
}

// Find edge normal of max separation on A, return if a separating axis is found.
// Find edge normal of max separation on B, return if a separating axis is found.
// Choose the reference edge as min(minA, minB).
// Find the incident edge.
// Clip.
fn polygon_polygon(poly_a: &PolyView, pose_a: &Pose, poly_b: &PolyView, pose_b: &Pose) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, pose_a, poly_b, pose_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, pose_b, poly_a, pose_a);
    if separation_b > total_radius {
        return manifold;
    }

    // prefer A's face unless B's is clearly better, for coherence between steps
    const K_TOL: f64 = 0.1 * LINEAR_SLOP;
    let (poly1, pose1, poly2, pose2, edge1, flip) = if separation_b > separation_a + K_TOL {
        manifold.kind = ManifoldKind::FaceB;
        (poly_b, pose_b, poly_a, pose_a, edge_b, true)
    } else {
        manifold.kind = ManifoldKind::FaceA;
        (poly_a, pose_a, poly_b, pose_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, pose1, edge1, poly2, pose2);

    let iv1 = edge1;
    let iv2 = (edge1 + 1) % poly1.count;

    let v11 = poly1.vertices[iv1];
    let v12 = poly1.vertices[iv2];

    let Some(local_tangent) = m::Unit::try_new(v12 - v11, f64::EPSILON) else {
        return manifold;
    };
    let local_tangent = local_tangent.into_inner();

    let local_normal = m::cross_vs(local_tangent, 1.0);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = pose1.rotation * local_tangent;
    let normal = m::cross_vs(tangent, 1.0);

    let v11 = *pose1 * v11;
    let v12 = *pose1 * v12;

    // face offset
    let front_offset = normal.dot(v11);

    // side offsets, extended by polytope skin thickness
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    // clip incident edge against the extruded edge1 side edges
    let (clip_points1, count1) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if count1 < 2 {
        return manifold;
    }
    let (clip_points2, count2) = clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2);
    if count2 < 2 {
        return manifold;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    for cp in &clip_points2 {
        let separation = normal.dot(cp.v) - front_offset;
        if separation <= total_radius {
            let id = if flip { cp.id.flipped() } else { cp.id };
            manifold.points.push(ManifoldPoint {
                local_point: m::inv_transform_point(pose2, cp.v),
                id: ContactId(id),
                ..Default::default()
            });
        }
    }

    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::WorldManifold;
    use crate::shape::{Chain, Polygon};

    fn circle(r: f64) -> Shape {
        Shape::Circle(Circle::new(r))
    }

    fn at(x: f64, y: f64) -> Pose {
        m::pose_from(Vec2::new(x, y), 0.0)
    }

    #[test]
    fn overlapping_circles_single_point_with_depth() {
        let (a, b) = (circle(1.0), circle(1.0));
        let (pose_a, pose_b) = (at(0.0, 0.0), at(1.7, 0.0));
        let manifold = collide(&a, 0, &pose_a, &b, 0, &pose_b);
        assert_eq!(manifold.point_count(), 1);

        let wm = WorldManifold::new(&manifold, &pose_a, 1.0, &pose_b, 1.0);
        assert!((wm.separations[0] + 0.3).abs() < 1e-12);
        assert!((wm.normal - Vec2::unit_x()).mag() < 1e-12);
    }

    #[test]
    fn disjoint_shapes_have_no_points() {
        let shapes = [
            circle(0.5),
            Shape::from(Polygon::new_box(0.5, 0.5).unwrap()),
            Shape::from(Edge::new(Vec2::new(-0.5, 0.0), Vec2::new(0.5, 0.0))),
            Shape::from(Chain::new_open(vec![
                Vec2::new(-0.5, 0.0),
                Vec2::zero(),
                Vec2::new(0.5, 0.0),
            ])),
        ];
        for a in &shapes {
            for b in &shapes {
                for child in 0..b.child_count() {
                    let manifold = collide(a, 0, &at(0.0, 0.0), b, child, &at(3.0, 1.0));
                    assert!(manifold.is_empty(), "{:?} vs {:?}", a.kind(), b.kind());
                }
            }
        }
    }

    #[test]
    fn box_resting_on_box_has_two_points() {
        let ground = Shape::from(Polygon::new_box(5.0, 0.5).unwrap());
        let crate_box = Shape::from(Polygon::new_box(0.5, 0.5).unwrap());
        let pose_g = at(0.0, 0.0);
        // slightly overlapping
        let pose_c = at(0.3, 0.99);
        let manifold = collide(&ground, 0, &pose_g, &crate_box, 0, &pose_c);
        assert_eq!(manifold.point_count(), 2);

        let wm = WorldManifold::new(&manifold, &pose_g, ground.radius(), &pose_c, crate_box.radius());
        assert!((wm.normal - Vec2::unit_y()).mag() < 1e-9);
        for (point, separation) in wm.iter() {
            assert!((separation - (-0.01 - 2.0 * POLYGON_RADIUS)).abs() < 1e-9);
            assert!((point.x - 0.3).abs() <= 0.5 + 1e-9);
        }
        // ids differ so that warm starting can tell the points apart
        assert_ne!(manifold.points[0].id, manifold.points[1].id);
    }

    #[test]
    fn swapped_order_flips_manifold() {
        let b = Shape::from(Polygon::new_box(1.0, 1.0).unwrap());
        let c = circle(0.5);
        let (pose_b, pose_c) = (at(0.0, 0.0), at(0.0, 1.3));

        let forward = collide(&b, 0, &pose_b, &c, 0, &pose_c);
        let backward = collide(&c, 0, &pose_c, &b, 0, &pose_b);
        assert_eq!(forward.kind, ManifoldKind::FaceA);
        assert_eq!(backward.kind, ManifoldKind::FaceB);

        let wm_f = WorldManifold::new(&forward, &pose_b, b.radius(), &pose_c, 0.5);
        let wm_b = WorldManifold::new(&backward, &pose_c, 0.5, &pose_b, b.radius());
        // same contact, opposite normals
        assert!((wm_f.normal + wm_b.normal).mag() < 1e-12);
        assert!((wm_f.points[0] - wm_b.points[0]).mag() < 1e-12);
        assert!((wm_f.separations[0] - wm_b.separations[0]).abs() < 1e-12);
    }

    #[test]
    fn circle_on_edge_regions() {
        let edge = Shape::from(Edge::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)));
        let c = circle(0.5);

        // above the middle of the edge
        let face = collide(&edge, 0, &at(0.0, 0.0), &c, 0, &at(0.2, 0.45));
        assert_eq!(face.kind, ManifoldKind::FaceA);
        // also works from below, edges are two-sided
        let below = collide(&edge, 0, &at(0.0, 0.0), &c, 0, &at(0.2, -0.45));
        let wm = WorldManifold::new(&below, &at(0.0, 0.0), POLYGON_RADIUS, &at(0.2, -0.45), 0.5);
        assert!(wm.normal.y < 0.0);

        // past the end vertex
        let corner = collide(&edge, 0, &at(0.0, 0.0), &c, 0, &at(1.3, 0.2));
        assert_eq!(corner.kind, ManifoldKind::Circles);
        assert_eq!(corner.points[0].id.0.index_a, 1);
    }

    #[test]
    fn box_on_edge() {
        let edge = Shape::from(Edge::new(Vec2::new(-3.0, 0.0), Vec2::new(3.0, 0.0)));
        let b = Shape::from(Polygon::new_box(0.5, 0.5).unwrap());
        let pose_b = at(0.0, 0.5);
        let manifold = collide(&edge, 0, &at(0.0, 0.0), &b, 0, &pose_b);
        assert_eq!(manifold.point_count(), 2);
        let wm = WorldManifold::new(&manifold, &at(0.0, 0.0), POLYGON_RADIUS, &pose_b, b.radius());
        assert!(wm.normal.y > 0.99);
    }

    #[test]
    fn thin_pairs_never_collide() {
        let e = Shape::from(Edge::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)));
        let manifold = collide(&e, 0, &at(0.0, 0.0), &e, 0, &at(0.0, 0.0));
        assert!(manifold.is_empty());
        assert!(!can_collide(ShapeKind::Chain, ShapeKind::Edge));
        assert!(needs_swap(ShapeKind::Circle, ShapeKind::Polygon));
    }
}
