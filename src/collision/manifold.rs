use crate::{
    math::{Pose, Vec2},
    settings::MAX_MANIFOLD_POINTS,
};

/// Whether a contact feature is a vertex or a face of its shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FeatureKind {
    #[default]
    Vertex,
    Face,
}

/// The features that intersect to form a contact point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ContactFeature {
    /// Feature index on shape A.
    pub index_a: u8,
    /// Feature index on shape B.
    pub index_b: u8,
    pub kind_a: FeatureKind,
    pub kind_b: FeatureKind,
}

impl ContactFeature {
    /// Swap the roles of A and B, used when the reference face is on shape B.
    #[inline]
    pub fn flipped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            kind_a: self.kind_b,
            kind_b: self.kind_a,
        }
    }
}

/// Identifies a contact point so that it can be matched
/// with the same point from the previous step for warm starting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ContactId(pub ContactFeature);

impl ContactId {
    /// Pack the feature into a single integer, mostly useful for hashing and debugging.
    pub fn key(&self) -> u32 {
        let f = self.0;
        let kind = |k: FeatureKind| match k {
            FeatureKind::Vertex => 0u32,
            FeatureKind::Face => 1u32,
        };
        f.index_a as u32
            | (f.index_b as u32) << 8
            | kind(f.kind_a) << 16
            | kind(f.kind_b) << 24
    }
}

/// A manifold point is a contact point belonging to a contact manifold.
///
/// The local point interpretation depends on the manifold kind:
/// - `Circles`: the local center of circle B
/// - `FaceA`: the local center of circle B or the clip point of polygon B
/// - `FaceB`: the clip point of polygon A
#[derive(Clone, Copy, Debug, Default)]
pub struct ManifoldPoint {
    pub local_point: Vec2,
    /// Accumulated non-penetration impulse.
    pub normal_impulse: f64,
    /// Accumulated friction impulse.
    pub tangent_impulse: f64,
    pub id: ContactId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ManifoldKind {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// Contact points between two touching convex shapes, stored in local coordinates
/// so that they stay valid as the bodies move during position correction.
///
/// Box2D-family engines support multiple manifold kinds:
/// `Circles` uses the local point of shape A as the center of circle A,
/// `FaceA` and `FaceB` use the local point and normal as a reference plane on that shape.
#[derive(Clone, Debug, Default)]
pub struct Manifold {
    pub points: PointBuf,
    /// Not used for `Circles`.
    pub local_normal: Vec2,
    pub local_point: Vec2,
    pub kind: ManifoldKind,
}

impl Manifold {
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Find the point with the given id, used to match against an older manifold.
    pub fn find(&self, id: ContactId) -> Option<&ManifoldPoint> {
        self.points.iter().find(|p| p.id == id)
    }
}

/// Fixed-capacity storage for manifold points.
#[derive(Clone, Copy, Debug, Default)]
pub struct PointBuf {
    items: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    len: usize,
}

impl PointBuf {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add a point. Points beyond the capacity are ignored.
    pub fn push(&mut self, point: ManifoldPoint) {
        if self.len < MAX_MANIFOLD_POINTS {
            self.items[self.len] = point;
            self.len += 1;
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Keep only the first `len` points.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifoldPoint> {
        self.items[..self.len].iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ManifoldPoint> {
        self.items[..self.len].iter_mut()
    }
}

impl std::ops::Index<usize> for PointBuf {
    type Output = ManifoldPoint;

    fn index(&self, idx: usize) -> &ManifoldPoint {
        &self.items[..self.len][idx]
    }
}

impl std::ops::IndexMut<usize> for PointBuf {
    fn index_mut(&mut self, idx: usize) -> &mut ManifoldPoint {
        &mut self.items[..self.len][idx]
    }
}

/// A manifold evaluated in world space.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorldManifold {
    /// World vector pointing from A to B.
    pub normal: Vec2,
    /// World contact points, at the midpoint between the two surfaces.
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative value indicates overlap, in meters.
    pub separations: [f64; MAX_MANIFOLD_POINTS],
    pub point_count: usize,
}

impl WorldManifold {
    /// Evaluate a manifold with the given poses and shape radii.
    /// Assumes modest motion from the original state.
    pub fn new(
        manifold: &Manifold,
        pose_a: &Pose,
        radius_a: f64,
        pose_b: &Pose,
        radius_b: f64,
    ) -> Self {
        let mut wm = WorldManifold {
            point_count: manifold.point_count(),
            ..Default::default()
        };
        if manifold.is_empty() {
            return wm;
        }

        match manifold.kind {
            ManifoldKind::Circles => {
                wm.normal = Vec2::unit_x();
                let point_a = *pose_a * manifold.local_point;
                let point_b = *pose_b * manifold.points[0].local_point;
                if (point_b - point_a).mag_sq() > f64::EPSILON * f64::EPSILON {
                    wm.normal = (point_b - point_a).normalized();
                }

                let c_a = point_a + radius_a * wm.normal;
                let c_b = point_b - radius_b * wm.normal;
                wm.points[0] = 0.5 * (c_a + c_b);
                wm.separations[0] = (c_b - c_a).dot(wm.normal);
            }
            ManifoldKind::FaceA => {
                wm.normal = pose_a.rotation * manifold.local_normal;
                let plane_point = *pose_a * manifold.local_point;

                for (i, mp) in manifold.points.iter().enumerate() {
                    let clip_point = *pose_b * mp.local_point;
                    let c_a = clip_point
                        + (radius_a - (clip_point - plane_point).dot(wm.normal)) * wm.normal;
                    let c_b = clip_point - radius_b * wm.normal;
                    wm.points[i] = 0.5 * (c_a + c_b);
                    wm.separations[i] = (c_b - c_a).dot(wm.normal);
                }
            }
            ManifoldKind::FaceB => {
                wm.normal = pose_b.rotation * manifold.local_normal;
                let plane_point = *pose_b * manifold.local_point;

                for (i, mp) in manifold.points.iter().enumerate() {
                    let clip_point = *pose_a * mp.local_point;
                    let c_b = clip_point
                        + (radius_b - (clip_point - plane_point).dot(wm.normal)) * wm.normal;
                    let c_a = clip_point - radius_a * wm.normal;
                    wm.points[i] = 0.5 * (c_a + c_b);
                    wm.separations[i] = (c_a - c_b).dot(wm.normal);
                }

                // ensure normal points from A to B
                wm.normal = -wm.normal;
            }
        }

        wm
    }

    /// Iterate over the valid contact points and their separations.
    pub fn iter(&self) -> impl '_ + Iterator<Item = (Vec2, f64)> {
        self.points[..self.point_count]
            .iter()
            .copied()
            .zip(self.separations[..self.point_count].iter().copied())
    }
}

/// What happened to a contact point between two steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PointState {
    /// The point doesn't exist.
    #[default]
    Null,
    /// The point was added in the update.
    Add,
    /// The point persisted across the update.
    Persist,
    /// The point was removed in the update.
    Remove,
}

/// Compare the points of two manifolds by id.
/// Returns the states of the old manifold's points and the new manifold's points.
pub fn point_states(
    old: &Manifold,
    new: &Manifold,
) -> (
    [PointState; MAX_MANIFOLD_POINTS],
    [PointState; MAX_MANIFOLD_POINTS],
) {
    let mut state_old = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state_new = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, p) in old.points.iter().enumerate() {
        state_old[i] = if new.find(p.id).is_some() {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }
    for (i, p) in new.points.iter().enumerate() {
        state_new[i] = if old.find(p.id).is_some() {
            PointState::Persist
        } else {
            PointState::Add
        };
    }

    (state_old, state_new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(index_a: u8, index_b: u8) -> ManifoldPoint {
        ManifoldPoint {
            id: ContactId(ContactFeature {
                index_a,
                index_b,
                kind_a: FeatureKind::Face,
                kind_b: FeatureKind::Vertex,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn point_states_match_by_id() {
        let mut old = Manifold::default();
        old.points.push(point(0, 1));
        old.points.push(point(0, 2));
        let mut new = Manifold::default();
        new.points.push(point(0, 2));
        new.points.push(point(1, 3));

        let (s_old, s_new) = point_states(&old, &new);
        assert_eq!(s_old, [PointState::Remove, PointState::Persist]);
        assert_eq!(s_new, [PointState::Persist, PointState::Add]);
    }

    #[test]
    fn point_buf_caps_at_capacity() {
        let mut buf = PointBuf::default();
        for i in 0..5 {
            buf.push(point(i, i));
        }
        assert_eq!(buf.len(), MAX_MANIFOLD_POINTS);
        buf.truncate(1);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf[0].id, point(0, 0).id);
    }

    #[test]
    fn world_manifold_of_overlapping_circles() {
        let mut manifold = Manifold {
            kind: ManifoldKind::Circles,
            ..Default::default()
        };
        manifold.points.push(ManifoldPoint::default());

        let pose_a = Pose::identity();
        let pose_b = crate::math::pose_from(Vec2::new(1.5, 0.0), 0.0);
        let wm = WorldManifold::new(&manifold, &pose_a, 1.0, &pose_b, 1.0);
        assert_eq!(wm.point_count, 1);
        assert!((wm.normal - Vec2::unit_x()).mag() < 1e-12);
        assert!((wm.separations[0] + 0.5).abs() < 1e-12);
        assert!((wm.points[0] - Vec2::new(0.75, 0.0)).mag() < 1e-12);
    }
}
