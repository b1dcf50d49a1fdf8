//! Collision detection: bounding volumes, the broad-phase tree,
//! narrow-phase manifold generation, distance and time of impact queries.

use crate::math as m;

pub mod broadphase;
pub use broadphase::{BroadPhase, ProxyId};

pub mod bvh;
pub use bvh::DynamicTree;

pub mod distance;
pub use distance::{distance, DistanceInput, DistanceOutput, DistanceProxy, SimplexCache};

mod manifold;
pub use manifold::{
    point_states, ContactFeature, ContactId, FeatureKind, Manifold, ManifoldKind, ManifoldPoint,
    PointBuf, PointState, WorldManifold,
};

pub mod narrowphase;
pub use narrowphase::collide;

pub mod query;
pub use query::{RayCastInput, RayCastOutput};

pub mod toi;
pub use toi::{time_of_impact, ToiInput, ToiOutput, ToiState};

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct AABB {
    pub min: m::Vec2,
    pub max: m::Vec2,
}

impl AABB {
    #[inline]
    pub fn new(min: m::Vec2, max: m::Vec2) -> Self {
        Self { min, max }
    }

    /// An AABB centered at a point with the given half extents.
    #[inline]
    pub fn from_center(center: m::Vec2, half_extents: m::Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// A degenerate AABB containing only one point.
    #[inline]
    pub fn from_point(point: m::Vec2) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Check that min is below max and all values are finite.
    pub fn is_valid(&self) -> bool {
        let d = self.max - self.min;
        d.x >= 0.0 && d.y >= 0.0 && m::is_finite_vec(self.min) && m::is_finite_vec(self.max)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Perimeter of the box, used as the cost metric when building the tree.
    #[inline]
    pub fn perimeter(&self) -> f64 {
        2.0 * (self.width() + self.height())
    }

    #[inline]
    pub fn center(&self) -> m::Vec2 {
        0.5 * (self.min + self.max)
    }

    #[inline]
    pub fn half_extents(&self) -> m::Vec2 {
        0.5 * (self.max - self.min)
    }

    /// The smallest AABB containing both this and another.
    #[inline]
    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min_by_component(other.min),
            max: self.max.max_by_component(other.max),
        }
    }

    /// The overlapping region of two AABBs, if they overlap.
    pub fn intersection(&self, other: &AABB) -> Option<AABB> {
        if self.overlaps(other) {
            Some(AABB {
                min: self.min.max_by_component(other.min),
                max: self.max.min_by_component(other.max),
            })
        } else {
            None
        }
    }

    /// Check whether two AABBs touch or overlap.
    #[inline]
    pub fn overlaps(&self, other: &AABB) -> bool {
        !(other.min.x > self.max.x
            || other.min.y > self.max.y
            || self.min.x > other.max.x
            || self.min.y > other.max.y)
    }

    /// Check whether another AABB is entirely inside this one.
    #[inline]
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    #[inline]
    pub fn contains_point(&self, point: m::Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Grow the AABB by the same amount in every direction.
    #[inline]
    pub fn padded(&self, padding: f64) -> AABB {
        let pad = m::Vec2::broadcast(padding);
        AABB {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    /// Extend the AABB in the direction of a displacement.
    pub fn extended_by(&self, displacement: m::Vec2) -> AABB {
        let mut ret = *self;
        if displacement.x < 0.0 {
            ret.min.x += displacement.x;
        } else {
            ret.max.x += displacement.x;
        }
        if displacement.y < 0.0 {
            ret.min.y += displacement.y;
        } else {
            ret.max.y += displacement.y;
        }
        ret
    }
}

/// A ray with a start point and a direction. The direction is not necessarily normalized;
/// distances along the ray are measured in multiples of its length.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub start: m::Vec2,
    pub dir: m::Vec2,
}

impl Ray {
    /// Create a ray going from one point to another,
    /// so that `t = 1` is at the end point.
    #[inline]
    pub fn between(p1: m::Vec2, p2: m::Vec2) -> Self {
        Self {
            start: p1,
            dir: p2 - p1,
        }
    }

    #[inline]
    pub fn point_at_t(&self, t: f64) -> m::Vec2 {
        self.start + t * self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(x0: f64, y0: f64, x1: f64, y1: f64) -> AABB {
        AABB::new(m::Vec2::new(x0, y0), m::Vec2::new(x1, y1))
    }

    #[test]
    fn union_and_intersection() {
        let a = aabb(0.0, 0.0, 2.0, 2.0);
        let b = aabb(1.0, -1.0, 3.0, 1.0);
        assert_eq!(a.union(&b), aabb(0.0, -1.0, 3.0, 2.0));
        assert_eq!(a.intersection(&b), Some(aabb(1.0, 0.0, 2.0, 1.0)));

        let far = aabb(5.0, 5.0, 6.0, 6.0);
        assert_eq!(a.intersection(&far), None);
        assert!(a.union(&far).contains(&far));
    }

    #[test]
    fn extension_by_displacement() {
        let a = aabb(0.0, 0.0, 1.0, 1.0);
        let e = a.extended_by(m::Vec2::new(-2.0, 3.0));
        assert_eq!(e, aabb(-2.0, 0.0, 1.0, 4.0));
        assert!(e.contains(&a));
        assert!(e.is_valid());
    }
}
