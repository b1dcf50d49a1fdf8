//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::PI;
pub use ultraviolet as uv;

/// A Pose has a rotation and a translation, no scaling.
///
/// Body transforms, shape transforms and sweep interpolations are all Poses.
pub type Pose = uv::DIsometry2;
pub type Vec2 = uv::DVec2;
pub type Rotor2 = uv::DRotor2;

/// An angle in either degrees or radians.
/// Default conversion from f64 is in degrees.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}
impl From<Angle> for Rotor2 {
    #[inline]
    fn from(ang: Angle) -> Rotor2 {
        Rotor2::from_angle(ang.rad())
    }
}
impl From<Rotor2> for Angle {
    #[inline]
    fn from(rotor: Rotor2) -> Self {
        Angle::Rad(-rotor.bv.xy.atan2(rotor.s) * 2.0)
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit<T>(T);

impl Unit<Vec2> {
    pub fn new_normalize(v: Vec2) -> Self {
        Unit(v.normalized())
    }

    /// Normalize a vector, returning `None` if it's too short to have a direction.
    pub fn try_new(v: Vec2, min_length: f64) -> Option<Self> {
        let len = v.mag();
        if len < min_length {
            None
        } else {
            Some(Unit(v / len))
        }
    }

    pub const fn new_unchecked(v: Vec2) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec2::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec2::unit_y())
    }

    #[inline]
    pub fn into_inner(self) -> Vec2 {
        self.0
    }
}

impl std::ops::Mul<Unit<Vec2>> for Rotor2 {
    type Output = Unit<Vec2>;

    fn mul(self, rhs: Unit<Vec2>) -> Self::Output {
        Unit(self * rhs.0)
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

/// Module to (de)serialize `Vec2`s as plain `[x, y]` arrays,
/// using the serde attribute `#[serde(with = "serde_vec2")]`.
#[cfg(feature = "serde-types")]
pub mod serde_vec2 {
    use super::Vec2;

    pub fn serialize<S>(v: &Vec2, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::Serialize;
        [v.x, v.y].serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec2, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::Deserialize;
        <[f64; 2]>::deserialize(deserializer).map(|[x, y]| Vec2::new(x, y))
    }
}

// Vec2 utils

#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}
#[inline]
pub fn right_normal(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}
#[inline]
pub fn unit_left_normal(u: Unit<Vec2>) -> Unit<Vec2> {
    Unit::new_unchecked(left_normal(*u))
}
#[inline]
pub fn unit_right_normal(u: Unit<Vec2>) -> Unit<Vec2> {
    Unit::new_unchecked(right_normal(*u))
}

/// The z component of the 3D cross product of two planar vectors.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.wedge(b).xy
}

/// Cross product of a scalar (z-axis vector) and a planar vector.
#[inline]
pub fn cross_sv(s: f64, v: Vec2) -> Vec2 {
    s * left_normal(v)
}

/// Cross product of a planar vector and a scalar (z-axis vector).
#[inline]
pub fn cross_vs(v: Vec2, s: f64) -> Vec2 {
    s * right_normal(v)
}

/// Rotate a vector by an angle given as its cosine and sine.
#[inline]
pub fn rotate(v: Vec2, cos: f64, sin: f64) -> Vec2 {
    Vec2::new(cos * v.x - sin * v.y, sin * v.x + cos * v.y)
}

/// Rotate a vector counterclockwise by an angle in radians.
#[inline]
pub fn rotate_angle(v: Vec2, angle: f64) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    rotate(v, cos, sin)
}

#[inline]
pub fn clamp(n: f64, lo: f64, hi: f64) -> f64 {
    n.max(lo).min(hi)
}

#[inline]
pub fn is_finite_vec(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}

/// Normalize a vector in place, returning its original length.
/// Vectors shorter than epsilon are left alone and report zero length.
#[inline]
pub fn normalize_len(v: &mut Vec2) -> f64 {
    let len = v.mag();
    if len < f64::EPSILON {
        return 0.0;
    }
    *v /= len;
    len
}

// pose utils

/// Build a pose from a translation and an angle in radians.
#[inline]
pub fn pose_from(translation: Vec2, angle: f64) -> Pose {
    Pose::new(translation, Rotor2::from_angle(angle))
}

/// Transform a point from world space to the pose's local space.
#[inline]
pub fn inv_transform_point(pose: &Pose, point: Vec2) -> Vec2 {
    pose.rotation.reversed() * (point - pose.translation)
}

/// Rotate a vector from world space to the pose's local space.
#[inline]
pub fn inv_rotate(rotation: Rotor2, v: Vec2) -> Vec2 {
    rotation.reversed() * v
}

//
// small matrices for the joint solvers
//

/// A 2x2 matrix stored as columns.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mat22 {
    pub ex: Vec2,
    pub ey: Vec2,
}

impl Mat22 {
    #[inline]
    pub fn new(ex: Vec2, ey: Vec2) -> Self {
        Self { ex, ey }
    }

    pub fn inverse(&self) -> Self {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Self {
            ex: Vec2::new(det * d, -det * c),
            ey: Vec2::new(-det * b, det * a),
        }
    }

    /// Solve `A * x = b` without computing the inverse.
    /// A singular matrix gives a zero result.
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }

    #[inline]
    pub fn mul_vec(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }
}

/// A 3x3 matrix stored as columns.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mat33 {
    pub ex: uv::DVec3,
    pub ey: uv::DVec3,
    pub ez: uv::DVec3,
}

impl Mat33 {
    /// Solve `A * x = b`. A singular matrix gives a zero result.
    pub fn solve33(&self, b: uv::DVec3) -> uv::DVec3 {
        let mut det = self.ex.dot(self.ey.cross(self.ez));
        if det != 0.0 {
            det = 1.0 / det;
        }
        uv::DVec3::new(
            det * b.dot(self.ey.cross(self.ez)),
            det * self.ex.dot(b.cross(self.ez)),
            det * self.ex.dot(self.ey.cross(b)),
        )
    }

    /// Solve the upper 2x2 block of `A * x = b`.
    pub fn solve22(&self, b: Vec2) -> Vec2 {
        Mat22::new(
            Vec2::new(self.ex.x, self.ex.y),
            Vec2::new(self.ey.x, self.ey.y),
        )
        .solve(b)
    }

    /// Inverse of the upper 2x2 block, zeroes elsewhere.
    pub fn inverse22(&self) -> Mat33 {
        let inv = Mat22::new(
            Vec2::new(self.ex.x, self.ex.y),
            Vec2::new(self.ey.x, self.ey.y),
        )
        .inverse();
        Mat33 {
            ex: uv::DVec3::new(inv.ex.x, inv.ex.y, 0.0),
            ey: uv::DVec3::new(inv.ey.x, inv.ey.y, 0.0),
            ez: uv::DVec3::zero(),
        }
    }

    /// Symmetric inverse of the full matrix, zero if singular.
    pub fn sym_inverse33(&self) -> Mat33 {
        let mut det = self.ex.dot(self.ey.cross(self.ez));
        if det != 0.0 {
            det = 1.0 / det;
        }
        let (a11, a12, a13) = (self.ex.x, self.ey.x, self.ez.x);
        let (a22, a23) = (self.ey.y, self.ez.y);
        let a33 = self.ez.z;

        let ex_x = det * (a22 * a33 - a23 * a23);
        let ex_y = det * (a13 * a23 - a12 * a33);
        let ex_z = det * (a12 * a23 - a13 * a22);
        let ey_y = det * (a11 * a33 - a13 * a13);
        let ey_z = det * (a13 * a12 - a11 * a23);
        let ez_z = det * (a11 * a22 - a12 * a12);
        Mat33 {
            ex: uv::DVec3::new(ex_x, ex_y, ex_z),
            ey: uv::DVec3::new(ex_y, ey_y, ey_z),
            ez: uv::DVec3::new(ex_z, ey_z, ez_z),
        }
    }

    #[inline]
    pub fn mul_vec3(&self, v: uv::DVec3) -> uv::DVec3 {
        v.x * self.ex + v.y * self.ey + v.z * self.ez
    }

    #[inline]
    pub fn mul_vec2(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }
}

//
// sweep
//

/// Describes the motion of a body over one time step for continuous collision.
///
/// Shapes are defined relative to the body origin, which may not coincide with
/// the center of mass, but the sweep interpolates the center of mass
/// to get correct rotational motion.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sweep {
    /// Center of mass in body-local space.
    pub local_center: Vec2,
    /// World center position at the start of the step.
    pub c0: Vec2,
    /// World center position at the end of the step.
    pub c: Vec2,
    pub a0: f64,
    pub a: f64,
}

impl Sweep {
    /// Get the interpolated pose of the body origin at `beta` in `[0, 1]`.
    pub fn pose_at(&self, beta: f64) -> Pose {
        let c = (1.0 - beta) * self.c0 + beta * self.c;
        let a = (1.0 - beta) * self.a0 + beta * self.a;
        let rotation = Rotor2::from_angle(a);
        Pose::new(c - rotation * self.local_center, rotation)
    }

    /// Keep the angles in a bounded range, preserving the angle difference.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_rotor_conversion() {
        for deg in [-170.0, -45.0, 0.0, 30.0, 90.0, 179.0] {
            let rotor: Rotor2 = Angle::Deg(deg).into();
            let back = Angle::from(rotor).deg();
            assert!((back - deg).abs() < 1e-9, "{} became {}", deg, back);
        }
    }

    #[test]
    fn rotate_matches_rotor() {
        let v = Vec2::new(1.5, -0.25);
        for angle in [0.1, 1.0, 2.5, -2.0] {
            let by_rotor = Rotor2::from_angle(angle) * v;
            let by_fn = rotate_angle(v, angle);
            assert!((by_rotor - by_fn).mag() < 1e-12);
        }
        // quarter turn counterclockwise
        let q = rotate_angle(Vec2::unit_x(), PI / 2.0);
        assert!((q - Vec2::unit_y()).mag() < 1e-12);
    }

    #[test]
    fn cross_helpers_agree() {
        let v = Vec2::new(2.0, 3.0);
        let w = 1.5;
        // (w x v) . v == 0 and cross(v, w x v) == w |v|^2
        let wv = cross_sv(w, v);
        assert!(wv.dot(v).abs() < 1e-12);
        assert!((cross(v, wv) - w * v.mag_sq()).abs() < 1e-12);
        assert_eq!(cross_vs(v, w), -cross_sv(w, v));
    }

    #[test]
    fn mat22_solve_inverse() {
        let m = Mat22::new(Vec2::new(4.0, 2.0), Vec2::new(1.0, 3.0));
        let b = Vec2::new(1.0, 2.0);
        let x = m.solve(b);
        assert!((m.mul_vec(x) - b).mag() < 1e-12);
        assert!((m.inverse().mul_vec(b) - x).mag() < 1e-12);
    }

    #[test]
    fn sweep_interpolates_center_of_mass() {
        let sweep = Sweep {
            local_center: Vec2::new(1.0, 0.0),
            c0: Vec2::new(0.0, 0.0),
            c: Vec2::new(2.0, 0.0),
            a0: 0.0,
            a: PI,
        };
        let half = sweep.pose_at(0.5);
        // center of mass is at (1, 0) rotated by 90 degrees from the origin
        let com = half * sweep.local_center;
        assert!((com - Vec2::new(1.0, 0.0)).mag() < 1e-12);
    }

    #[test]
    fn sweep_normalize_keeps_rotation() {
        let mut sweep = Sweep {
            local_center: Vec2::zero(),
            c0: Vec2::zero(),
            c: Vec2::zero(),
            a0: 7.0,
            a: 7.5,
        };
        sweep.normalize();
        assert!(sweep.a0 >= 0.0 && sweep.a0 < 2.0 * PI);
        assert!((sweep.a - sweep.a0 - 0.5).abs() < 1e-12);
        assert!((sweep.a0 - (7.0 - 2.0 * PI)).abs() < 1e-12);
    }
}
