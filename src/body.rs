use crate::{
    fixture::{Fixture, FixtureKey},
    joint::JointKey,
    contact::ContactKey,
    math::{self as m, Pose, Sweep, Vec2},
    shape::MassData,
};

use thunderdome as td;

/// Key type to look up a body stored in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyKey(pub(crate) td::Index);

impl BodyKey {
    /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
    /// Useful for creating your own mappings from bodies to other things.
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

/// How a body responds to forces and collisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyType {
    /// Zero velocity, infinite mass. Never moves unless moved manually.
    #[default]
    Static,
    /// Moves according to its velocity but isn't affected by forces or collisions.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Linear and angular velocity of a body.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    /// Linear velocity in metres per second.
    pub linear: Vec2,
    /// Angular velocity in radians per second.
    pub angular: f64,
}

impl Velocity {
    /// Get the linear velocity of a point offset from the center of mass.
    pub fn point_velocity(&self, offset: Vec2) -> Vec2 {
        let tangent = m::left_normal(offset) * self.angular;
        self.linear + tangent
    }
}

/// Mass or moment of inertia of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating inverse mass
/// is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl From<f64> for Mass {
    #[inline]
    fn from(mass: f64) -> Self {
        Mass::Finite {
            mass,
            inverse: 1.0 / mass,
        }
    }
}

impl Mass {
    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }

    /// Get the mass, reported as zero if infinite.
    #[inline]
    pub fn value(&self) -> f64 {
        match self {
            Mass::Finite { mass, .. } => *mass,
            Mass::Infinite => 0.0,
        }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct BodyFlags: u16 {
        const ISLAND = 0x0001;
        const AWAKE = 0x0002;
        const AUTO_SLEEP = 0x0004;
        const BULLET = 0x0008;
        const FIXED_ROTATION = 0x0010;
    }
}

/// Everything needed to create a body.
///
/// Deserializing fills in missing fields from the default,
/// which is a static body at the origin.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// World position of the body origin.
    #[cfg_attr(feature = "serde-types", serde(with = "m::serde_vec2"))]
    pub position: Vec2,
    /// World angle in radians.
    pub angle: f64,
    /// Linear velocity of the body origin.
    #[cfg_attr(feature = "serde-types", serde(with = "m::serde_vec2"))]
    pub linear_velocity: Vec2,
    pub angular_velocity: f64,
    /// Reduces linear velocity over time.
    /// Works like drag, not like friction; 0 means no damping.
    pub linear_damping: f64,
    pub angular_damping: f64,
    /// Set to false if this body should never fall asleep.
    pub allow_sleep: bool,
    /// Whether the body starts out awake.
    pub awake: bool,
    /// Prevent rotation, e.g. for characters.
    pub fixed_rotation: bool,
    /// Fast moving bodies that should be swept against other dynamic bodies too.
    pub bullet: bool,
    /// Scales the world gravity for this body.
    pub gravity_scale: f64,
    /// Application-specific data.
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::zero(),
            angle: 0.0,
            linear_velocity: Vec2::zero(),
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            gravity_scale: 1.0,
            user_data: 0,
        }
    }
}

impl BodyDef {
    pub fn new_static() -> Self {
        Self::default()
    }

    pub fn new_kinematic() -> Self {
        Self {
            body_type: BodyType::Kinematic,
            ..Self::default()
        }
    }

    pub fn new_dynamic() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            ..Self::default()
        }
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_velocity(mut self, linear: Vec2, angular: f64) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_sleeping(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn with_bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f64) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_user_data(mut self, data: u64) -> Self {
        self.user_data = data;
        self
    }
}

/// A rigid body. Bodies are created and changed through the [`World`][crate::World],
/// this type only exposes what can be read or tweaked without affecting
/// collision bookkeeping.
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) flags: BodyFlags,
    /// Pose of the body origin.
    pub(crate) pose: Pose,
    /// Angle in radians, kept separately so that it reads back exactly as set.
    pub(crate) sweep: Sweep,
    pub(crate) velocity: Velocity,
    pub(crate) force: Vec2,
    pub(crate) torque: f64,
    pub(crate) mass: Mass,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: Mass,
    pub(crate) mass_override: Option<MassData>,
    pub(crate) linear_damping: f64,
    pub(crate) angular_damping: f64,
    pub(crate) gravity_scale: f64,
    pub(crate) sleep_time: f64,
    /// Position in the island currently being built or solved.
    pub(crate) island_index: usize,
    pub(crate) fixtures: Vec<FixtureKey>,
    pub(crate) joints: Vec<JointKey>,
    pub(crate) contacts: Vec<ContactKey>,
    pub user_data: u64,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let mut flags = BodyFlags::empty();
        flags.set(BodyFlags::BULLET, def.bullet);
        flags.set(BodyFlags::FIXED_ROTATION, def.fixed_rotation);
        flags.set(BodyFlags::AUTO_SLEEP, def.allow_sleep);
        // static bodies are never awake
        flags.set(
            BodyFlags::AWAKE,
            def.awake && def.body_type != BodyType::Static,
        );

        let pose = m::pose_from(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::zero(),
            c0: def.position,
            c: def.position,
            a0: def.angle,
            a: def.angle,
        };

        let (mass, velocity) = match def.body_type {
            BodyType::Dynamic => (
                Mass::from(1.0),
                Velocity {
                    linear: def.linear_velocity,
                    angular: def.angular_velocity,
                },
            ),
            BodyType::Kinematic => (
                Mass::Infinite,
                Velocity {
                    linear: def.linear_velocity,
                    angular: def.angular_velocity,
                },
            ),
            BodyType::Static => (Mass::Infinite, Velocity::default()),
        };

        Self {
            body_type: def.body_type,
            flags,
            pose,
            sweep,
            velocity,
            force: Vec2::zero(),
            torque: 0.0,
            mass,
            inertia: Mass::Infinite,
            mass_override: None,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            island_index: 0,
            fixtures: Vec::new(),
            joints: Vec::new(),
            contacts: Vec::new(),
            user_data: def.user_data,
        }
    }

    //
    // read access
    //

    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// World position of the body origin.
    #[inline]
    pub fn position(&self) -> Vec2 {
        self.pose.translation
    }

    /// World angle in radians.
    #[inline]
    pub fn angle(&self) -> f64 {
        self.sweep.a
    }

    /// Position and angle, exactly as last set or computed by the solver.
    #[inline]
    pub fn transform(&self) -> (Vec2, f64) {
        (self.pose.translation, self.sweep.a)
    }

    #[inline]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// World position of the center of mass.
    #[inline]
    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    /// Center of mass relative to the body origin.
    #[inline]
    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    #[inline]
    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    /// Linear velocity of the center of mass.
    #[inline]
    pub fn linear_velocity(&self) -> Vec2 {
        self.velocity.linear
    }

    #[inline]
    pub fn angular_velocity(&self) -> f64 {
        self.velocity.angular
    }

    /// Total mass in kilograms, zero for static and kinematic bodies.
    #[inline]
    pub fn mass(&self) -> f64 {
        self.mass.value()
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> f64 {
        self.inertia.value() + self.mass.value() * self.sweep.local_center.mag_sq()
    }

    /// Current mass properties, relative to the body origin.
    pub fn mass_data(&self) -> MassData {
        MassData {
            mass: self.mass(),
            center: self.sweep.local_center,
            inertia: self.inertia(),
        }
    }

    #[inline]
    pub(crate) fn inv_mass(&self) -> f64 {
        self.mass.inv()
    }

    #[inline]
    pub(crate) fn inv_inertia(&self) -> f64 {
        self.inertia.inv()
    }

    #[inline]
    pub fn is_awake(&self) -> bool {
        self.flags.contains(BodyFlags::AWAKE)
    }

    #[inline]
    pub fn is_bullet(&self) -> bool {
        self.flags.contains(BodyFlags::BULLET)
    }

    #[inline]
    pub fn is_sleeping_allowed(&self) -> bool {
        self.flags.contains(BodyFlags::AUTO_SLEEP)
    }

    #[inline]
    pub fn is_fixed_rotation(&self) -> bool {
        self.flags.contains(BodyFlags::FIXED_ROTATION)
    }

    #[inline]
    pub fn fixtures(&self) -> &[FixtureKey] {
        &self.fixtures
    }

    #[inline]
    pub fn joints(&self) -> &[JointKey] {
        &self.joints
    }

    #[inline]
    pub fn linear_damping(&self) -> f64 {
        self.linear_damping
    }

    #[inline]
    pub fn angular_damping(&self) -> f64 {
        self.angular_damping
    }

    #[inline]
    pub fn gravity_scale(&self) -> f64 {
        self.gravity_scale
    }

    /// Transform a point from body-local space to world space.
    #[inline]
    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.pose * local
    }

    /// Transform a point from world space to body-local space.
    #[inline]
    pub fn local_point(&self, world: Vec2) -> Vec2 {
        m::inv_transform_point(&self.pose, world)
    }

    /// Rotate a vector from body-local space to world space.
    #[inline]
    pub fn world_vector(&self, local: Vec2) -> Vec2 {
        self.pose.rotation * local
    }

    /// Velocity of a point attached to the body, given in world space.
    pub fn velocity_at_world_point(&self, point: Vec2) -> Vec2 {
        self.velocity.point_velocity(point - self.sweep.c)
    }

    //
    // simple setters that don't touch collision state
    //

    pub fn set_linear_damping(&mut self, damping: f64) {
        self.linear_damping = damping;
    }

    pub fn set_angular_damping(&mut self, damping: f64) {
        self.angular_damping = damping;
    }

    pub fn set_gravity_scale(&mut self, scale: f64) {
        self.gravity_scale = scale;
    }

    /// Allow or forbid this body from falling asleep.
    /// Forbidding also wakes the body up.
    pub fn set_sleeping_allowed(&mut self, allow: bool) {
        self.flags.set(BodyFlags::AUTO_SLEEP, allow);
        if !allow {
            self.set_awake(true);
        }
    }

    //
    // internal state changes
    //

    /// Wake the body up or put it to sleep.
    /// Sleeping zeroes the velocity and any accumulated force.
    pub(crate) fn set_awake(&mut self, awake: bool) {
        if self.body_type == BodyType::Static {
            return;
        }
        if awake {
            if !self.is_awake() {
                self.flags.insert(BodyFlags::AWAKE);
                self.sleep_time = 0.0;
            }
        } else {
            self.flags.remove(BodyFlags::AWAKE);
            self.sleep_time = 0.0;
            self.velocity = Velocity::default();
            self.force = Vec2::zero();
            self.torque = 0.0;
        }
    }

    /// Check whether this body can ever generate contacts with another.
    /// At least one of the two must be dynamic.
    pub(crate) fn can_touch(&self, other: &Body) -> bool {
        self.body_type == BodyType::Dynamic || other.body_type == BodyType::Dynamic
    }

    /// Set the position and angle of the body origin, keeping the sweep consistent.
    pub(crate) fn set_transform_internal(&mut self, position: Vec2, angle: f64) {
        self.pose = m::pose_from(position, angle);
        self.sweep.c = self.pose * self.sweep.local_center;
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
    }

    /// Update the pose from the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        let rotation = m::Rotor2::from_angle(self.sweep.a);
        self.pose = Pose::new(self.sweep.c - rotation * self.sweep.local_center, rotation);
    }

    /// Pose at the beginning of the current step.
    pub(crate) fn start_pose(&self) -> Pose {
        self.sweep.pose_at(0.0)
    }

    /// Recompute mass, center of mass and inertia from the attached fixtures,
    /// or from the user-provided override.
    pub(crate) fn reset_mass_data(&mut self, fixtures: &td::Arena<Fixture>) {
        self.mass = Mass::Infinite;
        self.inertia = Mass::Infinite;
        self.sweep.local_center = Vec2::zero();

        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.pose.translation;
            self.sweep.c = self.pose.translation;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        // accumulate mass over all fixtures
        let total = match self.mass_override {
            Some(md) => md,
            None => {
                let mut total = MassData::default();
                let mut weighted_center = Vec2::zero();
                for fixture in self.fixtures.iter().filter_map(|f| fixtures.get(f.0)) {
                    if fixture.density == 0.0 || fixture.is_sensor {
                        continue;
                    }
                    let md = fixture.shape.compute_mass(fixture.density);
                    total.mass += md.mass;
                    weighted_center += md.mass * md.center;
                    total.inertia += md.inertia;
                }
                if total.mass > 0.0 {
                    total.center = weighted_center / total.mass;
                }
                total
            }
        };

        let local_center = if total.mass > 0.0 {
            self.mass = Mass::from(total.mass);
            total.center
        } else {
            // force all dynamic bodies to have positive mass
            self.mass = Mass::from(1.0);
            Vec2::zero()
        };

        let mass = self.mass.value();
        let central_inertia = total.inertia - mass * local_center.mag_sq();
        if total.inertia > 0.0 && central_inertia > 0.0 && !self.is_fixed_rotation() {
            self.inertia = Mass::from(central_inertia);
        }

        // move the center of mass, keeping the velocity of the new center consistent
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.pose * local_center;
        self.sweep.c0 = self.sweep.c;

        self.velocity.linear += m::cross_sv(self.velocity.angular, self.sweep.c - old_center);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn def_defaults_and_builders() {
        let def = BodyDef::new_dynamic()
            .with_position(Vec2::new(1.0, 2.0))
            .with_angle(0.5)
            .with_bullet(true);
        let body = Body::new(&def);
        assert_eq!(body.body_type(), BodyType::Dynamic);
        assert!(body.is_awake());
        assert!(body.is_bullet());
        assert_eq!(body.transform(), (Vec2::new(1.0, 2.0), 0.5));
        // a dynamic body without fixtures still has unit mass
        assert_eq!(body.mass(), 1.0);

        let ground = Body::new(&BodyDef::new_static());
        assert!(!ground.is_awake());
        assert_eq!(ground.inv_mass(), 0.0);
    }

    #[test]
    fn sleeping_zeroes_velocity() {
        let mut body = Body::new(&BodyDef::new_dynamic().with_velocity(Vec2::new(3.0, 0.0), 1.0));
        body.set_awake(false);
        assert!(!body.is_awake());
        assert_eq!(body.velocity(), Velocity::default());
        body.set_awake(true);
        assert!(body.is_awake());
    }

    #[test]
    fn mass_override_moves_center() {
        let mut body = Body::new(&BodyDef::new_dynamic().with_position(Vec2::new(2.0, 0.0)));
        body.mass_override = Some(MassData {
            mass: 2.0,
            center: Vec2::new(1.0, 0.0),
            inertia: 3.0,
        });
        body.reset_mass_data(&td::Arena::new());
        assert_eq!(body.mass(), 2.0);
        assert_eq!(body.world_center(), Vec2::new(3.0, 0.0));
        // inertia reported about the origin matches the override
        assert!((body.inertia() - 3.0).abs() < 1e-12);
        assert!((body.inv_inertia() - 1.0).abs() < 1e-12);
    }

    #[cfg(feature = "serde-types")]
    #[test]
    fn def_from_ron() {
        let def: BodyDef = ron::from_str(
            "(body_type: Dynamic, position: (1.0, 2.5), bullet: true, gravity_scale: 0.5)",
        )
        .unwrap();
        assert_eq!(def.body_type, BodyType::Dynamic);
        assert_eq!(def.position, Vec2::new(1.0, 2.5));
        assert!(def.bullet);
        assert_eq!(def.gravity_scale, 0.5);
        assert!(def.allow_sleep);
    }
}
