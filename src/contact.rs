//! Persistent contacts between pairs of fixture children.

use crate::{
    body::BodyKey,
    collision::{
        collide, distance, DistanceInput, DistanceProxy, Manifold, SimplexCache, WorldManifold,
    },
    command::CommandBuffer,
    fixture::{Fixture, FixtureKey},
    listener::ContactListener,
    math::Pose,
    settings::MAX_MANIFOLD_POINTS,
};

use thunderdome as td;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContactKey(pub(crate) td::Index);

impl ContactKey {
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct ContactFlags: u8 {
        /// Shapes are overlapping or within the skin distance.
        const TOUCHING = 0x01;
        /// Disabled by a pre-solve callback for the current step.
        const ENABLED = 0x02;
        /// Filter data changed and needs to be rechecked.
        const FILTER = 0x04;
        /// One of the fixtures is a sensor.
        const SENSOR = 0x08;
        const ISLAND = 0x10;
    }
}

/// Normal and tangent impulses applied at each manifold point in the last step,
/// reported to [`ContactListener::post_solve`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContactImpulse {
    pub normal_impulses: [f64; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f64; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

/// Mix the friction of two fixtures. Anything with zero friction makes the contact slide.
#[inline]
pub fn mix_friction(a: f64, b: f64) -> f64 {
    (a * b).sqrt()
}

/// Mix the restitution of two fixtures. Anything bouncy makes the contact bounce.
#[inline]
pub fn mix_restitution(a: f64, b: f64) -> f64 {
    a.max(b)
}

/// A potential collision between two fixture children whose fattened AABBs overlap.
///
/// The contact exists as long as the AABBs overlap, but only generates
/// collision response when it's touching.
#[derive(Clone, Debug)]
pub struct Contact {
    pub(crate) fixture_a: FixtureKey,
    pub(crate) child_a: usize,
    pub(crate) fixture_b: FixtureKey,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyKey,
    pub(crate) body_b: BodyKey,
    pub(crate) manifold: Manifold,
    pub(crate) world_manifold: WorldManifold,
    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    pub(crate) restitution_threshold: f64,
    pub(crate) flags: ContactFlags,
}

/// How the touching state of a contact changed in an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TouchChange {
    None,
    Began,
    Ended,
}

impl Contact {
    pub(crate) fn new(
        fixture_a: FixtureKey,
        fix_a: &Fixture,
        child_a: usize,
        fixture_b: FixtureKey,
        fix_b: &Fixture,
        child_b: usize,
    ) -> Self {
        let mut flags = ContactFlags::ENABLED;
        flags.set(ContactFlags::SENSOR, fix_a.is_sensor || fix_b.is_sensor);
        Self {
            fixture_a,
            child_a,
            fixture_b,
            child_b,
            body_a: fix_a.body,
            body_b: fix_b.body,
            manifold: Manifold::default(),
            world_manifold: WorldManifold::default(),
            friction: mix_friction(fix_a.friction, fix_b.friction),
            restitution: mix_restitution(fix_a.restitution, fix_b.restitution),
            restitution_threshold: fix_a.restitution_threshold.min(fix_b.restitution_threshold),
            flags,
        }
    }

    #[inline]
    pub fn fixture_a(&self) -> FixtureKey {
        self.fixture_a
    }

    #[inline]
    pub fn fixture_b(&self) -> FixtureKey {
        self.fixture_b
    }

    #[inline]
    pub fn child_a(&self) -> usize {
        self.child_a
    }

    #[inline]
    pub fn child_b(&self) -> usize {
        self.child_b
    }

    #[inline]
    pub fn body_a(&self) -> BodyKey {
        self.body_a
    }

    #[inline]
    pub fn body_b(&self) -> BodyKey {
        self.body_b
    }

    /// The contact manifold in local coordinates of the shapes.
    #[inline]
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// The manifold in world coordinates, evaluated at the last update.
    #[inline]
    pub fn world_manifold(&self) -> &WorldManifold {
        &self.world_manifold
    }

    #[inline]
    pub fn is_touching(&self) -> bool {
        self.flags.contains(ContactFlags::TOUCHING)
    }

    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.flags.contains(ContactFlags::SENSOR)
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ContactFlags::ENABLED)
    }

    /// Disable the contact for the current step. Call this from
    /// [`ContactListener::pre_solve`]; the flag is reset on every update.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.flags.set(ContactFlags::ENABLED, enabled);
    }

    #[inline]
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Override the mixed friction. Persists until the contact is destroyed.
    pub fn set_friction(&mut self, friction: f64) {
        self.friction = friction;
    }

    #[inline]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    /// Override the mixed restitution. Persists until the contact is destroyed.
    pub fn set_restitution(&mut self, restitution: f64) {
        self.restitution = restitution;
    }

    pub(crate) fn flag_for_filtering(&mut self) {
        self.flags.insert(ContactFlags::FILTER);
    }

    /// Recompute the manifold and fire begin/end/pre-solve events.
    ///
    /// Impulses of persisting points are carried over by matching contact ids.
    pub(crate) fn update(
        &mut self,
        fix_a: &Fixture,
        pose_a: &Pose,
        fix_b: &Fixture,
        pose_b: &Pose,
        listener: &mut dyn ContactListener,
        commands: &mut CommandBuffer,
    ) -> TouchChange {
        let old_manifold = self.manifold.clone();

        // re-enable every step so that disabling in pre-solve is temporary
        self.flags.insert(ContactFlags::ENABLED);

        let was_touching = self.is_touching();
        let touching = if self.is_sensor() {
            self.manifold = Manifold::default();
            self.world_manifold = WorldManifold::default();
            sensor_overlap(fix_a, self.child_a, pose_a, fix_b, self.child_b, pose_b)
        } else {
            let mut manifold = collide(
                &fix_a.shape,
                self.child_a,
                pose_a,
                &fix_b.shape,
                self.child_b,
                pose_b,
            );
            for point in manifold.points.iter_mut() {
                point.normal_impulse = 0.0;
                point.tangent_impulse = 0.0;
                if let Some(old) = old_manifold.find(point.id) {
                    point.normal_impulse = old.normal_impulse;
                    point.tangent_impulse = old.tangent_impulse;
                }
            }
            self.world_manifold = WorldManifold::new(
                &manifold,
                pose_a,
                fix_a.shape.radius(),
                pose_b,
                fix_b.shape.radius(),
            );
            self.manifold = manifold;
            !self.manifold.is_empty()
        };

        self.flags.set(ContactFlags::TOUCHING, touching);

        let change = match (was_touching, touching) {
            (false, true) => {
                listener.begin_contact(self, commands);
                TouchChange::Began
            }
            (true, false) => {
                listener.end_contact(self, commands);
                TouchChange::Ended
            }
            _ => TouchChange::None,
        };

        if touching && !self.is_sensor() {
            listener.pre_solve(self, &old_manifold, commands);
        }

        change
    }
}

fn sensor_overlap(
    fix_a: &Fixture,
    child_a: usize,
    pose_a: &Pose,
    fix_b: &Fixture,
    child_b: usize,
    pose_b: &Pose,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::new(&fix_a.shape, child_a),
        proxy_b: DistanceProxy::new(&fix_b.shape, child_b),
        pose_a: *pose_a,
        pose_b: *pose_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    distance(&mut cache, &input).distance < 10.0 * f64::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixture::FixtureDef,
        math::{self as m, Vec2},
        shape::Circle,
    };

    #[derive(Default)]
    struct Counter {
        begins: usize,
        ends: usize,
        pre_solves: usize,
    }

    impl ContactListener for Counter {
        fn begin_contact(&mut self, _contact: &Contact, _commands: &mut CommandBuffer) {
            self.begins += 1;
        }
        fn end_contact(&mut self, _contact: &Contact, _commands: &mut CommandBuffer) {
            self.ends += 1;
        }
        fn pre_solve(
            &mut self,
            contact: &mut Contact,
            _old_manifold: &Manifold,
            _commands: &mut CommandBuffer,
        ) {
            self.pre_solves += 1;
            contact.set_enabled(false);
        }
    }

    fn keys() -> (BodyKey, FixtureKey, FixtureKey) {
        let mut bodies = td::Arena::new();
        let mut fixtures = td::Arena::new();
        (
            BodyKey(bodies.insert(())),
            FixtureKey(fixtures.insert(())),
            FixtureKey(fixtures.insert(())),
        )
    }

    #[test]
    fn touching_transitions_fire_events() {
        let (body, key_a, key_b) = keys();
        let fix_a = Fixture::new(body, &FixtureDef::new(Circle::new(1.0)).with_friction(0.4));
        let fix_b = Fixture::new(body, &FixtureDef::new(Circle::new(1.0)).with_friction(0.9));
        let mut contact = Contact::new(key_a, &fix_a, 0, key_b, &fix_b, 0);
        assert!((contact.friction() - 0.6).abs() < 1e-12);

        let mut listener = Counter::default();
        let mut commands = CommandBuffer::default();
        let pose_a = m::pose_from(Vec2::zero(), 0.0);
        let near = m::pose_from(Vec2::new(1.5, 0.0), 0.0);
        let far = m::pose_from(Vec2::new(3.5, 0.0), 0.0);

        let change = contact.update(&fix_a, &pose_a, &fix_b, &near, &mut listener, &mut commands);
        assert_eq!(change, TouchChange::Began);
        assert!(contact.is_touching());
        // disabled by the listener for this step only
        assert!(!contact.is_enabled());

        let change = contact.update(&fix_a, &pose_a, &fix_b, &near, &mut listener, &mut commands);
        assert_eq!(change, TouchChange::None);

        let change = contact.update(&fix_a, &pose_a, &fix_b, &far, &mut listener, &mut commands);
        assert_eq!(change, TouchChange::Ended);
        assert!(contact.is_enabled());

        assert_eq!(listener.begins, 1);
        assert_eq!(listener.ends, 1);
        assert_eq!(listener.pre_solves, 2);
    }

    #[test]
    fn impulses_persist_by_id() {
        let (body, key_a, key_b) = keys();
        let fix_a = Fixture::new(body, &FixtureDef::new(Circle::new(1.0)));
        let fix_b = Fixture::new(body, &FixtureDef::new(Circle::new(1.0)));
        let mut contact = Contact::new(key_a, &fix_a, 0, key_b, &fix_b, 0);
        let pose_a = m::pose_from(Vec2::zero(), 0.0);
        let pose_b = m::pose_from(Vec2::new(1.9, 0.0), 0.0);

        contact.update(&fix_a, &pose_a, &fix_b, &pose_b, &mut (), &mut CommandBuffer::default());
        contact.manifold.points[0].normal_impulse = 2.5;
        let pose_b = m::pose_from(Vec2::new(1.8, 0.1), 0.0);
        contact.update(&fix_a, &pose_a, &fix_b, &pose_b, &mut (), &mut CommandBuffer::default());
        assert_eq!(contact.manifold.points[0].normal_impulse, 2.5);
    }

    #[test]
    fn sensors_have_no_manifold() {
        let (body, key_a, key_b) = keys();
        let fix_a = Fixture::new(body, &FixtureDef::new(Circle::new(1.0)).with_sensor(true));
        let fix_b = Fixture::new(body, &FixtureDef::new(Circle::new(1.0)));
        let mut contact = Contact::new(key_a, &fix_a, 0, key_b, &fix_b, 0);
        let pose_a = m::pose_from(Vec2::zero(), 0.0);
        let pose_b = m::pose_from(Vec2::new(1.0, 0.0), 0.0);
        let change =
            contact.update(&fix_a, &pose_a, &fix_b, &pose_b, &mut (), &mut CommandBuffer::default());
        assert_eq!(change, TouchChange::Began);
        assert!(contact.is_sensor());
        assert!(contact.manifold().is_empty());
    }
}
