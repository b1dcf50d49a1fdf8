//! The physics world owns every body, fixture, joint and contact
//! and drives the simulation step.

use crate::{
    body::{Body, BodyDef, BodyFlags, BodyKey, BodyType},
    collision::{
        bvh, narrowphase::can_collide, time_of_impact, BroadPhase, DistanceProxy, Ray,
        RayCastInput, ToiInput, ToiState, AABB,
    },
    command::{Command, CommandBuffer},
    contact::Contact,
    contact_manager::ContactManager,
    debug_draw::{self as dd, DebugDraw, DrawFlags},
    error::{HandleKind, PhysicsError, Result},
    fixture::{Filter, Fixture, FixtureDef, FixtureKey, FixtureProxy, ProxyRef},
    joint::{
        DistanceJoint, Joint, JointDef, JointKey, JointKind, MouseJoint, PrismaticJoint,
        RevoluteJoint, WeldJoint,
    },
    listener::{ContactFilter, ContactListener, DestructionListener, Listeners},
    math::{self as m, Pose, Vec2},
    settings::{WorldSettings, CCD_EXTENT_FRACTION},
    shape::MassData,
    solver::{
        island::{build_islands, solve_islands},
        TimeStep,
    },
};

use thunderdome as td;

#[cfg(test)]
mod tests;

/// A hit reported by [`World::ray_cast`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub fixture: FixtureKey,
    /// Index of the chain edge that was hit, zero for other shapes.
    pub child: usize,
    pub point: Vec2,
    /// Surface normal at the hit point, facing against the ray.
    pub normal: Vec2,
    /// Fraction along the ray from `p1` to `p2`.
    pub fraction: f64,
}

/// Iterator over ray hits in order of increasing distance.
///
/// Hits are computed lazily: stopping iteration early skips the rest of the tree.
pub struct RayCastIter<'w> {
    nodes: bvh::RayIter<'w, ProxyRef>,
    fixtures: &'w td::Arena<Fixture>,
    bodies: &'w td::Arena<Body>,
    input: RayCastInput,
    // hits found but not yet known to be the closest remaining
    pending: Vec<RayHit>,
}

impl<'w> RayCastIter<'w> {
    fn take_closest_pending(&mut self, bound: f64) -> Option<RayHit> {
        let (idx, hit) = self
            .pending
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.fraction.total_cmp(&b.fraction))?;
        if hit.fraction > bound {
            return None;
        }
        Some(self.pending.remove(idx))
    }

    fn cast_against(&self, proxy: ProxyRef) -> Option<RayHit> {
        let fixture = self.fixtures.get(proxy.fixture.0)?;
        let body = self.bodies.get(fixture.body.0)?;
        let out = fixture.shape.ray_cast(&self.input, &body.pose, proxy.child)?;
        Some(RayHit {
            fixture: proxy.fixture,
            child: proxy.child,
            point: self.input.p1 + out.fraction * (self.input.p2 - self.input.p1),
            normal: out.normal.into_inner(),
            fraction: out.fraction,
        })
    }
}

impl<'w> Iterator for RayCastIter<'w> {
    type Item = RayHit;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // nothing left in the tree can be closer than the next node's entry point
            let bound = self.nodes.peek_t().unwrap_or(f64::INFINITY);
            if let Some(hit) = self.take_closest_pending(bound) {
                return Some(hit);
            }
            match self.nodes.next() {
                Some((_, proxy, _)) => {
                    if let Some(hit) = self.cast_against(proxy) {
                        self.pending.push(hit);
                    }
                }
                None => return self.take_closest_pending(f64::INFINITY),
            }
        }
    }
}

/// The physics world.
///
/// Every change to the world goes through its methods, which keeps the broad-phase
/// and the contact graph consistent. Listener callbacks can't access the world
/// while it's stepping and instead queue changes in a [`CommandBuffer`].
#[derive(Debug)]
pub struct World {
    bodies: td::Arena<Body>,
    fixtures: td::Arena<Fixture>,
    joints: td::Arena<Joint>,
    contact_manager: ContactManager,
    settings: WorldSettings,
    listeners: Listeners,
    commands: CommandBuffer,
    draw_flags: DrawFlags,
    /// Inverse of the previous timestep, for scaling warm starting impulses.
    inv_dt0: f64,
    /// Fixtures were added or moved manually, so look for new contacts before stepping.
    new_contacts: bool,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldSettings::default())
    }
}

impl World {
    pub fn new(settings: WorldSettings) -> Self {
        Self {
            bodies: td::Arena::new(),
            fixtures: td::Arena::new(),
            joints: td::Arena::new(),
            contact_manager: ContactManager::new(),
            settings,
            listeners: Listeners::default(),
            commands: CommandBuffer::default(),
            draw_flags: DrawFlags::default(),
            inv_dt0: 0.0,
            new_contacts: false,
        }
    }

    //
    // settings and listeners
    //

    #[inline]
    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut WorldSettings {
        &mut self.settings
    }

    #[inline]
    pub fn gravity(&self) -> Vec2 {
        self.settings.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.settings.gravity = gravity;
    }

    pub fn set_contact_filter(&mut self, filter: impl ContactFilter + Send + 'static) {
        self.listeners.filter = Box::new(filter);
    }

    pub fn set_contact_listener(&mut self, listener: impl ContactListener + Send + 'static) {
        self.listeners.contact = Box::new(listener);
    }

    pub fn set_destruction_listener(&mut self, listener: impl DestructionListener + Send + 'static) {
        self.listeners.destruction = Box::new(listener);
    }

    //
    // bodies
    //

    /// Create a body. Fails if the initial position, angle or velocity isn't finite.
    pub fn create_body(&mut self, def: &BodyDef) -> Result<BodyKey> {
        let finite = m::is_finite_vec(def.position)
            && def.angle.is_finite()
            && m::is_finite_vec(def.linear_velocity)
            && def.angular_velocity.is_finite();
        if !finite {
            log::warn!("rejected body with non-finite initial state: {:?}", def);
            return Err(PhysicsError::InvalidTransform);
        }
        Ok(BodyKey(self.bodies.insert(Body::new(def))))
    }

    /// Destroy a body along with its joints, contacts and fixtures.
    ///
    /// The destruction listener is told about every joint and fixture removed this way.
    pub fn destroy_body(&mut self, key: BodyKey) -> Result<()> {
        let body = self.body_ref(key)?;
        let joints = body.joints.clone();
        let contacts = body.contacts.clone();
        let fixtures = body.fixtures.clone();

        for joint in joints {
            self.listeners.destruction.say_goodbye_joint(joint);
            self.remove_joint(joint);
        }
        for contact in contacts {
            self.contact_manager.destroy(
                contact,
                &mut self.bodies,
                &mut *self.listeners.contact,
                &mut self.commands,
            );
        }
        for fixture_key in fixtures {
            self.listeners.destruction.say_goodbye_fixture(fixture_key);
            if let Some(fixture) = self.fixtures.remove(fixture_key.0) {
                for proxy in &fixture.proxies {
                    self.contact_manager.broad_phase.destroy_proxy(proxy.proxy_id);
                }
            }
        }
        self.bodies.remove(key.0);
        log::trace!("destroyed body {:?}", key);
        Ok(())
    }

    #[inline]
    pub fn body(&self, key: BodyKey) -> Option<&Body> {
        self.bodies.get(key.0)
    }

    /// Mutable access for settings that don't affect collision, like damping.
    #[inline]
    pub fn body_mut(&mut self, key: BodyKey) -> Option<&mut Body> {
        self.bodies.get_mut(key.0)
    }

    pub fn bodies(&self) -> impl '_ + Iterator<Item = (BodyKey, &Body)> {
        self.bodies.iter().map(|(idx, b)| (BodyKey(idx), b))
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn body_ref(&self, key: BodyKey) -> Result<&Body> {
        self.bodies
            .get(key.0)
            .ok_or(PhysicsError::DanglingHandle(HandleKind::Body))
    }

    fn body_entry(&mut self, key: BodyKey) -> Result<&mut Body> {
        body_in(&mut self.bodies, key)
    }

    /// Teleport a body. Contacts are updated on the next step.
    pub fn set_transform(&mut self, key: BodyKey, position: Vec2, angle: f64) -> Result<()> {
        if !m::is_finite_vec(position) || !angle.is_finite() {
            log::warn!("rejected non-finite transform {:?}, {}", position, angle);
            return Err(PhysicsError::InvalidTransform);
        }
        let body = self.body_entry(key)?;
        body.set_transform_internal(position, angle);
        body.set_awake(true);

        let pose = body.pose;
        let body = &self.bodies[key.0];
        synchronize_fixtures(
            body,
            &mut self.fixtures,
            &mut self.contact_manager.broad_phase,
            &pose,
            &pose,
        );
        self.new_contacts = true;
        Ok(())
    }

    /// Move a body without changing its angle.
    pub fn set_position(&mut self, key: BodyKey, position: Vec2) -> Result<()> {
        let angle = self.body_ref(key)?.angle();
        self.set_transform(key, position, angle)
    }

    pub fn set_pose(&mut self, key: BodyKey, pose: &Pose) -> Result<()> {
        let angle = m::Angle::from(pose.rotation).rad();
        self.set_transform(key, pose.translation, angle)
    }

    /// Apply a force at a world point. Wakes the body. Only affects dynamic bodies.
    pub fn apply_force(&mut self, key: BodyKey, force: Vec2, point: Vec2) -> Result<()> {
        let body = self.body_entry(key)?;
        if body.body_type != BodyType::Dynamic {
            return Ok(());
        }
        body.set_awake(true);
        body.force += force;
        body.torque += m::cross(point - body.sweep.c, force);
        Ok(())
    }

    pub fn apply_force_to_center(&mut self, key: BodyKey, force: Vec2) -> Result<()> {
        let body = self.body_entry(key)?;
        if body.body_type != BodyType::Dynamic {
            return Ok(());
        }
        body.set_awake(true);
        body.force += force;
        Ok(())
    }

    pub fn apply_torque(&mut self, key: BodyKey, torque: f64) -> Result<()> {
        let body = self.body_entry(key)?;
        if body.body_type != BodyType::Dynamic {
            return Ok(());
        }
        body.set_awake(true);
        body.torque += torque;
        Ok(())
    }

    /// Apply an impulse at a world point, changing the velocity immediately.
    pub fn apply_linear_impulse(&mut self, key: BodyKey, impulse: Vec2, point: Vec2) -> Result<()> {
        let body = self.body_entry(key)?;
        if body.body_type != BodyType::Dynamic {
            return Ok(());
        }
        body.set_awake(true);
        body.velocity.linear += body.inv_mass() * impulse;
        body.velocity.angular += body.inv_inertia() * m::cross(point - body.sweep.c, impulse);
        Ok(())
    }

    pub fn apply_angular_impulse(&mut self, key: BodyKey, impulse: f64) -> Result<()> {
        let body = self.body_entry(key)?;
        if body.body_type != BodyType::Dynamic {
            return Ok(());
        }
        body.set_awake(true);
        body.velocity.angular += body.inv_inertia() * impulse;
        Ok(())
    }

    /// Set the linear velocity of the center of mass. Ignored for static bodies.
    pub fn set_linear_velocity(&mut self, key: BodyKey, velocity: Vec2) -> Result<()> {
        let body = self.body_entry(key)?;
        if body.body_type == BodyType::Static {
            return Ok(());
        }
        if velocity.mag_sq() > 0.0 {
            body.set_awake(true);
        }
        body.velocity.linear = velocity;
        Ok(())
    }

    pub fn set_angular_velocity(&mut self, key: BodyKey, velocity: f64) -> Result<()> {
        let body = self.body_entry(key)?;
        if body.body_type == BodyType::Static {
            return Ok(());
        }
        if velocity != 0.0 {
            body.set_awake(true);
        }
        body.velocity.angular = velocity;
        Ok(())
    }

    /// Wake a body up or put it to sleep. Sleeping zeroes its velocity.
    pub fn set_awake(&mut self, key: BodyKey, awake: bool) -> Result<()> {
        self.body_entry(key)?.set_awake(awake);
        Ok(())
    }

    pub fn set_bullet(&mut self, key: BodyKey, bullet: bool) -> Result<()> {
        self.body_entry(key)?.flags.set(BodyFlags::BULLET, bullet);
        Ok(())
    }

    pub fn set_fixed_rotation(&mut self, key: BodyKey, fixed: bool) -> Result<()> {
        let body = body_in(&mut self.bodies, key)?;
        if body.is_fixed_rotation() == fixed {
            return Ok(());
        }
        body.flags.set(BodyFlags::FIXED_ROTATION, fixed);
        body.velocity.angular = 0.0;
        body.reset_mass_data(&self.fixtures);
        Ok(())
    }

    /// Change the type of a body. Its contacts are destroyed and recreated on the next step.
    pub fn set_body_type(&mut self, key: BodyKey, body_type: BodyType) -> Result<()> {
        let body = body_in(&mut self.bodies, key)?;
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        body.reset_mass_data(&self.fixtures);

        if body_type == BodyType::Static {
            body.velocity = Default::default();
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            body.flags.remove(BodyFlags::AWAKE);
            let pose = body.pose;
            let body = &self.bodies[key.0];
            synchronize_fixtures(
                body,
                &mut self.fixtures,
                &mut self.contact_manager.broad_phase,
                &pose,
                &pose,
            );
        }

        let body = &mut self.bodies[key.0];
        body.set_awake(true);
        body.force = Vec2::zero();
        body.torque = 0.0;

        let contacts = body.contacts.clone();
        for contact in contacts {
            self.contact_manager.destroy(
                contact,
                &mut self.bodies,
                &mut *self.listeners.contact,
                &mut self.commands,
            );
        }
        self.touch_proxies(key);
        Ok(())
    }

    /// Override the mass, center of mass and inertia computed from fixtures.
    /// Only has an effect on dynamic bodies.
    pub fn set_mass_data(&mut self, key: BodyKey, mass_data: MassData) -> Result<()> {
        let valid = mass_data.mass.is_finite()
            && mass_data.mass >= 0.0
            && mass_data.inertia.is_finite()
            && m::is_finite_vec(mass_data.center);
        if !valid {
            log::warn!("rejected mass data {:?}", mass_data);
            return Err(PhysicsError::InvalidMass {
                density: mass_data.mass,
            });
        }
        let body = body_in(&mut self.bodies, key)?;
        body.mass_override = Some(mass_data);
        body.reset_mass_data(&self.fixtures);
        Ok(())
    }

    /// Drop any mass override and recompute mass from the fixtures.
    pub fn reset_mass_data(&mut self, key: BodyKey) -> Result<()> {
        let body = body_in(&mut self.bodies, key)?;
        body.mass_override = None;
        body.reset_mass_data(&self.fixtures);
        Ok(())
    }

    //
    // fixtures
    //

    /// Attach a shape to a body. Non-zero density updates the body's mass.
    pub fn create_fixture(&mut self, body_key: BodyKey, def: &FixtureDef) -> Result<FixtureKey> {
        let pose = self.body_ref(body_key)?.pose;
        if let Err(err) = def.shape.validate() {
            log::warn!("rejected fixture: {}", err);
            return Err(err);
        }
        if !def.is_sensor && !(def.density.is_finite() && def.density >= 0.0) {
            log::warn!("rejected fixture with density {}", def.density);
            return Err(PhysicsError::InvalidMass {
                density: def.density,
            });
        }

        let key = FixtureKey(self.fixtures.insert(Fixture::new(body_key, def)));
        let fixture = &mut self.fixtures[key.0];
        for child in 0..fixture.shape.child_count() {
            let aabb = fixture.shape.compute_aabb(&pose, child);
            let proxy_id = self
                .contact_manager
                .broad_phase
                .create_proxy(aabb, ProxyRef { fixture: key, child });
            fixture.proxies.push(FixtureProxy {
                aabb,
                child,
                proxy_id,
            });
        }
        let affects_mass = fixture.density > 0.0;

        let body = &mut self.bodies[body_key.0];
        body.fixtures.push(key);
        if affects_mass {
            body.reset_mass_data(&self.fixtures);
        }
        self.new_contacts = true;
        Ok(key)
    }

    /// Remove a fixture from its body, destroying its contacts.
    pub fn destroy_fixture(&mut self, key: FixtureKey) -> Result<()> {
        let body_key = self.fixture_ref(key)?.body;
        self.contact_manager.destroy_fixture_contacts(
            key,
            body_key,
            &mut self.bodies,
            &mut *self.listeners.contact,
            &mut self.commands,
        );
        if let Some(fixture) = self.fixtures.remove(key.0) {
            for proxy in &fixture.proxies {
                self.contact_manager.broad_phase.destroy_proxy(proxy.proxy_id);
            }
        }
        if let Some(body) = self.bodies.get_mut(body_key.0) {
            body.fixtures.retain(|f| *f != key);
            body.reset_mass_data(&self.fixtures);
            body.set_awake(true);
        }
        Ok(())
    }

    #[inline]
    pub fn fixture(&self, key: FixtureKey) -> Option<&Fixture> {
        self.fixtures.get(key.0)
    }

    /// Mutable access to material properties. Contacts pick up changes
    /// when they're next created.
    #[inline]
    pub fn fixture_mut(&mut self, key: FixtureKey) -> Option<&mut Fixture> {
        self.fixtures.get_mut(key.0)
    }

    pub fn fixtures(&self) -> impl '_ + Iterator<Item = (FixtureKey, &Fixture)> {
        self.fixtures.iter().map(|(idx, f)| (FixtureKey(idx), f))
    }

    #[inline]
    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    fn fixture_ref(&self, key: FixtureKey) -> Result<&Fixture> {
        self.fixtures
            .get(key.0)
            .ok_or(PhysicsError::DanglingHandle(HandleKind::Fixture))
    }

    /// Change a fixture's density and recompute its body's mass.
    pub fn set_density(&mut self, key: FixtureKey, density: f64) -> Result<()> {
        if !(density.is_finite() && density >= 0.0) {
            return Err(PhysicsError::InvalidMass { density });
        }
        let fixture = self
            .fixtures
            .get_mut(key.0)
            .ok_or(PhysicsError::DanglingHandle(HandleKind::Fixture))?;
        fixture.density = density;
        let body_key = fixture.body;
        if let Some(body) = self.bodies.get_mut(body_key.0) {
            body.reset_mass_data(&self.fixtures);
        }
        Ok(())
    }

    /// Turn a fixture into a sensor or back. Existing contacts are replaced on the next step.
    pub fn set_sensor(&mut self, key: FixtureKey, sensor: bool) -> Result<()> {
        let fixture = self
            .fixtures
            .get_mut(key.0)
            .ok_or(PhysicsError::DanglingHandle(HandleKind::Fixture))?;
        if fixture.is_sensor == sensor {
            return Ok(());
        }
        fixture.is_sensor = sensor;
        let body_key = fixture.body;

        self.contact_manager.destroy_fixture_contacts(
            key,
            body_key,
            &mut self.bodies,
            &mut *self.listeners.contact,
            &mut self.commands,
        );
        for proxy in &self.fixtures[key.0].proxies {
            self.contact_manager.broad_phase.touch_proxy(proxy.proxy_id);
        }
        if let Some(body) = self.bodies.get_mut(body_key.0) {
            body.reset_mass_data(&self.fixtures);
            body.set_awake(true);
        }
        self.new_contacts = true;
        Ok(())
    }

    pub fn set_filter(&mut self, key: FixtureKey, filter: Filter) -> Result<()> {
        self.fixtures
            .get_mut(key.0)
            .ok_or(PhysicsError::DanglingHandle(HandleKind::Fixture))?
            .filter = filter;
        self.refilter(key)
    }

    /// Recheck a fixture's contacts against the contact filter on the next step.
    /// Call this if a custom filter changed its mind about a fixture.
    pub fn refilter(&mut self, key: FixtureKey) -> Result<()> {
        let fixture = self
            .fixtures
            .get(key.0)
            .ok_or(PhysicsError::DanglingHandle(HandleKind::Fixture))?;
        let body = self
            .bodies
            .get(fixture.body.0)
            .ok_or(PhysicsError::DanglingHandle(HandleKind::Body))?;
        self.contact_manager.flag_fixture_for_filtering(key, body);
        for proxy in &fixture.proxies {
            self.contact_manager.broad_phase.touch_proxy(proxy.proxy_id);
        }
        self.new_contacts = true;
        Ok(())
    }

    //
    // joints
    //

    pub fn create_joint(&mut self, def: &JointDef) -> Result<JointKey> {
        let (key_a, key_b) = def.bodies();
        self.body_ref(key_a)?;
        let body_b = self.body_ref(key_b)?;
        if key_a == key_b {
            log::warn!("rejected joint connecting a body to itself");
            return Err(PhysicsError::IncompatibleJoint(
                "a joint must connect two different bodies",
            ));
        }

        let kind = match def {
            JointDef::Distance(d) => JointKind::Distance(DistanceJoint::new(d)),
            JointDef::Revolute(d) => JointKind::Revolute(RevoluteJoint::new(d)),
            JointDef::Prismatic(d) => JointKind::Prismatic(PrismaticJoint::new(d)),
            JointDef::Weld(d) => JointKind::Weld(WeldJoint::new(d)),
            JointDef::Mouse(d) => {
                if body_b.body_type != BodyType::Dynamic {
                    log::warn!("rejected mouse joint on a non-dynamic body");
                    return Err(PhysicsError::IncompatibleJoint(
                        "a mouse joint can only drag a dynamic body",
                    ));
                }
                if !m::is_finite_vec(d.target) {
                    return Err(PhysicsError::InvalidTransform);
                }
                JointKind::Mouse(MouseJoint::new(d, body_b.local_point(d.target)))
            }
        };

        let collide_connected = def.collide_connected();
        let key = JointKey(
            self.joints
                .insert(Joint::new(key_a, key_b, collide_connected, kind)),
        );
        self.bodies[key_a.0].joints.push(key);
        self.bodies[key_b.0].joints.push(key);

        if !collide_connected {
            self.flag_contacts_between(key_a, key_b);
        }
        Ok(key)
    }

    pub fn destroy_joint(&mut self, key: JointKey) -> Result<()> {
        self.remove_joint(key)
            .map(|_| ())
            .ok_or(PhysicsError::DanglingHandle(HandleKind::Joint))
    }

    fn remove_joint(&mut self, key: JointKey) -> Option<Joint> {
        let joint = self.joints.remove(key.0)?;
        for body_key in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_key.0) {
                body.joints.retain(|j| *j != key);
                body.set_awake(true);
            }
        }
        if !joint.collide_connected {
            self.flag_contacts_between(joint.body_a, joint.body_b);
            // the bodies may now touch where the joint kept them apart
            for body_key in [joint.body_a, joint.body_b] {
                self.touch_proxies(body_key);
            }
        }
        Some(joint)
    }

    /// Make the broad-phase report all pairs of a body's fixtures again on the next step.
    fn touch_proxies(&mut self, body_key: BodyKey) {
        let Some(body) = self.bodies.get(body_key.0) else {
            return;
        };
        for fixture in body.fixtures.iter().filter_map(|f| self.fixtures.get(f.0)) {
            for proxy in &fixture.proxies {
                self.contact_manager.broad_phase.touch_proxy(proxy.proxy_id);
            }
        }
        self.new_contacts = true;
    }

    fn flag_contacts_between(&mut self, a: BodyKey, b: BodyKey) {
        let Some(body_b) = self.bodies.get(b.0) else {
            return;
        };
        for key in &body_b.contacts {
            if let Some(contact) = self.contact_manager.contacts.get_mut(key.0) {
                if contact.body_a == a || contact.body_b == a {
                    contact.flag_for_filtering();
                }
            }
        }
    }

    #[inline]
    pub fn joint(&self, key: JointKey) -> Option<&Joint> {
        self.joints.get(key.0)
    }

    /// Mutable access to a joint's motors, limits and targets. Wakes both bodies.
    pub fn joint_mut(&mut self, key: JointKey) -> Option<&mut Joint> {
        let joint = self.joints.get_mut(key.0)?;
        for body_key in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_key.0) {
                body.set_awake(true);
            }
        }
        Some(joint)
    }

    pub fn joints(&self) -> impl '_ + Iterator<Item = (JointKey, &Joint)> {
        self.joints.iter().map(|(idx, j)| (JointKey(idx), j))
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    //
    // contacts
    //

    /// Every contact, touching or not.
    pub fn contacts(&self) -> impl '_ + Iterator<Item = &Contact> {
        self.contact_manager.contacts.iter().map(|(_, c)| c)
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.contact_manager.broad_phase.proxy_count()
    }

    //
    // simulation
    //

    /// Advance the simulation by `dt` seconds.
    ///
    /// A non-finite or negative `dt` is logged and skipped.
    /// A zero `dt` updates contacts without moving anything.
    pub fn step(&mut self, dt: f64, velocity_iterations: usize, position_iterations: usize) {
        let _span = tracy_span!("step", "step");

        if !dt.is_finite() || dt < 0.0 {
            log::warn!("skipped step with invalid timestep {}", dt);
            return;
        }

        if self.new_contacts {
            self.find_new_contacts();
            self.new_contacts = false;
        }

        let inv_dt = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        let step = TimeStep {
            dt,
            inv_dt,
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations,
            position_iterations,
            warm_starting: self.settings.warm_starting,
        };

        self.contact_manager.collide(
            &mut self.bodies,
            &self.fixtures,
            &self.joints,
            &mut *self.listeners.filter,
            &mut *self.listeners.contact,
            &mut self.commands,
        );

        if dt > 0.0 {
            self.solve(&step);
            if self.settings.continuous {
                self.solve_toi();
            }
            self.inv_dt0 = inv_dt;
        }

        for (_, body) in self.bodies.iter_mut() {
            body.force = Vec2::zero();
            body.torque = 0.0;
        }

        self.flush_commands();

        log::trace!(
            "stepped {} bodies, {} contacts, {} joints",
            self.bodies.len(),
            self.contact_manager.contact_count(),
            self.joints.len()
        );
    }

    fn find_new_contacts(&mut self) {
        self.contact_manager.find_new_contacts(
            &mut self.bodies,
            &self.fixtures,
            &self.joints,
            &mut *self.listeners.filter,
        );
    }

    fn solve(&mut self, step: &TimeStep) {
        let mut islands = build_islands(
            &mut self.bodies,
            &mut self.contact_manager.contacts,
            &mut self.joints,
            &self.fixtures,
        );

        solve_islands(&mut islands, step, &self.settings);

        for island in &islands {
            island.write_back(
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &mut self.joints,
                &mut *self.listeners.contact,
                &mut self.commands,
            );
            if island.fell_asleep() {
                log::debug!(
                    "island of {} bodies, {} contacts and {} joints fell asleep",
                    island.body_count(),
                    island.contact_count(),
                    island.joint_count()
                );
            }
        }

        {
            let _span = tracy_span!("synchronize fixtures", "solve");
            for island in &islands {
                for key in island.body_keys() {
                    let Some(body) = self.bodies.get(key.0) else {
                        continue;
                    };
                    if body.body_type == BodyType::Static {
                        continue;
                    }
                    synchronize_fixtures(
                        body,
                        &mut self.fixtures,
                        &mut self.contact_manager.broad_phase,
                        &body.start_pose(),
                        &body.pose,
                    );
                }
            }
        }

        self.find_new_contacts();
    }

    /// Sweep fast bodies against the rest of the world and pull back
    /// the ones that would pass through something to the time of impact.
    fn solve_toi(&mut self) {
        let _span = tracy_span!("continuous collision", "solve_toi");

        let candidates: Vec<BodyKey> = self
            .bodies
            .iter()
            .filter(|(_, body)| self.needs_ccd(body))
            .map(|(idx, _)| BodyKey(idx))
            .collect();

        let mut moved_any = false;
        for key in candidates {
            let Some(t) = self.earliest_impact(key) else {
                continue;
            };

            let body = &mut self.bodies[key.0];
            let sweep = &mut body.sweep;
            sweep.c = sweep.c0 + t * (sweep.c - sweep.c0);
            sweep.a = sweep.a0 + t * (sweep.a - sweep.a0);
            sweep.c0 = sweep.c;
            sweep.a0 = sweep.a;
            body.synchronize_transform();

            let pose = body.pose;
            let body = &self.bodies[key.0];
            synchronize_fixtures(
                body,
                &mut self.fixtures,
                &mut self.contact_manager.broad_phase,
                &pose,
                &pose,
            );
            log::trace!("rolled body {:?} back to time of impact {}", key, t);
            moved_any = true;
        }

        if moved_any {
            self.find_new_contacts();
        }
    }

    fn needs_ccd(&self, body: &Body) -> bool {
        if body.body_type != BodyType::Dynamic || !body.is_awake() {
            return false;
        }
        if body.is_bullet() {
            return true;
        }
        let min_extent = body
            .fixtures
            .iter()
            .filter_map(|f| self.fixtures.get(f.0))
            .filter(|f| !f.is_sensor)
            .map(|f| f.shape.min_extent())
            .fold(f64::MAX, f64::min);
        if min_extent == f64::MAX {
            return false;
        }
        (body.sweep.c - body.sweep.c0).mag() > CCD_EXTENT_FRACTION * min_extent
    }

    /// Find the earliest time of impact of a body's sweep this step, if it hits anything.
    fn earliest_impact(&mut self, key: BodyKey) -> Option<f64> {
        let body = &self.bodies[key.0];
        let mut min_t = 1.0;

        for fixture_key in &body.fixtures {
            let Some(fixture) = self.fixtures.get(fixture_key.0) else {
                continue;
            };
            if fixture.is_sensor {
                continue;
            }
            for proxy in &fixture.proxies {
                let Some(fat) = self.contact_manager.broad_phase.fat_aabb(proxy.proxy_id) else {
                    continue;
                };
                for (_, other) in self.contact_manager.broad_phase.query(fat) {
                    let Some(other_fixture) = self.fixtures.get(other.fixture.0) else {
                        continue;
                    };
                    if other_fixture.body == key || other_fixture.is_sensor {
                        continue;
                    }
                    let Some(other_body) = self.bodies.get(other_fixture.body.0) else {
                        continue;
                    };
                    // regular fast bodies only stop at the static level geometry,
                    // bullets also stop at other dynamic bodies
                    let sweep_against = match other_body.body_type {
                        BodyType::Static | BodyType::Kinematic => true,
                        BodyType::Dynamic => body.is_bullet() && !other_body.is_bullet(),
                    };
                    if !sweep_against {
                        continue;
                    }
                    if !can_collide(fixture.shape.kind(), other_fixture.shape.kind()) {
                        continue;
                    }
                    let allowed = ContactManager::candidate(
                        *fixture_key,
                        fixture,
                        other.fixture,
                        other_fixture,
                        &self.bodies,
                        &self.joints,
                    )
                    .map_or(false, |c| self.listeners.filter.should_collide(&c));
                    if !allowed {
                        continue;
                    }

                    let mut sweep_b = other_body.sweep;
                    if !other_body.is_awake() {
                        sweep_b.c0 = sweep_b.c;
                        sweep_b.a0 = sweep_b.a;
                    }
                    let input = ToiInput {
                        proxy_a: DistanceProxy::new(&fixture.shape, proxy.child),
                        proxy_b: DistanceProxy::new(&other_fixture.shape, other.child),
                        sweep_a: body.sweep,
                        sweep_b,
                        t_max: min_t,
                    };
                    let output = time_of_impact(&input);
                    if output.state == ToiState::Touching && output.t < min_t {
                        min_t = output.t;
                    }
                }
            }
        }

        (min_t < 1.0).then_some(min_t)
    }

    /// Apply commands queued by listeners. Commands whose targets are gone are dropped.
    fn flush_commands(&mut self) {
        let _span = tracy_span!("flush commands", "flush_commands");

        // applying commands can trigger callbacks that queue more commands
        while !self.commands.is_empty() {
            let commands: Vec<Command> = self.commands.drain().collect();
            for command in commands {
                let result = match command {
                    Command::DestroyBody(body) => self.destroy_body(body),
                    Command::DestroyFixture(fixture) => self.destroy_fixture(fixture),
                    Command::DestroyJoint(joint) => self.destroy_joint(joint),
                    Command::SetTransform {
                        body,
                        position,
                        angle,
                    } => self.set_transform(body, position, angle),
                    Command::SetLinearVelocity(body, v) => self.set_linear_velocity(body, v),
                    Command::SetAngularVelocity(body, w) => self.set_angular_velocity(body, w),
                    Command::ApplyLinearImpulse {
                        body,
                        impulse,
                        point,
                    } => self.apply_linear_impulse(body, impulse, point),
                    Command::SetAwake(body, awake) => self.set_awake(body, awake),
                    Command::SetBodyType(body, body_type) => self.set_body_type(body, body_type),
                    Command::SetBullet(body, bullet) => self.set_bullet(body, bullet),
                };
                if let Err(err) = result {
                    log::debug!("dropped deferred command {:?}: {}", command, err);
                }
            }
        }
    }

    //
    // queries
    //

    /// Find every fixture whose bounding box overlaps the given one,
    /// in broad-phase order without duplicates.
    pub fn query_aabb(&self, aabb: &AABB) -> Vec<FixtureKey> {
        let mut found: Vec<FixtureKey> = Vec::new();
        for (_, proxy) in self.contact_manager.broad_phase.query(*aabb) {
            let Some(fixture) = self.fixtures.get(proxy.fixture.0) else {
                continue;
            };
            let overlaps = fixture
                .aabb(proxy.child)
                .map_or(false, |fixture_aabb| fixture_aabb.overlaps(aabb));
            if overlaps && !found.contains(&proxy.fixture) {
                found.push(proxy.fixture);
            }
        }
        found
    }

    /// Find every fixture containing a point.
    pub fn query_point(&self, point: Vec2) -> Vec<FixtureKey> {
        let mut found: Vec<FixtureKey> = Vec::new();
        for (_, proxy) in self
            .contact_manager
            .broad_phase
            .query(AABB::from_point(point))
        {
            let Some(fixture) = self.fixtures.get(proxy.fixture.0) else {
                continue;
            };
            let Some(body) = self.bodies.get(fixture.body.0) else {
                continue;
            };
            if fixture.shape.test_point(&body.pose, point) && !found.contains(&proxy.fixture) {
                found.push(proxy.fixture);
            }
        }
        found
    }

    /// Cast a ray from `p1` to `p2`, yielding hits from nearest to farthest.
    pub fn ray_cast(&self, p1: Vec2, p2: Vec2) -> RayCastIter<'_> {
        RayCastIter {
            nodes: self
                .contact_manager
                .broad_phase
                .ray_cast(Ray::between(p1, p2), 1.0),
            fixtures: &self.fixtures,
            bodies: &self.bodies,
            input: RayCastInput {
                p1,
                p2,
                max_fraction: 1.0,
            },
            pending: Vec::new(),
        }
    }

    //
    // debug drawing
    //

    #[inline]
    pub fn flags(&self) -> DrawFlags {
        self.draw_flags
    }

    pub fn set_flags(&mut self, flags: DrawFlags) {
        self.draw_flags = flags;
    }

    pub fn append_flags(&mut self, flags: DrawFlags) {
        self.draw_flags.insert(flags);
    }

    pub fn clear_flags(&mut self, flags: DrawFlags) {
        self.draw_flags.remove(flags);
    }

    /// Draw the parts of the world selected with the draw flags.
    pub fn debug_draw(&self, draw: &mut dyn DebugDraw) {
        let _span = tracy_span!("debug draw", "debug_draw");
        let flags = self.draw_flags;

        if flags.contains(DrawFlags::SHAPES) {
            for (_, body) in self.bodies.iter() {
                let color = match body.body_type {
                    BodyType::Static => dd::STATIC_COLOR,
                    BodyType::Kinematic => dd::KINEMATIC_COLOR,
                    BodyType::Dynamic if !body.is_awake() => dd::SLEEPING_COLOR,
                    BodyType::Dynamic => dd::AWAKE_COLOR,
                };
                for fixture in body.fixtures.iter().filter_map(|f| self.fixtures.get(f.0)) {
                    dd::draw_shape(draw, &fixture.shape, &body.pose, color);
                }
            }
        }

        if flags.contains(DrawFlags::JOINTS) {
            for (_, joint) in self.joints.iter() {
                self.draw_joint(draw, joint);
            }
        }

        if flags.contains(DrawFlags::PAIRS) {
            for (_, contact) in self.contact_manager.contacts.iter() {
                let center = |key: FixtureKey, child: usize| {
                    self.fixtures
                        .get(key.0)
                        .and_then(|f| f.aabb(child))
                        .map(|aabb| aabb.center())
                };
                if let (Some(a), Some(b)) = (
                    center(contact.fixture_a, contact.child_a),
                    center(contact.fixture_b, contact.child_b),
                ) {
                    draw.draw_segment(a, b, dd::PAIR_COLOR);
                }
            }
        }

        if flags.contains(DrawFlags::AABBS) {
            for (_, fixture) in self.fixtures.iter() {
                for proxy in &fixture.proxies {
                    if let Some(aabb) = self.contact_manager.broad_phase.fat_aabb(proxy.proxy_id)
                    {
                        dd::draw_aabb(draw, &aabb, dd::AABB_COLOR);
                    }
                }
            }
        }

        if flags.contains(DrawFlags::CENTER_OF_MASS) {
            for (_, body) in self.bodies.iter() {
                let pose = Pose::new(body.world_center(), body.pose.rotation);
                draw.draw_transform(&pose);
            }
        }
    }

    fn draw_joint(&self, draw: &mut dyn DebugDraw, joint: &Joint) {
        let (Some(body_a), Some(body_b)) =
            (self.bodies.get(joint.body_a.0), self.bodies.get(joint.body_b.0))
        else {
            return;
        };
        let (anchor_a, anchor_b) = joint.local_anchors();
        let p2 = body_b.world_point(anchor_b);

        match joint.kind() {
            JointKind::Mouse(_) => {
                // the first anchor is already in world space
                draw.draw_point(anchor_a, 4.0, dd::JOINT_COLOR);
                draw.draw_point(p2, 4.0, dd::JOINT_COLOR);
                draw.draw_segment(anchor_a, p2, dd::JOINT_COLOR);
            }
            JointKind::Distance(_) => {
                draw.draw_segment(body_a.world_point(anchor_a), p2, dd::JOINT_COLOR);
            }
            _ => {
                let p1 = body_a.world_point(anchor_a);
                draw.draw_segment(body_a.position(), p1, dd::JOINT_COLOR);
                draw.draw_segment(p1, p2, dd::JOINT_COLOR);
                draw.draw_segment(body_b.position(), p2, dd::JOINT_COLOR);
            }
        }
    }
}

/// Look up a body while other parts of the world are borrowed.
fn body_in(bodies: &mut td::Arena<Body>, key: BodyKey) -> Result<&mut Body> {
    bodies
        .get_mut(key.0)
        .ok_or(PhysicsError::DanglingHandle(HandleKind::Body))
}

/// Update a body's broad-phase proxies to cover its motion from `start` to `end`.
fn synchronize_fixtures(
    body: &Body,
    fixtures: &mut td::Arena<Fixture>,
    broad_phase: &mut BroadPhase<ProxyRef>,
    start: &Pose,
    end: &Pose,
) {
    for key in &body.fixtures {
        let Some(fixture) = fixtures.get_mut(key.0) else {
            continue;
        };
        for proxy in &mut fixture.proxies {
            let aabb_start = fixture.shape.compute_aabb(start, proxy.child);
            let aabb_end = fixture.shape.compute_aabb(end, proxy.child);
            proxy.aabb = aabb_start.union(&aabb_end);
            let displacement = aabb_end.center() - aabb_start.center();
            broad_phase.move_proxy(proxy.proxy_id, proxy.aabb, displacement);
        }
    }
}
