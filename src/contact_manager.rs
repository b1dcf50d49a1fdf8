//! Creates, updates and destroys contacts as the broad-phase reports overlapping proxies.

use crate::{
    body::{Body, BodyKey, BodyType},
    collision::{narrowphase, BroadPhase},
    command::CommandBuffer,
    contact::{Contact, ContactFlags, ContactKey, TouchChange},
    fixture::{Fixture, FixtureKey, ProxyRef},
    joint::Joint,
    listener::{CollisionCandidate, ContactFilter, ContactListener},
};

use std::collections::HashMap;
use thunderdome as td;

/// Contacts are looked up by the pair of fixture children they connect,
/// stored with the smaller child first.
type PairKey = (ProxyRef, ProxyRef);

fn pair_key(a: ProxyRef, b: ProxyRef) -> PairKey {
    if (a.fixture, a.child) <= (b.fixture, b.child) {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ContactManager {
    pub contacts: td::Arena<Contact>,
    pub broad_phase: BroadPhase<ProxyRef>,
    pairs: HashMap<PairKey, ContactKey>,
}

impl ContactManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Build the filter input for two fixtures, including whether
    /// a joint between their bodies forbids collision.
    /// Pairs where neither body is dynamic never reach the filter.
    pub fn candidate(
        fixture_a: FixtureKey,
        fix_a: &Fixture,
        fixture_b: FixtureKey,
        fix_b: &Fixture,
        bodies: &td::Arena<Body>,
        joints: &td::Arena<Joint>,
    ) -> Option<CollisionCandidate> {
        let body_a = bodies.get(fix_a.body.0)?;
        let body_b = bodies.get(fix_b.body.0)?;
        if !body_a.can_touch(body_b) {
            return None;
        }
        let joint_forbids = body_b
            .joints
            .iter()
            .filter_map(|j| joints.get(j.0))
            .any(|j| j.other_body(fix_b.body) == fix_a.body && !j.collide_connected);

        Some(CollisionCandidate {
            fixture_a,
            fixture_b,
            body_a: fix_a.body,
            body_b: fix_b.body,
            body_type_a: body_a.body_type,
            body_type_b: body_b.body_type,
            filter_a: fix_a.filter,
            filter_b: fix_b.filter,
            joint_forbids,
        })
    }

    /// Run the broad-phase pair search and create contacts for new pairs.
    pub fn find_new_contacts(
        &mut self,
        bodies: &mut td::Arena<Body>,
        fixtures: &td::Arena<Fixture>,
        joints: &td::Arena<Joint>,
        filter: &mut dyn ContactFilter,
    ) {
        let _span = tracy_span!("find new contacts", "find_new_contacts");

        let mut new_pairs = Vec::new();
        self.broad_phase.update_pairs(|a, b| new_pairs.push((a, b)));
        for (a, b) in new_pairs {
            self.add_pair(a, b, bodies, fixtures, joints, filter);
        }
    }

    fn add_pair(
        &mut self,
        a: ProxyRef,
        b: ProxyRef,
        bodies: &mut td::Arena<Body>,
        fixtures: &td::Arena<Fixture>,
        joints: &td::Arena<Joint>,
        filter: &mut dyn ContactFilter,
    ) {
        let (Some(fix_a), Some(fix_b)) = (fixtures.get(a.fixture.0), fixtures.get(b.fixture.0))
        else {
            return;
        };
        // fixtures on the same body never collide
        if fix_a.body == fix_b.body {
            return;
        }
        let key = pair_key(a, b);
        if self.pairs.contains_key(&key) {
            return;
        }
        if !narrowphase::can_collide(fix_a.shape.kind(), fix_b.shape.kind()) {
            return;
        }
        let Some(candidate) = Self::candidate(a.fixture, fix_a, b.fixture, fix_b, bodies, joints)
        else {
            return;
        };
        if !filter.should_collide(&candidate) {
            return;
        }

        // keep the shapes in the order the narrow-phase works in
        let (a, fix_a, b, fix_b) = if narrowphase::needs_swap(fix_a.shape.kind(), fix_b.shape.kind())
        {
            (b, fix_b, a, fix_a)
        } else {
            (a, fix_a, b, fix_b)
        };

        let contact = Contact::new(a.fixture, fix_a, a.child, b.fixture, fix_b, b.child);
        let contact_key = ContactKey(self.contacts.insert(contact));
        self.pairs.insert(key, contact_key);

        for body_key in [fix_a.body, fix_b.body] {
            if let Some(body) = bodies.get_mut(body_key.0) {
                body.contacts.push(contact_key);
            }
        }
        log::trace!("created contact {:?}", contact_key);
    }

    /// Remove a contact, reporting the end of touching if it was touching.
    pub fn destroy(
        &mut self,
        key: ContactKey,
        bodies: &mut td::Arena<Body>,
        listener: &mut dyn ContactListener,
        commands: &mut CommandBuffer,
    ) {
        let Some(contact) = self.contacts.remove(key.0) else {
            return;
        };
        let a = ProxyRef {
            fixture: contact.fixture_a,
            child: contact.child_a,
        };
        let b = ProxyRef {
            fixture: contact.fixture_b,
            child: contact.child_b,
        };
        self.pairs.remove(&pair_key(a, b));

        let touching = contact.is_touching();
        if touching {
            listener.end_contact(&contact, commands);
        }
        for body_key in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(body_key.0) {
                body.contacts.retain(|c| *c != key);
                if touching {
                    body.set_awake(true);
                }
            }
        }
    }

    /// Destroy every contact involving a fixture.
    pub fn destroy_fixture_contacts(
        &mut self,
        fixture: FixtureKey,
        body: BodyKey,
        bodies: &mut td::Arena<Body>,
        listener: &mut dyn ContactListener,
        commands: &mut CommandBuffer,
    ) {
        let Some(b) = bodies.get(body.0) else {
            return;
        };
        let doomed: Vec<ContactKey> = b
            .contacts
            .iter()
            .copied()
            .filter(|c| {
                self.contacts
                    .get(c.0)
                    .map_or(false, |c| c.fixture_a == fixture || c.fixture_b == fixture)
            })
            .collect();
        for key in doomed {
            self.destroy(key, bodies, listener, commands);
        }
    }

    /// Mark every contact of a fixture to be rechecked against the filter on the next step.
    pub fn flag_fixture_for_filtering(&mut self, fixture: FixtureKey, body: &Body) {
        for key in &body.contacts {
            if let Some(contact) = self.contacts.get_mut(key.0) {
                if contact.fixture_a == fixture || contact.fixture_b == fixture {
                    contact.flag_for_filtering();
                }
            }
        }
    }

    /// Update the manifolds of all contacts, destroying the ones
    /// that no longer pass the filter or whose fat AABBs stopped overlapping.
    pub fn collide(
        &mut self,
        bodies: &mut td::Arena<Body>,
        fixtures: &td::Arena<Fixture>,
        joints: &td::Arena<Joint>,
        filter: &mut dyn ContactFilter,
        listener: &mut dyn ContactListener,
        commands: &mut CommandBuffer,
    ) {
        let _span = tracy_span!("collide", "collide");

        let keys: Vec<ContactKey> = self.contacts.iter().map(|(i, _)| ContactKey(i)).collect();
        for key in keys {
            let Some(contact) = self.contacts.get(key.0) else {
                continue;
            };
            let (fixture_a, child_a) = (contact.fixture_a, contact.child_a);
            let (fixture_b, child_b) = (contact.fixture_b, contact.child_b);
            let needs_filter = contact.flags.contains(ContactFlags::FILTER);

            let (Some(fix_a), Some(fix_b)) = (fixtures.get(fixture_a.0), fixtures.get(fixture_b.0))
            else {
                self.destroy(key, bodies, listener, commands);
                continue;
            };

            if needs_filter {
                let keep = fix_a.body != fix_b.body
                    && Self::candidate(fixture_a, fix_a, fixture_b, fix_b, bodies, joints)
                        .map_or(false, |c| filter.should_collide(&c));
                if !keep {
                    self.destroy(key, bodies, listener, commands);
                    continue;
                }
                if let Some(contact) = self.contacts.get_mut(key.0) {
                    contact.flags.remove(ContactFlags::FILTER);
                }
            }

            let (Some(body_a), Some(body_b)) =
                (bodies.get(fix_a.body.0), bodies.get(fix_b.body.0))
            else {
                continue;
            };
            let active = |b: &Body| b.is_awake() && b.body_type != BodyType::Static;
            // at least one body must be moving for the contact to change
            if !active(body_a) && !active(body_b) {
                continue;
            }

            let proxy_a = fix_a.proxies.get(child_a).map(|p| p.proxy_id);
            let proxy_b = fix_b.proxies.get(child_b).map(|p| p.proxy_id);
            let overlap = match (proxy_a, proxy_b) {
                (Some(a), Some(b)) => self.broad_phase.test_overlap(a, b),
                _ => false,
            };
            if !overlap {
                self.destroy(key, bodies, listener, commands);
                continue;
            }

            let (pose_a, pose_b) = (body_a.pose, body_b.pose);
            let (body_key_a, body_key_b) = (fix_a.body, fix_b.body);
            let Some(contact) = self.contacts.get_mut(key.0) else {
                continue;
            };
            let change = contact.update(fix_a, &pose_a, fix_b, &pose_b, listener, commands);
            if change != TouchChange::None {
                for body_key in [body_key_a, body_key_b] {
                    if let Some(body) = bodies.get_mut(body_key.0) {
                        body.set_awake(true);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        body::BodyDef,
        fixture::{FixtureDef, FixtureProxy},
        math::Vec2,
        shape::Circle,
    };

    struct Setup {
        bodies: td::Arena<Body>,
        fixtures: td::Arena<Fixture>,
        joints: td::Arena<Joint>,
        manager: ContactManager,
    }

    impl Setup {
        fn new() -> Self {
            Self {
                bodies: td::Arena::new(),
                fixtures: td::Arena::new(),
                joints: td::Arena::new(),
                manager: ContactManager::new(),
            }
        }

        fn add_circle(&mut self, def: BodyDef, radius: f64) -> (BodyKey, FixtureKey) {
            let body_key = BodyKey(self.bodies.insert(Body::new(&def)));
            let fixture = Fixture::new(body_key, &FixtureDef::with_density(Circle::new(radius), 1.0));
            let fixture_key = FixtureKey(self.fixtures.insert(fixture));

            let pose = self.bodies[body_key.0].pose;
            let fixture = &mut self.fixtures[fixture_key.0];
            let aabb = fixture.shape.compute_aabb(&pose, 0);
            let proxy_id = self.manager.broad_phase.create_proxy(
                aabb,
                ProxyRef {
                    fixture: fixture_key,
                    child: 0,
                },
            );
            fixture.proxies.push(FixtureProxy {
                aabb,
                child: 0,
                proxy_id,
            });
            self.bodies[body_key.0].fixtures.push(fixture_key);
            (body_key, fixture_key)
        }

        fn step(&mut self, listener: &mut dyn ContactListener) {
            let mut commands = CommandBuffer::default();
            self.manager
                .find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints, &mut ());
            self.manager.collide(
                &mut self.bodies,
                &self.fixtures,
                &self.joints,
                &mut (),
                listener,
                &mut commands,
            );
        }
    }

    #[derive(Default)]
    struct Counter {
        begins: usize,
        ends: usize,
    }

    impl ContactListener for Counter {
        fn begin_contact(&mut self, _contact: &Contact, _commands: &mut CommandBuffer) {
            self.begins += 1;
        }
        fn end_contact(&mut self, _contact: &Contact, _commands: &mut CommandBuffer) {
            self.ends += 1;
        }
    }

    #[test]
    fn overlapping_circles_get_one_touching_contact() {
        let mut setup = Setup::new();
        let (a, _) = setup.add_circle(BodyDef::new_dynamic(), 0.5);
        let (b, _) = setup.add_circle(BodyDef::new_dynamic().with_position(Vec2::new(0.8, 0.0)), 0.5);

        let mut counter = Counter::default();
        setup.step(&mut counter);
        setup.step(&mut counter);

        assert_eq!(setup.manager.contact_count(), 1);
        assert_eq!(counter.begins, 1);
        assert_eq!(setup.bodies[a.0].contacts.len(), 1);
        assert_eq!(setup.bodies[b.0].contacts.len(), 1);
        let (_, contact) = setup.manager.contacts.iter().next().unwrap();
        assert!(contact.is_touching());
    }

    #[test]
    fn same_body_and_static_pairs_are_skipped() {
        let mut setup = Setup::new();
        setup.add_circle(BodyDef::new_static(), 0.5);
        setup.add_circle(BodyDef::new_static().with_position(Vec2::new(0.5, 0.0)), 0.5);
        setup.step(&mut ());
        assert_eq!(setup.manager.contact_count(), 0);
    }

    #[test]
    fn destroying_touching_contact_reports_end() {
        let mut setup = Setup::new();
        let (_, fa) = setup.add_circle(BodyDef::new_dynamic(), 0.5);
        let (b, _) = setup.add_circle(BodyDef::new_dynamic().with_position(Vec2::new(0.8, 0.0)), 0.5);
        let mut counter = Counter::default();
        setup.step(&mut counter);

        let body_a = setup.fixtures[fa.0].body;
        let mut commands = CommandBuffer::default();
        setup.manager.destroy_fixture_contacts(
            fa,
            body_a,
            &mut setup.bodies,
            &mut counter,
            &mut commands,
        );
        assert_eq!(counter.ends, 1);
        assert_eq!(setup.manager.contact_count(), 0);
        assert!(setup.bodies[b.0].contacts.is_empty());
    }
}
