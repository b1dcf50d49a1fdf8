//! Hooks for reacting to what happens in the world.
//!
//! All trait methods have empty default implementations,
//! so implementors only need to write the ones they care about.
//! `()` implements every trait and is the default for a new world.

use crate::{
    body::{BodyKey, BodyType},
    collision::Manifold,
    command::CommandBuffer,
    contact::{Contact, ContactImpulse},
    fixture::{Filter, FixtureKey},
    joint::JointKey,
};

/// Everything known about a pair of fixtures before a contact is created for them.
#[derive(Clone, Copy, Debug)]
pub struct CollisionCandidate {
    pub fixture_a: FixtureKey,
    pub fixture_b: FixtureKey,
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub body_type_a: BodyType,
    pub body_type_b: BodyType,
    pub filter_a: Filter,
    pub filter_b: Filter,
    /// A joint connects the bodies and doesn't allow them to collide.
    pub joint_forbids: bool,
}

impl CollisionCandidate {
    /// The built-in collision rule.
    /// Two static bodies never collide and joints can forbid collision
    /// between their bodies. Otherwise the filters must agree.
    ///
    /// Pairs with no dynamic body are rejected before any filter runs.
    pub fn default_rule(&self) -> bool {
        if self.body_type_a == BodyType::Static && self.body_type_b == BodyType::Static {
            return false;
        }
        if self.joint_forbids {
            return false;
        }
        self.filter_a.should_collide(&self.filter_b)
    }
}

/// Decides which fixture pairs get contacts.
pub trait ContactFilter {
    fn should_collide(&mut self, candidate: &CollisionCandidate) -> bool {
        candidate.default_rule()
    }
}

impl ContactFilter for () {}

/// Receives contact events during a step.
///
/// Contacts are only valid for the duration of a callback.
/// Changes to the world go through the command buffer.
pub trait ContactListener {
    /// Two fixtures started touching.
    fn begin_contact(&mut self, _contact: &Contact, _commands: &mut CommandBuffer) {}

    /// Two fixtures stopped touching. Also called when a touching contact is
    /// destroyed because a fixture or body was removed.
    fn end_contact(&mut self, _contact: &Contact, _commands: &mut CommandBuffer) {}

    /// Called every step for touching non-sensor contacts before they're solved.
    /// The contact can be disabled for this step or have its material overridden.
    fn pre_solve(
        &mut self,
        _contact: &mut Contact,
        _old_manifold: &Manifold,
        _commands: &mut CommandBuffer,
    ) {
    }

    /// Impulses applied by the solver to a touching contact.
    fn post_solve(
        &mut self,
        _contact: &Contact,
        _impulse: &ContactImpulse,
        _commands: &mut CommandBuffer,
    ) {
    }
}

impl ContactListener for () {}

/// Told about joints and fixtures that are removed implicitly
/// because their body was destroyed.
pub trait DestructionListener {
    fn say_goodbye_joint(&mut self, _joint: JointKey) {}
    fn say_goodbye_fixture(&mut self, _fixture: FixtureKey) {}
}

impl DestructionListener for () {}

/// All the user hooks of a world, boxed so that the world doesn't need type parameters.
pub(crate) struct Listeners {
    pub filter: Box<dyn ContactFilter + Send>,
    pub contact: Box<dyn ContactListener + Send>,
    pub destruction: Box<dyn DestructionListener + Send>,
}

impl Default for Listeners {
    fn default() -> Self {
        Self {
            filter: Box::new(()),
            contact: Box::new(()),
            destruction: Box::new(()),
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunderdome as td;

    fn candidate(type_a: BodyType, type_b: BodyType) -> CollisionCandidate {
        let mut bodies = td::Arena::new();
        let mut fixtures = td::Arena::new();
        CollisionCandidate {
            fixture_a: FixtureKey(fixtures.insert(())),
            fixture_b: FixtureKey(fixtures.insert(())),
            body_a: BodyKey(bodies.insert(())),
            body_b: BodyKey(bodies.insert(())),
            body_type_a: type_a,
            body_type_b: type_b,
            filter_a: Filter::default(),
            filter_b: Filter::default(),
            joint_forbids: false,
        }
    }

    #[test]
    fn default_rule() {
        assert!(candidate(BodyType::Dynamic, BodyType::Static).default_rule());
        assert!(!candidate(BodyType::Static, BodyType::Static).default_rule());

        let mut c = candidate(BodyType::Dynamic, BodyType::Dynamic);
        c.joint_forbids = true;
        assert!(!c.default_rule());

        let mut c = candidate(BodyType::Dynamic, BodyType::Dynamic);
        c.filter_a = Filter::default().with_group(-4);
        c.filter_b = Filter::default().with_group(-4);
        assert!(!c.default_rule());
        // the unit filter uses the default rule
        assert!(!().should_collide(&c));
    }
}
