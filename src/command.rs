//! Deferred world changes requested from inside callbacks.
//!
//! Callbacks run while the world is being stepped and can't touch it directly,
//! so they push commands here instead. The world applies them in order
//! once the step is over.

use crate::{
    body::{BodyKey, BodyType},
    fixture::FixtureKey,
    joint::JointKey,
    math::Vec2,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    DestroyBody(BodyKey),
    DestroyFixture(FixtureKey),
    DestroyJoint(JointKey),
    SetTransform {
        body: BodyKey,
        position: Vec2,
        angle: f64,
    },
    SetLinearVelocity(BodyKey, Vec2),
    SetAngularVelocity(BodyKey, f64),
    ApplyLinearImpulse {
        body: BodyKey,
        impulse: Vec2,
        point: Vec2,
    },
    SetAwake(BodyKey, bool),
    SetBodyType(BodyKey, BodyType),
    SetBullet(BodyKey, bool),
}

/// A queue of world changes, flushed after the current step.
#[derive(Clone, Debug, Default)]
pub struct CommandBuffer {
    pub(crate) commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn destroy_body(&mut self, body: BodyKey) {
        self.push(Command::DestroyBody(body));
    }

    pub fn destroy_fixture(&mut self, fixture: FixtureKey) {
        self.push(Command::DestroyFixture(fixture));
    }

    pub fn destroy_joint(&mut self, joint: JointKey) {
        self.push(Command::DestroyJoint(joint));
    }

    pub fn set_transform(&mut self, body: BodyKey, position: Vec2, angle: f64) {
        self.push(Command::SetTransform {
            body,
            position,
            angle,
        });
    }

    pub fn set_linear_velocity(&mut self, body: BodyKey, velocity: Vec2) {
        self.push(Command::SetLinearVelocity(body, velocity));
    }

    pub fn set_angular_velocity(&mut self, body: BodyKey, velocity: f64) {
        self.push(Command::SetAngularVelocity(body, velocity));
    }

    pub fn apply_linear_impulse(&mut self, body: BodyKey, impulse: Vec2, point: Vec2) {
        self.push(Command::ApplyLinearImpulse {
            body,
            impulse,
            point,
        });
    }

    pub fn set_awake(&mut self, body: BodyKey, awake: bool) {
        self.push(Command::SetAwake(body, awake));
    }

    pub fn set_body_type(&mut self, body: BodyKey, body_type: BodyType) {
        self.push(Command::SetBodyType(body, body_type));
    }

    pub fn set_bullet(&mut self, body: BodyKey, bullet: bool) {
        self.push(Command::SetBullet(body, bullet));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take every queued command out, leaving the buffer empty.
    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, Command> {
        self.commands.drain(..)
    }
}
