//! A 2D rigid body physics engine.
//!
//! Bodies carry fixtures (shapes with material properties), are connected by joints,
//! and interact through contacts found by a dynamic AABB tree and resolved with
//! a sequential impulse solver. Everything lives in a [`World`] and is referred to
//! by generational keys, so stale handles are detected instead of aliasing.

// span macro that compiles to nothing unless the `tracy` feature enables the client
macro_rules! tracy_span {
    ($name:expr, $fn_name:expr) => {
        tracy_client::Client::running()
            .map(|c| c.span_alloc(Some($name), $fn_name, file!(), line!(), 0))
    };
}

pub mod math;
#[cfg(feature = "serde-types")]
pub use math::serde_vec2;
pub use math::{uv, Angle, Pose, Rotor2, Unit, Vec2};

pub mod settings;
pub use settings::WorldSettings;

pub mod error;
pub use error::{HandleKind, PhysicsError, Result};

pub mod shape;
pub use shape::{Chain, Circle, Edge, MassData, Polygon, Shape, ShapeKind};

pub mod collision;
pub use collision::{Manifold, Ray, WorldManifold, AABB};

pub mod body;
pub use body::{Body, BodyDef, BodyKey, BodyType, Mass, Velocity};

pub mod fixture;
pub use fixture::{Filter, Fixture, FixtureDef, FixtureKey};

pub mod contact;
pub use contact::{Contact, ContactImpulse, ContactKey};

mod contact_manager;

pub mod command;
pub use command::{Command, CommandBuffer};

pub mod listener;
pub use listener::{CollisionCandidate, ContactFilter, ContactListener, DestructionListener};

pub mod debug_draw;
pub use debug_draw::{Color, DebugDraw, DrawFlags};

pub mod joint;
pub use joint::{
    DistanceJoint, DistanceJointDef, Joint, JointDef, JointKey, JointKind, MouseJoint,
    MouseJointDef, PrismaticJoint, PrismaticJointDef, RevoluteJoint, RevoluteJointDef, WeldJoint,
    WeldJointDef,
};

mod solver;

pub mod world;
pub use world::{RayCastIter, RayHit, World};
