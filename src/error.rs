//! Errors reported by the physics world.
//!
//! Every error is detected at the call that introduces it
//! (creation, attachment or a setter). Stepping the world never fails.

/// Which kind of handle an operation was given.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleKind {
    Body,
    Fixture,
    Joint,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandleKind::Body => "body",
            HandleKind::Fixture => "fixture",
            HandleKind::Joint => "joint",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(&'static str),
    #[error("Invalid density {density} for a non-sensor fixture")]
    InvalidMass { density: f64 },
    #[error("The {0} handle refers to something that has been destroyed")]
    DanglingHandle(HandleKind),
    #[error("Incompatible joint: {0}")]
    IncompatibleJoint(&'static str),
    #[error("Position or angle is not finite")]
    InvalidTransform,
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
