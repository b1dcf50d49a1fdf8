//! Tuning constants and world-level configuration.
//!
//! Units are meters, kilograms and seconds. The constants are tuned for
//! moving objects between 0.1 and 10 meters in size.

use crate::math as m;

/// Maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Collision and constraint tolerance.
pub const LINEAR_SLOP: f64 = 0.005;

/// Collision and constraint tolerance for angles.
pub const ANGULAR_SLOP: f64 = 2.0 / 180.0 * std::f64::consts::PI;

/// Skin radius around polygons and edges, keeps them from touching
/// so that contacts can be generated before overlap happens.
pub const POLYGON_RADIUS: f64 = 2.0 * LINEAR_SLOP;

/// Fattening applied to broad-phase AABBs so that proxies
/// don't need to be reinserted every time a body moves a little.
pub const AABB_MARGIN: f64 = 0.1;

/// Velocity-predicted fattening multiplier for broad-phase AABBs.
pub const AABB_MULTIPLIER: f64 = 4.0;

/// Maximum number of root finder iterations in time of impact.
pub const MAX_TOI_ITERATIONS: usize = 20;

/// A body is swept in the continuous pass if it moved further than
/// this fraction of its smallest shape extent during the step.
pub const CCD_EXTENT_FRACTION: f64 = 0.5;

/// Relative velocity below which collisions are treated as inelastic.
pub const VELOCITY_THRESHOLD: f64 = 1.0;

/// Maximum linear position correction per position iteration.
pub const MAX_LINEAR_CORRECTION: f64 = 0.2;

/// Maximum angular position correction per position iteration.
pub const MAX_ANGULAR_CORRECTION: f64 = 8.0 / 180.0 * std::f64::consts::PI;

/// Maximum linear translation of a body per step. This prevents numerical
/// problems and is much larger than anything a sane simulation needs.
pub const MAX_TRANSLATION: f64 = 2.0;
pub const MAX_TRANSLATION_SQUARED: f64 = MAX_TRANSLATION * MAX_TRANSLATION;

/// Maximum rotation of a body per step.
pub const MAX_ROTATION: f64 = 0.5 * std::f64::consts::PI;
pub const MAX_ROTATION_SQUARED: f64 = MAX_ROTATION * MAX_ROTATION;

/// How fast overlap is resolved, usually a bit smaller than 1 to avoid overshoot.
pub const BAUMGARTE: f64 = 0.2;

/// Time a body must be still before it sleeps.
pub const TIME_TO_SLEEP: f64 = 0.5;

/// A body cannot sleep if its linear velocity is above this tolerance.
pub const LINEAR_SLEEP_TOLERANCE: f64 = 0.01;

/// A body cannot sleep if its angular velocity is above this tolerance.
pub const ANGULAR_SLEEP_TOLERANCE: f64 = 2.0 / 180.0 * std::f64::consts::PI;

/// Condition number limit for the two-point block solver.
pub const MAX_CONDITION_NUMBER: f64 = 1000.0;

/// Runtime configuration of a [`World`][crate::World].
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct WorldSettings {
    /// Acceleration applied to every dynamic body, scaled by its gravity scale.
    #[cfg_attr(feature = "serde-types", serde(with = "m::serde_vec2"))]
    pub gravity: m::Vec2,
    /// Allow bodies to fall asleep when they come to rest.
    pub allow_sleep: bool,
    /// Reuse last step's impulses as the initial guess of the solver.
    pub warm_starting: bool,
    /// Run the time of impact pass after the discrete solve.
    pub continuous: bool,
    /// Solve two-point manifolds as a block instead of point by point.
    pub block_solve: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            gravity: m::Vec2::new(0.0, -9.81),
            allow_sleep: true,
            warm_starting: true,
            continuous: true,
            block_solve: true,
        }
    }
}

impl WorldSettings {
    pub fn with_gravity(mut self, gravity: m::Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_sleeping(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_warm_starting(mut self, enabled: bool) -> Self {
        self.warm_starting = enabled;
        self
    }

    pub fn with_continuous(mut self, enabled: bool) -> Self {
        self.continuous = enabled;
        self
    }

    pub fn with_block_solve(mut self, enabled: bool) -> Self {
        self.block_solve = enabled;
        self
    }
}

#[cfg(all(test, feature = "serde-types"))]
mod tests {
    use super::*;

    #[test]
    fn settings_from_ron_fill_defaults() {
        let settings: WorldSettings =
            ron::from_str("(gravity: (0.0, -3.0), allow_sleep: false, block_solve: false)")
                .unwrap();
        assert!(!settings.allow_sleep);
        assert!(!settings.block_solve);
        // unspecified fields come from Default
        assert!(settings.warm_starting);
        assert!(settings.continuous);
        assert_eq!(settings.gravity, m::Vec2::new(0.0, -3.0));
    }
}
