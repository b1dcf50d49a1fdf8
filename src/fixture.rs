use crate::{
    body::BodyKey,
    collision::{ProxyId, AABB},
    settings::VELOCITY_THRESHOLD,
    shape::Shape,
};

use thunderdome as td;

/// Key type to look up a fixture stored in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureKey(pub(crate) td::Index);

impl FixtureKey {
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

/// Collision filtering data.
///
/// Two fixtures in the same non-zero group always collide if the group is positive
/// and never collide if it's negative. Otherwise each fixture's category bits
/// must be included in the other's mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn with_category(mut self, bits: u16) -> Self {
        self.category_bits = bits;
        self
    }

    pub fn with_mask(mut self, bits: u16) -> Self {
        self.mask_bits = bits;
        self
    }

    pub fn with_group(mut self, group: i16) -> Self {
        self.group_index = group;
        self
    }

    /// The default collision rule between two filters.
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (self.category_bits & other.mask_bits) != 0
    }
}

/// Everything needed to attach a fixture to a body.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct FixtureDef {
    pub shape: Shape,
    /// Mass per unit area.
    #[cfg_attr(feature = "serde-types", serde(default))]
    pub density: f64,
    /// Coulomb friction coefficient, usually in `[0, 1]`.
    #[cfg_attr(feature = "serde-types", serde(default = "default_friction"))]
    pub friction: f64,
    /// Elasticity, usually in `[0, 1]`.
    #[cfg_attr(feature = "serde-types", serde(default))]
    pub restitution: f64,
    /// Relative speed above which collisions bounce.
    #[cfg_attr(feature = "serde-types", serde(default = "default_restitution_threshold"))]
    pub restitution_threshold: f64,
    #[cfg_attr(feature = "serde-types", serde(default))]
    pub filter: Filter,
    /// Sensors detect overlap but generate no collision response.
    #[cfg_attr(feature = "serde-types", serde(default))]
    pub is_sensor: bool,
    #[cfg_attr(feature = "serde-types", serde(default))]
    pub user_data: u64,
}

fn default_friction() -> f64 {
    0.2
}

fn default_restitution_threshold() -> f64 {
    VELOCITY_THRESHOLD
}

impl FixtureDef {
    /// A massless fixture with default material.
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            density: 0.0,
            friction: default_friction(),
            restitution: 0.0,
            restitution_threshold: default_restitution_threshold(),
            filter: Filter::default(),
            is_sensor: false,
            user_data: 0,
        }
    }

    /// A fixture with the given density and default material otherwise.
    pub fn with_density(shape: impl Into<Shape>, density: f64) -> Self {
        Self {
            density,
            ..Self::new(shape)
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_sensor(mut self, sensor: bool) -> Self {
        self.is_sensor = sensor;
        self
    }

    pub fn with_user_data(mut self, data: u64) -> Self {
        self.user_data = data;
        self
    }
}

/// What the broad-phase stores for each proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ProxyRef {
    pub fixture: FixtureKey,
    pub child: usize,
}

/// Broad-phase bookkeeping for one child primitive of a fixture.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FixtureProxy {
    pub aabb: AABB,
    pub child: usize,
    pub proxy_id: ProxyId,
}

/// A shape attached to a body, with material and filtering data.
#[derive(Clone, Debug)]
pub struct Fixture {
    pub(crate) body: BodyKey,
    pub(crate) shape: Shape,
    pub(crate) density: f64,
    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    pub(crate) restitution_threshold: f64,
    pub(crate) filter: Filter,
    pub(crate) is_sensor: bool,
    pub(crate) proxies: Vec<FixtureProxy>,
    pub user_data: u64,
}

impl Fixture {
    pub(crate) fn new(body: BodyKey, def: &FixtureDef) -> Self {
        Self {
            body,
            shape: def.shape.clone(),
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            restitution_threshold: def.restitution_threshold,
            filter: def.filter,
            is_sensor: def.is_sensor,
            proxies: Vec::new(),
            user_data: def.user_data,
        }
    }

    #[inline]
    pub fn body(&self) -> BodyKey {
        self.body
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn density(&self) -> f64 {
        self.density
    }

    #[inline]
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Changing friction doesn't affect existing contacts.
    pub fn set_friction(&mut self, friction: f64) {
        self.friction = friction;
    }

    #[inline]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    /// Changing restitution doesn't affect existing contacts.
    pub fn set_restitution(&mut self, restitution: f64) {
        self.restitution = restitution;
    }

    #[inline]
    pub fn filter(&self) -> Filter {
        self.filter
    }

    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    /// Fattened broad-phase AABB of a child, as of the last synchronization.
    pub fn aabb(&self, child: usize) -> Option<AABB> {
        self.proxies.iter().find(|p| p.child == child).map(|p| p.aabb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Circle;

    #[test]
    fn filter_rules() {
        let a = Filter::default();
        let b = Filter::default();
        assert!(a.should_collide(&b));

        // category not in mask
        let c = Filter::default().with_category(0x0002).with_mask(0x0002);
        assert!(!a.should_collide(&c));

        // shared positive group overrides masks
        let d = c.with_group(3);
        let e = Filter::default().with_group(3);
        assert!(d.should_collide(&e));

        // shared negative group never collides
        let f = Filter::default().with_group(-1);
        assert!(!f.should_collide(&f));

        // different groups fall back to the mask test
        let g = Filter::default().with_group(1);
        let h = Filter::default().with_group(2);
        assert!(g.should_collide(&h));
    }

    #[test]
    fn def_constructors() {
        let def = FixtureDef::with_density(Circle::new(0.5), 2.0);
        assert_eq!(def.density, 2.0);
        assert_eq!(def.friction, 0.2);
        assert!(!def.is_sensor);
        assert_eq!(FixtureDef::new(Circle::new(0.5)).density, 0.0);
    }

    #[cfg(feature = "serde-types")]
    #[test]
    fn def_from_ron() {
        let def: FixtureDef = ron::from_str(
            "(shape: Circle((center: (0.0, 0.0), radius: 0.5)), density: 3.0, filter: (group_index: -2))",
        )
        .unwrap();
        assert_eq!(def.density, 3.0);
        assert_eq!(def.friction, 0.2);
        assert_eq!(def.filter.group_index, -2);
        assert_eq!(def.filter.mask_bits, 0xFFFF);
        match def.shape {
            Shape::Circle(c) => assert_eq!(c.radius, 0.5),
            other => panic!("expected a circle, got {:?}", other),
        }
    }
}
