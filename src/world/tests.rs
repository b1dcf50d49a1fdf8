use super::*;
use crate::{
    joint::{MouseJointDef, PrismaticJointDef, RevoluteJointDef},
    listener::CollisionCandidate,
    shape::{Circle, Edge, Polygon},
};

use itertools::assert_equal;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

const DT: f64 = 1.0 / 60.0;

fn zero_gravity() -> World {
    World::new(WorldSettings::default().with_gravity(Vec2::zero()))
}

fn add_ground(world: &mut World) -> BodyKey {
    let ground = world.create_body(&BodyDef::new_static()).unwrap();
    let shape = Polygon::new_box(20.0, 0.5).unwrap();
    world
        .create_fixture(ground, &FixtureDef::new(shape))
        .unwrap();
    ground
}

fn add_circle(world: &mut World, position: Vec2, radius: f64) -> (BodyKey, FixtureKey) {
    let body = world
        .create_body(&BodyDef::new_dynamic().with_position(position))
        .unwrap();
    let fixture = world
        .create_fixture(body, &FixtureDef::with_density(Circle::new(radius), 1.0))
        .unwrap();
    (body, fixture)
}

fn add_box(world: &mut World, def: BodyDef, hw: f64, hh: f64) -> (BodyKey, FixtureKey) {
    let body = world.create_body(&def).unwrap();
    let shape = Polygon::new_box(hw, hh).unwrap();
    let fixture = world
        .create_fixture(body, &FixtureDef::with_density(shape, 1.0))
        .unwrap();
    (body, fixture)
}

#[derive(Default)]
struct Counts {
    begin: AtomicUsize,
    end: AtomicUsize,
    goodbye_joint: AtomicUsize,
    goodbye_fixture: AtomicUsize,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Counts>);

impl ContactListener for Recorder {
    fn begin_contact(&mut self, _contact: &Contact, _commands: &mut CommandBuffer) {
        self.0.begin.fetch_add(1, Ordering::Relaxed);
    }

    fn end_contact(&mut self, _contact: &Contact, _commands: &mut CommandBuffer) {
        self.0.end.fetch_add(1, Ordering::Relaxed);
    }
}

impl DestructionListener for Recorder {
    fn say_goodbye_joint(&mut self, _joint: JointKey) {
        self.0.goodbye_joint.fetch_add(1, Ordering::Relaxed);
    }

    fn say_goodbye_fixture(&mut self, _fixture: FixtureKey) {
        self.0.goodbye_fixture.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn overlapping_circles_touch_at_one_point() {
    let mut world = zero_gravity();
    add_circle(&mut world, Vec2::new(0.0, 0.0), 1.0);
    add_circle(&mut world, Vec2::new(1.5, 0.0), 1.0);

    // a zero timestep updates contacts without moving anything
    world.step(0.0, 8, 3);

    assert_eq!(world.contact_count(), 1);
    let contact = world.contacts().next().unwrap();
    assert!(contact.is_touching());
    let wm = contact.world_manifold();
    assert_eq!(wm.point_count, 1);
    assert!((wm.separations[0] + 0.5).abs() < 1e-9);
    assert!(wm.normal.y.abs() < 1e-12);
    assert!((wm.normal.x.abs() - 1.0).abs() < 1e-12);
    assert!(wm.points[0].y.abs() < 1e-12);
}

#[test]
fn disjoint_fixtures_have_no_points() {
    let mut world = zero_gravity();
    // close enough for the fat boxes to overlap, far enough not to touch
    add_circle(&mut world, Vec2::new(0.0, 0.0), 1.0);
    add_circle(&mut world, Vec2::new(2.1, 0.0), 1.0);

    world.step(0.0, 8, 3);

    assert_eq!(world.contact_count(), 1);
    let contact = world.contacts().next().unwrap();
    assert!(!contact.is_touching());
    assert_eq!(contact.manifold().point_count(), 0);
}

#[test]
fn set_transform_reads_back_exactly() {
    let mut world = World::default();
    let (body, _) = add_circle(&mut world, Vec2::zero(), 0.5);

    let position = Vec2::new(1.25, -3.1);
    let angle = 0.7;
    world.set_transform(body, position, angle).unwrap();
    assert_eq!(world.body(body).unwrap().transform(), (position, angle));

    world.set_position(body, Vec2::new(4.0, 2.0)).unwrap();
    assert_eq!(
        world.body(body).unwrap().transform(),
        (Vec2::new(4.0, 2.0), angle)
    );
}

#[test]
fn resting_box_falls_asleep_with_zero_velocity() {
    let mut world = World::default();
    add_ground(&mut world);
    let (body, _) = add_box(
        &mut world,
        BodyDef::new_dynamic().with_position(Vec2::new(0.0, 1.0)),
        0.5,
        0.5,
    );

    for _ in 0..300 {
        world.step(DT, 8, 3);
        if !world.body(body).unwrap().is_awake() {
            break;
        }
    }

    let asleep = world.body(body).unwrap();
    assert!(!asleep.is_awake());
    assert_eq!(asleep.linear_velocity(), Vec2::zero());
    assert_eq!(asleep.angular_velocity(), 0.0);
    assert!((asleep.position().y - 1.0).abs() < 0.05);
    let rest = asleep.transform();

    // gravity keeps pulling but nothing moves until something wakes it
    for _ in 0..120 {
        world.step(DT, 8, 3);
        let b = world.body(body).unwrap();
        assert!(!b.is_awake());
        assert_eq!(b.linear_velocity(), Vec2::zero());
        assert_eq!(b.angular_velocity(), 0.0);
        assert_eq!(b.transform(), rest);
    }
}

#[test]
fn applying_force_wakes_sleeping_body() {
    let mut world = zero_gravity();
    let (body, _) = add_circle(&mut world, Vec2::zero(), 0.5);
    world.set_awake(body, false).unwrap();
    assert!(!world.body(body).unwrap().is_awake());

    world
        .apply_force_to_center(body, Vec2::new(10.0, 0.0))
        .unwrap();
    assert!(world.body(body).unwrap().is_awake());

    world.step(DT, 8, 3);
    assert!(world.body(body).unwrap().linear_velocity().x > 0.0);
}

#[test]
fn fast_bullet_does_not_tunnel_through_thin_wall() {
    let mut world = zero_gravity();
    let wall = world
        .create_body(&BodyDef::new_static().with_position(Vec2::new(5.0, 0.0)))
        .unwrap();
    world
        .create_fixture(wall, &FixtureDef::new(Polygon::new_box(0.05, 5.0).unwrap()))
        .unwrap();

    let bullet = world
        .create_body(
            &BodyDef::new_dynamic()
                .with_bullet(true)
                .with_velocity(Vec2::new(100.0, 0.0), 0.0),
        )
        .unwrap();
    world
        .create_fixture(bullet, &FixtureDef::with_density(Circle::new(0.1), 1.0))
        .unwrap();

    for _ in 0..60 {
        world.step(DT, 8, 3);
    }

    let x = world.body(bullet).unwrap().position().x;
    assert!(x < 5.0, "bullet passed through the wall to x = {}", x);
}

#[test]
fn small_circle_falling_fast_lands_on_floor() {
    let mut world = World::default();
    add_ground(&mut world);
    // by impact it moves several diameters per step
    let (ball, _) = add_circle(&mut world, Vec2::new(0.0, 50.0), 0.05);

    let mut fastest: f64 = 0.0;
    for _ in 0..600 {
        world.step(DT, 8, 3);
        let body = world.body(ball).unwrap();
        fastest = fastest.max(body.linear_velocity().mag() * DT);
        assert!(
            body.position().y > 0.5,
            "circle passed into the floor at y = {}",
            body.position().y
        );
    }
    assert!(fastest > 0.4, "only moved {} per step", fastest);

    let body = world.body(ball).unwrap();
    assert!((body.position().y - 0.55).abs() < 0.03, "y = {}", body.position().y);
    assert!(body.linear_velocity().mag() < 0.1);
}

#[test]
fn destroying_body_cascades_and_notifies_once() {
    let mut world = zero_gravity();
    let recorder = Recorder::default();
    world.set_destruction_listener(recorder.clone());
    world.set_contact_listener(recorder.clone());

    let ground = add_ground(&mut world);
    let (body, first) = add_circle(&mut world, Vec2::new(0.0, 1.2), 0.5);
    let second = world
        .create_fixture(
            body,
            &FixtureDef::new(Circle::new(0.25).with_center(Vec2::new(0.5, 0.0))),
        )
        .unwrap();
    world
        .create_joint(
            &RevoluteJointDef::new(ground, body, Vec2::new(0.0, 1.2), Vec2::zero())
                .with_collide_connected(true)
                .into(),
        )
        .unwrap();

    world.step(DT, 8, 3);
    let area = AABB::new(Vec2::new(-2.0, -2.0), Vec2::new(2.0, 3.0));
    let found = world.query_aabb(&area);
    assert!(found.contains(&first) && found.contains(&second));

    world.destroy_body(body).unwrap();

    assert_eq!(recorder.0.goodbye_joint.load(Ordering::Relaxed), 1);
    assert_eq!(recorder.0.goodbye_fixture.load(Ordering::Relaxed), 2);
    assert_eq!(
        recorder.0.begin.load(Ordering::Relaxed),
        recorder.0.end.load(Ordering::Relaxed)
    );
    assert_eq!(world.joint_count(), 0);
    assert_eq!(world.contact_count(), 0);
    assert_eq!(world.fixture_count(), 1);
    let found = world.query_aabb(&area);
    assert!(!found.contains(&first) && !found.contains(&second));
    assert_eq!(world.query_point(Vec2::new(0.0, 1.2)), vec![]);

    assert_eq!(
        world.destroy_body(body),
        Err(PhysicsError::DanglingHandle(HandleKind::Body))
    );
}

#[test]
fn explicit_destruction_is_not_reported() {
    let mut world = zero_gravity();
    let recorder = Recorder::default();
    world.set_destruction_listener(recorder.clone());

    let (body, fixture) = add_circle(&mut world, Vec2::zero(), 0.5);
    world.destroy_fixture(fixture).unwrap();
    world.destroy_body(body).unwrap();

    assert_eq!(recorder.0.goodbye_fixture.load(Ordering::Relaxed), 0);
    assert_eq!(world.body_count(), 0);
    assert_eq!(world.proxy_count(), 0);
}

fn pyramid_run() -> Vec<(u64, u64, u64)> {
    let mut world = World::default();
    add_ground(&mut world);
    let mut bodies = Vec::new();
    for row in 0..5 {
        for col in 0..(5 - row) {
            let x = col as f64 * 1.05 - (5 - row) as f64 * 0.5;
            let y = 1.0 + row as f64 * 1.02;
            let (body, _) = add_box(
                &mut world,
                BodyDef::new_dynamic().with_position(Vec2::new(x, y)),
                0.5,
                0.5,
            );
            bodies.push(body);
        }
    }
    let (ball, _) = add_circle(&mut world, Vec2::new(-8.0, 2.0), 0.4);
    world.set_linear_velocity(ball, Vec2::new(30.0, 0.0)).unwrap();

    for _ in 0..120 {
        world.step(DT, 8, 3);
    }

    bodies
        .iter()
        .chain(std::iter::once(&ball))
        .map(|key| {
            let (p, a) = world.body(*key).unwrap().transform();
            (p.x.to_bits(), p.y.to_bits(), a.to_bits())
        })
        .collect()
}

#[test]
fn identical_runs_are_bit_identical() {
    assert_eq!(pyramid_run(), pyramid_run());
}

#[test]
fn ray_hits_come_nearest_first() {
    let mut world = zero_gravity();
    let mut fixtures = Vec::new();
    // created out of order so that tree order differs from distance order
    for x in [8.0, 2.0, 5.0] {
        let (_, fixture) = add_box(
            &mut world,
            BodyDef::new_static().with_position(Vec2::new(x, 0.0)),
            0.5,
            0.5,
        );
        fixtures.push((x, fixture));
    }
    fixtures.sort_by(|a, b| a.0.total_cmp(&b.0));

    let hits: Vec<RayHit> = world
        .ray_cast(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0))
        .collect();
    assert_equal(hits.iter().map(|h| h.fixture), fixtures.iter().map(|f| f.1));
    assert!(hits.windows(2).all(|w| w[0].fraction <= w[1].fraction));

    let first = hits[0];
    assert!((first.fraction - 0.15).abs() < 1e-9);
    assert!((first.point - Vec2::new(1.5, 0.0)).mag() < 1e-9);
    assert!((first.normal - Vec2::new(-1.0, 0.0)).mag() < 1e-9);

    // stopping early is just dropping the iterator
    let nearest = world
        .ray_cast(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0))
        .next()
        .map(|h| h.fixture);
    assert_eq!(nearest, Some(fixtures[0].1));

    // a ray that stops short doesn't report what's beyond it
    assert_eq!(
        world
            .ray_cast(Vec2::new(0.0, 0.0), Vec2::new(3.0, 0.0))
            .count(),
        1
    );
}

#[test]
fn edges_can_be_hit_by_rays_and_circles() {
    let mut world = World::default();
    let ground = world.create_body(&BodyDef::new_static()).unwrap();
    let edge = world
        .create_fixture(
            ground,
            &FixtureDef::new(Edge::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0))),
        )
        .unwrap();
    let (ball, _) = add_circle(&mut world, Vec2::new(0.0, 2.0), 0.5);

    let hit = world
        .ray_cast(Vec2::new(1.0, 1.0), Vec2::new(1.0, -1.0))
        .next()
        .unwrap();
    assert_eq!(hit.fixture, edge);
    assert!((hit.fraction - 0.5).abs() < 1e-9);

    for _ in 0..120 {
        world.step(DT, 8, 3);
    }
    let y = world.body(ball).unwrap().position().y;
    assert!(y > 0.4 && y < 0.6, "ball ended at y = {}", y);
}

#[test]
fn definitions_load_from_ron() {
    let body_def: BodyDef =
        ron::from_str("(body_type: Dynamic, position: (0.0, 3.0), angle: 0.25)").unwrap();
    let fixture_def: FixtureDef = ron::from_str(
        "(shape: Circle((center: (0.0, 0.0), radius: 0.5)), density: 2.0, friction: 0.4)",
    )
    .unwrap();

    let mut world = World::default();
    let body = world.create_body(&body_def).unwrap();
    let fixture = world.create_fixture(body, &fixture_def).unwrap();

    let body = world.body(body).unwrap();
    assert_eq!(body.body_type(), BodyType::Dynamic);
    assert_eq!(body.transform(), (Vec2::new(0.0, 3.0), 0.25));
    let expected_mass = 2.0 * std::f64::consts::PI * 0.25;
    assert!((body.mass() - expected_mass).abs() < 1e-9);
    assert_eq!(world.fixture(fixture).unwrap().friction(), 0.4);
}

#[test]
fn invalid_input_is_rejected_where_it_enters() {
    let mut world = World::default();
    let (body, fixture) = add_circle(&mut world, Vec2::zero(), 0.5);
    let other = world.create_body(&BodyDef::new_static()).unwrap();

    assert_eq!(
        world.create_fixture(body, &FixtureDef::with_density(Circle::new(0.5), -1.0)),
        Err(PhysicsError::InvalidMass { density: -1.0 })
    );
    assert!(matches!(
        world.create_fixture(body, &FixtureDef::new(Circle::new(0.0))),
        Err(PhysicsError::InvalidGeometry(_))
    ));
    assert!(matches!(
        Polygon::new(&[Vec2::zero(), Vec2::unit_x()]),
        Err(PhysicsError::InvalidGeometry(_))
    ));
    assert_eq!(
        world.set_transform(body, Vec2::new(f64::NAN, 0.0), 0.0),
        Err(PhysicsError::InvalidTransform)
    );
    assert_eq!(
        world.create_body(&BodyDef::new_dynamic().with_angle(f64::INFINITY)),
        Err(PhysicsError::InvalidTransform)
    );
    assert!(matches!(
        world.create_joint(&RevoluteJointDef::new(body, body, Vec2::zero(), Vec2::zero()).into()),
        Err(PhysicsError::IncompatibleJoint(_))
    ));
    assert!(matches!(
        world.create_joint(&MouseJointDef::new(body, other, Vec2::zero()).into()),
        Err(PhysicsError::IncompatibleJoint(_))
    ));

    world.destroy_fixture(fixture).unwrap();
    assert_eq!(
        world.destroy_fixture(fixture),
        Err(PhysicsError::DanglingHandle(HandleKind::Fixture))
    );
    world.destroy_body(other).unwrap();
    assert_eq!(
        world.create_joint(&MouseJointDef::new(other, body, Vec2::zero()).into()),
        Err(PhysicsError::DanglingHandle(HandleKind::Body))
    );

    // rejected calls leave the world as it was
    assert_eq!(world.body_count(), 1);
    assert_eq!(world.fixture_count(), 0);
    assert_eq!(world.joint_count(), 0);
}

#[test]
fn body_setters_reject_destroyed_bodies() {
    let mut world = World::default();
    let (body, _) = add_circle(&mut world, Vec2::zero(), 0.5);
    world.destroy_body(body).unwrap();

    let dangling = Err(PhysicsError::DanglingHandle(HandleKind::Body));
    assert_eq!(world.set_transform(body, Vec2::unit_x(), 0.0), dangling);
    assert_eq!(world.set_position(body, Vec2::unit_x()), dangling);
    assert_eq!(world.set_awake(body, true), dangling);
    assert_eq!(world.set_bullet(body, true), dangling);
    assert_eq!(world.set_fixed_rotation(body, true), dangling);
    assert_eq!(world.set_body_type(body, BodyType::Static), dangling);
    assert_eq!(
        world.set_mass_data(
            body,
            MassData {
                mass: 2.0,
                center: Vec2::zero(),
                inertia: 1.0,
            },
        ),
        dangling
    );
    assert_eq!(world.reset_mass_data(body), dangling);
    assert_eq!(world.apply_torque(body, 1.0), dangling);
    assert_eq!(world.body_count(), 0);
}

#[test]
fn invalid_timestep_is_skipped() {
    let mut world = World::default();
    let (body, _) = add_circle(&mut world, Vec2::new(0.0, 5.0), 0.5);
    world.step(f64::NAN, 8, 3);
    world.step(-DT, 8, 3);
    assert_eq!(world.body(body).unwrap().position(), Vec2::new(0.0, 5.0));
}

#[test]
fn revolute_pendulum_keeps_its_length() {
    let mut world = World::default();
    let pivot = world.create_body(&BodyDef::new_static()).unwrap();
    let (bob, _) = add_circle(&mut world, Vec2::new(2.0, 0.0), 0.25);
    let joint = world
        .create_joint(&RevoluteJointDef::new(pivot, bob, Vec2::zero(), Vec2::new(-2.0, 0.0)).into())
        .unwrap();

    let mut lowest: f64 = 0.0;
    for _ in 0..120 {
        world.step(DT, 8, 3);
        let p = world.body(bob).unwrap().position();
        assert!((p.mag() - 2.0).abs() < 0.05, "pendulum stretched to {}", p.mag());
        lowest = lowest.min(p.y);
    }
    assert!(lowest < -1.9);
    assert!(world.joint(joint).unwrap().reaction_force(1.0 / DT).mag() > 0.0);
}

#[test]
fn prismatic_limit_stops_slider() {
    let mut world = zero_gravity();
    let ground = world.create_body(&BodyDef::new_static()).unwrap();
    let (slider, _) = add_box(
        &mut world,
        BodyDef::new_dynamic().with_velocity(Vec2::new(5.0, 1.0), 0.0),
        0.25,
        0.25,
    );
    world
        .create_joint(
            &PrismaticJointDef::new(ground, slider, Vec2::zero(), Vec2::zero(), Vec2::unit_x())
                .with_limits(-1.0, 1.0)
                .into(),
        )
        .unwrap();

    for _ in 0..60 {
        world.step(DT, 8, 3);
    }
    let body = world.body(slider).unwrap();
    assert!(body.position().x <= 1.0 + 0.05);
    assert!(body.position().y.abs() < 0.05);
    assert!(body.angle().abs() < 0.05);
}

#[test]
fn mouse_joint_drags_body_to_target() {
    let mut world = zero_gravity();
    let ground = world.create_body(&BodyDef::new_static()).unwrap();
    let (body, _) = add_circle(&mut world, Vec2::zero(), 0.5);
    let joint = world
        .create_joint(&MouseJointDef::new(ground, body, Vec2::zero()).into())
        .unwrap();

    if let JointKind::Mouse(mouse) = world.joint_mut(joint).unwrap().kind_mut() {
        mouse.set_target(Vec2::new(3.0, 0.0));
    }
    for _ in 0..180 {
        world.step(DT, 8, 3);
    }
    let p = world.body(body).unwrap().position();
    assert!((p - Vec2::new(3.0, 0.0)).mag() < 0.1, "body ended at {:?}", p);
}

#[test]
fn joint_without_collide_connected_filters_contacts() {
    let mut world = zero_gravity();
    let (a, _) = add_circle(&mut world, Vec2::zero(), 1.0);
    let (b, _) = add_circle(&mut world, Vec2::new(1.0, 0.0), 1.0);
    world.step(0.0, 8, 3);
    assert_eq!(world.contact_count(), 1);

    let joint = world
        .create_joint(&RevoluteJointDef::new(a, b, Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0)).into())
        .unwrap();
    world.step(0.0, 8, 3);
    assert_eq!(world.contact_count(), 0);

    world.destroy_joint(joint).unwrap();
    world.step(0.0, 8, 3);
    assert_eq!(world.contact_count(), 1);
}

#[test]
fn custom_filter_rejects_pairs() {
    struct NoneCollide;
    impl ContactFilter for NoneCollide {
        fn should_collide(&mut self, _candidate: &CollisionCandidate) -> bool {
            false
        }
    }

    let mut world = zero_gravity();
    world.set_contact_filter(NoneCollide);
    add_circle(&mut world, Vec2::zero(), 1.0);
    add_circle(&mut world, Vec2::new(1.0, 0.0), 1.0);
    world.step(DT, 8, 3);
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn permissive_filter_never_pairs_bodies_without_a_dynamic_one() {
    struct AllCollide;
    impl ContactFilter for AllCollide {
        fn should_collide(&mut self, _candidate: &CollisionCandidate) -> bool {
            true
        }
    }

    let mut world = World::default();
    world.set_contact_filter(AllCollide);
    let recorder = Recorder::default();
    world.set_contact_listener(recorder.clone());

    add_ground(&mut world);
    let second_ground = world
        .create_body(&BodyDef::new_static().with_position(Vec2::new(1.0, 0.0)))
        .unwrap();
    world
        .create_fixture(
            second_ground,
            &FixtureDef::new(Polygon::new_box(20.0, 0.5).unwrap()),
        )
        .unwrap();
    add_box(
        &mut world,
        BodyDef::new_kinematic()
            .with_position(Vec2::new(5.0, 0.5))
            .with_velocity(Vec2::new(1.0, 0.0), 0.0),
        0.5,
        0.5,
    );
    let (ball, _) = add_circle(&mut world, Vec2::new(-15.0, 0.9), 0.5);

    for _ in 0..3 {
        world.step(DT, 8, 3);
    }

    // only the ball against each ground
    assert_eq!(world.contact_count(), 2);
    assert!(world
        .contacts()
        .all(|c| c.body_a() == ball || c.body_b() == ball));
    assert_eq!(recorder.0.begin.load(Ordering::Relaxed), 2);
}

#[test]
fn sensors_report_overlap_without_pushing() {
    let mut world = zero_gravity();
    let recorder = Recorder::default();
    world.set_contact_listener(recorder.clone());

    let (_, sensor) = add_circle(&mut world, Vec2::zero(), 1.0);
    world.set_sensor(sensor, true).unwrap();
    let (other, _) = add_circle(&mut world, Vec2::new(1.0, 0.0), 1.0);

    world.step(DT, 8, 3);
    assert_eq!(recorder.0.begin.load(Ordering::Relaxed), 1);
    assert_eq!(world.body(other).unwrap().linear_velocity(), Vec2::zero());
}

#[test]
fn listener_commands_apply_after_step() {
    struct DestroyOnTouch {
        target: BodyKey,
    }
    impl ContactListener for DestroyOnTouch {
        fn begin_contact(&mut self, contact: &Contact, commands: &mut CommandBuffer) {
            if contact.body_a() == self.target || contact.body_b() == self.target {
                commands.destroy_body(self.target);
                // the second one has nothing left to destroy and is dropped
                commands.destroy_body(self.target);
            }
        }
    }

    let mut world = World::default();
    add_ground(&mut world);
    let (ball, _) = add_circle(&mut world, Vec2::new(0.0, 0.9), 0.5);
    world.set_contact_listener(DestroyOnTouch { target: ball });

    world.step(DT, 8, 3);
    assert!(world.body(ball).is_none());
    assert_eq!(world.body_count(), 1);
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn body_type_change_recomputes_mass_and_contacts() {
    let mut world = World::default();
    add_ground(&mut world);
    let (body, _) = add_box(
        &mut world,
        BodyDef::new_static().with_position(Vec2::new(0.0, 0.9)),
        0.5,
        0.5,
    );
    world.step(DT, 8, 3);
    assert_eq!(world.contact_count(), 0);
    assert_eq!(world.body(body).unwrap().mass(), 0.0);

    world.set_body_type(body, BodyType::Dynamic).unwrap();
    assert!((world.body(body).unwrap().mass() - 1.0).abs() < 1e-9);
    assert!(world.body(body).unwrap().is_awake());
    world.step(DT, 8, 3);
    assert_eq!(world.contact_count(), 1);

    world
        .set_mass_data(
            body,
            MassData {
                mass: 4.0,
                center: Vec2::zero(),
                inertia: 1.0,
            },
        )
        .unwrap();
    assert_eq!(world.body(body).unwrap().mass(), 4.0);
    world.reset_mass_data(body).unwrap();
    assert!((world.body(body).unwrap().mass() - 1.0).abs() < 1e-9);
}

#[test]
fn debug_draw_follows_flags() {
    #[derive(Default)]
    struct Tally {
        polygons: usize,
        segments: usize,
        transforms: usize,
    }
    impl DebugDraw for Tally {
        fn draw_solid_polygon(&mut self, _vertices: &[Vec2], _color: dd::Color) {
            self.polygons += 1;
        }
        fn draw_segment(&mut self, _p1: Vec2, _p2: Vec2, _color: dd::Color) {
            self.segments += 1;
        }
        fn draw_transform(&mut self, _pose: &Pose) {
            self.transforms += 1;
        }
    }

    let mut world = World::default();
    let ground = add_ground(&mut world);
    let (body, _) = add_box(
        &mut world,
        BodyDef::new_dynamic().with_position(Vec2::new(0.0, 3.0)),
        0.5,
        0.5,
    );
    world
        .create_joint(&RevoluteJointDef::new(ground, body, Vec2::new(0.0, 3.0), Vec2::zero()).into())
        .unwrap();

    let mut tally = Tally::default();
    world.debug_draw(&mut tally);
    assert_eq!(tally.polygons, 2);
    assert_eq!(tally.segments, 3);
    assert_eq!(tally.transforms, 0);

    world.set_flags(DrawFlags::CENTER_OF_MASS);
    let mut tally = Tally::default();
    world.debug_draw(&mut tally);
    assert_eq!((tally.polygons, tally.segments, tally.transforms), (0, 0, 2));

    world.append_flags(DrawFlags::SHAPES);
    world.clear_flags(DrawFlags::CENTER_OF_MASS);
    assert_eq!(world.flags(), DrawFlags::SHAPES);
}
