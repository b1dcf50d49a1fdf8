//! Islands are groups of awake bodies connected through touching contacts and joints.
//!
//! Each island copies what it needs out of the world into its own buffers,
//! so islands can be solved independently (and in parallel with the `parallel` feature)
//! and written back afterwards.

use super::{
    contact_solver::{ContactEntry, ContactSolver},
    Position, SolverBody, SolverData, TimeStep,
};
use crate::{
    body::{Body, BodyFlags, BodyKey, BodyType, Velocity},
    command::CommandBuffer,
    contact::{Contact, ContactFlags, ContactImpulse, ContactKey},
    fixture::{Fixture, FixtureKey},
    joint::{Joint, JointKey},
    listener::ContactListener,
    math::Vec2,
    settings::{
        WorldSettings, ANGULAR_SLEEP_TOLERANCE, LINEAR_SLEEP_TOLERANCE, MAX_ROTATION,
        MAX_ROTATION_SQUARED, MAX_TRANSLATION, MAX_TRANSLATION_SQUARED, TIME_TO_SLEEP,
    },
};

use itertools::izip;
use thunderdome as td;

/// Per-body inputs of velocity integration and the sleep timer.
#[derive(Clone, Copy, Debug)]
struct IslandBody {
    key: BodyKey,
    body_type: BodyType,
    force: Vec2,
    torque: f64,
    gravity_scale: f64,
    linear_damping: f64,
    angular_damping: f64,
    auto_sleep: bool,
    sleep_time: f64,
}

#[derive(Clone, Copy, Debug)]
struct IslandJoint {
    key: JointKey,
    joint: Joint,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug)]
pub(crate) struct Island {
    bodies: Vec<IslandBody>,
    solver_bodies: Vec<SolverBody>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    contacts: Vec<ContactEntry>,
    joints: Vec<IslandJoint>,
    impulses: Vec<ContactImpulse>,
    fall_asleep: bool,
}

impl Island {
    /// Keys of the bodies in this island, static ones included.
    pub fn body_keys(&self) -> impl '_ + Iterator<Item = BodyKey> {
        self.bodies.iter().map(|b| b.key)
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Whether the last solve put this island to sleep.
    #[inline]
    pub fn fell_asleep(&self) -> bool {
        self.fall_asleep
    }

    /// Copy the state of the given bodies, contacts and joints into a new island.
    /// Each body's `island_index` must already point at its position in `body_keys`.
    fn capture(
        body_keys: &[BodyKey],
        contact_keys: &[ContactKey],
        joint_keys: &[JointKey],
        bodies: &mut td::Arena<Body>,
        contacts: &td::Arena<Contact>,
        joints: &td::Arena<Joint>,
        fixtures: &td::Arena<Fixture>,
    ) -> Self {
        let mut island = Island {
            bodies: Vec::with_capacity(body_keys.len()),
            solver_bodies: Vec::with_capacity(body_keys.len()),
            positions: Vec::with_capacity(body_keys.len()),
            velocities: Vec::with_capacity(body_keys.len()),
            contacts: Vec::with_capacity(contact_keys.len()),
            joints: Vec::with_capacity(joint_keys.len()),
            impulses: Vec::new(),
            fall_asleep: false,
        };

        for &key in body_keys {
            let body = &mut bodies[key.0];
            // the step starts from here
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;

            island.bodies.push(IslandBody {
                key,
                body_type: body.body_type,
                force: body.force,
                torque: body.torque,
                gravity_scale: body.gravity_scale,
                linear_damping: body.linear_damping,
                angular_damping: body.angular_damping,
                auto_sleep: body.flags.contains(BodyFlags::AUTO_SLEEP),
                sleep_time: body.sleep_time,
            });
            island.solver_bodies.push(SolverBody {
                local_center: body.sweep.local_center,
                inv_mass: body.inv_mass(),
                inv_inertia: body.inv_inertia(),
            });
            island.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            island.velocities.push(body.velocity);
        }

        for &key in contact_keys {
            let contact = &contacts[key.0];
            let radius = |f: FixtureKey| {
                fixtures.get(f.0).map(|f| f.shape.radius()).unwrap_or(0.0)
            };
            island.contacts.push(ContactEntry {
                key,
                manifold: contact.manifold.clone(),
                friction: contact.friction,
                restitution: contact.restitution,
                threshold: contact.restitution_threshold,
                radius_a: radius(contact.fixture_a),
                radius_b: radius(contact.fixture_b),
                index_a: bodies[contact.body_a.0].island_index,
                index_b: bodies[contact.body_b.0].island_index,
            });
        }

        for &key in joint_keys {
            let joint = joints[key.0];
            island.joints.push(IslandJoint {
                key,
                joint,
                index_a: bodies[joint.body_a.0].island_index,
                index_b: bodies[joint.body_b.0].island_index,
            });
        }

        island
    }

    /// Integrate velocities, solve constraints and integrate positions.
    pub fn solve(&mut self, step: &TimeStep, settings: &WorldSettings) {
        let _span = tracy_span!("solve island", "solve");
        let h = step.dt;

        // integrate velocities
        for (ib, sb, vel) in izip!(&self.bodies, &self.solver_bodies, &mut self.velocities) {
            if ib.body_type != BodyType::Dynamic {
                continue;
            }
            vel.linear += h * (ib.gravity_scale * settings.gravity + sb.inv_mass * ib.force);
            vel.angular += h * sb.inv_inertia * ib.torque;

            // Pade approximation of exp(-damping * h), stable for large damping
            vel.linear *= 1.0 / (1.0 + h * ib.linear_damping);
            vel.angular *= 1.0 / (1.0 + h * ib.angular_damping);
        }

        let mut contact_solver =
            ContactSolver::new(step, &self.contacts, &self.solver_bodies, settings.block_solve);
        contact_solver.initialize_velocity_constraints(
            &self.contacts,
            &self.positions,
            &self.velocities,
        );
        if step.warm_starting {
            contact_solver.warm_start(&mut self.velocities);
        }

        let mut data = SolverData {
            step: *step,
            bodies: &self.solver_bodies,
            positions: &mut self.positions,
            velocities: &mut self.velocities,
        };

        for ij in &mut self.joints {
            ij.joint.init_velocity_constraints(ij.index_a, ij.index_b, &mut data);
        }

        for _ in 0..step.velocity_iterations {
            for ij in &mut self.joints {
                ij.joint.solve_velocity_constraints(&mut data);
            }
            contact_solver.solve_velocity_constraints(data.velocities);
        }

        // integrate positions, clamping large motions
        for (pos, vel) in izip!(data.positions.iter_mut(), data.velocities.iter_mut()) {
            let translation = h * vel.linear;
            if translation.mag_sq() > MAX_TRANSLATION_SQUARED {
                vel.linear *= MAX_TRANSLATION / translation.mag();
            }
            let rotation = h * vel.angular;
            if rotation * rotation > MAX_ROTATION_SQUARED {
                vel.angular *= MAX_ROTATION / rotation.abs();
            }
            pos.c += h * vel.linear;
            pos.a += h * vel.angular;
        }

        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_ok = contact_solver.solve_position_constraints(data.positions);
            let mut joints_ok = true;
            for ij in &mut self.joints {
                joints_ok &= ij.joint.solve_position_constraints(&mut data);
            }
            if contacts_ok && joints_ok {
                position_solved = true;
                break;
            }
        }

        self.impulses = contact_solver.impulses().collect();

        self.fall_asleep = false;
        if settings.allow_sleep {
            let mut min_sleep_time = f64::MAX;
            for (ib, vel) in izip!(&mut self.bodies, &self.velocities) {
                if ib.body_type == BodyType::Static {
                    continue;
                }
                if !ib.auto_sleep
                    || vel.angular * vel.angular > ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE
                    || vel.linear.mag_sq() > LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE
                {
                    ib.sleep_time = 0.0;
                    min_sleep_time = 0.0;
                } else {
                    ib.sleep_time += h;
                    min_sleep_time = min_sleep_time.min(ib.sleep_time);
                }
            }
            self.fall_asleep = min_sleep_time >= TIME_TO_SLEEP && position_solved;
        }
    }

    /// Copy the solved state back into the world and report impulses.
    pub fn write_back(
        &self,
        bodies: &mut td::Arena<Body>,
        contacts: &mut td::Arena<Contact>,
        joints: &mut td::Arena<Joint>,
        listener: &mut dyn ContactListener,
        commands: &mut CommandBuffer,
    ) {
        for (ib, pos, vel) in izip!(&self.bodies, &self.positions, &self.velocities) {
            let Some(body) = bodies.get_mut(ib.key.0) else {
                continue;
            };
            if body.body_type == BodyType::Static {
                continue;
            }
            body.sweep.c = pos.c;
            body.sweep.a = pos.a;
            body.velocity = *vel;
            body.sleep_time = ib.sleep_time;
            body.synchronize_transform();
            if self.fall_asleep {
                body.set_awake(false);
            }
        }

        for ij in &self.joints {
            if let Some(joint) = joints.get_mut(ij.key.0) {
                joint.kind = ij.joint.kind;
                joint.solver_bodies = ij.joint.solver_bodies;
            }
        }

        for (entry, impulse) in izip!(&self.contacts, &self.impulses) {
            let Some(contact) = contacts.get_mut(entry.key.0) else {
                continue;
            };
            for (i, point) in contact.manifold.points.iter_mut().enumerate() {
                point.normal_impulse = impulse.normal_impulses[i];
                point.tangent_impulse = impulse.tangent_impulses[i];
            }
            listener.post_solve(contact, impulse, commands);
        }
    }
}

/// Group awake bodies into islands with a depth-first search
/// over touching contacts and joints, seeded in arena order.
///
/// Static bodies are included in every island they touch
/// but don't connect islands together.
pub(crate) fn build_islands(
    bodies: &mut td::Arena<Body>,
    contacts: &mut td::Arena<Contact>,
    joints: &mut td::Arena<Joint>,
    fixtures: &td::Arena<Fixture>,
) -> Vec<Island> {
    let _span = tracy_span!("build islands", "build_islands");

    for (_, body) in bodies.iter_mut() {
        body.flags.remove(BodyFlags::ISLAND);
    }
    for (_, contact) in contacts.iter_mut() {
        contact.flags.remove(ContactFlags::ISLAND);
    }
    for (_, joint) in joints.iter_mut() {
        joint.in_island = false;
    }

    let seeds: Vec<td::Index> = bodies.iter().map(|(idx, _)| idx).collect();
    let mut islands = Vec::new();
    let mut stack: Vec<td::Index> = Vec::new();
    let mut body_keys: Vec<BodyKey> = Vec::new();
    let mut contact_keys: Vec<ContactKey> = Vec::new();
    let mut joint_keys: Vec<JointKey> = Vec::new();

    for seed in seeds {
        {
            let body = &bodies[seed];
            if body.flags.contains(BodyFlags::ISLAND)
                || !body.is_awake()
                || body.body_type == BodyType::Static
            {
                continue;
            }
        }

        body_keys.clear();
        contact_keys.clear();
        joint_keys.clear();

        stack.push(seed);
        bodies[seed].flags.insert(BodyFlags::ISLAND);

        while let Some(idx) = stack.pop() {
            let body = &mut bodies[idx];
            body.island_index = body_keys.len();
            body_keys.push(BodyKey(idx));
            // connected bodies may be asleep, the whole island wakes together
            body.set_awake(true);

            // static bodies don't propagate the island
            if body.body_type == BodyType::Static {
                continue;
            }

            for i in 0..bodies[idx].contacts.len() {
                let key = bodies[idx].contacts[i];
                let Some(contact) = contacts.get_mut(key.0) else {
                    continue;
                };
                if contact.flags.contains(ContactFlags::ISLAND)
                    || !contact.is_enabled()
                    || !contact.is_touching()
                    || contact.is_sensor()
                {
                    continue;
                }
                contact.flags.insert(ContactFlags::ISLAND);
                contact_keys.push(key);

                let other = if contact.body_a.0 == idx {
                    contact.body_b
                } else {
                    contact.body_a
                };
                let other_body = &mut bodies[other.0];
                if !other_body.flags.contains(BodyFlags::ISLAND) {
                    other_body.flags.insert(BodyFlags::ISLAND);
                    stack.push(other.0);
                }
            }

            for i in 0..bodies[idx].joints.len() {
                let key = bodies[idx].joints[i];
                let Some(joint) = joints.get_mut(key.0) else {
                    continue;
                };
                if joint.in_island {
                    continue;
                }
                joint.in_island = true;
                joint_keys.push(key);

                let other = joint.other_body(BodyKey(idx));
                let other_body = &mut bodies[other.0];
                if !other_body.flags.contains(BodyFlags::ISLAND) {
                    other_body.flags.insert(BodyFlags::ISLAND);
                    stack.push(other.0);
                }
            }
        }

        islands.push(Island::capture(
            &body_keys,
            &contact_keys,
            &joint_keys,
            bodies,
            contacts,
            joints,
            fixtures,
        ));

        // let static bodies take part in other islands
        for key in &body_keys {
            let body = &mut bodies[key.0];
            if body.body_type == BodyType::Static {
                body.flags.remove(BodyFlags::ISLAND);
            }
        }
    }

    log::trace!("built {} islands", islands.len());
    islands
}

/// Solve every island, in parallel if the `parallel` feature is enabled.
pub(crate) fn solve_islands(islands: &mut [Island], step: &TimeStep, settings: &WorldSettings) {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        islands
            .par_iter_mut()
            .for_each(|island| island.solve(step, settings));
    }
    #[cfg(not(feature = "parallel"))]
    {
        for island in islands.iter_mut() {
            island.solve(step, settings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        body::BodyDef,
        fixture::FixtureDef,
        shape::Circle,
    };

    fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    fn add_body(
        bodies: &mut td::Arena<Body>,
        fixtures: &mut td::Arena<Fixture>,
        def: BodyDef,
    ) -> BodyKey {
        let key = BodyKey(bodies.insert(Body::new(&def)));
        let fix = Fixture::new(key, &FixtureDef::with_density(Circle::new(0.5), 1.0));
        let fix_key = FixtureKey(fixtures.insert(fix));
        let body = &mut bodies[key.0];
        body.fixtures.push(fix_key);
        body.reset_mass_data(fixtures);
        key
    }

    #[test]
    fn free_bodies_form_separate_islands() {
        let mut bodies = td::Arena::new();
        let mut fixtures = td::Arena::new();
        let mut contacts = td::Arena::new();
        let mut joints = td::Arena::new();

        add_body(&mut bodies, &mut fixtures, BodyDef::new_dynamic());
        add_body(
            &mut bodies,
            &mut fixtures,
            BodyDef::new_dynamic().with_position(Vec2::new(5.0, 0.0)),
        );
        // static and sleeping bodies don't seed islands
        add_body(&mut bodies, &mut fixtures, BodyDef::new_static());
        add_body(
            &mut bodies,
            &mut fixtures,
            BodyDef::new_dynamic().with_awake(false),
        );

        let islands = build_islands(&mut bodies, &mut contacts, &mut joints, &fixtures);
        assert_eq!(islands.len(), 2);
        assert!(islands.iter().all(|i| i.body_count() == 1 && i.contact_count() == 0));
    }

    #[test]
    fn gravity_integrates_and_writes_back() {
        let mut bodies = td::Arena::new();
        let mut fixtures = td::Arena::new();
        let mut contacts = td::Arena::new();
        let mut joints = td::Arena::new();

        let key = add_body(&mut bodies, &mut fixtures, BodyDef::new_dynamic());
        let settings = WorldSettings::default().with_gravity(Vec2::new(0.0, -10.0));
        let step = step();

        let mut islands = build_islands(&mut bodies, &mut contacts, &mut joints, &fixtures);
        solve_islands(&mut islands, &step, &settings);
        let mut commands = CommandBuffer::default();
        for island in &islands {
            island.write_back(&mut bodies, &mut contacts, &mut joints, &mut (), &mut commands);
        }

        let body = &bodies[key.0];
        assert!((body.linear_velocity().y + 10.0 * step.dt).abs() < 1e-12);
        assert!((body.position().y + 10.0 * step.dt * step.dt).abs() < 1e-12);
        assert!(body.is_awake());
    }

    #[test]
    fn resting_island_falls_asleep_with_zero_velocity() {
        let mut bodies = td::Arena::new();
        let mut fixtures = td::Arena::new();
        let mut contacts = td::Arena::new();
        let mut joints = td::Arena::new();

        let key = add_body(&mut bodies, &mut fixtures, BodyDef::new_dynamic());
        let settings = WorldSettings::default().with_gravity(Vec2::zero());
        let step = step();
        let mut commands = CommandBuffer::default();

        for _ in 0..40 {
            let mut islands = build_islands(&mut bodies, &mut contacts, &mut joints, &fixtures);
            solve_islands(&mut islands, &step, &settings);
            for island in &islands {
                island.write_back(&mut bodies, &mut contacts, &mut joints, &mut (), &mut commands);
            }
        }

        let body = &bodies[key.0];
        assert!(!body.is_awake());
        assert_eq!(body.velocity(), Velocity::default());
    }
}
