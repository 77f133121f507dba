//! Headless demo: a few entities bouncing along one axis under a simulated
//! clock, with an expiring log collecting bounce events.
//!
//! Run with: `cargo run --example bouncing`

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use veld_engine::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut world = World::new();
    let position =
        world.register_component(ComponentDef::new("position", || json!({ "x": 0.0 })));
    let velocity =
        world.register_component(ComponentDef::new("velocity", || json!({ "dx": 60.0 })));

    world.on_spawn(|record| tracing::info!(id = %record.id(), "spawned"));

    for i in 0..3 {
        let e = world.spawn();
        world.add_component_with(e, position, json!({ "x": i as f64 * 25.0 }))?;
        world.add_component_with(e, velocity, json!({ "dx": 40.0 + i as f64 * 30.0 }))?;
    }

    let movables = world.query(QuerySpec::new().all([position, velocity]))?;
    let events = Rc::new(RefCell::new(ExpiringLog::with_max_lifetime(1.0)));

    let mut scheduler = Scheduler::new(world);

    let bounce_events = events.clone();
    scheduler.add_system(System::from_fn(move |world| {
        let delta = world.time.delta * 0.001;
        for id in movables.collect(world) {
            let x = world
                .component(id, position)
                .and_then(|c| c.field("x")?.as_f64())
                .unwrap_or(0.0);
            let dx = world
                .component(id, velocity)
                .and_then(|c| c.field("dx")?.as_f64())
                .unwrap_or(0.0);

            let mut next = x + dx * delta;
            if !(0.0..=100.0).contains(&next) {
                next = next.clamp(0.0, 100.0);
                world
                    .component_mut(id, velocity)
                    .expect("queried entity holds velocity")
                    .set_field("dx", json!(-dx));
                bounce_events
                    .borrow_mut()
                    .log(format!("entity {id} bounced at x={next:.1}"));
            }
            world
                .component_mut(id, position)
                .expect("queried entity holds position")
                .set_field("x", json!(next));
        }
    }));
    scheduler.add_system(System::from_object(events.clone()));

    scheduler.define_main(|world| {
        if world.time.elapsed > 3.0 {
            world.time.stop();
        }
    });

    let mut clock = SimulatedClock::new();
    scheduler.start_with(&mut clock);

    let world = scheduler.world();
    tracing::info!(
        elapsed = world.time.elapsed,
        fps = world.time.fps,
        "simulation finished"
    );
    for record in world.entities() {
        let x = world
            .component(record.id(), position)
            .and_then(|c| c.field("x")?.as_f64())
            .unwrap_or(0.0);
        tracing::info!(id = %record.id(), x, "final position");
    }
    for message in events.borrow().all() {
        tracing::info!(%message, "bounce");
    }
    Ok(())
}
