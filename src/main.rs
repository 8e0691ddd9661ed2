// Headless run: walk, jump, climb into a car and drive it

use std::error::Error;

use glam::Vec3;
use tracing::info;

use avatar_sim::physics::StaticCollider;
use avatar_sim::{logging, InputEvent, SimConfig, SimEvent, SimulationWorld, VehicleKind, WorldCommand};

const FRAME: f32 = 1.0 / 60.0;
const DURATION: f32 = 14.0;

/// Key presses (`true`) and releases at scripted times.
const SCRIPT: &[(f32, &str, bool)] = &[
    (0.5, "w", true),
    (1.5, "Shift", true),
    (2.2, " ", true),
    (2.3, " ", false),
    (3.0, "Shift", false),
    (3.2, "w", false),
    (5.0, "f", true),
    (5.1, "f", false),
    (8.0, "w", true),
    (9.0, "d", true),
    (10.0, "d", false),
    (11.0, "w", false),
    (11.0, " ", true),
    (12.0, " ", false),
    (12.2, "f", true),
    (12.3, "f", false),
];

fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let config = SimConfig::from_env()?;
    logging::init(&config.logging);

    let mut world = SimulationWorld::new(config)?;
    world.physics_mut().add_static(StaticCollider::ground(0.0));
    let player = world.spawn_character(Vec3::new(0.0, 0.57, 0.0))?;

    let mut script = SCRIPT.iter().peekable();
    let mut car_spawned = false;
    let mut time = 0.0;
    let mut next_report = 1.0;

    while time < DURATION {
        while let Some(&&(at, key, pressed)) = script.peek() {
            if at > time {
                break;
            }
            let event = if pressed { InputEvent::KeyDown(key.to_string()) } else { InputEvent::KeyUp(key.to_string()) };
            world.handle_input(&event);
            script.next();
        }

        // Park a car with its driver door next to wherever the walk ended.
        if !car_spawned && time >= 4.0 {
            let at = world.character(player).map_or(Vec3::ZERO, |c| c.position);
            world.enqueue(WorldCommand::SpawnVehicle {
                kind: VehicleKind::Car,
                position: Vec3::new(at.x, 0.8, at.z + 1.3),
                yaw: 0.0,
            });
            car_spawned = true;
        }

        world.frame(FRAME);
        time += FRAME;

        for event in world.drain_events() {
            match event {
                SimEvent::AnimationRequested { .. } => {}
                other => info!(?other, "event"),
            }
        }

        if time >= next_report {
            next_report += 1.0;
            if let Some(c) = world.character(player) {
                info!(
                    t = time,
                    state = ?c.state_id(),
                    x = c.position.x,
                    y = c.position.y,
                    z = c.position.z,
                    speed = c.velocity.length(),
                    "player"
                );
            }
        }
    }

    println!("{}", world.snapshot().to_json()?);
    Ok(())
}
