//! Offscreen Respawn demo
//!
//! Spins an observer in place above a populated field and logs the
//! lifecycle events it causes. Pass a JSON config path to override defaults.

#[cfg(not(target_arch = "wasm32"))]
use offscreen_respawn::FieldConfig;
#[cfg(not(target_arch = "wasm32"))]
use offscreen_respawn::sim::{
    Aabb, CompositionField, Decorator, EventKind, Observer, SpatialEntity, Transform, VisualPart,
};

/// Stacks of one to four crates per entity
#[cfg(not(target_arch = "wasm32"))]
struct CrateStacks;

#[cfg(not(target_arch = "wasm32"))]
impl Decorator for CrateStacks {
    type Payload = usize;

    fn decorate(&mut self, entity: &mut SpatialEntity) -> usize {
        use glam::Vec3;
        use rand::Rng;

        let height = entity.rng().random_range(1..=4usize);
        let parts = (0..height)
            .map(|level| {
                VisualPart::new(
                    Transform::from_translation(Vec3::new(0.0, level as f32 + 0.5, 0.0)),
                    Aabb::from_center_size(Vec3::ZERO, Vec3::ONE),
                )
            })
            .collect();
        entity.set_parts(parts);
        height
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use glam::Vec3;

    env_logger::init();
    log::info!("Offscreen Respawn (native) starting...");

    let config = match std::env::args().nth(1) {
        Some(path) => match FieldConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => FieldConfig::default(),
    };

    let seed = 0x5EED;
    let mut field = match CompositionField::new(config, CrateStacks, seed) {
        Ok(field) => field,
        Err(e) => {
            log::error!("Invalid config: {}", e);
            std::process::exit(1);
        }
    };

    let eye = Vec3::new(0.0, 10.0, 0.0);
    field.populate(&Observer::from_yaw_pitch(eye, 0.0, -10.0));

    // One full turn over ~12 seconds of 16 ms frames
    let (mut entered, mut exited, mut respawned) = (0usize, 0usize, 0usize);
    for frame in 0..750u32 {
        let now_ms = frame as f64 * 16.0;
        let yaw = frame as f32 * 0.48;
        let observer = Observer::from_yaw_pitch(eye, yaw, -10.0);

        for event in field.tick(now_ms, &observer) {
            match event.kind {
                EventKind::EnterView => entered += 1,
                EventKind::ExitView => exited += 1,
                EventKind::Respawned => respawned += 1,
            }
        }
    }

    let crates: usize = field.iter().map(|c| *c.payload()).sum();
    log::info!(
        "{} entities, {} crates: {} entered, {} exited, {} respawned",
        field.len(),
        crates,
        entered,
        exited,
        respawned
    );
}

#[cfg(target_arch = "wasm32")]
fn main() {}
