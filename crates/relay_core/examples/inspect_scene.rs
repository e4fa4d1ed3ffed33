//! Example: Load and inspect a JSON scene file.
//!
//! Run with: cargo run --example inspect_scene -- assets/turntable.json

use std::env;

use relay_core::{load_scene, SourceScene};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: inspect_scene <path-to-scene-json>");
        println!("\nExamples:");
        println!("  cargo run --example inspect_scene -- assets/turntable.json");
        return;
    }

    let path = &args[1];
    println!("Loading scene file: {}", path);

    match load_scene(path) {
        Ok(scene) => {
            let cursor = scene.cursor();
            println!("\n=== Scene: {} (frame {}) ===", scene.name(), cursor.frame);
            println!("Entities: {}", scene.entities().len());
            println!("Placements: {}", scene.placements().len());
            println!("Materials: {}", scene.materials().len());

            println!("\n--- Entities ---");
            for entity in scene.entities() {
                let pos = entity.matrix_world.transform_point3(relay_math::Vec3::ZERO);
                println!(
                    "  [{}] {} {:?} at ({:.2}, {:.2}, {:.2})",
                    entity.id, entity.name, entity.kind, pos.x, pos.y, pos.z
                );
                if entity.is_transforming || entity.is_deforming {
                    println!(
                        "       transforming: {}, deforming: {}",
                        entity.is_transforming, entity.is_deforming
                    );
                }
                for psys in &entity.particle_systems {
                    println!("       particles '{}': {} points", psys.name, psys.points.len());
                }
            }

            let instanced = scene.placements().iter().filter(|p| p.is_instance).count();
            println!("\n--- Placements ---");
            println!("  Direct: {}", scene.placements().len() - instanced);
            println!("  Instanced: {}", instanced);

            if let Some(camera) = scene.active_camera().and_then(|id| scene.entity(id)) {
                println!("\nCamera: {}", camera.name);
            }
        }
        Err(e) => {
            eprintln!("Error loading scene file: {}", e);
        }
    }
}
