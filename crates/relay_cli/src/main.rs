use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use relay_core::{load_scene, MemoryGraph, Scene, SourceScene};
use relay_export::{ExportMode, ExportOptions, Exporter};
use relay_math::{normalize_steps, Cursor};

#[derive(Parser, Debug)]
#[command(name = "relay", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a scene file into an in-memory render graph.
    Export(ExportArgs),
    /// List the entities and placements of a scene file.
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input scene JSON.
    scene: PathBuf,

    /// Pass kind: final, interactive, bake, selection or swatch.
    #[arg(long, default_value = "final")]
    mode: ExportMode,

    /// Export at this frame instead of the scene's own.
    #[arg(long)]
    frame: Option<i32>,

    /// Options JSON; replaces the scene file's options block.
    #[arg(long)]
    options: Option<PathBuf>,

    /// Force motion blur on.
    #[arg(long, default_value_t = false)]
    motion_blur: bool,

    /// Transform samples per moving entity.
    #[arg(long)]
    segments: Option<u32>,

    /// Deformation samples per deforming entity.
    #[arg(long)]
    deform_segments: Option<u32>,

    /// Shutter angle in degrees.
    #[arg(long)]
    shutter_angle: Option<f32>,

    /// Print the graph hierarchy.
    #[arg(long, default_value_t = false)]
    outline: bool,

    /// Print the summary (and graph with --outline) as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Input scene JSON.
    scene: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
        Command::Inspect(args) => cmd_inspect(args),
    }
}

fn read_options(args: &ExportArgs, scene: &Scene) -> anyhow::Result<ExportOptions> {
    let mut options = match &args.options {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read options '{}'", path.display()))?;
            ExportOptions::from_json_str(&text)
                .with_context(|| format!("parse options '{}'", path.display()))?
        }
        None => match scene.options() {
            Some(value) => ExportOptions::from_value(value.clone()).context("parse scene options block")?,
            None => ExportOptions::default(),
        },
    };

    if args.motion_blur {
        options.motion_blur = true;
    }
    if let Some(segments) = args.segments {
        options.motion_segments = segments;
    }
    if let Some(segments) = args.deform_segments {
        options.deform_motion_segments = segments;
    }
    if let Some(angle) = args.shutter_angle {
        anyhow::ensure!(angle > 0.0 && angle <= 360.0, "shutter angle must be in (0, 360], got {angle}");
        options.shutter.angle = angle;
    }
    Ok(options)
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let mut scene =
        load_scene(&args.scene).with_context(|| format!("load scene '{}'", args.scene.display()))?;
    if let Some(frame) = args.frame {
        scene
            .set_cursor(Cursor::new(frame, 0.0))
            .with_context(|| format!("evaluate frame {frame}"))?;
    }
    let options = read_options(&args, &scene)?;
    log::debug!("Export options: {:?}", options);

    let mut graph = MemoryGraph::new();
    let mut exporter = Exporter::new(options).with_mode(args.mode);
    let summary = exporter
        .export(&mut scene, &mut graph)
        .with_context(|| format!("export '{}'", scene.name()))?;

    if args.json {
        let value = if args.outline {
            serde_json::json!({
                "summary": serde_json::to_value(&summary)?,
                "graph": serde_json::to_value(&graph)?,
            })
        } else {
            serde_json::to_value(&summary)?
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Scene: {} ({} pass)", scene.name(), summary.mode);
    println!("  Entities:         {}", summary.entities);
    println!("  Particle systems: {}", summary.particle_systems);
    println!("  Materials:        {}", summary.materials);
    println!("  Cameras:          {}", summary.cameras);
    println!("  Groups:           {}", summary.groups);
    println!("  Skipped:          {}", summary.skipped_placements);
    println!("  Graph nodes:      {}", graph.node_count());
    if !summary.motion_steps.is_empty() {
        let normalized = normalize_steps(&summary.motion_steps);
        println!("  Motion steps:     {:?} (normalized {:?})", summary.motion_steps, normalized);
        if !summary.motion_complete {
            println!("  Motion sampling stopped early; blur is partial");
        }
    }

    if args.outline {
        println!();
        print!("{}", graph.outline());
    }
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let scene =
        load_scene(&args.scene).with_context(|| format!("load scene '{}'", args.scene.display()))?;

    println!("Scene: {} at frame {}", scene.name(), scene.cursor().frame);
    for entity in scene.entities() {
        let flags = [
            (entity.is_transforming, "transforming"),
            (entity.is_deforming, "deforming"),
            (entity.is_instancer, "instancer"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(", ");
        println!("  {:?} {} [{}]", entity.kind, entity.name, flags);
    }
    println!("{} placements", scene.placements().len());
    Ok(())
}
