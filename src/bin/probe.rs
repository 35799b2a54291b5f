// uniplex-probe: list, inspect and bind input devices without a GPU.
//
// `run` drives the full binding runtime against the headless renderer and prints what the
// program would have received.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uniplex::backends::linux::EvdevDevice;
use uniplex::headless::Upload;
use uniplex::logger::describe_event;
use uniplex::{
    backends, classify, Config, DeviceError, DeviceMeta, FrameHooks, HeadlessRenderer, InputManager,
    RawDevice, Renderer,
};

#[derive(Parser, Debug)]
#[command(name = "uniplex-probe", about = "Inspect and bind Linux input devices", version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the event nodes.
    #[arg(long, global = true)]
    device_dir: Option<PathBuf>,

    /// Bind keyboards to this uniform (keyboards are ignored otherwise).
    #[arg(short = 'k', long, global = true, value_name = "UNIFORM")]
    keyboard: Option<String>,

    /// Bind touchscreens to this uniform.
    #[arg(long, global = true, value_name = "UNIFORM")]
    touch: Option<String>,

    /// Bind trackpads to this uniform.
    #[arg(long, global = true, value_name = "UNIFORM")]
    trackpad: Option<String>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List event nodes and how they classify.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show one device's capabilities and stream its events.
    Inspect {
        path: PathBuf,

        /// Stop after this many events.
        #[arg(long)]
        count: Option<usize>,
    },
    /// Run the binding runtime against a headless program.
    Run {
        /// Uniforms the headless program declares.
        #[arg(long = "declare", value_name = "UNIFORM", default_value = "iMouse")]
        declare: Vec<String>,

        /// Frames to render before exiting (forever if unset).
        #[arg(long)]
        frames: Option<u64>,

        /// Frame rate of the headless loop.
        #[arg(long, default_value_t = 60)]
        fps: u32,
    },
}

#[derive(Serialize)]
struct ListEntry {
    path: String,
    name: String,
    archetype: Option<String>,
    meta: DeviceMeta,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = &args.device_dir {
        config.device_dir = dir.clone();
    }
    if let Some(name) = &args.keyboard {
        config.slots.keyboard = Some(name.clone());
    }
    if let Some(name) = &args.touch {
        config.slots.touchscreen = Some(name.clone());
    }
    if let Some(name) = &args.trackpad {
        config.slots.trackpad = Some(name.clone());
    }
    config.validate()?;
    Ok(config)
}

fn list(config: &Config, json: bool) -> Result<()> {
    let nodes = backends::enumerate(&config.device_dir)
        .with_context(|| format!("listing {}", config.device_dir.display()))?;
    let mut entries = Vec::new();
    for path in nodes {
        let device = match EvdevDevice::open(&path) {
            Ok(device) => device,
            Err(e) => {
                log::debug!("{e}");
                continue;
            }
        };
        let info = device.info();
        entries.push(ListEntry {
            path: path.display().to_string(),
            name: info.name.clone(),
            archetype: classify(info, config.slots.keyboard_requested()).map(|a| a.to_string()),
            meta: info.meta.clone(),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for e in &entries {
        println!(
            "{:<24} {:<12} {}",
            e.path,
            e.archetype.as_deref().unwrap_or("-"),
            e.name
        );
    }
    Ok(())
}

fn inspect(config: &Config, path: &Path, count: Option<usize>) -> Result<()> {
    let mut device = EvdevDevice::open(path)?;
    let info = device.info().clone();
    println!("name:        {}", info.name);
    println!("path:        {}", info.path.display());
    if let Some(bus) = &info.meta.bus {
        println!(
            "id:          {bus} {:04x}:{:04x}",
            info.meta.vid.unwrap_or(0),
            info.meta.pid.unwrap_or(0)
        );
    }
    println!(
        "archetype:   {}",
        classify(&info, config.slots.keyboard_requested())
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".into())
    );
    println!("keys:        {}", info.keys.iter().count());
    println!("relative:    {:?}", info.relative_axes.iter().collect::<Vec<_>>());
    println!("properties:  {:?}", info.properties.iter().collect::<Vec<_>>());
    for axis in info.absolute_axes.iter() {
        if let Some(r) = info.abs_range(axis) {
            println!("  {axis:?}: {}..={} (now {})", r.minimum, r.maximum, r.value);
        }
    }
    if info.mt_slot_count() > 0 {
        println!("mt slots:    {}", info.mt_slot_count());
    }

    let mut seen = 0;
    loop {
        if !device.wait(Duration::from_millis(100))? {
            continue;
        }
        let events = match device.read_events() {
            Ok(events) => events,
            Err(DeviceError::Overflow) => {
                println!("(dropped events, resyncing)");
                device.resync()?
            }
            Err(e) => return Err(e.into()),
        };
        for event in events {
            println!("{}", describe_event(&event));
            seen += 1;
            if count.is_some_and(|n| seen >= n) {
                return Ok(());
            }
        }
    }
}

fn print_uniforms(renderer: &HeadlessRenderer, names: &[String]) {
    for name in names {
        match renderer.value(name) {
            Some(Upload::Vec4(v)) => println!("{name} = {v:?}"),
            Some(Upload::Vec4Array(v)) => {
                println!("{name} = {} x vec4, first {:?}", v.len(), v.first())
            }
            Some(Upload::Sampler(unit)) => {
                let pressed = renderer
                    .texture(name)
                    .map(|t| t[..256].iter().filter(|b| **b != 0).count())
                    .unwrap_or(0);
                println!("{name} = sampler on unit {}, {pressed} key(s) down", unit.0);
            }
            None => println!("{name} = (unset)"),
        }
    }
}

fn run(config: Config, declare: Vec<String>, frames: Option<u64>, fps: u32) -> Result<()> {
    for (slot, meta) in &config.metadata {
        log::info!("metadata for '{slot}': {meta:?}");
    }
    let mut renderer = declare
        .iter()
        .fold(HeadlessRenderer::new(1280, 720), |r, name| r.declare(name));
    let mut manager = InputManager::new(config);
    manager
        .shutdown_token()
        .trigger_on_interrupt()
        .context("installing the Ctrl+C handler")?;
    let queued = manager.discover();
    log::info!("{queued} device(s) queued at startup");
    manager.watch();

    let program = renderer.current_program();
    let (width, height) = renderer.viewport();
    manager.before_first_frame(&mut renderer, program, width, height);

    let shutdown = manager.shutdown_token();
    let interval = Duration::from_secs(1) / fps.max(1);
    let start = Instant::now();
    let mut frame = 0u64;
    while frames.map_or(true, |n| frame < n) {
        manager.frame(&mut renderer, frame, start.elapsed().as_secs_f32());
        if frame % u64::from(fps.max(1)) == 0 {
            log::debug!("frame {frame}");
            if log::log_enabled!(log::Level::Debug) {
                print_uniforms(&renderer, &declare);
            }
        }
        frame += 1;
        if shutdown.wait_timeout(interval) {
            break;
        }
    }

    print_uniforms(&renderer, &declare);
    log::info!(
        "{frame} frame(s), {} validation pass(es), {} pump(s) running",
        manager.validation_passes(),
        manager.registry().running_pumps()
    );
    manager.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    uniplex::logger::init(args.verbose);
    let config = load_config(&args)?;
    match args.command {
        Command::List { json } => list(&config, json),
        Command::Inspect { path, count } => inspect(&config, &path, count),
        Command::Run {
            declare,
            frames,
            fps,
        } => run(config, declare, frames, fps),
    }
}
