//! # TANDEM Demo
//!
//! Drops a grid of spheres onto the ground plane of the mock engine, with the
//! simulator on its own thread and a render-cadence consumer on this one.
//!
//! ## Usage
//!
//! ```bash
//! tandem_demo --bodies 500 --seconds 5 --frame-rate 144 --config session.toml
//! ```

use std::time::{Duration, Instant};

use tandem_bridge::{
    session, MockNode, MockPhysicsEngine, MockSceneGraph, RayQuery, RequestTicket, SessionConfig,
};
use tandem_shared::{BodyConfig, Command, EntityId, Mat4, RaycastHit, ShapeDescriptor, Vec3};

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         TANDEM BRIDGE DEMO                                       ║");
    println!("║         SIMULATOR THREAD + RENDER-CADENCE CONSUMER               ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // Parse command line arguments (simple parsing, no external deps)
    let args: Vec<String> = std::env::args().collect();
    let mut bodies = 500u32;
    let mut seconds = 5u64;
    let mut frame_rate = 144u32;
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bodies" | "-b" => {
                if i + 1 < args.len() {
                    bodies = args[i + 1].parse().unwrap_or(500);
                    i += 1;
                }
            }
            "--seconds" | "-s" => {
                if i + 1 < args.len() {
                    seconds = args[i + 1].parse().unwrap_or(5);
                    i += 1;
                }
            }
            "--frame-rate" | "-f" => {
                if i + 1 < args.len() {
                    frame_rate = args[i + 1].parse().unwrap_or(144).max(1);
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: tandem_demo [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -b, --bodies <NUM>         Spheres to drop (default: 500)");
                println!("  -s, --seconds <SECS>       Run time (default: 5)");
                println!("  -f, --frame-rate <RATE>    Consumer frames per second (default: 144)");
                println!("  -c, --config <PATH>        Session TOML (default: built-in)");
                println!("  -h, --help                 Show this help");
                return;
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = match config_path.as_deref().map(SessionConfig::load) {
        Some(Ok(config)) => config,
        Some(Err(err)) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
        None => SessionConfig::default(),
    };
    config.max_bodies = config.max_bodies.max(bodies);

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Bodies:             {bodies}");
    println!("│ Slots:              {}", config.max_bodies);
    println!("│ Tick Rate:          {} Hz", config.tick_rate);
    println!("│ Frame Rate:         {frame_rate} Hz");
    println!("│ Handoff:            {:?}", config.handoff);
    println!("│ Duration:           {seconds} seconds");
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let (mut consumer, simulator) = match session::connect(&config, MockPhysicsEngine::new()) {
        Ok(drivers) => drivers,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    let worker = match session::spawn_simulator(simulator) {
        Ok(worker) => worker,
        Err(err) => {
            eprintln!("cannot start simulator thread: {err}");
            std::process::exit(1);
        }
    };

    // Sent before READY: held by the consumer and flushed in order
    let mut scene = MockSceneGraph::new();
    let side = f64::from(bodies).sqrt().ceil() as u32;
    for n in 0..bodies {
        let id = EntityId::generate();
        let at = Vec3::new((n % side) as f32 * 1.5, 10.0 + (n / side) as f32 * 0.1, 0.0);
        scene.insert(id.clone(), MockNode::default());
        let sent = consumer.send(Command::AddRigidBody {
            id,
            initial_transform: Mat4::from_translation(at),
            shape: ShapeDescriptor::Sphere { radius: 0.5 },
            config: BodyConfig::default(),
        });
        if sent.is_err() {
            eprintln!("simulator exited during setup");
            std::process::exit(1);
        }
    }

    let frame_budget = Duration::from_secs(1) / frame_rate;
    let start = Instant::now();
    let mut last_report = start;
    let mut pending_ray: Option<RequestTicket<Vec<RaycastHit>>> = None;

    while start.elapsed() < Duration::from_secs(seconds) {
        let frame_start = Instant::now();
        consumer.frame(&mut scene);

        if let Some(hits) = pending_ray.as_mut().and_then(RequestTicket::try_take) {
            println!("│ Raycast down x=0:   {} hit(s)", hits.len());
            pending_ray = None;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let telemetry = consumer.telemetry();
            let stats = consumer.stats();
            println!("┌─ CONSUMER STATUS ({:.1}s) ─────────────────────────────────────", start.elapsed().as_secs_f64());
            println!("│ Frames:             {}", stats.frames);
            println!("│ Snapshots Read:     {}", stats.snapshots_read);
            println!("│ Live Bodies:        {}", consumer.roster().len());
            println!("│ Step Time:          {:.3} ms", telemetry.step_duration_ms);
            println!("│ Sub-steps:          {}", telemetry.sub_steps);
            println!("└──────────────────────────────────────────────────────────────────");

            if pending_ray.is_none() {
                pending_ray = consumer
                    .raycast(RayQuery::closest(Vec3::new(0.0, 50.0, 0.0), Vec3::new(0.0, -1.0, 0.0)))
                    .ok();
            }
        }

        if let Some(rest) = frame_budget.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    if consumer.shutdown().is_err() {
        eprintln!("simulator already stopped");
    }
    let Ok(simulator) = worker.join() else {
        eprintln!("simulator thread panicked");
        std::process::exit(1);
    };

    let sim = simulator.stats();
    let ticks = simulator.tick_stats();
    println!();
    println!("┌─ FINAL ─────────────────────────────────────────────────────────┐");
    println!("│ Snapshots:          {}", sim.snapshots_published);
    println!("│ Commands Applied:   {}", sim.commands_applied);
    println!("│ Rejected:           {}", sim.rejected);
    println!("│ Avg Tick Time:      {} μs", ticks.avg_tick_us);
    println!(
        "│ Late Ticks:         {} ({:.2}%)",
        ticks.late_ticks,
        ticks.late_ticks as f64 / ticks.total_ticks.max(1) as f64 * 100.0
    );
    println!("│ Skipped Ticks:      {}", ticks.skipped_ticks);
    println!("│ Engine Steps:       {}", simulator.engine().steps_taken());
    println!("└──────────────────────────────────────────────────────────────────┘");
}
