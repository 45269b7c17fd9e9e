use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rover_navigation::{
    Backend, ExplorationEngine, ExplorationReport, GridMap, GridPoint, LabelledArena, MapDescriptor, Rover, StateReport,
    TaskControl, Termination,
};
use tracing::{info, warn};

use crate::bus::Topic;
use crate::config::{ArenaSettings, RunMode, Settings};
use crate::link::TcpLink;

/// Random placement gives up after this many rejected draws per obstacle.
const PLACEMENT_ATTEMPTS: usize = 64;

/// What a finished mission hands back to `main`.
#[derive(Debug)]
pub struct MissionSummary {
    pub exploration: ExplorationReport,
    pub labels_recorded: usize,
    pub route: Option<Vec<String>>,
    pub final_state: StateReport,
}

/// Builds the simulation ground truth: a descriptor file if configured, otherwise
/// the listed obstacles plus seeded random ones kept clear of `keep_clear`.
pub fn build_arena(arena: &ArenaSettings, keep_clear: &[GridPoint]) -> Result<GridMap> {
    let mut truth = match &arena.descriptor {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading arena descriptor {}", path.display()))?;
            MapDescriptor::parse(&text)?.to_map(arena.height, arena.width)?
        }
        None => GridMap::new(arena.height, arena.width)?,
    };
    truth.set_all_explored();

    for &(x, y) in &arena.obstacles {
        let p = GridPoint::new(x, y);
        truth.set_obstacle(p, true).with_context(|| format!("placing obstacle at {p}"))?;
    }

    if arena.random_obstacles > 0 {
        let mut rng = StdRng::seed_from_u64(arena.seed);
        let mut placed = 0;
        for _ in 0..arena.random_obstacles * PLACEMENT_ATTEMPTS {
            if placed == arena.random_obstacles {
                break;
            }
            let p = GridPoint::new(
                rng.random_range(0..arena.width as i32),
                rng.random_range(0..arena.height as i32),
            );
            let near_reserved = keep_clear.iter().any(|c| (c.x - p.x).abs() <= 1 && (c.y - p.y).abs() <= 1);
            if near_reserved || truth.cell(p).is_none_or(|c| c.is_obstacle()) {
                continue;
            }
            truth.set_obstacle(p, true)?;
            placed += 1;
        }
        if placed < arena.random_obstacles {
            warn!(requested = arena.random_obstacles, placed, "arena too crowded for every random obstacle");
        }
    }
    Ok(truth)
}

fn build_backend(settings: &Settings) -> Result<Backend> {
    match settings.rover.mode {
        RunMode::Simulation => {
            let keep_clear: Vec<GridPoint> = [Some(settings.start()), settings.waypoint(), settings.goal()]
                .into_iter()
                .flatten()
                .collect();
            let truth = build_arena(&settings.arena, &keep_clear)?;
            if !truth.clear_for_robot(settings.start()) {
                bail!("start {} overlaps an obstacle in the arena", settings.start());
            }
            info!(obstacles = truth.obstacles().len(), "simulated arena ready");
            Ok(Backend::simulated(truth, settings.rover.steps_per_second))
        }
        RunMode::Hardware => {
            let link = TcpLink::connect(&settings.link.address, settings.read_timeout())?;
            Ok(Backend::hardware(link))
        }
    }
}

/// Explores, optionally captures obstacle faces, runs the fastest path and writes
/// the configured outputs. Blocking; run it off the async runtime.
pub fn run(settings: &Settings, control: TaskControl, status: Topic<StateReport>) -> Result<MissionSummary> {
    let start = settings.start();
    let mut map = GridMap::new(settings.arena.height, settings.arena.width)?;
    map.set_pass_through(start);
    if !map.check_valid_move(start) {
        bail!("start {start} does not leave room for the rover");
    }

    let rover = Rover::new(start, settings.rover.heading, build_backend(settings)?);
    let mut engine = ExplorationEngine::new(map, rover, settings.exploration_config())
        .with_control(control.clone())
        .with_sink(move |report: StateReport| {
            status.publish(report);
        });

    let exploration = engine.explore();
    info!(
        termination = %exploration.termination,
        explored = exploration.explored_pct,
        iterations = exploration.iterations,
        elapsed_ms = exploration.elapsed.as_millis() as u64,
        "exploration finished"
    );

    let cancelled = exploration.termination == Termination::Cancelled || control.is_cancelled();

    let mut labels_recorded = 0;
    if settings.capture.enabled && !cancelled {
        let mut classifier = LabelledArena::new(
            settings
                .capture
                .labels
                .iter()
                .map(|l| (GridPoint::new(l.x, l.y), l.label.clone())),
        );
        labels_recorded = engine.capture_surfaces(&mut classifier);
        info!(labels_recorded, "capture finished");
        engine.return_home();
    }

    let mut route = None;
    if let Some(goal) = settings.goal().filter(|_| !cancelled) {
        match engine.run_fastest_path(settings.waypoint(), goal) {
            Ok(steps) => {
                let wire: Vec<String> = steps.iter().map(|s| s.encode()).collect();
                info!(messages = wire.len(), route = %wire.concat(), "fastest path driven");
                route = Some(wire);
            }
            Err(e) => warn!(error = %e, %goal, "fastest path skipped"),
        }
    }

    let final_state = engine.export_state();
    if let Some(path) = &settings.output.map_path {
        write_map(path, engine.map())?;
    }
    if let Some(path) = &settings.output.state_path {
        let json = serde_json::to_string_pretty(&final_state).context("serializing final state")?;
        fs::write(path, json).with_context(|| format!("writing state to {}", path.display()))?;
    }

    Ok(MissionSummary {
        exploration,
        labels_recorded,
        route,
        final_state,
    })
}

fn write_map(path: &Path, map: &GridMap) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(path, MapDescriptor::from_map(map).to_text())
        .with_context(|| format!("writing map descriptor to {}", path.display()))?;
    info!(path = %path.display(), "map descriptor written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CaptureSettings, ExplorationSettings, FastestPathSettings, LinkSettings, OutputSettings, RoverSettings,
    };
    use rover_navigation::Direction;
    use std::path::PathBuf;

    fn arena(obstacles: Vec<(i32, i32)>, random_obstacles: usize) -> ArenaSettings {
        ArenaSettings {
            height: 20,
            width: 15,
            obstacles,
            random_obstacles,
            seed: 3,
            descriptor: None,
        }
    }

    fn settings(output_dir: &Path) -> Settings {
        Settings {
            arena: ArenaSettings {
                width: 20,
                ..arena(vec![(5, 5)], 0)
            },
            rover: RoverSettings {
                start: (1, 1),
                heading: Direction::Right,
                mode: RunMode::Simulation,
                steps_per_second: 0,
            },
            exploration: ExplorationSettings {
                coverage_limit: 100.0,
                time_limit_secs: 60,
                checking_step: 18,
            },
            fastest_path: FastestPathSettings {
                waypoint: None,
                goal: Some((18, 18)),
            },
            link: LinkSettings {
                address: "127.0.0.1:1".into(),
                read_timeout_ms: 100,
            },
            output: OutputSettings {
                map_path: Some(output_dir.join("map.txt")),
                state_path: Some(output_dir.join("state.json")),
            },
            capture: CaptureSettings::default(),
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("arena-rover-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_build_arena_places_listed_obstacles() {
        let truth = build_arena(&arena(vec![(5, 5), (6, 5)], 0), &[]).unwrap();
        assert_eq!(truth.obstacles().len(), 2);
        assert!(truth.cells().all(|c| c.is_explored()), "ground truth is fully known");
    }

    #[test]
    fn test_random_obstacles_avoid_reserved_cells() {
        let start = GridPoint::new(1, 1);
        let truth = build_arena(&arena(vec![], 25), &[start]).unwrap();
        assert_eq!(truth.obstacles().len(), 25);
        for dx in -1..=1 {
            for dy in -1..=1 {
                let p = GridPoint::new(start.x + dx, start.y + dy);
                assert!(!truth.cell(p).unwrap().is_obstacle(), "start footprint must stay clear at {p}");
            }
        }
        let again = build_arena(&arena(vec![], 25), &[start]).unwrap();
        assert_eq!(
            MapDescriptor::from_map(&truth),
            MapDescriptor::from_map(&again),
            "the same seed yields the same arena"
        );
    }

    #[test]
    fn test_build_arena_rejects_out_of_bounds_obstacle() {
        assert!(build_arena(&arena(vec![(40, 2)], 0), &[]).is_err());
    }

    #[test]
    fn test_simulated_mission_writes_outputs() {
        let dir = scratch_dir("mission");
        let settings = settings(&dir);
        let topic = Topic::new(1024);
        let mut rx = topic.subscribe();

        let summary = run(&settings, TaskControl::new(), topic).unwrap();

        assert_eq!(summary.exploration.termination, Termination::CoverageReached);
        assert!(summary.route.as_ref().is_some_and(|r| !r.is_empty()), "goal was configured");
        assert_eq!((summary.final_state.x, summary.final_state.y), (18, 18), "rover ends on the goal");
        assert!(rx.try_recv().is_ok(), "status reports reach the bus");

        let text = fs::read_to_string(dir.join("map.txt")).unwrap();
        let reloaded = MapDescriptor::parse(&text).unwrap().to_map(20, 20).unwrap();
        assert_eq!(reloaded.obstacles().len(), 1, "the saved map holds every obstacle");
        let state: StateReport = serde_json::from_str(&fs::read_to_string(dir.join("state.json")).unwrap()).unwrap();
        assert_eq!(state, summary.final_state);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_start_must_fit_the_rover() {
        let dir = scratch_dir("start");
        let mut settings = settings(&dir);
        settings.output = OutputSettings::default();

        settings.rover.start = (0, 4);
        let err = run(&settings, TaskControl::new(), Topic::new(16)).unwrap_err();
        assert!(err.to_string().contains("does not leave room"), "border start rejected: {err}");

        settings.rover.start = (4, 4);
        let err = run(&settings, TaskControl::new(), Topic::new(16)).unwrap_err();
        assert!(err.to_string().contains("overlaps an obstacle"), "(5, 5) sits in the footprint: {err}");
    }

    #[test]
    fn test_cancelled_mission_skips_fastest_path() {
        let dir = scratch_dir("cancel");
        let mut settings = settings(&dir);
        settings.output = OutputSettings::default();
        let control = TaskControl::new();
        control.cancel();

        let summary = run(&settings, control, Topic::new(16)).unwrap();
        assert_eq!(summary.exploration.termination, Termination::Cancelled);
        assert!(summary.route.is_none(), "a cancelled mission does not drive the route");
    }
}
