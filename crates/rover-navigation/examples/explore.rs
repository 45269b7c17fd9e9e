use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rover_navigation::{Backend, Direction, ExplorationConfig, ExplorationEngine, GridMap, GridPoint, Rover, StateReport};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    // Ground truth: random obstacles away from the start zone
    let (height, width) = (20, 15);
    let mut truth = GridMap::new(height, width).expect("valid dimensions");
    truth.set_all_explored();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..12 {
        let p = GridPoint::new(rng.random_range(4..width as i32 - 1), rng.random_range(4..height as i32 - 1));
        truth.set_obstacle(p, true).expect("inside the arena");
    }

    let config = ExplorationConfig::default();
    let rover = Rover::new(config.start, Direction::Up, Backend::simulated(truth, 0));
    let map = GridMap::new(height, width).expect("valid dimensions");
    let mut engine = ExplorationEngine::new(map, rover, config)
        .with_sink(|r: StateReport| info!(explored = r.explored_pct, "{}", r.status));

    let report = engine.explore();
    println!("{report:?}");
    println!("{}", engine.map());
}
