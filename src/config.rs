use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use rover_navigation::{Direction, ExplorationConfig, GridPoint};
use serde::Deserialize;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const ENV_PREFIX: &str = "ROVER";

/// Which backend drives the rover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Simulation,
    Hardware,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArenaSettings {
    pub height: usize,
    pub width: usize,
    #[serde(default)]
    pub obstacles: Vec<(i32, i32)>,
    #[serde(default)]
    pub random_obstacles: usize,
    #[serde(default)]
    pub seed: u64,
    /// Two-line hex file used as ground truth instead of `obstacles`.
    pub descriptor: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoverSettings {
    pub start: (i32, i32),
    pub heading: Direction,
    pub mode: RunMode,
    #[serde(default)]
    pub steps_per_second: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorationSettings {
    pub coverage_limit: f64,
    pub time_limit_secs: u64,
    pub checking_step: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FastestPathSettings {
    pub waypoint: Option<(i32, i32)>,
    pub goal: Option<(i32, i32)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkSettings {
    pub address: String,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputSettings {
    pub map_path: Option<PathBuf>,
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurfaceLabel {
    pub x: i32,
    pub y: i32,
    pub label: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub labels: Vec<SurfaceLabel>,
}

/// Typed view of `config/default.toml` plus the `ROVER__SECTION__KEY` overlay.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub arena: ArenaSettings,
    pub rover: RoverSettings,
    pub exploration: ExplorationSettings,
    #[serde(default)]
    pub fastest_path: FastestPathSettings,
    pub link: LinkSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub capture: CaptureSettings,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let settings: Settings = load_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn start(&self) -> GridPoint {
        GridPoint::new(self.rover.start.0, self.rover.start.1)
    }

    pub fn waypoint(&self) -> Option<GridPoint> {
        self.fastest_path.waypoint.map(|(x, y)| GridPoint::new(x, y))
    }

    pub fn goal(&self) -> Option<GridPoint> {
        self.fastest_path.goal.map(|(x, y)| GridPoint::new(x, y))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.link.read_timeout_ms)
    }

    /// Library tunables; everything not configurable keeps its default.
    pub fn exploration_config(&self) -> ExplorationConfig {
        ExplorationConfig {
            coverage_limit: self.exploration.coverage_limit,
            time_limit: Duration::from_secs(self.exploration.time_limit_secs),
            checking_step: self.exploration.checking_step,
            start: self.start(),
            ..ExplorationConfig::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.exploration.coverage_limit) {
            return Err(ConfigError::Message(format!(
                "exploration.coverage_limit must be within 0..=100, got {}",
                self.exploration.coverage_limit
            )));
        }
        if self.exploration.checking_step == 0 {
            return Err(ConfigError::Message("exploration.checking_step must be positive".into()));
        }
        Ok(())
    }
}

fn load_config() -> Result<Config, ConfigError> {
    info!("Attempting to load configuration from {}", DEFAULT_CONFIG_PATH);

    let settings = Config::builder()
        .add_source(File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(true))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
        .build();

    match settings {
        Ok(config) => {
            info!("Successfully loaded configuration");
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e)
        }
    }
}
