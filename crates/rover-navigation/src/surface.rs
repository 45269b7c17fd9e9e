//! Obstacle faces the rover can photograph, and the records built from what the
//! image classifier says about them.

use std::collections::{BTreeMap, HashMap};

use crate::direction::Direction;
use crate::error::{NavigationError, TransportError};
use crate::map::{GridMap, GridPoint};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Farthest distance, in cells, at which the camera resolves an obstacle face.
pub const CAMERA_RANGE: i32 = 4;
/// Nearest distance at which a whole face fits in frame.
const CAMERA_MIN_RANGE: i32 = 2;

/// One face of a known obstacle and where to stand to look at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObsSurface {
    /// The obstacle cell.
    pub obstacle: GridPoint,
    /// Outward normal of the face.
    pub face: Direction,
    /// Rover centre for the shot.
    pub stand: GridPoint,
    /// Heading to hold at `stand`; always opposite to `face`.
    pub heading: Direction,
}

impl ObsSurface {
    /// Whether `other` is the same face of an obstacle next to this one.
    pub fn is_lateral_neighbour(&self, other: &ObsSurface) -> bool {
        self.face == other.face && self.obstacle.distance_squared(other.obstacle) == 1
    }
}

/// Lists every photographable face of every obstacle on `map`.
///
/// For each face the standing cell is the farthest one in `camera_range..=2` along
/// the face normal that is a valid move with nothing but free cells between it and
/// the obstacle. Faces with no such cell are skipped.
pub fn enumerate_surfaces(map: &GridMap, camera_range: i32) -> Vec<ObsSurface> {
    let mut surfaces = Vec::new();
    for obstacle in map.obstacles() {
        for face in Direction::ALL {
            let mut stand = None;
            for k in 1..=camera_range {
                let p = obstacle.step(face, k);
                match map.cell(p) {
                    None => break,
                    Some(c) if c.is_obstacle() => break,
                    Some(_) if k >= CAMERA_MIN_RANGE && map.check_valid_move(p) => stand = Some(p),
                    Some(_) => {}
                }
            }
            if let Some(stand) = stand {
                surfaces.push(ObsSurface {
                    obstacle,
                    face,
                    stand,
                    heading: face.opposite(),
                });
            }
        }
    }
    surfaces
}

/// The external image classifier, called once per photographed face.
pub trait ImageClassifier: Send {
    /// Returns `"gridOffset,labelId"` or `"None"`.
    fn classify(&mut self, surface: &ObsSurface) -> Result<String, TransportError>;
}

/// Classifier backed by a known label per obstacle, for simulated arenas.
#[derive(Debug, Clone, Default)]
pub struct LabelledArena {
    labels: HashMap<GridPoint, String>,
}

impl LabelledArena {
    /// Labels the given obstacles; every other face classifies as `None`.
    pub fn new(labels: impl IntoIterator<Item = (GridPoint, String)>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }
}

impl ImageClassifier for LabelledArena {
    fn classify(&mut self, surface: &ObsSurface) -> Result<String, TransportError> {
        Ok(match self.labels.get(&surface.obstacle) {
            Some(label) => format!("0,{label}"),
            None => "None".to_string(),
        })
    }
}

/// Splits a classifier reply into `(grid_offset, label_id)`. `"None"` yields `Ok(None)`.
pub fn parse_classification(raw: &str) -> Result<Option<(i32, String)>, NavigationError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let (offset, label) = raw
        .split_once(',')
        .ok_or(NavigationError::MalformedFrame("Expected `gridOffset,labelId`"))?;
    let offset = offset
        .trim()
        .parse()
        .map_err(|_| NavigationError::MalformedFrame("Grid offset is not an integer"))?;
    let label = label.trim();
    if label.is_empty() {
        return Err(NavigationError::MalformedFrame("Empty label id"));
    }
    Ok(Some((offset, label.to_string())))
}

/// One recognised obstacle face.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CaptureRecord {
    /// Label reported by the classifier.
    pub label_id: String,
    /// Obstacle the label was found on, after the lateral offset.
    pub obstacle: GridPoint,
    /// Face the label was seen on.
    pub face: Direction,
}

/// Captured labels, one record per label id; the first sighting wins.
#[derive(Debug, Clone, Default)]
pub struct CaptureLog {
    records: BTreeMap<String, CaptureRecord>,
}

impl CaptureLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a classifier reply for `surface` into the log.
    ///
    /// A positive offset moves the obstacle to the camera's right.
    ///
    /// # Returns
    /// * `Result<bool, NavigationError>` - Whether a new label was recorded, or an error for an unparsable reply
    pub fn record(&mut self, surface: &ObsSurface, reply: &str) -> Result<bool, NavigationError> {
        let Some((offset, label_id)) = parse_classification(reply)? else {
            return Ok(false);
        };
        if self.records.contains_key(&label_id) {
            return Ok(false);
        }
        let obstacle = surface.obstacle.step(surface.heading.clockwise(), offset);
        self.records.insert(
            label_id.clone(),
            CaptureRecord {
                label_id,
                obstacle,
                face: surface.face,
            },
        );
        Ok(true)
    }

    /// Records ordered by label id.
    pub fn records(&self) -> Vec<CaptureRecord> {
        self.records.values().cloned().collect()
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with(obstacles: &[(i32, i32)]) -> GridMap {
        let mut map = GridMap::new(15, 15).unwrap();
        map.set_all_explored();
        for &(x, y) in obstacles {
            map.set_obstacle(GridPoint::new(x, y), true).unwrap();
        }
        map
    }

    #[test]
    fn test_surfaces_of_lone_obstacle() {
        let map = arena_with(&[(7, 7)]);
        let surfaces = enumerate_surfaces(&map, CAMERA_RANGE);
        assert_eq!(surfaces.len(), 4);
        let up = surfaces.iter().find(|s| s.face == Direction::Up).unwrap();
        assert_eq!(up.stand, GridPoint::new(7, 11), "farthest valid standing cell");
        assert_eq!(up.heading, Direction::Down);
        for s in &surfaces {
            assert!(map.check_valid_move(s.stand));
        }
    }

    #[test]
    fn test_surface_near_border_stands_closer() {
        // Up face: row 14 is the border wall, so the camera stops one short of range
        let map = arena_with(&[(2, 10)]);
        let surfaces = enumerate_surfaces(&map, CAMERA_RANGE);
        let up = surfaces.iter().find(|s| s.face == Direction::Up).unwrap();
        assert_eq!(up.stand, GridPoint::new(2, 13));
        // Left face: column 1 is the obstacle's margin and column 0 the border
        assert!(surfaces.iter().all(|s| s.face != Direction::Left), "no room on the left");
    }

    #[test]
    fn test_blocked_face_is_skipped() {
        let map = arena_with(&[(7, 7), (7, 9)]);
        let surfaces = enumerate_surfaces(&map, CAMERA_RANGE);
        assert!(
            !surfaces.iter().any(|s| s.obstacle == GridPoint::new(7, 7) && s.face == Direction::Up),
            "the other obstacle sits between face and camera"
        );
        let a = surfaces.iter().find(|s| s.obstacle == GridPoint::new(7, 7) && s.face == Direction::Left).unwrap();
        let b = ObsSurface { obstacle: GridPoint::new(7, 8), ..*a };
        assert!(a.is_lateral_neighbour(&b));
        assert!(!a.is_lateral_neighbour(&ObsSurface { face: Direction::Right, ..b }));
    }

    #[test]
    fn test_parse_classification() {
        assert_eq!(parse_classification("None"), Ok(None));
        assert_eq!(parse_classification(" 1,12\n"), Ok(Some((1, "12".to_string()))));
        assert_eq!(parse_classification("-1,arrow"), Ok(Some((-1, "arrow".to_string()))));
        assert!(parse_classification("x,1").is_err());
        assert!(parse_classification("3").is_err());
        assert!(parse_classification("0,").is_err());
    }

    #[test]
    fn test_capture_log_dedups_and_offsets() {
        let surface = ObsSurface {
            obstacle: GridPoint::new(5, 5),
            face: Direction::Up,
            stand: GridPoint::new(5, 8),
            heading: Direction::Down,
        };
        let mut log = CaptureLog::new();
        assert_eq!(log.record(&surface, "None"), Ok(false));
        assert_eq!(log.record(&surface, "1,7"), Ok(true));
        assert_eq!(log.record(&surface, "0,7"), Ok(false), "first sighting wins");
        assert_eq!(log.len(), 1);

        let record = &log.records()[0];
        // Facing down, the camera's right is the rover's left in world terms
        assert_eq!(record.obstacle, GridPoint::new(4, 5));
        assert_eq!(record.face, Direction::Up);
        assert!(log.record(&surface, "garbage").is_err());
    }

    #[test]
    fn test_labelled_arena() {
        let mut classifier = LabelledArena::new([(GridPoint::new(5, 5), "3".to_string())]);
        let mut surface = ObsSurface {
            obstacle: GridPoint::new(5, 5),
            face: Direction::Left,
            stand: GridPoint::new(2, 5),
            heading: Direction::Right,
        };
        assert_eq!(classifier.classify(&surface), Ok("0,3".to_string()));
        surface.obstacle = GridPoint::new(9, 9);
        assert_eq!(classifier.classify(&surface), Ok("None".to_string()));
    }
}
