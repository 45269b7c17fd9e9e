//! Heading-aware A* path planning and conversion of paths into commands.

use crate::command::Command;
use crate::direction::Direction;
use crate::map::{GridMap, GridPoint};
use crate::rover::Rover;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cost of one step between adjacent cells.
pub const MOVE_COST: f64 = 1.0;
/// Cost of one 90° turn.
pub const TURN_COST: f64 = 3.0;
/// Initial cost-to-reach of cells the rover may not stand on.
pub const INFINITE_COST: f64 = 1e7;

/// Represents the result of an A* pathfinding operation with metadata.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathResult<T> {
    /// The computed path, if one was found. Excludes the start cell.
    pub path: Option<Vec<T>>,
    /// Accumulated move and turn cost of the path.
    pub total_cost: Option<f64>,
    /// The number of nodes expanded during the search.
    pub nodes_explored: usize,
    /// The length of the path (number of cells).
    pub path_length: usize,
}

impl<T> PathResult<T> {
    /// Creates a new PathResult for a successful path.
    pub fn success(path: Vec<T>, total_cost: f64, nodes_explored: usize) -> Self {
        let path_length = path.len();
        Self {
            path: Some(path),
            total_cost: Some(total_cost),
            nodes_explored,
            path_length,
        }
    }

    /// Creates a new PathResult for a failed path search.
    pub fn failure(nodes_explored: usize) -> Self {
        Self {
            path: None,
            total_cost: None,
            nodes_explored,
            path_length: 0,
        }
    }

    /// Returns true if a path was found.
    pub fn is_success(&self) -> bool {
        self.path.is_some()
    }

    /// Returns the path if one was found.
    pub fn into_path(self) -> Option<Vec<T>> {
        self.path
    }
}

impl<T> fmt::Display for PathResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(_) => write!(
                f,
                "PathResult {{ success: true, path_length: {}, total_cost: {}, nodes_explored: {} }}",
                self.path_length,
                self.total_cost.unwrap_or(0.0),
                self.nodes_explored
            ),
            None => write!(f, "PathResult {{ success: false, nodes_explored: {} }}", self.nodes_explored),
        }
    }
}

/// Cost of turning from heading `a` to heading `b`, always the shorter rotation.
pub fn turn_cost(a: Direction, b: Direction) -> f64 {
    let mut turns = a.ordinal().abs_diff(b.ordinal());
    if turns > 2 {
        turns %= 2;
    }
    f64::from(turns as u32) * TURN_COST
}

#[derive(Copy, Clone, Debug)]
struct State {
    f: f64,
    index: usize,
}

// Min-heap on f; equal f pops the lower row-major index first.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other.f.total_cmp(&self.f).then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

/// Heading-aware A* over a [`GridMap`].
///
/// The cost to reach a cell includes the turn needed to leave its predecessor in
/// the new direction, where the predecessor's heading is the one implied by the
/// edge that reached it. Cost-to-reach starts at zero for movable cells and at
/// [`INFINITE_COST`] for everything else.
#[derive(Debug)]
pub struct Planner<'a> {
    map: &'a GridMap,
    initial_g: Vec<f64>,
}

impl<'a> Planner<'a> {
    /// Prepares a planner over the current state of `map`.
    pub fn new(map: &'a GridMap) -> Self {
        let initial_g = map
            .cells()
            .map(|c| if c.is_movable() { 0.0 } else { INFINITE_COST })
            .collect();
        Self { map, initial_g }
    }

    fn index(&self, p: GridPoint) -> usize {
        p.y as usize * self.map.width() + p.x as usize
    }

    fn point(&self, index: usize) -> GridPoint {
        let w = self.map.width();
        GridPoint::new((index % w) as i32, (index / w) as i32)
    }

    /// Finds a path from `start` to `goal`, returning only the cells.
    pub fn search(&self, start: GridPoint, goal: GridPoint, heading: Direction) -> Option<Vec<GridPoint>> {
        self.search_detailed(start, goal, heading).into_path()
    }

    /// Finds a path from `start` to `goal` with detailed results.
    ///
    /// # Arguments
    /// * `start` - Where the rover's centre is now; need not be movable
    /// * `goal` - Destination, which must be a movable cell
    /// * `heading` - Heading of the rover at `start`
    ///
    /// # Returns
    /// * `PathResult<GridPoint>` - The cells after `start` up to and including `goal`, or a failure
    pub fn search_detailed(&self, start: GridPoint, goal: GridPoint, heading: Direction) -> PathResult<GridPoint> {
        if !self.map.check_valid_cell(start) || !self.map.check_valid_cell(goal) {
            return PathResult::failure(0);
        }
        if start == goal {
            return PathResult::success(Vec::new(), 0.0, 0);
        }
        if !self.map.check_valid_move(goal) {
            return PathResult::failure(0);
        }

        let n = self.initial_g.len();
        let mut g = self.initial_g.clone();
        let mut heading_at = vec![heading; n];
        let mut came_from: Vec<Option<usize>> = vec![None; n];
        let mut opened = vec![false; n];
        let mut closed = vec![false; n];
        let mut open_set = BinaryHeap::new();
        let mut nodes_explored = 0;

        let start_index = self.index(start);
        let goal_index = self.index(goal);
        g[start_index] = 0.0;
        opened[start_index] = true;
        open_set.push(State {
            f: start.distance(goal),
            index: start_index,
        });

        while let Some(State { index: current, .. }) = open_set.pop() {
            if closed[current] {
                continue;
            }
            closed[current] = true;
            nodes_explored += 1;

            if current == goal_index {
                let path = self.reconstruct_path(&came_from, start_index, current);
                return PathResult::success(path, g[current], nodes_explored);
            }

            let here = self.point(current);
            for neighbour in self.map.neighbours(here) {
                let next = self.index(neighbour);
                if closed[next] {
                    continue;
                }
                let dir = GridMap::cell_direction(here, neighbour);
                let tentative = g[current] + MOVE_COST + turn_cost(heading_at[current], dir);
                if !opened[next] || tentative < g[next] {
                    opened[next] = true;
                    came_from[next] = Some(current);
                    g[next] = tentative;
                    heading_at[next] = dir;
                    open_set.push(State {
                        f: tentative + neighbour.distance(goal),
                        index: next,
                    });
                }
            }
        }

        PathResult::failure(nodes_explored)
    }

    fn reconstruct_path(&self, came_from: &[Option<usize>], start: usize, goal: usize) -> Vec<GridPoint> {
        let mut path = Vec::new();
        let mut current = goal;
        while current != start {
            path.push(self.point(current));
            match came_from[current] {
                Some(previous) => current = previous,
                None => break,
            }
        }
        path.reverse();
        path
    }
}

/// Converts a cell path into turn and move commands.
///
/// A disposable shadow rover tracks the heading; a reversal is two left turns.
///
/// # Arguments
/// * `start` - Rover centre before the first step
/// * `heading` - Rover heading before the first step
/// * `path` - Adjacent cells after `start`, as returned by [`Planner::search`]
pub fn path_commands(start: GridPoint, heading: Direction, path: &[GridPoint]) -> Vec<Command> {
    let mut shadow = Rover::shadow(start, heading);
    let mut commands = Vec::with_capacity(path.len() * 2);
    for &next in path {
        let want = GridMap::cell_direction(shadow.position(), next);
        let current = shadow.heading();
        let turns: &[Command] = if want == current {
            &[]
        } else if want == current.opposite() {
            &[Command::TurnLeft, Command::TurnLeft]
        } else if want == current.clockwise() {
            &[Command::TurnRight]
        } else {
            &[Command::TurnLeft]
        };
        for &turn in turns {
            shadow.turn(turn);
            commands.push(turn);
        }
        commands.push(Command::Forward);
        shadow.set_pose(next, shadow.heading());
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_map(h: usize, w: usize) -> GridMap {
        let mut map = GridMap::new(h, w).unwrap();
        map.set_all_explored();
        map
    }

    #[test]
    fn test_turn_cost_folds_to_shorter_rotation() {
        assert_eq!(turn_cost(Direction::Up, Direction::Up), 0.0);
        assert_eq!(turn_cost(Direction::Up, Direction::Down), 2.0 * TURN_COST, "reversal is two turns");
        assert_eq!(turn_cost(Direction::Left, Direction::Right), 2.0 * TURN_COST);
        assert_eq!(turn_cost(Direction::Up, Direction::Right), TURN_COST, "three anticlockwise is one clockwise");
        assert_eq!(turn_cost(Direction::Right, Direction::Up), TURN_COST);
        assert_eq!(turn_cost(Direction::Down, Direction::Left), TURN_COST);
    }

    #[test]
    fn test_straight_path_costs_only_moves() {
        let map = open_map(10, 10);
        let planner = Planner::new(&map);
        let result = planner.search_detailed(GridPoint::new(1, 1), GridPoint::new(6, 1), Direction::Right);
        assert!(result.is_success());
        assert_eq!(result.total_cost, Some(5.0 * MOVE_COST));
        assert_eq!(result.path_length, 5);
        let path = result.into_path().unwrap();
        assert_eq!(path.first(), Some(&GridPoint::new(2, 1)), "path excludes the start cell");
        assert_eq!(path.last(), Some(&GridPoint::new(6, 1)));
    }

    #[test]
    fn test_single_turn_path() {
        let map = open_map(10, 10);
        let result = Planner::new(&map).search_detailed(GridPoint::new(1, 1), GridPoint::new(3, 3), Direction::Right);
        assert_eq!(result.total_cost, Some(4.0 * MOVE_COST + TURN_COST));

        let path = result.into_path().unwrap();
        let commands = path_commands(GridPoint::new(1, 1), Direction::Right, &path);
        let turns = commands.iter().filter(|c| **c == Command::TurnLeft).count();
        assert_eq!(turns, 1, "one left turn from right to up");
        assert_eq!(commands.iter().filter(|c| **c == Command::Forward).count(), 4);
    }

    #[test]
    fn test_reversal_uses_two_left_turns() {
        let map = open_map(10, 10);
        let planner = Planner::new(&map);
        let result = planner.search_detailed(GridPoint::new(5, 5), GridPoint::new(5, 2), Direction::Up);
        assert_eq!(result.total_cost, Some(3.0 * MOVE_COST + 2.0 * TURN_COST));
        let commands = path_commands(GridPoint::new(5, 5), Direction::Up, &result.into_path().unwrap());
        assert_eq!(
            commands,
            vec![Command::TurnLeft, Command::TurnLeft, Command::Forward, Command::Forward, Command::Forward]
        );
    }

    #[test]
    fn test_start_equals_goal() {
        let map = open_map(10, 10);
        let result = Planner::new(&map).search_detailed(GridPoint::new(1, 1), GridPoint::new(1, 1), Direction::Right);
        assert!(result.is_success());
        assert_eq!(result.total_cost, Some(0.0));
        let path = result.into_path().unwrap();
        assert!(path.is_empty());
        assert!(path_commands(GridPoint::new(1, 1), Direction::Right, &path).is_empty());
    }

    #[test]
    fn test_detours_around_obstacle() {
        let mut map = open_map(12, 12);
        map.set_obstacle(GridPoint::new(5, 2), true).unwrap();
        let path = Planner::new(&map)
            .search(GridPoint::new(2, 2), GridPoint::new(8, 2), Direction::Right)
            .unwrap();
        for p in &path {
            assert!(map.check_valid_move(*p), "{p} is not movable");
        }
        for pair in path.windows(2) {
            assert_eq!(pair[0].distance_squared(pair[1]), 1, "path cells must be adjacent");
        }
    }

    #[test]
    fn test_blocked_goal_fails() {
        let mut map = open_map(10, 10);
        for y in 0..10 {
            map.set_obstacle(GridPoint::new(5, y), true).unwrap();
        }
        let planner = Planner::new(&map);
        let result = planner.search_detailed(GridPoint::new(2, 2), GridPoint::new(8, 2), Direction::Right);
        assert!(!result.is_success());
        assert!(result.nodes_explored > 0, "the reachable side is searched before giving up");
        assert!(planner.search(GridPoint::new(2, 2), GridPoint::new(5, 5), Direction::Up).is_none());
        assert_eq!(result.to_string(), format!("PathResult {{ success: false, nodes_explored: {} }}", result.nodes_explored));
    }

    #[test]
    fn test_unexplored_cells_are_not_traversed() {
        let mut map = GridMap::new(10, 10).unwrap();
        map.set_pass_through(GridPoint::new(1, 1));
        map.set_pass_through(GridPoint::new(2, 1));
        map.set_pass_through(GridPoint::new(3, 1));
        let planner = Planner::new(&map);
        assert_eq!(
            planner.search(GridPoint::new(1, 1), GridPoint::new(3, 1), Direction::Up),
            Some(vec![GridPoint::new(2, 1), GridPoint::new(3, 1)])
        );
        assert!(planner.search(GridPoint::new(1, 1), GridPoint::new(4, 4), Direction::Up).is_none());
    }
}
