//! Cells and the occupancy grid.

#![warn(missing_docs)]

use super::GridPoint;
use crate::direction::Direction;
use crate::error::NavigationError;

/// One square of the arena and everything the rover knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    pos: GridPoint,
    pub(crate) explored: bool,
    pub(crate) obstacle: bool,
    pub(crate) virtual_wall: bool,
    pub(crate) passed_through: bool,
    pub(crate) on_path: bool,
}

impl Cell {
    fn new(pos: GridPoint) -> Self {
        Self {
            pos,
            explored: false,
            obstacle: false,
            virtual_wall: false,
            passed_through: false,
            on_path: false,
        }
    }

    /// Grid position of this cell.
    pub fn position(&self) -> GridPoint {
        self.pos
    }

    /// Whether a sensor or the rover body has observed this cell.
    pub fn is_explored(&self) -> bool {
        self.explored
    }

    /// Whether the cell holds an obstacle.
    pub fn is_obstacle(&self) -> bool {
        self.obstacle
    }

    /// Whether the cell lies in the safety margin of an obstacle or the border.
    pub fn is_virtual_wall(&self) -> bool {
        self.virtual_wall
    }

    /// Whether the rover body has occupied this cell.
    pub fn is_passed_through(&self) -> bool {
        self.passed_through
    }

    /// Whether the cell is on the most recently computed path.
    pub fn is_on_path(&self) -> bool {
        self.on_path
    }

    /// A cell is movable iff explored, obstacle-free and outside every virtual wall.
    pub fn is_movable(&self) -> bool {
        self.explored && !self.obstacle && !self.virtual_wall
    }

    fn clear_flags(&mut self) {
        *self = Cell::new(self.pos);
    }
}

/// Fixed-size occupancy grid the rover explores.
///
/// Two invariants are maintained by every mutator:
/// * border cells are always virtual walls;
/// * every obstacle's 3×3 neighbourhood is virtual wall, re-derived from scratch
///   whenever an obstacle is added or removed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridMap {
    /// Number of rows.
    height: usize,
    /// Number of columns.
    width: usize,
    /// Cells in row-major order, row 0 first.
    cells: Vec<Cell>,
}

impl GridMap {
    /// Creates an unexplored map with its border walls in place.
    ///
    /// # Arguments
    /// * `height` - Number of rows
    /// * `width` - Number of columns
    ///
    /// # Returns
    /// * `Result<Self, NavigationError>` - The map, or an error if a 3×3 rover cannot fit inside the border
    pub fn new(height: usize, width: usize) -> Result<Self, NavigationError> {
        if height < 3 || width < 3 {
            return Err(NavigationError::InvalidDimensions("Height and width must be at least 3"));
        }
        if height.checked_mul(width).is_none() || height > i32::MAX as usize || width > i32::MAX as usize {
            return Err(NavigationError::InvalidDimensions("Map dimensions too large"));
        }

        let mut cells = Vec::with_capacity(height * width);
        for row in 0..height {
            for col in 0..width {
                cells.push(Cell::new(GridPoint::new(col as i32, row as i32)));
            }
        }

        let mut map = GridMap { height, width, cells };
        map.reinitialize_virtual_wall();
        Ok(map)
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    fn index(&self, p: GridPoint) -> Option<usize> {
        if self.check_valid_cell(p) {
            Some(p.y as usize * self.width + p.x as usize)
        } else {
            None
        }
    }

    /// Whether `p` addresses a cell inside the grid.
    pub fn check_valid_cell(&self, p: GridPoint) -> bool {
        p.x >= 0 && p.y >= 0 && (p.x as usize) < self.width && (p.y as usize) < self.height
    }

    /// Whether the rover's center may stand on `p`.
    pub fn check_valid_move(&self, p: GridPoint) -> bool {
        self.cell(p).is_some_and(Cell::is_movable)
    }

    /// Whether `p` may be used as a waypoint: inside, not an obstacle, not a virtual wall.
    pub fn waypoint_clear(&self, p: GridPoint) -> bool {
        self.cell(p).is_some_and(|c| !c.virtual_wall && !c.obstacle)
    }

    /// Returns the cell at `p`, or `None` outside the grid.
    pub fn cell(&self, p: GridPoint) -> Option<&Cell> {
        self.index(p).map(|i| &self.cells[i])
    }

    pub(crate) fn cell_mut(&mut self, p: GridPoint) -> Option<&mut Cell> {
        self.index(p).map(|i| &mut self.cells[i])
    }

    /// Returns the cell at `(row, col)`.
    ///
    /// # Returns
    /// * `Result<&Cell, NavigationError>` - The cell or an error if out of bounds
    pub fn get_cell(&self, row: i32, col: i32) -> Result<&Cell, NavigationError> {
        self.cell(GridPoint::new(col, row))
            .ok_or(NavigationError::OutOfBounds("Grid index out of bounds"))
    }

    /// All cells in row-major scan order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Positions of every obstacle cell, in scan order.
    pub fn obstacles(&self) -> Vec<GridPoint> {
        self.cells.iter().filter(|c| c.obstacle).map(Cell::position).collect()
    }

    /// Marks a cell explored or unexplored.
    pub fn set_explored(&mut self, p: GridPoint, explored: bool) -> Result<(), NavigationError> {
        let cell = self
            .cell_mut(p)
            .ok_or(NavigationError::OutOfBounds("Grid index out of bounds"))?;
        cell.explored = explored;
        Ok(())
    }

    /// Adds or removes an obstacle and re-derives every virtual wall.
    pub fn set_obstacle(&mut self, p: GridPoint, obstacle: bool) -> Result<(), NavigationError> {
        let cell = self
            .cell_mut(p)
            .ok_or(NavigationError::OutOfBounds("Grid index out of bounds"))?;
        if cell.obstacle != obstacle {
            cell.obstacle = obstacle;
            self.reinitialize_virtual_wall();
        }
        Ok(())
    }

    /// Flags an obstacle without touching virtual walls; callers re-derive once afterwards.
    ///
    /// Returns whether the flag changed.
    pub(crate) fn mark_obstacle(&mut self, p: GridPoint, obstacle: bool) -> bool {
        match self.cell_mut(p) {
            Some(cell) if cell.obstacle != obstacle => {
                cell.obstacle = obstacle;
                true
            }
            _ => false,
        }
    }

    /// Sets or clears the virtual wall on the 3×3 block centred on `p`, clipped to the grid.
    ///
    /// Clearing is followed by a full re-derivation, so walls owed to the border or to
    /// another obstacle survive.
    pub fn set_virtual_wall(&mut self, p: GridPoint, on: bool) {
        for q in Self::block(p) {
            if let Some(cell) = self.cell_mut(q) {
                cell.virtual_wall = on;
            }
        }
        if !on {
            self.reinitialize_virtual_wall();
        }
    }

    /// Rebuilds every virtual wall from the border and the current obstacles.
    ///
    /// Idempotent: calling it twice leaves the map unchanged.
    pub fn reinitialize_virtual_wall(&mut self) {
        let (h, w) = (self.height as i32, self.width as i32);
        for cell in &mut self.cells {
            let p = cell.pos;
            cell.virtual_wall = p.x == 0 || p.y == 0 || p.x == w - 1 || p.y == h - 1;
        }
        for obstacle in self.obstacles() {
            for q in Self::block(obstacle) {
                if let Some(cell) = self.cell_mut(q) {
                    cell.virtual_wall = true;
                }
            }
        }
    }

    /// Records that the rover body covered the 3×3 footprint centred on `p`.
    pub fn set_pass_through(&mut self, p: GridPoint) {
        for q in Self::block(p) {
            if let Some(cell) = self.cell_mut(q) {
                cell.passed_through = true;
                cell.explored = true;
            }
        }
    }

    /// Flags or unflags a cell as part of the displayed path.
    pub fn set_on_path(&mut self, p: GridPoint, on: bool) {
        if let Some(cell) = self.cell_mut(p) {
            cell.on_path = on;
        }
    }

    /// Clears every path flag.
    pub fn remove_paths(&mut self) {
        self.cells.iter_mut().for_each(|c| c.on_path = false);
    }

    /// Marks the whole grid explored, used for ground-truth arenas.
    pub fn set_all_explored(&mut self) {
        self.cells.iter_mut().for_each(|c| c.explored = true);
    }

    /// Marks the whole grid as traversed.
    pub fn set_all_pass_through(&mut self) {
        self.cells.iter_mut().for_each(|c| c.passed_through = true);
    }

    /// Returns every cell to its freshly constructed state.
    pub fn reset(&mut self) {
        self.cells.iter_mut().for_each(Cell::clear_flags);
        self.reinitialize_virtual_wall();
    }

    /// Percentage of cells explored, recomputed on each call.
    pub fn explored_percentage(&self) -> f64 {
        let explored = self.cells.iter().filter(|c| c.explored).count();
        explored as f64 * 100.0 / self.cells.len() as f64
    }

    /// Movable 4-neighbours of `p`, in the order up, down, left, right.
    pub fn neighbours(&self, p: GridPoint) -> Vec<GridPoint> {
        [Direction::Up, Direction::Down, Direction::Left, Direction::Right]
            .into_iter()
            .map(|d| p.step(d, 1))
            .filter(|&q| self.check_valid_move(q))
            .collect()
    }

    /// Heading needed to step from `from` to the adjacent cell `to`.
    pub fn cell_direction(from: GridPoint, to: GridPoint) -> Direction {
        if from.y > to.y {
            Direction::Down
        } else if from.y < to.y {
            Direction::Up
        } else if from.x > to.x {
            Direction::Left
        } else {
            Direction::Right
        }
    }

    /// True iff the full 3×3 footprint around `p` is inside, explored and obstacle-free.
    pub fn clear_for_robot(&self, p: GridPoint) -> bool {
        Self::block(p).all(|q| self.cell(q).is_some_and(|c| c.explored && !c.obstacle))
    }

    /// True iff every in-bounds cell of the 3×3 footprint around `p` has been traversed.
    pub fn footprint_traversed(&self, p: GridPoint) -> bool {
        Self::block(p).all(|q| self.cell(q).is_none_or(|c| c.passed_through))
    }

    /// Nearest unexplored cell to `from` by Euclidean distance; ties keep the first in scan order.
    pub fn nearest_unexplored_cell(&self, from: GridPoint) -> Option<GridPoint> {
        self.cells
            .iter()
            .filter(|c| !c.explored)
            .map(Cell::position)
            .fold(None, |best: Option<GridPoint>, p| match best {
                Some(b) if b.distance_squared(from) <= p.distance_squared(from) => Some(b),
                _ => Some(p),
            })
    }

    /// Nearest standing cell to `target` from which the rover can look at unexplored space.
    ///
    /// A candidate is a valid move whose footprint is fully explored and not yet
    /// entirely traversed. Ranked by distance to `target`; exact ties prefer the
    /// cell closer to `rover`, then the first in scan order.
    pub fn nearest_explored_cell(&self, target: GridPoint, rover: GridPoint) -> Option<GridPoint> {
        let mut best: Option<(GridPoint, i32, i32)> = None;
        for p in self.cells.iter().map(Cell::position) {
            if !self.check_valid_move(p) || !self.clear_for_robot(p) || self.footprint_traversed(p) {
                continue;
            }
            let to_target = p.distance_squared(target);
            let to_rover = p.distance_squared(rover);
            let better = match best {
                None => true,
                Some((_, bt, br)) => to_target < bt || (to_target == bt && to_rover < br),
            };
            if better {
                best = Some((p, to_target, to_rover));
            }
        }
        best.map(|(p, _, _)| p)
    }

    /// The 3×3 block centred on `p`, not clipped.
    pub(crate) fn block(p: GridPoint) -> impl Iterator<Item = GridPoint> {
        (-1..=1).flat_map(move |dy| (-1..=1).map(move |dx| GridPoint::new(p.x + dx, p.y + dy)))
    }
}

impl std::fmt::Display for GridMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "GridMap ({}x{}, {:.1}% explored)", self.height, self.width, self.explored_percentage())?;

        // Top row first so "up" reads upward
        for row in (0..self.height as i32).rev() {
            for col in 0..self.width as i32 {
                let glyph = match self.cell(GridPoint::new(col, row)) {
                    Some(c) if c.on_path => '*',
                    Some(c) if c.obstacle => '#',
                    Some(c) if !c.explored => '?',
                    Some(c) if c.virtual_wall => '+',
                    Some(_) => '.',
                    None => ' ',
                };
                write!(f, "{} ", glyph)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
