//! Two-line hex encoding of a [`GridMap`].
//!
//! Line one packs the explored flag of every cell, framed by two `1` guard bits on
//! each side. Line two packs the obstacle flag of explored cells only. Both scan
//! row 0 first, column 0 first, four bits per hex digit, zero padded at the end.

use super::{GridMap, GridPoint};
use crate::error::NavigationError;

const GUARD_BITS: usize = 2;

/// Explored and obstacle bitmaps of a map, as hex strings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapDescriptor {
    /// Guard-framed explored bitmap.
    pub explored: String,
    /// Obstacle bitmap over explored cells.
    pub obstacles: String,
}

impl MapDescriptor {
    /// Encodes the current flags of `map`.
    pub fn from_map(map: &GridMap) -> Self {
        let mut explored_bits = vec![true; GUARD_BITS];
        let mut obstacle_bits = Vec::new();
        for cell in map.cells() {
            explored_bits.push(cell.is_explored());
            if cell.is_explored() {
                obstacle_bits.push(cell.is_obstacle());
            }
        }
        explored_bits.extend([true; GUARD_BITS]);

        Self {
            explored: pack_hex(&explored_bits),
            obstacles: pack_hex(&obstacle_bits),
        }
    }

    /// Parses the two-line text form. Blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self, NavigationError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let explored = lines
            .next()
            .ok_or(NavigationError::InvalidDescriptor("Missing explored line"))?;
        let obstacles = lines.next().unwrap_or_default();
        Ok(Self {
            explored: explored.to_string(),
            obstacles: obstacles.to_string(),
        })
    }

    /// The two-line text form, newline terminated.
    pub fn to_text(&self) -> String {
        format!("{}\n{}\n", self.explored, self.obstacles)
    }

    /// Decodes into a fresh map of the given size with virtual walls re-derived.
    ///
    /// # Arguments
    /// * `height` - Number of rows of the encoded map
    /// * `width` - Number of columns of the encoded map
    ///
    /// # Returns
    /// * `Result<GridMap, NavigationError>` - The decoded map or an error if the strings do not fit the size
    pub fn to_map(&self, height: usize, width: usize) -> Result<GridMap, NavigationError> {
        let mut map = GridMap::new(height, width)?;
        let cell_count = height * width;

        let explored_bits = unpack_hex(&self.explored)?;
        if explored_bits.len() < GUARD_BITS + cell_count {
            return Err(NavigationError::InvalidDescriptor("Explored bitmap shorter than the map"));
        }
        let obstacle_bits = unpack_hex(&self.obstacles)?;
        let mut obstacle_iter = obstacle_bits.into_iter();

        for (i, explored) in explored_bits[GUARD_BITS..GUARD_BITS + cell_count].iter().enumerate() {
            if !explored {
                continue;
            }
            let p = GridPoint::new((i % width) as i32, (i / width) as i32);
            map.set_explored(p, true)?;
            let obstacle = obstacle_iter
                .next()
                .ok_or(NavigationError::InvalidDescriptor("Obstacle bitmap shorter than explored cells"))?;
            if obstacle {
                map.mark_obstacle(p, true);
            }
        }
        map.reinitialize_virtual_wall();
        Ok(map)
    }
}

fn pack_hex(bits: &[bool]) -> String {
    bits.chunks(4)
        .map(|group| {
            let nibble = (0..4).fold(0u32, |acc, i| (acc << 1) | u32::from(group.get(i).copied().unwrap_or(false)));
            char::from_digit(nibble, 16).unwrap_or('0')
        })
        .collect()
}

fn unpack_hex(hex: &str) -> Result<Vec<bool>, NavigationError> {
    let mut bits = Vec::with_capacity(hex.len() * 4);
    for c in hex.chars() {
        let nibble = c
            .to_digit(16)
            .ok_or(NavigationError::InvalidDescriptor("Non-hex character in bitmap"))?;
        bits.extend((0..4).rev().map(|i| nibble & (1 << i) != 0));
    }
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_pads_final_group() {
        assert_eq!(pack_hex(&[true, true, false, true, true]), "d8");
        assert_eq!(unpack_hex("d8").unwrap(), vec![true, true, false, true, true, false, false, false]);
    }

    #[test]
    fn test_hex_digits_are_lowercase() {
        let bits: Vec<bool> = (0..16).map(|i| i % 3 != 0).collect();
        let hex = pack_hex(&bits);
        assert_eq!(hex, "6db6");
        assert!(!hex.chars().any(|c| c.is_ascii_uppercase()), "companion app expects lowercase digits");
        assert_eq!(unpack_hex("6DB6").unwrap(), unpack_hex(&hex).unwrap(), "decoding ignores case");
    }

    #[test]
    fn test_empty_map_encoding() {
        let map = GridMap::new(20, 15).unwrap();
        let d = MapDescriptor::from_map(&map);
        // 2 + 300 + 2 bits -> 76 digits, all cells unexplored
        assert_eq!(d.explored.len(), 76);
        assert!(d.explored.starts_with("c0"));
        assert!(d.explored.ends_with('3'));
        assert_eq!(d.obstacles, "");
    }

    #[test]
    fn test_round_trip_preserves_flags() {
        let mut map = GridMap::new(20, 15).unwrap();
        for y in 0..12 {
            for x in 0..15 {
                map.set_explored(GridPoint::new(x, y), true).unwrap();
            }
        }
        map.set_obstacle(GridPoint::new(5, 5), true).unwrap();
        map.set_obstacle(GridPoint::new(10, 2), true).unwrap();
        map.set_explored(GridPoint::new(7, 18), true).unwrap();

        let text = MapDescriptor::from_map(&map).to_text();
        let loaded = MapDescriptor::parse(&text).unwrap().to_map(20, 15).unwrap();
        for (a, b) in map.cells().zip(loaded.cells()) {
            assert_eq!(a.is_explored(), b.is_explored(), "explored differs at {}", a.position());
            assert_eq!(a.is_obstacle(), b.is_obstacle(), "obstacle differs at {}", a.position());
            assert_eq!(a.is_virtual_wall(), b.is_virtual_wall(), "walls are re-derived identically");
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        let bad_hex = MapDescriptor { explored: "ZZ".into(), obstacles: String::new() };
        assert!(matches!(bad_hex.to_map(5, 5), Err(NavigationError::InvalidDescriptor(_))));

        let short = MapDescriptor { explored: "FF".into(), obstacles: String::new() };
        assert!(matches!(short.to_map(5, 5), Err(NavigationError::InvalidDescriptor(_))));

        assert!(MapDescriptor::parse("\n\n").is_err());
    }
}
