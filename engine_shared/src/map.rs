//! 2D ASCII tile maps.
//!
//! A map is a plain-text tile grid plus a handful of tagged positions
//! (spawns, flags, payload cart tracks, respawn room visualizers, resupply
//! lockers, health/ammo pickups) and two free-text blocks (a resource list
//! and a script). Solidity, line-of-sight and pathfinding are all derived
//! from the tile grid.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::math::{Direction, Vec2};

pub const AIR_CHAR: char = ' ';
pub const ONEWAY_LEFT_CHAR: char = '<';
pub const ONEWAY_RIGHT_CHAR: char = '>';
pub const ONEWAY_UP_CHAR: char = '^';
pub const ONEWAY_DOWN_CHAR: char = 'v';

const COST_STRAIGHT: u32 = 1000;
const COST_DIAGONAL: u32 = 1414;

/// A tile is solid, full stop, unless it is air or a one-way tile.
pub fn is_solid_char(ch: char) -> bool {
    !matches!(
        ch,
        AIR_CHAR | ONEWAY_LEFT_CHAR | ONEWAY_RIGHT_CHAR | ONEWAY_UP_CHAR | ONEWAY_DOWN_CHAR
    )
}

/// A rectangular grid of tiles. Rows shorter than the widest row are
/// right-padded with `pad` when parsed from text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileMatrix<T> {
    width: usize,
    height: usize,
    tiles: Vec<T>,
}

impl TileMatrix<char> {
    pub fn from_str(data: &str, pad: char) -> Self {
        let rows: Vec<Vec<char>> = data.lines().map(|line| line.chars().collect()).collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let height = rows.len();
        let mut tiles = Vec::with_capacity(width * height);
        for row in &rows {
            for x in 0..width {
                tiles.push(row.get(x).copied().unwrap_or(pad));
            }
        }
        Self {
            width,
            height,
            tiles,
        }
    }
}

impl<T: Copy> TileMatrix<T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.tiles.get(y * self.width + x).copied()
    }

    pub fn get_or(&self, x: usize, y: usize, default: T) -> T {
        self.get(x, y).unwrap_or(default)
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        if x < self.width && y < self.height {
            let index = y * self.width + x;
            self.tiles[index] = value;
        }
    }
}

fn parse_substr<'a>(str: &'a str, begin_tag: &str, end_tag: &str) -> Option<&'a str> {
    let begin = str.find(begin_tag)?;
    let begin_of_body = begin + begin_tag.len();
    let end = str[begin..].find(end_tag).map(|i| begin + i)?;
    if begin_of_body < end {
        Some(&str[begin_of_body..end])
    } else {
        None
    }
}

fn parse_char(str: &str, tag: &str) -> char {
    match str.find(tag) {
        Some(i) => str[i + tag.len()..].chars().next().unwrap_or('\0'),
        None => '\0',
    }
}

/// Walks an unordered set of track tiles into an ordered path, starting at
/// `start` and always preferring to continue in the same direction of
/// travel ("extrapolating") before falling back to any unvisited neighbor.
fn make_path(nodes: &HashSet<Vec2>, start: Vec2) -> Vec<Vec2> {
    fn unvisited_neighbor(nodes: &HashSet<Vec2>, p: Vec2, visited: &HashSet<Vec2>) -> Option<Vec2> {
        let candidates = [
            Vec2::new(p.x, p.y - 1),
            Vec2::new(p.x, p.y + 1),
            Vec2::new(p.x - 1, p.y),
            Vec2::new(p.x + 1, p.y),
            Vec2::new(p.x - 1, p.y - 1),
            Vec2::new(p.x + 1, p.y - 1),
            Vec2::new(p.x - 1, p.y + 1),
            Vec2::new(p.x + 1, p.y + 1),
        ];
        candidates
            .into_iter()
            .find(|c| nodes.contains(c) && !visited.contains(c))
    }

    let mut path = vec![start];
    let mut visited = HashSet::new();
    let mut previous = start;
    let mut current = unvisited_neighbor(nodes, start, &visited);

    while let Some(position) = current {
        let extrapolated = Vec2::new(
            position.x + (position.x - previous.x),
            position.y + (position.y - previous.y),
        );

        path.push(position);
        visited.insert(position);

        current = if nodes.contains(&extrapolated) && !visited.contains(&extrapolated) {
            Some(extrapolated)
        } else {
            unvisited_neighbor(nodes, position, &visited)
        };

        previous = position;
    }

    path
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// The `[DATA]` block (or the whole file, if untagged) produced an empty tile grid.
    EmptyData,
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapError::EmptyData => write!(f, "map data is empty"),
        }
    }
}

impl std::error::Error for MapError {}

/// A loaded map: a tile grid plus tagged spawn/pickup/track positions.
#[derive(Debug, Clone, Default)]
pub struct Map {
    matrix: TileMatrix<char>,
    name: String,
    hash: u32,
    red_cart_spawn: Vec2,
    blue_cart_spawn: Vec2,
    red_cart_path: Vec<Vec2>,
    blue_cart_path: Vec<Vec2>,
    red_flag_spawns: Vec<Vec2>,
    blue_flag_spawns: Vec<Vec2>,
    red_spawns: Vec<Vec2>,
    blue_spawns: Vec<Vec2>,
    red_respawn_room_visualizers: Vec<Vec2>,
    blue_respawn_room_visualizers: Vec<Vec2>,
    resupply_lockers: Vec<Vec2>,
    medkit_spawns: Vec<Vec2>,
    ammopack_spawns: Vec<Vec2>,
    resources: Vec<String>,
    script: String,
}

impl Map {
    pub const fn is_solid_char(ch: char) -> bool {
        !matches!(
            ch,
            AIR_CHAR | ONEWAY_LEFT_CHAR | ONEWAY_RIGHT_CHAR | ONEWAY_UP_CHAR | ONEWAY_DOWN_CHAR
        )
    }

    /// Parses a map file. `[DATA]`/`[END_DATA]` brackets the tile grid; if
    /// absent, the entire string is treated as the grid. `[RESOURCES]` and
    /// `[SCRIPT]` blocks are optional free text. Single-line tags like
    /// `[SPAWN_RED] X` bind a tile character to a role; matching tiles are
    /// extracted from the grid (replaced with air) and recorded as typed
    /// positions.
    pub fn load(name: String, str: &str) -> Result<Self, MapError> {
        let data = parse_substr(str, "[DATA]\n", "\n[END_DATA]").unwrap_or(str);

        let hash = {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(data.as_bytes());
            hasher.finalize()
        };

        let mut matrix = TileMatrix::from_str(data, AIR_CHAR);
        if matrix.is_empty() {
            return Err(MapError::EmptyData);
        }

        let resources = parse_substr(str, "[RESOURCES]\n", "[END_RESOURCES]")
            .unwrap_or("")
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        let script = parse_substr(str, "[SCRIPT]\n", "\n[END_SCRIPT]")
            .unwrap_or("")
            .to_owned();

        let red_spawn_char = parse_char(str, "[SPAWN_RED] ");
        let blue_spawn_char = parse_char(str, "[SPAWN_BLU] ");
        let medkit_char = parse_char(str, "[MEDKIT] ");
        let ammopack_char = parse_char(str, "[AMMOPACK] ");
        let red_flag_char = parse_char(str, "[FLAG_RED] ");
        let blue_flag_char = parse_char(str, "[FLAG_BLU] ");
        let red_spawn_vis_char = parse_char(str, "[SPAWNVIS_RED] ");
        let blue_spawn_vis_char = parse_char(str, "[SPAWNVIS_BLU] ");
        let resupply_char = parse_char(str, "[RESUPPLY] ");
        let red_track_char = parse_char(str, "[TRACK_RED] ");
        let blue_track_char = parse_char(str, "[TRACK_BLU] ");
        let red_cart_char = parse_char(str, "[CART_RED] ");
        let blue_cart_char = parse_char(str, "[CART_BLU] ");

        let mut red_track = HashSet::new();
        let mut blue_track = HashSet::new();
        let mut red_cart_spawn = Vec2::ZERO;
        let mut blue_cart_spawn = Vec2::ZERO;
        let mut red_spawns = Vec::new();
        let mut blue_spawns = Vec::new();
        let mut medkit_spawns = Vec::new();
        let mut ammopack_spawns = Vec::new();
        let mut red_flag_spawns = Vec::new();
        let mut blue_flag_spawns = Vec::new();
        let mut red_respawn_room_visualizers = Vec::new();
        let mut blue_respawn_room_visualizers = Vec::new();
        let mut resupply_lockers = Vec::new();

        for y in 0..matrix.height() {
            for x in 0..matrix.width() {
                let position = Vec2::new(x as i16, y as i16);
                let ch = match matrix.get(x, y) {
                    Some(ch) => ch,
                    None => continue,
                };

                if ch == red_track_char {
                    red_track.insert(position);
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == blue_track_char {
                    blue_track.insert(position);
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == red_cart_char {
                    red_cart_spawn = position;
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == blue_cart_char {
                    blue_cart_spawn = position;
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == red_spawn_char {
                    red_spawns.push(position);
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == blue_spawn_char {
                    blue_spawns.push(position);
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == medkit_char {
                    medkit_spawns.push(position);
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == ammopack_char {
                    ammopack_spawns.push(position);
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == red_flag_char {
                    red_flag_spawns.push(position);
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == blue_flag_char {
                    blue_flag_spawns.push(position);
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == red_spawn_vis_char {
                    red_respawn_room_visualizers.push(position);
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == blue_spawn_vis_char {
                    blue_respawn_room_visualizers.push(position);
                    matrix.set(x, y, AIR_CHAR);
                } else if ch == resupply_char {
                    resupply_lockers.push(position);
                    matrix.set(x, y, AIR_CHAR);
                }
            }
        }

        let red_cart_path = if red_track.is_empty() {
            Vec::new()
        } else {
            make_path(&red_track, red_cart_spawn)
        };
        let blue_cart_path = if blue_track.is_empty() {
            Vec::new()
        } else {
            make_path(&blue_track, blue_cart_spawn)
        };

        Ok(Self {
            matrix,
            name,
            hash,
            red_cart_spawn,
            blue_cart_spawn,
            red_cart_path,
            blue_cart_path,
            red_flag_spawns,
            blue_flag_spawns,
            red_spawns,
            blue_spawns,
            red_respawn_room_visualizers,
            blue_respawn_room_visualizers,
            resupply_lockers,
            medkit_spawns,
            ammopack_spawns,
            resources,
            script,
        })
    }

    pub fn is_loaded(&self) -> bool {
        !self.matrix.is_empty()
    }

    pub fn width(&self) -> i16 {
        self.matrix.width() as i16
    }

    pub fn height(&self) -> i16 {
        self.matrix.height() as i16
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matrix(&self) -> &TileMatrix<char> {
        &self.matrix
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn red_cart_spawn(&self) -> Vec2 {
        self.red_cart_spawn
    }

    pub fn blue_cart_spawn(&self) -> Vec2 {
        self.blue_cart_spawn
    }

    pub fn red_cart_path(&self) -> &[Vec2] {
        &self.red_cart_path
    }

    pub fn blue_cart_path(&self) -> &[Vec2] {
        &self.blue_cart_path
    }

    pub fn red_flag_spawns(&self) -> &[Vec2] {
        &self.red_flag_spawns
    }

    pub fn blue_flag_spawns(&self) -> &[Vec2] {
        &self.blue_flag_spawns
    }

    pub fn red_spawns(&self) -> &[Vec2] {
        &self.red_spawns
    }

    pub fn blue_spawns(&self) -> &[Vec2] {
        &self.blue_spawns
    }

    pub fn red_respawn_room_visualizers(&self) -> &[Vec2] {
        &self.red_respawn_room_visualizers
    }

    pub fn blue_respawn_room_visualizers(&self) -> &[Vec2] {
        &self.blue_respawn_room_visualizers
    }

    pub fn resupply_lockers(&self) -> &[Vec2] {
        &self.resupply_lockers
    }

    pub fn medkit_spawns(&self) -> &[Vec2] {
        &self.medkit_spawns
    }

    pub fn ammopack_spawns(&self) -> &[Vec2] {
        &self.ammopack_spawns
    }

    pub fn get(&self, p: Vec2) -> char {
        self.get_or(p, '\0')
    }

    pub fn get_or(&self, p: Vec2, default: char) -> char {
        if p.x < 0 || p.y < 0 {
            return default;
        }
        self.matrix.get_or(p.x as usize, p.y as usize, default)
    }

    pub fn is_resupply_locker(&self, p: Vec2) -> bool {
        self.resupply_lockers.contains(&p)
    }

    pub fn is_red_respawn_room_visualizer(&self, p: Vec2) -> bool {
        self.red_respawn_room_visualizers.contains(&p)
    }

    pub fn is_blue_respawn_room_visualizer(&self, p: Vec2) -> bool {
        self.blue_respawn_room_visualizers.contains(&p)
    }

    /// Solidity ignoring direction of travel: one-way tiles are always
    /// passable from this overload's point of view.
    pub fn is_solid(&self, p: Vec2, red: bool, blue: bool) -> bool {
        match self.get(p) {
            AIR_CHAR => {
                (!red && self.is_red_respawn_room_visualizer(p))
                    || (!blue && self.is_blue_respawn_room_visualizer(p))
            }
            ONEWAY_LEFT_CHAR | ONEWAY_RIGHT_CHAR | ONEWAY_UP_CHAR | ONEWAY_DOWN_CHAR => false,
            _ => true,
        }
    }

    /// Solidity accounting for one-way tiles: a one-way tile is solid to
    /// anyone not moving in its permitted direction.
    pub fn is_solid_in_direction(&self, p: Vec2, red: bool, blue: bool, move_direction: Direction) -> bool {
        match self.get(p) {
            AIR_CHAR => {
                (!red && self.is_red_respawn_room_visualizer(p))
                    || (!blue && self.is_blue_respawn_room_visualizer(p))
            }
            ONEWAY_LEFT_CHAR => !move_direction.has_left(),
            ONEWAY_RIGHT_CHAR => !move_direction.has_right(),
            ONEWAY_UP_CHAR => !move_direction.has_up(),
            ONEWAY_DOWN_CHAR => !move_direction.has_down(),
            _ => true,
        }
    }

    /// Bresenham line of sight, ignoring team/respawn-room rules entirely:
    /// only the raw tile solidity of `Map::is_solid_char` matters.
    pub fn line_of_sight(&self, mut p1: Vec2, p2: Vec2) -> bool {
        let dx = (p2.x as i32 - p1.x as i32).abs();
        let dy = (p2.y as i32 - p1.y as i32).abs();
        let sx: i16 = if p1.x < p2.x { 1 } else { -1 };
        let sy: i16 = if p1.y < p2.y { 1 } else { -1 };

        let mut err = if dx > dy { dx } else { -dy } / 2;
        loop {
            if is_solid_char(self.get(p1)) {
                return false;
            }
            if p1 == p2 {
                break;
            }
            let error = err;
            if error > -dx {
                err -= dy;
                p1.x += sx;
            }
            if error < dy {
                err += dx;
                p1.y += sy;
            }
        }
        true
    }

    /// A* over the 8-connected grid. Cardinal steps cost 1000, diagonal
    /// steps cost 1414; the heuristic is Manhattan distance scaled by 1000
    /// to stay admissible against those integer step costs.
    ///
    /// Returns an empty vector if no path exists. A non-empty path always
    /// has the destination as its first element and is meant to be walked
    /// in reverse; the start position itself is never included, unless it
    /// is also the destination.
    pub fn find_path(&self, start: Vec2, destination: Vec2, red: bool, blue: bool) -> Vec<Vec2> {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        struct Node {
            cost: u32,
            position: Vec2,
        }

        impl Ord for Node {
            fn cmp(&self, other: &Self) -> Ordering {
                other.cost.cmp(&self.cost)
            }
        }

        impl PartialOrd for Node {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let heuristic = |p: Vec2| p.manhattan_distance(destination) as u32 * 1000;

        let mut cost = HashMap::new();
        cost.insert(start, 0u32);
        let mut previous = HashMap::new();
        previous.insert(start, start);
        let mut queue = BinaryHeap::new();
        queue.push(Node {
            cost: 0,
            position: start,
        });

        while let Some(node) = queue.pop() {
            if node.position == destination {
                break;
            }

            self.for_each_non_solid_neighbor(node.position, red, blue, |neighbor, weight| {
                let new_cost = cost[&node.position] + weight;
                let better = match cost.get(&neighbor) {
                    None => true,
                    Some(&existing) => new_cost < existing,
                };
                if better {
                    cost.insert(neighbor, new_cost);
                    previous.insert(neighbor, node.position);
                    queue.push(Node {
                        cost: new_cost + heuristic(neighbor),
                        position: neighbor,
                    });
                }
            });
        }

        let mut path = Vec::new();
        if let Some(&first_pred) = previous.get(&destination) {
            path.push(destination);
            let mut pred = first_pred;
            loop {
                if pred == start {
                    break;
                }
                path.push(pred);
                match previous.get(&pred) {
                    Some(&next_pred) => pred = next_pred,
                    None => break,
                }
            }
        }
        path
    }

    fn for_each_non_solid_neighbor(
        &self,
        p: Vec2,
        red: bool,
        blue: bool,
        mut callback: impl FnMut(Vec2, u32),
    ) {
        let up = Vec2::new(p.x, p.y - 1);
        if !self.is_solid_in_direction(up, red, blue, Direction::up()) {
            callback(up, COST_STRAIGHT);
        }
        let down = Vec2::new(p.x, p.y + 1);
        if !self.is_solid_in_direction(down, red, blue, Direction::down()) {
            callback(down, COST_STRAIGHT);
        }
        let left = Vec2::new(p.x - 1, p.y);
        if !self.is_solid_in_direction(left, red, blue, Direction::left()) {
            callback(left, COST_STRAIGHT);
        }
        let right = Vec2::new(p.x + 1, p.y);
        if !self.is_solid_in_direction(right, red, blue, Direction::right()) {
            callback(right, COST_STRAIGHT);
        }

        let up_left = Vec2::new(p.x - 1, p.y - 1);
        if !self.is_solid_in_direction(up_left, red, blue, Direction::up() | Direction::left()) {
            callback(up_left, COST_DIAGONAL);
        }
        let up_right = Vec2::new(p.x + 1, p.y - 1);
        if !self.is_solid_in_direction(up_right, red, blue, Direction::up() | Direction::right()) {
            callback(up_right, COST_DIAGONAL);
        }
        let down_left = Vec2::new(p.x - 1, p.y + 1);
        if !self.is_solid_in_direction(down_left, red, blue, Direction::down() | Direction::left()) {
            callback(down_left, COST_DIAGONAL);
        }
        let down_right = Vec2::new(p.x + 1, p.y + 1);
        if !self.is_solid_in_direction(down_right, red, blue, Direction::down() | Direction::right()) {
            callback(down_right, COST_DIAGONAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_map(rows: &[&str]) -> Map {
        let data = rows.join("\n");
        Map::load("test".to_owned(), &data).unwrap()
    }

    #[test]
    fn load_rejects_empty_data() {
        assert_eq!(Map::load("empty".to_owned(), ""), Err(MapError::EmptyData));
    }

    #[test]
    fn hash_is_stable_for_identical_data() {
        let a = Map::load("a".to_owned(), "#####\n#   #\n#####").unwrap();
        let b = Map::load("b".to_owned(), "#####\n#   #\n#####").unwrap();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn spawn_tags_are_stripped_from_the_grid_and_recorded() {
        let data = "[SPAWN_RED] R\n[DATA]\n#####\n#R  #\n#####\n[END_DATA]";
        let map = Map::load("spawns".to_owned(), data).unwrap();
        assert_eq!(map.red_spawns(), &[Vec2::new(1, 1)]);
        assert_eq!(map.get(Vec2::new(1, 1)), AIR_CHAR);
    }

    #[test]
    fn line_of_sight_blocked_by_wall() {
        let map = open_map(&["#####", "#   #", "# # #", "#   #", "#####"]);
        assert!(!map.line_of_sight(Vec2::new(1, 1), Vec2::new(3, 3)));
        assert!(map.line_of_sight(Vec2::new(1, 1), Vec2::new(3, 1)));
    }

    #[test]
    fn line_of_sight_diagonal_through_center_tile_is_blocked_both_ways() {
        // A single solid tile at the center of a square blocks both its
        // diagonals identically: (0,0)-(4,4) and (0,4)-(4,0) both pass
        // through (2,2) under this Bresenham stepping.
        let map = open_map(&["     ", "     ", "  #  ", "     ", "     "]);
        assert!(!map.line_of_sight(Vec2::new(0, 0), Vec2::new(4, 4)));
        assert!(!map.line_of_sight(Vec2::new(0, 4), Vec2::new(4, 0)));
    }

    #[test]
    fn find_path_around_a_wall_with_one_gap() {
        let mut rows = Vec::new();
        for y in 0..10 {
            if y < 9 {
                rows.push("    #     ".to_string());
            } else {
                rows.push("          ".to_string());
            }
        }
        let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let map = open_map(&row_refs);

        let path = map.find_path(Vec2::new(0, 0), Vec2::new(9, 0), false, false);
        assert_eq!(path.first(), Some(&Vec2::new(9, 0)));
        assert_eq!(path.len(), 18);
    }

    #[test]
    fn is_solid_respects_respawn_room_visualizer_for_opposing_team() {
        let data = "[SPAWNVIS_RED] V\n[DATA]\nV\n[END_DATA]";
        let map = Map::load("vis".to_owned(), data).unwrap();
        assert!(map.is_solid(Vec2::new(0, 0), false, false));
        assert!(!map.is_solid(Vec2::new(0, 0), true, false));
    }

    #[test]
    fn one_way_tile_blocks_the_wrong_direction() {
        let map = open_map(&["^"]);
        let p = Vec2::new(0, 0);
        assert!(map.is_solid_in_direction(p, true, true, Direction::down()));
        assert!(!map.is_solid_in_direction(p, true, true, Direction::up()));
        assert!(!map.is_solid(p, true, true));
    }

    #[test]
    fn find_path_returns_empty_when_unreachable() {
        let map = open_map(&["#####", "#   #", "#####", "#   #", "#####"]);
        let path = map.find_path(Vec2::new(1, 1), Vec2::new(1, 3), false, false);
        assert!(path.is_empty());
    }

    #[test]
    fn find_path_start_equals_destination() {
        let map = open_map(&["   "]);
        let path = map.find_path(Vec2::new(1, 0), Vec2::new(1, 0), false, false);
        assert_eq!(path, vec![Vec2::new(1, 0)]);
    }

    #[test]
    fn find_path_through_a_gap() {
        let map = open_map(&[
            "##########",
            "#        #",
            "#        #",
            "########  ",
            "#        #",
            "#        #",
            "##########",
        ]);
        let path = map.find_path(Vec2::new(1, 1), Vec2::new(9, 5), false, false);
        assert_eq!(path.first(), Some(&Vec2::new(9, 5)));
        assert!(!path.is_empty());
    }
}
