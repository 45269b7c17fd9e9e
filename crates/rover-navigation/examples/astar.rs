use rover_navigation::{Direction, GridMap, GridPoint, MAX_MOVE, Planner, group_moves, path_commands};

fn main() {
    // 15 x 20 arena, fully known, with a few obstacles
    let mut map = GridMap::new(15, 20).expect("valid dimensions");
    map.set_all_explored();
    for (x, y) in [(5, 2), (5, 3), (9, 7), (10, 7), (14, 11), (3, 10)] {
        map.set_obstacle(GridPoint::new(x, y), true).expect("inside the arena");
    }

    let start = GridPoint::new(1, 1);
    let goal = GridPoint::new(18, 13);
    let heading = Direction::Right;

    let result = Planner::new(&map).search_detailed(start, goal, heading);
    println!("{result}");

    let Some(path) = result.into_path() else {
        println!("\nNo path found.");
        return;
    };
    for &p in &path {
        map.set_on_path(p, true);
    }
    println!("\n{map}");

    let commands = path_commands(start, heading, &path);
    let wire: Vec<String> = group_moves(&commands, MAX_MOVE).iter().map(|s| s.encode()).collect();
    println!("Commands: {}", wire.concat());
}
