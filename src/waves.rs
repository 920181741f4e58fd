// Waves module - Stage-order generators for every wave pattern
//
// A wave is an ordered list of stages; each stage is the set of grid
// positions that light up together. Crystals without a pixel binding never
// appear in any stage. The directional formulas reproduce the display's
// historical behaviour exactly, including its asymmetries on non-square
// grids - tests pin those down rather than normalising them.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::grid::CrystalGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveKind {
    Left,
    Right,
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    ChainForward,
    ChainBackward,
    ChainCentre,
    Raindrop,
    Corruption,
    Shuffle,
}

impl WaveKind {
    /// Parse a sequence-catalog routine name. Unknown names are a
    /// configuration error, surfaced at load time.
    pub fn from_routine(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "left_wave" | "left" => Some(WaveKind::Left),
            "right_wave" | "right" => Some(WaveKind::Right),
            "top_wave" | "top" => Some(WaveKind::Top),
            "bottom_wave" | "bottom" => Some(WaveKind::Bottom),
            "top_left_wave" | "top_left" => Some(WaveKind::TopLeft),
            "top_right_wave" | "top_right" => Some(WaveKind::TopRight),
            "bottom_left_wave" | "bottom_left" => Some(WaveKind::BottomLeft),
            "bottom_right_wave" | "bottom_right" => Some(WaveKind::BottomRight),
            "chain_wave" | "forward_chain" => Some(WaveKind::ChainForward),
            "reverse_chain_wave" | "backward_chain" => Some(WaveKind::ChainBackward),
            "centre_chain_wave" | "centre_chain" => Some(WaveKind::ChainCentre),
            "rain_drop" | "raindrop" => Some(WaveKind::Raindrop),
            "cracked" | "corruption" => Some(WaveKind::Corruption),
            "random_crystal" | "shuffle" => Some(WaveKind::Shuffle),
            _ => None,
        }
    }

    pub fn routine(&self) -> &'static str {
        match self {
            WaveKind::Left => "left_wave",
            WaveKind::Right => "right_wave",
            WaveKind::Top => "top_wave",
            WaveKind::Bottom => "bottom_wave",
            WaveKind::TopLeft => "top_left_wave",
            WaveKind::TopRight => "top_right_wave",
            WaveKind::BottomLeft => "bottom_left_wave",
            WaveKind::BottomRight => "bottom_right_wave",
            WaveKind::ChainForward => "chain_wave",
            WaveKind::ChainBackward => "reverse_chain_wave",
            WaveKind::ChainCentre => "centre_chain_wave",
            WaveKind::Raindrop => "rain_drop",
            WaveKind::Corruption => "cracked",
            WaveKind::Shuffle => "random_crystal",
        }
    }

    /// Timer-table entry for the inter-stage delay.
    pub fn stage_timer(&self) -> &'static str {
        match self {
            WaveKind::Left => "left wave stages",
            WaveKind::Right => "right wave stages",
            WaveKind::Top => "top wave stages",
            WaveKind::Bottom => "bottom wave stages",
            WaveKind::TopLeft => "top left wave stages",
            WaveKind::TopRight => "top right wave stages",
            WaveKind::BottomLeft => "bottom left wave stages",
            WaveKind::BottomRight => "bottom right wave stages",
            WaveKind::ChainForward => "forward chain stages",
            WaveKind::ChainBackward => "backward chain stages",
            WaveKind::ChainCentre => "centre chain stages",
            WaveKind::Raindrop => "raindrop wave stages",
            WaveKind::Corruption => "cracked stages",
            WaveKind::Shuffle => "random stages",
        }
    }

    /// Timer-table entry for the per-step pulse delay. The corruption wave
    /// derives its step delay from the stage timer instead.
    pub fn pulse_timer(&self) -> Option<&'static str> {
        match self {
            WaveKind::Left => Some("left wave pulses"),
            WaveKind::Right => Some("right wave pulses"),
            WaveKind::Top => Some("top wave pulses"),
            WaveKind::Bottom => Some("bottom wave pulses"),
            WaveKind::TopLeft => Some("top left wave pulses"),
            WaveKind::TopRight => Some("top right wave pulses"),
            WaveKind::BottomLeft => Some("bottom left wave pulses"),
            WaveKind::BottomRight => Some("bottom right wave pulses"),
            WaveKind::ChainForward => Some("forward chain pulses"),
            WaveKind::ChainBackward => Some("backward chain pulses"),
            WaveKind::ChainCentre => Some("centre chain pulses"),
            WaveKind::Raindrop => Some("raindrop wave pulses"),
            WaveKind::Corruption => None,
            WaveKind::Shuffle => Some("button press pulses"),
        }
    }
}

fn push_stage(stages: &mut Vec<Vec<usize>>, stage: usize, pos: usize) {
    while stages.len() < stage + 1 {
        stages.push(Vec::new());
    }
    if !stages[stage].contains(&pos) {
        stages[stage].push(pos);
    }
}

/// Stage order for the eight directional waves and the three chain waves.
/// Raindrop, corruption and shuffle need a random start and are built by
/// their own generators below.
pub fn directional_stages(grid: &CrystalGrid, kind: WaveKind) -> Vec<Vec<usize>> {
    match kind {
        WaveKind::ChainForward | WaveKind::ChainBackward | WaveKind::ChainCentre => {
            return chain_stages(grid, kind);
        }
        _ => {}
    }

    let max_rows = grid.max_rows as isize;
    let max_cols = grid.max_cols as isize;
    // Bottom corner waves drop one row when the grid's last row is short
    let adjusted_rows = if grid.full_last_row {
        max_rows
    } else {
        max_rows - 1
    };

    let mut stages = Vec::new();
    for crystal in grid.crystals() {
        if crystal.pixel.is_none() {
            continue;
        }
        let row = crystal.row as isize;
        let col = crystal.column as isize;

        let stage = match kind {
            // Side waves bulge from the centre of the origin edge
            WaveKind::Left => (row - max_rows / 2).abs() + col,
            WaveKind::Right => (row - max_rows / 2).abs() + (max_cols - col),
            WaveKind::Top => (col - max_cols / 2).abs() + row,
            WaveKind::Bottom => (col - max_cols / 2).abs() + (max_rows - row),
            // Corner waves are Chebyshev distance from the origin corner.
            // TopRight keeps its historical off-by-one comparison.
            WaveKind::TopLeft => row.max(col),
            WaveKind::TopRight => {
                if row > max_cols - col - 1 {
                    row
                } else {
                    max_cols - col
                }
            }
            WaveKind::BottomLeft => {
                if adjusted_rows - row > col {
                    adjusted_rows - row
                } else {
                    col
                }
            }
            WaveKind::BottomRight => {
                if adjusted_rows - row < max_cols - col {
                    max_cols - col
                } else {
                    adjusted_rows - row
                }
            }
            _ => unreachable!("handled above"),
        };

        push_stage(&mut stages, stage.max(0) as usize, crystal.pos);
    }
    stages
}

/// Chain waves ignore grid geometry and follow the 1-D wiring order of the
/// strip. Pixel indices with no crystal produce empty stages so the timing
/// of the sweep is preserved.
fn chain_stages(grid: &CrystalGrid, kind: WaveKind) -> Vec<Vec<usize>> {
    let num_pixels = grid.num_pixels;
    let positions_at = |pixel: usize| -> Vec<usize> {
        grid.crystals()
            .iter()
            .filter(|c| c.pixel == Some(pixel))
            .map(|c| c.pos)
            .collect()
    };

    match kind {
        WaveKind::ChainForward => (0..num_pixels).map(positions_at).collect(),
        WaveKind::ChainBackward => (0..=num_pixels)
            .map(|i| positions_at(num_pixels - i))
            .collect(),
        WaveKind::ChainCentre => {
            let mut stages = Vec::new();
            let mut lower = (num_pixels / 2) as isize;
            let mut upper = num_pixels / 2;
            while lower > -1 && upper <= num_pixels {
                let mut stage = positions_at(lower as usize);
                if upper as isize != lower {
                    for pos in positions_at(upper) {
                        if !stage.contains(&pos) {
                            stage.push(pos);
                        }
                    }
                }
                stages.push(stage);
                lower -= 1;
                upper += 1;
            }
            stages
        }
        _ => unreachable!(),
    }
}

fn push_ring_pos(
    wave: &mut Vec<usize>,
    row: isize,
    col: isize,
    max_row: isize,
    max_col: isize,
    columns: isize,
) {
    if row >= 0 && row <= max_row && col >= 0 && col <= max_col {
        let pos = (row * columns + col) as usize;
        if !wave.contains(&pos) {
            wave.push(pos);
        }
    }
}

/// Expanding Chebyshev rings around a start cell: stage 0 is the start,
/// stage k the ring of cells exactly k steps out, clipped to the grid.
/// Expansion halts on the first ring with no in-bounds cell.
pub fn ring_stages(grid: &CrystalGrid, start_pos: usize) -> Vec<Vec<usize>> {
    let columns = (grid.max_cols + 1) as isize;
    let start_row = (start_pos as isize) / columns;
    let start_col = (start_pos as isize) % columns;
    let max_row = grid.max_rows as isize;
    let max_col = grid.max_cols as isize;

    let mut stages = vec![vec![start_pos]];
    let mut ring = 1isize;
    loop {
        let mut wave = Vec::new();
        for col in [start_col - ring, start_col + ring] {
            for dr in -ring..=ring {
                push_ring_pos(&mut wave, start_row + dr, col, max_row, max_col, columns);
            }
        }
        // Boundary rows skip the corners already taken by the column scans
        for row in [start_row - ring, start_row + ring] {
            for dc in -(ring - 1)..=(ring - 1) {
                push_ring_pos(&mut wave, row, start_col + dc, max_row, max_col, columns);
            }
        }
        if wave.is_empty() {
            break;
        }
        stages.push(wave);
        ring += 1;
    }
    stages
}

/// Every wired position in random order, one per stage.
pub fn shuffle_stages<R: Rng>(grid: &CrystalGrid, rng: &mut R) -> Vec<Vec<usize>> {
    let mut positions = grid.wired_positions();
    positions.shuffle(rng);
    positions.into_iter().map(|pos| vec![pos]).collect()
}

/// Random wired position, for the raindrop start cell.
pub fn random_wired_position<R: Rng>(grid: &CrystalGrid, rng: &mut R) -> Option<usize> {
    let wired = grid.wired_positions();
    if wired.is_empty() {
        None
    } else {
        Some(wired[rng.gen_range(0..wired.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::test_support::wired_grid;
    use std::collections::HashSet;

    const DIRECTIONAL: [WaveKind; 8] = [
        WaveKind::Left,
        WaveKind::Right,
        WaveKind::Top,
        WaveKind::Bottom,
        WaveKind::TopLeft,
        WaveKind::TopRight,
        WaveKind::BottomLeft,
        WaveKind::BottomRight,
    ];

    fn stage_of(stages: &[Vec<usize>], pos: usize) -> Option<usize> {
        stages.iter().position(|stage| stage.contains(&pos))
    }

    #[test]
    fn test_directional_waves_cover_wired_set_once() {
        let grid = wired_grid(4, 5);
        let wired: HashSet<usize> = grid.wired_positions().into_iter().collect();
        for kind in DIRECTIONAL {
            let stages = directional_stages(&grid, kind);
            let mut seen = HashSet::new();
            for stage in &stages {
                for &pos in stage {
                    assert!(seen.insert(pos), "{kind:?}: {pos} in two stages");
                }
            }
            assert_eq!(seen, wired, "{kind:?} misses wired crystals");
        }
    }

    #[test]
    fn test_left_wave_monotone_in_column() {
        let grid = wired_grid(4, 5);
        for crystal in grid.crystals() {
            if crystal.column == 0 {
                continue;
            }
            let stages = directional_stages(&grid, WaveKind::Left);
            let here = stage_of(&stages, crystal.pos).unwrap();
            let left_neighbour = stage_of(&stages, crystal.pos - 1).unwrap();
            assert!(here >= left_neighbour);
        }
    }

    #[test]
    fn test_top_left_wave_is_chebyshev_on_3x3() {
        let grid = wired_grid(3, 3);
        let stages = directional_stages(&grid, WaveKind::TopLeft);
        assert_eq!(stage_of(&stages, 0), Some(0)); // (0,0)
        assert_eq!(stage_of(&stages, 4), Some(1)); // (1,1)
        assert_eq!(stage_of(&stages, 8), Some(2)); // (2,2)
        assert_eq!(stage_of(&stages, 2), Some(2)); // (0,2)
        assert_eq!(stage_of(&stages, 6), Some(2)); // (2,0)
    }

    #[test]
    fn test_top_right_wave_keeps_asymmetric_comparison() {
        // On a 3x3 grid, (1,1): row=1, max_cols-col-1 = 0, so the row wins
        // even though Chebyshev distance from (0,2) is 1 either way.
        let grid = wired_grid(3, 3);
        let stages = directional_stages(&grid, WaveKind::TopRight);
        assert_eq!(stage_of(&stages, 4), Some(1));
        // (2,2): row=2 > -1, stage = 2
        assert_eq!(stage_of(&stages, 8), Some(2));
        // (0,0): row=0, not > 2-0-1=1, stage = max_cols - 0 = 2
        assert_eq!(stage_of(&stages, 0), Some(2));
    }

    #[test]
    fn test_ring_stages_terminate_and_start_alone() {
        let grid = wired_grid(5, 5);
        let centre = 12; // (2,2)
        let stages = ring_stages(&grid, centre);
        assert_eq!(stages[0], vec![centre]);
        // Ring count is bounded by the larger grid dimension
        assert!(stages.len() - 1 <= 5);
        // First ring is the 8 neighbours of the centre
        assert_eq!(stages[1].len(), 8);
    }

    #[test]
    fn test_ring_stages_clip_at_corner() {
        let grid = wired_grid(3, 3);
        let stages = ring_stages(&grid, 0);
        assert_eq!(stages[0], vec![0]);
        let ring1: HashSet<usize> = stages[1].iter().copied().collect();
        assert_eq!(ring1, HashSet::from([1, 3, 4]));
    }

    #[test]
    fn test_chain_forward_follows_pixel_order() {
        let grid = wired_grid(2, 3);
        let stages = directional_stages(&grid, WaveKind::ChainForward);
        assert_eq!(stages.len(), 6);
        for (pixel, stage) in stages.iter().enumerate() {
            assert_eq!(stage, &vec![pixel]);
        }
    }

    #[test]
    fn test_chain_backward_leads_with_empty_stage() {
        let grid = wired_grid(2, 3);
        let stages = directional_stages(&grid, WaveKind::ChainBackward);
        // Historical scan starts one past the last pixel
        assert_eq!(stages[0], Vec::<usize>::new());
        assert_eq!(stages[1], vec![5]);
        assert_eq!(stages[6], vec![0]);
    }

    #[test]
    fn test_chain_centre_expands_outward() {
        let grid = wired_grid(1, 6);
        let stages = directional_stages(&grid, WaveKind::ChainCentre);
        assert_eq!(stages[0], vec![3]);
        let second: HashSet<usize> = stages[1].iter().copied().collect();
        assert_eq!(second, HashSet::from([2, 4]));
    }

    #[test]
    fn test_shuffle_covers_every_wired_position() {
        let grid = wired_grid(3, 3);
        let mut rng = rand::thread_rng();
        let stages = shuffle_stages(&grid, &mut rng);
        assert_eq!(stages.len(), 9);
        let seen: HashSet<usize> = stages.iter().flatten().copied().collect();
        assert_eq!(seen.len(), 9);
    }

    #[test]
    fn test_routine_name_round_trip() {
        for kind in [
            WaveKind::Left,
            WaveKind::ChainCentre,
            WaveKind::Corruption,
            WaveKind::Shuffle,
        ] {
            assert_eq!(WaveKind::from_routine(kind.routine()), Some(kind));
        }
        assert_eq!(WaveKind::from_routine("lava_lamp"), None);
    }
}
