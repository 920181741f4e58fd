// Runner module - Drives a wave through its stages
//
// The runner owns the lifecycle of one wave: preempt whatever is animating,
// launch one pulse task per crystal stage by stage, and hand the grid back
// by clearing `block` and `sequence_active`. A button press aborts the
// rollout between stages; the preemption itself is global and hard.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::{Timers, TIMER_BUTTON_PULSES};
use crate::control::{AnimationControl, SETTLE_DELAY};
use crate::grid::CrystalGrid;
use crate::pulse::{corruption_pulse, standard_pulse};
use crate::types::ColourProfile;
use crate::waves::{self, WaveKind};

/// Grace period after the last stage so trailing pulses can finish.
pub const WAVE_COOL_DOWN: Duration = Duration::from_secs(10);

/// Animation steps one full pulse takes (rise + fall) plus half a ramp of
/// slack; used to estimate how long a wave stays visible.
const EXPECTED_PULSE_STEPS: f64 = 510.0 + 127.5;

/// How the crystals of a stage are animated.
#[derive(Clone, Copy, Debug)]
pub enum PulseMode {
    Standard {
        pulse_delay: Duration,
        pulse_count: u32,
    },
    Corruption {
        colour: ColourProfile,
    },
}

/// Run a wave to completion. Preempts all in-flight pulse tasks, then
/// launches the stages in generator order with `stage_delay` between them.
/// `button_active` aborts the rollout; the cool-down and flag handover
/// happen either way.
pub async fn run_wave(
    grid: Arc<CrystalGrid>,
    control: Arc<AnimationControl>,
    stages: Vec<Vec<usize>>,
    stage_delay: Duration,
    mode: PulseMode,
) {
    control.preempt().await;

    let total_stages = stages.len().saturating_sub(1);
    'stages: for (stage_no, stage) in stages.iter().enumerate() {
        if control.button_active() {
            break;
        }
        for &pos in stage {
            if control.button_active() {
                break 'stages;
            }
            let Some(index) = grid.index_by_pos(pos) else {
                continue;
            };
            match mode {
                PulseMode::Standard {
                    pulse_delay,
                    pulse_count,
                } => {
                    tokio::spawn(standard_pulse(
                        grid.clone(),
                        control.clone(),
                        index,
                        pulse_delay,
                        pulse_count,
                        false,
                    ));
                }
                PulseMode::Corruption { colour } => {
                    tokio::spawn(corruption_pulse(
                        grid.clone(),
                        control.clone(),
                        index,
                        colour,
                        total_stages,
                        stage_no,
                        stage_delay,
                        false,
                    ));
                }
            }
        }
        tokio::time::sleep(stage_delay).await;
    }

    tokio::time::sleep(WAVE_COOL_DOWN).await;
    control.set_block(false);
    control.end_sequence();
}

/// Launch one wave sequence end to end: claim the sequence slot, generate
/// the stage order and run it. A no-op when another sequence already owns
/// the grid.
pub async fn launch_sequence(
    grid: Arc<CrystalGrid>,
    control: Arc<AnimationControl>,
    timers: Arc<Timers>,
    kind: WaveKind,
    shuffle_pulses: u32,
) -> Result<()> {
    let stage_delay = timers.duration(kind.stage_timer())?;
    let standard_mode = match kind.pulse_timer() {
        Some(name) => Some(PulseMode::Standard {
            pulse_delay: timers.duration(name)?,
            pulse_count: if kind == WaveKind::Shuffle {
                shuffle_pulses
            } else {
                1
            },
        }),
        None => None,
    };

    if !control.try_begin_sequence() {
        return Ok(());
    }

    let (stages, mode) = match kind {
        WaveKind::Corruption => {
            let cracked = grid.cracked_indices();
            if cracked.is_empty() {
                warn!("corruption wave skipped: no cracked crystals configured");
                control.end_sequence();
                return Ok(());
            }
            let index = {
                let mut rng = rand::thread_rng();
                cracked[rng.gen_range(0..cracked.len())]
            };
            let crystal = &grid.crystals()[index];
            let colour = crystal.cracked_profile.unwrap_or(crystal.profile);
            (
                waves::ring_stages(&grid, crystal.pos),
                PulseMode::Corruption { colour },
            )
        }
        WaveKind::Raindrop => {
            let start = {
                let mut rng = rand::thread_rng();
                waves::random_wired_position(&grid, &mut rng)
            };
            let Some(start) = start else {
                warn!("raindrop wave skipped: no wired crystals");
                control.end_sequence();
                return Ok(());
            };
            (waves::ring_stages(&grid, start), standard_mode.unwrap())
        }
        WaveKind::Shuffle => {
            let stages = {
                let mut rng = rand::thread_rng();
                waves::shuffle_stages(&grid, &mut rng)
            };
            (stages, standard_mode.unwrap())
        }
        _ => (
            waves::directional_stages(&grid, kind),
            standard_mode.unwrap(),
        ),
    };

    debug!(routine = kind.routine(), stages = stages.len(), "running wave");
    run_wave(grid, control, stages, stage_delay, mode).await;
    Ok(())
}

/// Rough wall-clock estimate for one run of `kind`, used by the ambient
/// selector to avoid re-triggering before the wave visually finishes.
pub fn expected_duration(
    kind: WaveKind,
    grid: &CrystalGrid,
    timers: &Timers,
    shuffle_pulses: u32,
) -> Duration {
    let stage_bound = match kind {
        WaveKind::ChainForward | WaveKind::ChainBackward | WaveKind::ChainCentre => {
            grid.num_pixels + 1
        }
        WaveKind::Shuffle => grid.wired_positions().len(),
        _ => grid.max_rows + grid.max_cols + 2,
    } as u32;

    let stage_delay = timers
        .duration(kind.stage_timer())
        .unwrap_or(Duration::ZERO);
    let mut total = SETTLE_DELAY + stage_delay * stage_bound + WAVE_COOL_DOWN;

    match kind {
        WaveKind::Corruption => {
            // Two decelerating flips per stage, longest near the origin
            total += stage_delay * (2 * (stage_bound + 1));
        }
        _ => {
            let pulse_timer = kind.pulse_timer().unwrap_or(TIMER_BUTTON_PULSES);
            let pulse_delay = timers.duration(pulse_timer).unwrap_or(Duration::ZERO);
            let pulses = if kind == WaveKind::Shuffle {
                shuffle_pulses.max(1)
            } else {
                1
            };
            total += pulse_delay.mul_f64(EXPECTED_PULSE_STEPS * pulses as f64);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayConfig;
    use crate::grid::test_support::wired_grid;
    use tokio::time::Instant;

    fn setup() -> (Arc<CrystalGrid>, Arc<AnimationControl>, Arc<Timers>) {
        let config = DisplayConfig::default();
        (
            Arc::new(wired_grid(3, 3)),
            Arc::new(AnimationControl::new()),
            Arc::new(config.timer_table()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_sequence_is_noop_while_first_owns_grid() {
        let (grid, control, timers) = setup();
        assert!(control.try_begin_sequence());
        let start = Instant::now();
        launch_sequence(grid, control.clone(), timers, WaveKind::Left, 1)
            .await
            .unwrap();
        // No preemption, no stages, no cool-down: returns immediately with
        // every flag untouched.
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!control.kill_requested());
        assert!(!control.blocked());
        assert!(control.sequence_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_wave_clears_flags_when_done() {
        let (grid, control, _) = setup();
        assert!(control.try_begin_sequence());
        let stages = waves::directional_stages(&grid, WaveKind::Left);
        run_wave(
            grid.clone(),
            control.clone(),
            stages,
            Duration::from_millis(50),
            PulseMode::Standard {
                pulse_delay: Duration::from_millis(1),
                pulse_count: 1,
            },
        )
        .await;
        assert!(!control.blocked());
        assert!(!control.sequence_active());
        // Cool-down outlives the trailing pulses; everything is back at idle
        for crystal in grid.crystals().iter() {
            let sample = crystal.sample();
            assert_eq!(sample.display.g, 0);
            assert_eq!(sample.pixel.g, 25);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stages_launch_in_order() {
        let (grid, control, _) = setup();
        assert!(control.try_begin_sequence());
        // Chain wave on a 3x3 grid: pixel 0 fires a full stage before pixel 8
        let stages = waves::directional_stages(&grid, WaveKind::ChainForward);
        let handle = tokio::spawn(run_wave(
            grid.clone(),
            control.clone(),
            stages,
            Duration::from_millis(100),
            PulseMode::Standard {
                pulse_delay: Duration::from_millis(1),
                pulse_count: 2,
            },
        ));

        // 150ms in: settle (100ms) plus 50 steps of stage 0's pulse
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(grid.crystals()[0].state().green > 0.0);
        assert_eq!(grid.crystals()[8].state().green, 0.0);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_button_press_stops_further_stages() {
        let (grid, control, _) = setup();
        assert!(control.try_begin_sequence());
        control.set_button_active(true);
        let stages = waves::directional_stages(&grid, WaveKind::Left);
        let handle = tokio::spawn(run_wave(
            grid.clone(),
            control.clone(),
            stages,
            Duration::from_secs(1),
            PulseMode::Standard {
                pulse_delay: Duration::from_millis(1),
                pulse_count: 2,
            },
        ));

        // Past the settle delay: the wave must not have lit anything
        tokio::time::sleep(Duration::from_millis(150)).await;
        for crystal in grid.crystals().iter() {
            assert_eq!(crystal.state().green, 0.0);
        }
        handle.await.unwrap();
        // Aborted run still hands the grid back
        assert!(!control.blocked());
        assert!(!control.sequence_active());
        assert!(control.button_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_corruption_sequence_runs_from_cracked_crystal() {
        let config = DisplayConfig::default();
        let grid = Arc::new(config.build_grid().unwrap());
        let control = Arc::new(AnimationControl::new());
        let timers = Arc::new(config.timer_table());
        launch_sequence(
            grid.clone(),
            control.clone(),
            timers,
            WaveKind::Corruption,
            1,
        )
        .await
        .unwrap();
        assert!(!control.sequence_active());
        for crystal in grid.crystals().iter() {
            let st = crystal.state();
            assert_eq!(st.red, 0.0);
            assert_eq!(st.text_red, 255.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_corruption_skipped_without_cracked_crystals() {
        let (grid, control, timers) = setup(); // wired_grid has no cracked entries
        let start = Instant::now();
        launch_sequence(grid, control.clone(), timers, WaveKind::Corruption, 1)
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!control.sequence_active());
    }

    #[test]
    fn test_expected_duration_covers_cool_down() {
        let config = DisplayConfig::default();
        let grid = config.build_grid().unwrap();
        let timers = config.timer_table();
        for kind in [
            WaveKind::Left,
            WaveKind::ChainForward,
            WaveKind::Corruption,
            WaveKind::Shuffle,
        ] {
            let estimate = expected_duration(kind, &grid, &timers, 3);
            assert!(estimate >= WAVE_COOL_DOWN + SETTLE_DELAY);
        }
    }
}
