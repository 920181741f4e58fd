// Engine module - Fixed-rate refresh loop, ambient selector and button input
//
// The refresh loop is the only long-lived task: every tick it samples all
// crystals, forwards the clamped colours to the sinks as one batched frame,
// and, when the grid has been idle long enough, picks the next ambient
// sequence at random.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::Rng;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{DisplayConfig, Timers, TIMER_BUTTON_PULSES, TIMER_MAX_BETWEEN, TIMER_MIN_BETWEEN};
use crate::control::AnimationControl;
use crate::grid::CrystalGrid;
use crate::pulse::standard_pulse;
use crate::runner::{expected_duration, launch_sequence};
use crate::sink::{DisplaySink, PixelSink};
use crate::waves::WaveKind;

/// Pulses a pressed button runs before settling back to idle.
pub const BUTTON_PULSE_LIMIT: u32 = 4;

pub struct Engine {
    grid: Arc<CrystalGrid>,
    control: Arc<AnimationControl>,
    timers: Arc<Timers>,
    sequences: Vec<WaveKind>,
    illuminate_when_idle: bool,
    shuffle_pulses: u32,
    min_gap_secs: f64,
    max_gap_secs: f64,
    tick: Duration,
    pixel_sink: Mutex<Box<dyn PixelSink>>,
    display_sink: Mutex<Box<dyn DisplaySink>>,
}

impl Engine {
    pub fn new(
        config: &DisplayConfig,
        pixel_sink: Box<dyn PixelSink>,
        display_sink: Box<dyn DisplaySink>,
    ) -> Result<Engine> {
        if config.fps <= 0.0 {
            return Err(anyhow!("fps must be positive"));
        }
        let grid = Arc::new(config.build_grid()?);
        let timers = config.timer_table();
        let sequences = config.enabled_sequences()?;

        let min_gap_secs = timers.seconds(TIMER_MIN_BETWEEN)?;
        let max_gap_secs = timers.seconds(TIMER_MAX_BETWEEN)?;
        if max_gap_secs < min_gap_secs {
            return Err(anyhow!(
                "'{}' must not exceed '{}'",
                TIMER_MIN_BETWEEN,
                TIMER_MAX_BETWEEN
            ));
        }
        timers.duration(TIMER_BUTTON_PULSES)?;

        Ok(Engine {
            grid,
            control: Arc::new(AnimationControl::new()),
            timers: Arc::new(timers),
            sequences,
            illuminate_when_idle: config.illuminate_when_idle,
            shuffle_pulses: config.random_crystal_pulses,
            min_gap_secs,
            max_gap_secs,
            tick: Duration::from_secs_f64(1.0 / config.fps),
            pixel_sink: Mutex::new(pixel_sink),
            display_sink: Mutex::new(display_sink),
        })
    }

    pub fn grid(&self) -> &Arc<CrystalGrid> {
        &self.grid
    }

    /// Refresh loop. Runs until `shutdown` is raised; one bad element or a
    /// failed strip write never stops the tick.
    pub async fn run(self: Arc<Self>, shutdown: Arc<AtomicBool>) -> Result<()> {
        let mut frame = vec![0u8; self.grid.num_pixels * 4];
        info!(
            crystals = self.grid.crystals().len(),
            pixels = self.grid.num_pixels,
            sequences = self.sequences.len(),
            "refresh loop started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            self.refresh_tick(&mut frame);
            self.maybe_launch_ambient();
            if let Err(e) = self.pixel_sink.lock().unwrap().write_frame(&frame) {
                warn!("strip write failed: {e:#}");
            }
            tokio::time::sleep(self.tick).await;
        }

        info!("refresh loop stopped");
        Ok(())
    }

    /// Sample every crystal, clamp at this boundary, and stage the pixel
    /// colours into the frame buffer.
    fn refresh_tick(&self, frame: &mut [u8]) {
        let forward_display = self.illuminate_when_idle || self.control.button_active();
        for crystal in self.grid.crystals() {
            let sample = crystal.sample();

            if forward_display {
                let result = self.display_sink.lock().unwrap().set_colour(
                    &crystal.key,
                    sample.display,
                    sample.text,
                );
                if let Err(e) = result {
                    warn!(crystal = %crystal.key, "display update failed: {e:#}");
                }
            }

            if let Some(pixel) = crystal.pixel {
                let offset = pixel * 4;
                if offset + 4 <= frame.len() {
                    frame[offset] = sample.pixel.r;
                    frame[offset + 1] = sample.pixel.g;
                    frame[offset + 2] = sample.pixel.b;
                    frame[offset + 3] = sample.pixel.w;
                }
            }
        }
    }

    /// Launch a random enabled sequence once the idle window has passed and
    /// nothing owns the grid. The next window opens only after the launched
    /// wave is expected to have finished.
    fn maybe_launch_ambient(&self) {
        if self.sequences.is_empty() || self.control.blocked() || self.control.button_active() {
            return;
        }
        let now = Instant::now();
        if now < self.control.next_ambient_time() {
            return;
        }

        let (kind, gap_secs) = {
            let mut rng = rand::thread_rng();
            (
                self.sequences[rng.gen_range(0..self.sequences.len())],
                rng.gen_range(self.min_gap_secs..=self.max_gap_secs),
            )
        };
        let expected = expected_duration(kind, &self.grid, &self.timers, self.shuffle_pulses);
        self.control
            .set_next_ambient_time(now + Duration::from_secs_f64(gap_secs) + expected);

        info!(routine = kind.routine(), "launching ambient sequence");
        let grid = self.grid.clone();
        let control = self.control.clone();
        let timers = self.timers.clone();
        let shuffle_pulses = self.shuffle_pulses;
        tokio::spawn(async move {
            if let Err(e) = launch_sequence(grid, control, timers, kind, shuffle_pulses).await {
                warn!("ambient sequence failed: {e:#}");
            }
        });
    }

    /// A crystal's button was pressed. Preempts everything, shows the
    /// description text, then runs a short blocking pulse on that crystal
    /// alone; the pulse clears `block`/`button_active` when it completes.
    pub async fn on_crystal_activated(&self, key: &str, description: &str) -> Result<()> {
        let index = self
            .grid
            .index_of(key)
            .ok_or_else(|| anyhow!("unknown crystal '{}'", key))?;
        let pulse_delay = self.timers.duration(TIMER_BUTTON_PULSES)?;

        self.control.set_button_active(true);
        self.control.preempt().await;

        if !description.is_empty() {
            let result = self
                .display_sink
                .lock()
                .unwrap()
                .show_description(key, description);
            if let Err(e) = result {
                warn!(crystal = key, "description popup failed: {e:#}");
            }
        }

        tokio::spawn(standard_pulse(
            self.grid.clone(),
            self.control.clone(),
            index,
            pulse_delay,
            BUTTON_PULSE_LIMIT,
            true,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_support::{Recorder, RecordingDisplaySink, RecordingPixelSink};

    fn engine_with_recorder(mut config: DisplayConfig) -> (Arc<Engine>, Recorder) {
        config.crystals[0].description = "The first crystal of the demo set.".to_string();
        let recorder = Recorder::default();
        let engine = Engine::new(
            &config,
            Box::new(RecordingPixelSink(recorder.clone())),
            Box::new(RecordingDisplaySink(recorder.clone())),
        )
        .unwrap();
        (Arc::new(engine), recorder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_stages_glow_floor_into_frame() {
        let (engine, recorder) = engine_with_recorder(DisplayConfig::default());
        let mut frame = vec![0u8; engine.grid().num_pixels * 4];
        engine.refresh_tick(&mut frame);

        // Position 0 is green: glow floor of 25 on the green channel
        assert_eq!(&frame[0..4], &[0, 25, 0, 0]);
        // Position 4 is the white crystal: glow on the white channel
        assert_eq!(&frame[16..20], &[0, 0, 0, 25]);

        // All nine crystals got a display update, idle colours
        let colours = recorder.colours.lock().unwrap();
        assert_eq!(colours.len(), 9);
        for (_, display, text) in colours.iter() {
            assert_eq!((display.r, display.g, display.b, display.w), (0, 0, 0, 0));
            assert_eq!((text.r, text.g, text.b), (255, 255, 255));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_display_suppressed_when_not_illuminating() {
        let mut config = DisplayConfig::default();
        config.illuminate_when_idle = false;
        let (engine, recorder) = engine_with_recorder(config);
        let mut frame = vec![0u8; engine.grid().num_pixels * 4];
        engine.refresh_tick(&mut frame);
        assert!(recorder.colours.lock().unwrap().is_empty());
        // Pixel output is unaffected by the display flag
        assert_eq!(&frame[0..4], &[0, 25, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambient_selector_schedules_next_window() {
        let (engine, _recorder) = engine_with_recorder(DisplayConfig::default());
        let before = Instant::now();
        engine.maybe_launch_ambient();
        // The window always moves past the expected wave duration
        assert!(engine.control.next_ambient_time() >= before + Duration::from_secs(30));

        // The spawned sequence claims the slot once it gets polled
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(engine.control.sequence_active());

        // A second call inside the window is a no-op
        let scheduled = engine.control.next_ambient_time();
        engine.maybe_launch_ambient();
        assert_eq!(engine.control.next_ambient_time(), scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambient_suppressed_while_blocked() {
        let (engine, _recorder) = engine_with_recorder(DisplayConfig::default());
        engine.control.set_block(true);
        let scheduled = engine.control.next_ambient_time();
        engine.maybe_launch_ambient();
        assert_eq!(engine.control.next_ambient_time(), scheduled);
        assert!(!engine.control.sequence_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_button_press_pulses_and_releases() {
        let (engine, recorder) = engine_with_recorder(DisplayConfig::default());
        engine
            .on_crystal_activated("Demo 10", "The first crystal of the demo set.")
            .await
            .unwrap();
        assert!(engine.control.button_active());
        assert_eq!(recorder.descriptions.lock().unwrap().len(), 1);

        // The blocking pulse releases the grid when it finishes naturally
        let deadline = Instant::now() + Duration::from_secs(60);
        while engine.control.button_active() {
            assert!(Instant::now() < deadline, "button pulse never released");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!engine.control.blocked());
        assert_eq!(engine.grid().get("Demo 10").unwrap().sample().display.g, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_crystal_press_is_an_error() {
        let (engine, _recorder) = engine_with_recorder(DisplayConfig::default());
        assert!(engine.on_crystal_activated("Nobody7", "").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_writes_batched_frames_until_shutdown() {
        let (engine, recorder) = engine_with_recorder(DisplayConfig::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(engine.clone().run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap().unwrap();

        let frames = recorder.frames.lock().unwrap();
        assert!(!frames.is_empty());
        // One batched write per tick, full strip width
        assert_eq!(frames[0].len(), engine.grid().num_pixels * 4);
    }
}
