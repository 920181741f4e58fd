// Pulse module - Per-crystal colour trajectory tasks
//
// One task per activated crystal. Tasks communicate only through the shared
// grid state and the global control flags; cancellation is cooperative via
// the `kill` flag, polled once per animation step.

use std::sync::Arc;
use std::time::Duration;

use crate::control::AnimationControl;
use crate::grid::CrystalGrid;
use crate::types::ColourProfile;

/// Ramp a crystal up to full brightness and back `pulse_limit` times, then
/// restore the idle baseline. Exits early when `kill` is raised, still
/// restoring the baseline. Returns the completed-pulse count.
///
/// In blocking mode (button presses) the task clears `block` and
/// `button_active` on a natural finish; a killed run leaves them for the
/// preempting action to manage.
pub async fn standard_pulse(
    grid: Arc<CrystalGrid>,
    control: Arc<AnimationControl>,
    index: usize,
    pulse_delay: Duration,
    pulse_limit: u32,
    blocking: bool,
) -> u32 {
    let crystal = &grid.crystals()[index];
    let mut addition = 1.0f64;
    let mut pulses = 0u32;

    if crystal.pixel.is_some() {
        while pulses < pulse_limit && !control.kill_requested() {
            let profile = &crystal.profile;
            {
                let mut st = crystal.state();
                st.red += profile.base.red / 255.0 * addition;
                st.green += profile.base.green / 255.0 * addition;
                st.blue += profile.base.blue / 255.0 * addition;
                st.white += profile.base.white / 255.0 * addition;
                st.update_text();

                if st.red > 253.0 || st.green > 253.0 || st.blue > 253.0 || st.white > 253.0 {
                    addition = -1.0;
                } else if st.red <= 1.0 && st.green <= 1.0 && st.blue <= 1.0 && st.white <= 1.0 {
                    addition = 1.0;
                    pulses += 1;
                }

                st.apply_glow_floor(&profile.glow);
            }
            tokio::time::sleep(pulse_delay).await;
        }
    }

    crystal.reset_to_idle();
    if blocking && !control.kill_requested() {
        control.set_block(false);
        control.set_button_active(false);
    }
    pulses
}

/// Corruption variant: flips the crystal between its own colour and the
/// wave's corruption colour for two half-pulses. Stages closer to the wave
/// origin hold each flip longer, so the corruption visibly decelerates as
/// it spreads, and every crystal holds its final flip until its stage's
/// share of the rollback has passed.
pub async fn corruption_pulse(
    grid: Arc<CrystalGrid>,
    control: Arc<AnimationControl>,
    index: usize,
    corruption: ColourProfile,
    total_stages: usize,
    stage: usize,
    base_delay: Duration,
    blocking: bool,
) {
    let crystal = &grid.crystals()[index];
    let own = crystal.profile;
    let mut corrupted = false;
    let mut pulses = 0u32;

    if crystal.pixel.is_some() {
        while pulses < 2 && !control.kill_requested() {
            corrupted = !corrupted;
            let profile = if corrupted { &corruption } else { &own };
            {
                let mut st = crystal.state();
                st.red = profile.base.red;
                st.green = profile.base.green;
                st.blue = profile.base.blue;
                st.white = profile.base.white;
                st.update_text();
                st.apply_glow_floor(&profile.glow);
            }
            let remaining = total_stages.saturating_sub(stage);
            tokio::time::sleep(base_delay.mul_f64((remaining + 1) as f64)).await;
            pulses += 1;
        }
    }

    tokio::time::sleep(base_delay.mul_f64(stage as f64)).await;

    crystal.reset_to_idle();
    if blocking && !control.kill_requested() {
        control.set_block(false);
        control.set_button_active(false);
    }
}
