//! Simulated daylight.

use chrono::{NaiveTime, Timelike};
use rand::Rng;

const MAX_LUX: f64 = 1000.0;
const NOON_LUX: f64 = 800.0;
const DAWN_DUSK_LUX: f64 = 200.0;
const NIGHT_MAX_LUX: f64 = 50.0;
const NOISE: f64 = 0.1;

/// Illuminance at `time` of day.
///
/// Between 06:00 and 18:00 the value falls linearly from 800 lux at noon to
/// 200 lux at either end; at night it is drawn uniformly from 0 to 50 lux.
/// The result carries up to ±10% noise and is clamped to `0..=1000`.
pub fn daylight_lux(time: NaiveTime, rng: &mut impl Rng) -> f64 {
    let hours = f64::from(time.hour()) + f64::from(time.minute()) / 60.0;
    let base = if (6.0..18.0).contains(&hours) {
        let from_noon = (hours - 12.0).abs() / 6.0;
        NOON_LUX - from_noon * (NOON_LUX - DAWN_DUSK_LUX)
    } else {
        rng.gen_range(0.0..NIGHT_MAX_LUX)
    };
    let noise = base * NOISE * rng.gen_range(-1.0..=1.0);
    (base + noise).clamp(0.0, MAX_LUX)
}
