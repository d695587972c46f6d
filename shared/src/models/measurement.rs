//! Growth measurements and readiness evaluation

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Batch, Species};

const SECONDS_PER_DAY: i64 = 86_400;

/// Projections further out than this are reported as "no projection"
const MAX_PROJECTION_DAYS: i64 = 3_650;

/// A periodic growth sample for a batch. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: Uuid,
    pub batch_id: Uuid,
    /// Recorder
    pub user_id: Uuid,
    /// Average stem girth of the sample, millimetres
    pub girth_mm: Decimal,
    /// Average height of the sample, centimetres
    pub height_cm: Decimal,
    pub sample_size: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Which measurements feed the readiness decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "count", rename_all = "snake_case")]
pub enum ReadinessWindow {
    /// Everything recorded since the batch entered its current stage
    #[default]
    CurrentStage,
    /// The most recent `n` measurements
    Trailing(usize),
    /// Every measurement of the batch
    All,
}

/// Per-day growth between the first and last measurement of a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthRate {
    pub girth_mm_per_day: Decimal,
    pub height_cm_per_day: Decimal,
}

/// Readiness and growth trend of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessResult {
    pub batch_id: Uuid,
    pub window: ReadinessWindow,
    pub measurement_count: usize,
    pub average_girth_mm: Option<Decimal>,
    pub average_height_cm: Option<Decimal>,
    pub target_girth_mm: Decimal,
    pub target_height_cm: Decimal,
    /// Both window averages are at or above target
    pub meets_target: bool,
    pub growth_rate: Option<GrowthRate>,
    pub projected_ready_date: Option<DateTime<Utc>>,
    pub is_on_track: bool,
    /// Ratchet flag stored on the batch
    pub is_ready: bool,
    pub ready_date: Option<DateTime<Utc>>,
    pub days_in_stage: i64,
}

/// Measurements inside `window`, oldest first
pub fn window_measurements<'a>(
    measurements: &'a [Measurement],
    window: ReadinessWindow,
    stage_entered_at: DateTime<Utc>,
) -> Vec<&'a Measurement> {
    let mut sorted: Vec<&Measurement> = measurements.iter().collect();
    sorted.sort_by_key(|m| m.created_at);

    match window {
        ReadinessWindow::CurrentStage => sorted
            .into_iter()
            .filter(|m| m.created_at >= stage_entered_at)
            .collect(),
        ReadinessWindow::Trailing(count) => {
            let count = count.max(1);
            let skip = sorted.len().saturating_sub(count);
            sorted.into_iter().skip(skip).collect()
        }
        ReadinessWindow::All => sorted,
    }
}

/// Mean girth and height of a set of measurements
pub fn average_growth(measurements: &[&Measurement]) -> Option<(Decimal, Decimal)> {
    if measurements.is_empty() {
        return None;
    }
    let count = Decimal::from(measurements.len());
    let girth: Decimal = measurements.iter().map(|m| m.girth_mm).sum();
    let height: Decimal = measurements.iter().map(|m| m.height_cm).sum();
    Some(((girth / count).round_dp(2), (height / count).round_dp(2)))
}

/// Linear growth rate from the first to the last measurement
pub fn growth_rate(measurements: &[&Measurement]) -> Option<GrowthRate> {
    let first = measurements.first()?;
    let last = measurements.last()?;
    let elapsed = (last.created_at - first.created_at).num_seconds();
    if elapsed <= 0 {
        return None;
    }
    let days = Decimal::from(elapsed).checked_div(Decimal::from(SECONDS_PER_DAY))?;
    Some(GrowthRate {
        girth_mm_per_day: (last.girth_mm - first.girth_mm).checked_div(days)?,
        height_cm_per_day: (last.height_cm - first.height_cm).checked_div(days)?,
    })
}

/// Days until `current` reaches `target` at `rate`; zero when already there.
/// `None` when the rate is flat or too slow to represent.
fn days_to_target(current: Decimal, target: Decimal, rate: Decimal) -> Option<Decimal> {
    if current >= target {
        return Some(Decimal::ZERO);
    }
    if rate <= Decimal::ZERO {
        return None;
    }
    (target - current).checked_div(rate)
}

fn project_ready_date(
    latest: &Measurement,
    rate: GrowthRate,
    species: &Species,
) -> Option<DateTime<Utc>> {
    let girth_days = days_to_target(latest.girth_mm, species.target_girth_mm, rate.girth_mm_per_day)?;
    let height_days = days_to_target(
        latest.height_cm,
        species.target_height_cm,
        rate.height_cm_per_day,
    )?;
    let days = girth_days.max(height_days);
    if days > Decimal::from(MAX_PROJECTION_DAYS) {
        return None;
    }
    let seconds = days
        .checked_mul(Decimal::from(SECONDS_PER_DAY))?
        .ceil()
        .to_i64()?;
    Some(latest.created_at + Duration::seconds(seconds))
}

/// Evaluate readiness of `batch` against its species targets.
///
/// A batch is on track when it already meets target, or when the projected
/// ready date falls within `grace_period_days` of `now`.
pub fn evaluate_readiness(
    batch: &Batch,
    species: &Species,
    measurements: &[Measurement],
    window: ReadinessWindow,
    grace_period_days: i64,
    now: DateTime<Utc>,
) -> ReadinessResult {
    let selected = window_measurements(measurements, window, batch.stage_entered_at);
    let averages = average_growth(&selected);
    let meets_target = averages.is_some_and(|(girth, height)| {
        girth >= species.target_girth_mm && height >= species.target_height_cm
    });
    let rate = growth_rate(&selected);

    let projected_ready_date = match (selected.last(), rate) {
        (Some(latest), _) if meets_target => Some(latest.created_at),
        (Some(latest), Some(rate)) => project_ready_date(latest, rate, species),
        _ => None,
    };
    let horizon = now + Duration::days(grace_period_days.clamp(0, MAX_PROJECTION_DAYS));
    let is_on_track = meets_target || projected_ready_date.is_some_and(|date| date <= horizon);

    ReadinessResult {
        batch_id: batch.id,
        window,
        measurement_count: selected.len(),
        average_girth_mm: averages.map(|(girth, _)| girth),
        average_height_cm: averages.map(|(_, height)| height),
        target_girth_mm: species.target_girth_mm,
        target_height_cm: species.target_height_cm,
        meets_target,
        growth_rate: rate,
        projected_ready_date,
        is_on_track,
        is_ready: batch.is_ready,
        ready_date: batch.ready_date,
        days_in_stage: (now - batch.stage_entered_at).num_days().max(0),
    }
}
