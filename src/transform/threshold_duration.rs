//! `ThresholdMetForDuration`: per-row state reduction that classifies the
//! newest point by how long the threshold condition has been continuously
//! met, scanning newest-to-oldest (spec §4.5, §8 scenarios 3-4).
//!
//! Two behaviors here are deliberately preserved verbatim per spec §9
//! "Open questions": the INFO branch's message cites `warnDurationMillis`
//! (both mid-scan and in the post-scan fallback), and equality between two
//! `ThresholdMetForDuration` transforms compares `infoDurationMillis`
//! against `infoDurationMillis` (the source's documented `warnDurationMillis`
//! comparison there is treated as a defect and not reproduced — see
//! `DESIGN.md`).

use chrono::Duration as ChronoDuration;

use crate::model::status_level::{CRIT, INFO, OK, WARN};
use crate::model::{Matrix, Row, ThresholdType, Transmutation};

#[allow(clippy::too_many_arguments)]
pub fn apply(
    matrix: Matrix,
    threshold: f64,
    threshold_type: ThresholdType,
    critical_duration_millis: i64,
    warn_duration_millis: i64,
    info_duration_millis: i64,
) -> Matrix {
    matrix
        .into_rows()
        .into_iter()
        .filter_map(|row| {
            reduce_row(
                &row,
                threshold,
                threshold_type,
                critical_duration_millis,
                warn_duration_millis,
                info_duration_millis,
            )
        })
        .collect()
}

fn reduce_row(
    row: &Row,
    threshold: f64,
    threshold_type: ThresholdType,
    critical_duration_millis: i64,
    warn_duration_millis: i64,
    info_duration_millis: i64,
) -> Option<Row> {
    let last_point = row.last()?;
    let last_ts = last_point.time;
    let crit_ts = last_ts - ChronoDuration::milliseconds(critical_duration_millis);
    let warn_ts = last_ts - ChronoDuration::milliseconds(warn_duration_millis);
    let info_ts = last_ts - ChronoDuration::milliseconds(info_duration_millis);

    let mut at_warning_level = false;
    let mut at_info_level = false;

    for point in row.iter().rev() {
        if threshold_type.matches(point.value, threshold) {
            if point.time <= crit_ts {
                let message = duration_message(
                    "CRIT",
                    last_point,
                    threshold_type,
                    threshold,
                    critical_duration_millis,
                );
                return Some(vec![last_point.with_value(CRIT).with_metadata_message(message)]);
            } else if point.time <= warn_ts {
                at_warning_level = true;
            } else if point.time <= info_ts {
                at_info_level = true;
            }
            continue;
        }

        // First point that breaks the threshold condition.
        if point.time <= warn_ts {
            let message =
                duration_message("WARN", point, threshold_type, threshold, warn_duration_millis);
            return Some(vec![point.with_value(WARN).with_metadata_message(message)]);
        } else if point.time <= info_ts {
            // Open question (spec §9): uses warnDurationMillis in the message.
            let message =
                duration_message("INFO", point, threshold_type, threshold, warn_duration_millis);
            return Some(vec![point.with_value(INFO).with_metadata_message(message)]);
        } else {
            return Some(vec![point.with_value(OK)]);
        }
    }

    // The scan consumed every point while the condition kept matching.
    if at_warning_level {
        let message = duration_message(
            "WARN",
            last_point,
            threshold_type,
            threshold,
            warn_duration_millis,
        );
        Some(vec![last_point.with_value(WARN).with_metadata_message(message)])
    } else if at_info_level {
        let message = duration_message(
            "INFO",
            last_point,
            threshold_type,
            threshold,
            warn_duration_millis,
        );
        Some(vec![last_point.with_value(INFO).with_metadata_message(message)])
    } else {
        Some(vec![last_point.with_value(OK)])
    }
}

fn type_symbol(threshold_type: ThresholdType) -> &'static str {
    match threshold_type {
        ThresholdType::GreaterThan => ">",
        ThresholdType::LessThan => "<",
        ThresholdType::EqualTo => "==",
    }
}

fn duration_message(
    level: &str,
    subject: &Transmutation,
    threshold_type: ThresholdType,
    threshold: f64,
    duration_millis: i64,
) -> String {
    format!(
        "<{level}> threshold hit by {}, with value={} {} {}, duration longer than {}",
        subject.name,
        subject.original_value,
        type_symbol(threshold_type),
        threshold,
        format_duration(duration_millis)
    )
}

/// `<dd>days hh:mm:ss` when the duration spans at least one day, else
/// `hh:mm:ss`, all fields zero-padded to two digits (spec §4.5).
fn format_duration(millis: i64) -> String {
    let total_seconds = millis / 1000;
    let days = total_seconds / 86_400;
    let remainder = total_seconds % 86_400;
    let hours = remainder / 3600;
    let minutes = (remainder % 3600) / 60;
    let seconds = remainder % 60;
    if days > 0 {
        format!("{days}days {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}
