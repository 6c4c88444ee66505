//! `Threshold`: per-cell level classification against a single threshold
//! (spec §4.5 "referenced collaborator" — exact rules are explicitly out
//! of scope for this spec; `ThresholdMetForDuration` is the hard case this
//! module defers to). This crate implements the simplest rule consistent
//! with the stated output alphabet: a cell that matches the threshold is
//! `CRIT`, otherwise `OK` (see `DESIGN.md` for the rationale).

use crate::model::status_level::{CRIT, OK};
use crate::model::{Matrix, ThresholdType};

pub fn apply(matrix: Matrix, threshold: f64, threshold_type: ThresholdType) -> Matrix {
    matrix
        .into_rows()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|point| {
                    let level = if threshold_type.matches(point.value, threshold) {
                        CRIT
                    } else {
                        OK
                    };
                    point.with_value(level)
                })
                .collect()
        })
        .collect()
}
