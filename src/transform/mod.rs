//! Transform stage dispatch (spec §4.5): applies a Configuration's ordered
//! `Transform` list to a Matrix, folding left to right.

mod info_status;
mod last_datapoint;
mod threshold;
mod threshold_duration;

use crate::model::{Matrix, Transform};

/// Applies `transforms` to `matrix` in declared order.
pub fn apply_all(transforms: &[Transform], matrix: Matrix) -> Matrix {
    transforms
        .iter()
        .fold(matrix, |m, transform| apply_one(transform, m))
}

fn apply_one(transform: &Transform, matrix: Matrix) -> Matrix {
    match transform {
        Transform::LastDatapoint => last_datapoint::apply(matrix),
        Transform::InfoStatus => info_status::apply(matrix),
        Transform::Threshold {
            threshold,
            threshold_type,
        } => threshold::apply(matrix, *threshold, *threshold_type),
        Transform::ThresholdMetForDuration {
            threshold,
            threshold_type,
            critical_duration_millis,
            warn_duration_millis,
            info_duration_millis,
        } => threshold_duration::apply(
            matrix,
            *threshold,
            *threshold_type,
            *critical_duration_millis,
            *warn_duration_millis,
            *info_duration_millis,
        ),
    }
}
