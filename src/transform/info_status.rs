//! `InfoStatus`: clamps `OK` (0) to `INFO` (1), leaving everything else
//! unchanged (spec §4.5, §8 scenario 2).

use crate::model::Matrix;

pub fn apply(matrix: Matrix) -> Matrix {
    matrix
        .into_rows()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|point| {
                    if point.value as i64 == 0 {
                        point.with_value(1.0)
                    } else {
                        point
                    }
                })
                .collect()
        })
        .collect()
}
