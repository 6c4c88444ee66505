//! `LastDatapoint`: keep only the last element of each row, dropping
//! empty rows (spec §4.5, §8 scenario 1).

use crate::model::Matrix;

pub fn apply(matrix: Matrix) -> Matrix {
    matrix
        .into_rows()
        .into_iter()
        .filter_map(|mut row| row.pop().map(|last| vec![last]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Transmutation;
    use chrono::{TimeZone, Utc};

    fn point(secs: i64, value: f64) -> Transmutation {
        Transmutation::new(Utc.timestamp_opt(secs, 0).unwrap(), "m", value)
    }

    #[test]
    fn keeps_only_the_last_element_per_row() {
        let matrix = Matrix::new(vec![
            vec![point(1, 10.0), point(2, 20.0), point(3, 30.0)],
            vec![point(4, 5.0)],
        ]);
        let result = apply(matrix);
        assert_eq!(result.len(), 2);
        assert_eq!(result.rows()[0], vec![point(3, 30.0)]);
        assert_eq!(result.rows()[1], vec![point(4, 5.0)]);
    }

    #[test]
    fn drops_empty_rows() {
        let matrix = Matrix::new(vec![vec![], vec![point(1, 1.0)]]);
        let result = apply(matrix);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn empty_matrix_passes_through_unchanged() {
        assert_eq!(apply(Matrix::empty()), Matrix::empty());
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let matrix = Matrix::new(vec![vec![point(1, 1.0), point(2, 2.0)]]);
        let once = apply(matrix.clone());
        let twice = apply(apply(matrix));
        assert_eq!(once, twice);
    }

    #[test]
    fn preserves_original_value() {
        let mut p = point(1, 5.0);
        p.value = 9.0; // transformed elsewhere, original unchanged
        let matrix = Matrix::new(vec![vec![p.clone()]]);
        let result = apply(matrix);
        assert_eq!(result.rows()[0][0].original_value, 5.0);
    }
}
