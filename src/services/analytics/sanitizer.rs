use super::types::MetricKind;
use super::utils::parse_js_number;
use crate::models::{cell_at, Cell, Row};

/// The integer rating held by `cell`, if it is a valid value for `kind`.
///
/// Blank cells, non-numeric text, fractional numbers and out-of-range
/// integers are all rejected; nothing is ever coerced to zero.
pub fn metric_value(cell: &Cell, kind: MetricKind) -> Option<u8> {
    let number = match cell {
        Cell::Empty => return None,
        Cell::Number(n) => *n,
        Cell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            parse_js_number(trimmed)?
        }
    };

    if !number.is_finite() || number.fract() != 0.0 {
        return None;
    }
    let rating = number as i64;
    kind.range().contains(&rating).then_some(rating as u8)
}

/// Rows whose `column` holds a valid `kind` rating, in their original order.
pub fn sanitize<'a, I>(rows: I, column: usize, kind: MetricKind) -> Vec<&'a Row>
where
    I: IntoIterator<Item = &'a Row>,
{
    rows.into_iter()
        .filter(|row| metric_value(cell_at(row, column), kind).is_some())
        .collect()
}

/// The valid ratings of `column`, in row order.
pub fn sample<'a, I>(rows: I, column: usize, kind: MetricKind) -> Vec<u8>
where
    I: IntoIterator<Item = &'a Row>,
{
    rows.into_iter()
        .filter_map(|row| metric_value(cell_at(row, column), kind))
        .collect()
}

/// Like [`sample`], but keeps the position of each rating in the input so two
/// samples can be joined row by row.
pub fn indexed_sample<'a, I>(rows: I, column: usize, kind: MetricKind) -> Vec<(usize, u8)>
where
    I: IntoIterator<Item = &'a Row>,
{
    rows.into_iter()
        .enumerate()
        .filter_map(|(position, row)| {
            metric_value(cell_at(row, column), kind).map(|value| (position, value))
        })
        .collect()
}

/// Drops rows in which every cell is blank.
pub fn drop_blank_rows(rows: Vec<Row>) -> Vec<Row> {
    let before = rows.len();
    let kept: Vec<Row> = rows
        .into_iter()
        .filter(|row| row.iter().any(|cell| !cell.is_blank()))
        .collect();
    if kept.len() < before {
        tracing::debug!("Dropped {} blank rows", before - kept.len());
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[Cell]) -> Vec<Row> {
        values.iter().map(|cell| vec![cell.clone()]).collect()
    }

    #[test]
    fn accepts_integers_within_range() {
        assert_eq!(metric_value(&Cell::from(0i64), MetricKind::Nps), Some(0));
        assert_eq!(metric_value(&Cell::from(10i64), MetricKind::Nps), Some(10));
        assert_eq!(metric_value(&Cell::from(" 7 "), MetricKind::Nps), Some(7));
        assert_eq!(metric_value(&Cell::from("5.0"), MetricKind::Likert), Some(5));
    }

    #[test]
    fn rejects_blank_fractional_and_out_of_range() {
        assert_eq!(metric_value(&Cell::Empty, MetricKind::Nps), None);
        assert_eq!(metric_value(&Cell::from("  "), MetricKind::Nps), None);
        assert_eq!(metric_value(&Cell::from(7.5), MetricKind::Nps), None);
        assert_eq!(metric_value(&Cell::from(11i64), MetricKind::Nps), None);
        assert_eq!(metric_value(&Cell::from(0i64), MetricKind::Likert), None);
        assert_eq!(metric_value(&Cell::from("n/a"), MetricKind::Likert), None);
    }

    #[test]
    fn sanitization_is_per_metric() {
        let data = vec![
            vec![Cell::Empty, Cell::from(4i64)],
            vec![Cell::from(9i64), Cell::from(8i64)],
        ];
        assert_eq!(sanitize(&data, 0, MetricKind::Nps).len(), 1);
        assert_eq!(sanitize(&data, 1, MetricKind::Likert).len(), 1);
        assert!(std::ptr::eq(sanitize(&data, 1, MetricKind::Likert)[0], &data[0]));
    }

    #[test]
    fn sanitizing_twice_changes_nothing() {
        let data = rows(&[
            Cell::from(3i64),
            Cell::from("x"),
            Cell::from(12i64),
            Cell::from("8"),
            Cell::Empty,
        ]);
        let once = sanitize(&data, 0, MetricKind::Nps);
        let twice = sanitize(once.iter().copied(), 0, MetricKind::Nps);
        assert_eq!(once, twice);
    }

    #[test]
    fn indexed_sample_keeps_positions() {
        let data = rows(&[Cell::from(3i64), Cell::Empty, Cell::from(5i64)]);
        assert_eq!(indexed_sample(&data, 0, MetricKind::Likert), vec![(0, 3), (2, 5)]);
    }

    #[test]
    fn blank_rows_are_dropped() {
        let data = vec![
            vec![Cell::Empty, Cell::from("  ")],
            vec![Cell::Empty, Cell::from(0i64)],
            vec![],
        ];
        let kept = drop_blank_rows(data);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0][1], Cell::from(0i64));
    }
}
