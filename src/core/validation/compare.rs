//! Schema and sample comparison

use super::result::{ColumnMismatch, SampleMismatch};
use crate::domain::value::values_equal;
use crate::domain::{CellValue, LogicalType, Sample, Schema};

/// Positional schema comparison
///
/// Columns at the same index must agree on name (case-insensitively) and
/// logical type family. Surplus columns on either side are mismatches.
pub fn compare_schemas(source: &Schema, destination: &Schema) -> Vec<ColumnMismatch> {
    let width = source.len().max(destination.len());
    (0..width)
        .filter_map(|position| {
            let s = source.columns().get(position);
            let d = destination.columns().get(position);
            let same = match (s, d) {
                (Some(s), Some(d)) => {
                    s.name.eq_ignore_ascii_case(&d.name) && s.data_type.compatible_with(&d.data_type)
                }
                _ => false,
            };
            (!same).then(|| ColumnMismatch {
                position,
                source: s.cloned(),
                destination: d.cloned(),
            })
        })
        .collect()
}

/// Sample ordering: key columns first, then every other source column the
/// destination also has, in source order
pub fn sample_order(keys: &[String], source: &Schema, destination: &Schema) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let shared = |name: &str| source.get(name).is_some() && destination.get(name).is_some();

    for key in keys {
        if shared(key) && !order.iter().any(|o| o.eq_ignore_ascii_case(key)) {
            order.push(key.clone());
        }
    }
    for column in source.columns() {
        if destination.get(&column.name).is_some()
            && !order.iter().any(|o| o.eq_ignore_ascii_case(&column.name))
        {
            order.push(column.name.clone());
        }
    }
    order
}

/// Differences between two aligned samples
#[derive(Debug, Default)]
pub struct SampleComparison {
    pub rows_compared: usize,
    pub mismatch_count: usize,
    /// First `limit` mismatches in row-major order
    pub mismatches: Vec<SampleMismatch>,
}

/// Compares samples row by row, aligning columns by name
///
/// Cells are parsed with their side's column type before comparing, so
/// `1.50` equals `1.5` and `2024-01-01T00:00:00Z` equals `2024-01-01 00:00:00 UTC`.
/// A row present on one side only counts every shared column as different.
pub fn compare_samples(
    source: &Sample,
    destination: &Sample,
    source_schema: &Schema,
    destination_schema: &Schema,
    tolerance: f64,
    limit: usize,
) -> SampleComparison {
    let columns: Vec<(String, usize, usize, LogicalType, LogicalType)> = source
        .columns
        .iter()
        .enumerate()
        .filter_map(|(si, name)| {
            let di = destination.column_index(name)?;
            let st = column_type(source_schema, name);
            let dt = column_type(destination_schema, &destination.columns[di]);
            Some((name.clone(), si, di, st, dt))
        })
        .collect();

    let rows = source.rows.len().max(destination.rows.len());
    let mut comparison = SampleComparison {
        rows_compared: rows,
        ..Default::default()
    };

    for row in 0..rows {
        let s_row = source.rows.get(row);
        let d_row = destination.rows.get(row);
        for (name, si, di, st, dt) in &columns {
            let s_raw = s_row.and_then(|r| r.get(*si)).and_then(|v| v.as_deref());
            let d_raw = d_row.and_then(|r| r.get(*di)).and_then(|v| v.as_deref());

            let equal = match (s_row, d_row) {
                (Some(_), Some(_)) => values_equal(
                    &CellValue::parse(s_raw, st),
                    &CellValue::parse(d_raw, dt),
                    tolerance,
                ),
                _ => false,
            };
            if equal {
                continue;
            }

            comparison.mismatch_count += 1;
            if comparison.mismatches.len() < limit {
                comparison.mismatches.push(SampleMismatch {
                    row,
                    column: name.clone(),
                    source_value: s_raw.map(str::to_string),
                    destination_value: d_raw.map(str::to_string),
                });
            }
        }
    }
    comparison
}

fn column_type(schema: &Schema, name: &str) -> LogicalType {
    schema
        .get(name)
        .map(|c| c.data_type.clone())
        .unwrap_or(LogicalType::String)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Column;

    fn schema(cols: &[(&str, LogicalType)]) -> Schema {
        cols.iter()
            .map(|(n, t)| Column::new(*n, t.clone()))
            .collect()
    }

    fn sample(cols: &[&str], rows: &[&[Option<&str>]]) -> Sample {
        Sample::new(
            cols.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| v.map(str::to_string)).collect())
                .collect(),
        )
    }

    #[test]
    fn test_schema_comparison_is_positional() {
        let source = schema(&[("id", LogicalType::Integer), ("name", LogicalType::String)]);
        let swapped = schema(&[("name", LogicalType::String), ("id", LogicalType::Integer)]);
        let mismatches = compare_schemas(&source, &swapped);
        assert_eq!(mismatches.len(), 2);
        assert_eq!(mismatches[0].position, 0);

        let same = schema(&[("ID", LogicalType::Integer), ("Name", LogicalType::String)]);
        assert!(compare_schemas(&source, &same).is_empty());
    }

    #[test]
    fn test_schema_surplus_columns() {
        let source = schema(&[("id", LogicalType::Integer)]);
        let destination = schema(&[("id", LogicalType::Integer), ("extra", LogicalType::String)]);
        let mismatches = compare_schemas(&source, &destination);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].position, 1);
        assert!(mismatches[0].source.is_none());
    }

    #[test]
    fn test_schema_temporal_family() {
        let source = schema(&[("at", LogicalType::Datetime)]);
        let destination = schema(&[("at", LogicalType::Timestamp)]);
        assert!(compare_schemas(&source, &destination).is_empty());
    }

    #[test]
    fn test_sample_order() {
        let source = schema(&[
            ("name", LogicalType::String),
            ("id", LogicalType::Integer),
            ("only_source", LogicalType::String),
        ]);
        let destination = schema(&[("id", LogicalType::Integer), ("name", LogicalType::String)]);
        let order = sample_order(&["id".to_string()], &source, &destination);
        assert_eq!(order, vec!["id", "name"]);
    }

    #[test]
    fn test_type_aware_sample_comparison() {
        let s_schema = schema(&[
            ("id", LogicalType::Integer),
            ("amount", LogicalType::Float),
            ("at", LogicalType::Timestamp),
            ("note", LogicalType::String),
        ]);
        let d_schema = s_schema.clone();
        let source = sample(
            &["id", "amount", "at", "note"],
            &[&[Some("1"), Some("1.50"), Some("2024-01-01 10:00:00"), None]],
        );
        let destination = sample(
            &["id", "amount", "at", "note"],
            &[&[Some("1"), Some("1.5"), Some("2024-01-01T10:00:00Z"), Some("")]],
        );

        let result = compare_samples(&source, &destination, &s_schema, &d_schema, 1e-6, 50);
        assert_eq!(result.rows_compared, 1);
        assert_eq!(result.mismatch_count, 0);
    }

    #[test]
    fn test_mismatches_are_capped_but_counted() {
        let s_schema = schema(&[("id", LogicalType::Integer), ("v", LogicalType::String)]);
        let source = sample(&["id", "v"], &[&[Some("1"), Some("a")], &[Some("2"), Some("b")]]);
        let destination = sample(&["id", "v"], &[&[Some("1"), Some("x")], &[Some("3"), Some("y")]]);

        let result = compare_samples(&source, &destination, &s_schema, &s_schema, 1e-6, 2);
        assert_eq!(result.mismatch_count, 3);
        assert_eq!(result.mismatches.len(), 2);
        assert_eq!(result.mismatches[0].row, 0);
        assert_eq!(result.mismatches[0].column, "v");
        assert_eq!(result.mismatches[0].destination_value.as_deref(), Some("x"));
    }

    #[test]
    fn test_missing_rows_count_as_mismatches() {
        let s_schema = schema(&[("id", LogicalType::Integer)]);
        let source = sample(&["id"], &[&[Some("1")], &[Some("2")]]);
        let destination = sample(&["id"], &[&[Some("1")]]);
        let result = compare_samples(&source, &destination, &s_schema, &s_schema, 1e-6, 10);
        assert_eq!(result.rows_compared, 2);
        assert_eq!(result.mismatch_count, 1);
        assert_eq!(result.mismatches[0].destination_value, None);
    }
}
