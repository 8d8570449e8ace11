//! Schema Deriver
//!
//! Decodes the assembled introspection stream back into rows and groups them
//! into table → columns. The reply is buffered completely before decoding.

use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use super::error::{BridgeError, BridgeResult};
use super::wire::decode_stream;

/// Label of the derived schema
pub const SCHEMA_LABEL: &str = "main";

/// Columns every introspection reply must carry
const REQUIRED_COLUMNS: [&str; 4] = ["table_name", "column_name", "data_type", "is_nullable"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub name: String,
    pub tables: Vec<TableSchema>,
}

/// One row of `information_schema.columns`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectionRow {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: String,
}

impl IntrospectionRow {
    pub fn new(table: &str, column: &str, data_type: &str, is_nullable: &str) -> Self {
        Self {
            table_name: table.to_string(),
            column_name: column.to_string(),
            data_type: data_type.to_string(),
            is_nullable: is_nullable.to_string(),
        }
    }
}

/// Read introspection rows from decoded batches, in decode order.
///
/// String-like columns of any encoding are accepted; nulls read as "".
pub fn rows_from_batches(batches: &[RecordBatch]) -> BridgeResult<Vec<IntrospectionRow>> {
    let mut rows = Vec::new();
    for batch in batches {
        let mut columns = Vec::with_capacity(REQUIRED_COLUMNS.len());
        for name in REQUIRED_COLUMNS {
            let column = batch
                .column_by_name(name)
                .ok_or_else(|| BridgeError::decode(format!("missing column {name}")))?;
            columns.push(cast(column, &DataType::Utf8)?);
        }
        let strings: Vec<_> = columns.iter().map(|c| c.as_string::<i32>()).collect();
        let value = |col: usize, row: usize| -> String {
            let array = strings[col];
            if array.is_null(row) {
                String::new()
            } else {
                array.value(row).to_string()
            }
        };
        for row in 0..batch.num_rows() {
            rows.push(IntrospectionRow {
                table_name: value(0, row),
                column_name: value(1, row),
                data_type: value(2, row),
                is_nullable: value(3, row),
            });
        }
    }
    Ok(rows)
}

/// Group rows by table, keeping first-seen table order and row order.
pub fn group_rows(rows: impl IntoIterator<Item = IntrospectionRow>) -> Vec<TableSchema> {
    let mut tables: Vec<TableSchema> = Vec::new();
    for row in rows {
        let column = ColumnSchema {
            name: row.column_name,
            data_type: row.data_type,
            nullable: row.is_nullable == "YES",
        };
        match tables.iter_mut().find(|t| t.name == row.table_name) {
            Some(table) => table.columns.push(column),
            None => tables.push(TableSchema {
                name: row.table_name,
                columns: vec![column],
            }),
        }
    }
    tables
}

/// Decode an assembled introspection stream into a schema.
pub fn derive_schema(stream: &[u8]) -> BridgeResult<DatabaseSchema> {
    let (_, batches) = decode_stream(stream)?;
    let rows = rows_from_batches(&batches)?;
    tracing::debug!(batches = batches.len(), rows = rows.len(), "introspection_decoded");
    Ok(DatabaseSchema {
        name: SCHEMA_LABEL.to_string(),
        tables: group_rows(rows),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::{reassemble, DataFrame};
    use arrow::array::{ArrayRef, LargeStringArray, StringArray};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    fn string_column(values: Vec<&str>) -> ArrayRef {
        Arc::new(StringArray::from(values))
    }

    fn introspection_stream(rows: &[IntrospectionRow], batch_size: usize) -> Vec<u8> {
        let schema = Arc::new(Schema::new(
            REQUIRED_COLUMNS
                .iter()
                .map(|name| Field::new(*name, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));
        let batches: Vec<RecordBatch> = rows
            .chunks(batch_size.max(1))
            .map(|chunk| {
                RecordBatch::try_new(
                    schema.clone(),
                    vec![
                        string_column(chunk.iter().map(|r| r.table_name.as_str()).collect()),
                        string_column(chunk.iter().map(|r| r.column_name.as_str()).collect()),
                        string_column(chunk.iter().map(|r| r.data_type.as_str()).collect()),
                        string_column(chunk.iter().map(|r| r.is_nullable.as_str()).collect()),
                    ],
                )
                .unwrap()
            })
            .collect();
        let frames: Vec<DataFrame> = arrow_flight::utils::batches_to_flight_data(&schema, batches)
            .unwrap()
            .into_iter()
            .map(DataFrame::from)
            .collect();
        reassemble(&frames).unwrap().to_vec()
    }

    fn sample_rows() -> Vec<IntrospectionRow> {
        vec![
            IntrospectionRow::new("customers", "id", "INTEGER", "NO"),
            IntrospectionRow::new("customers", "email", "VARCHAR", "YES"),
            IntrospectionRow::new("orders", "id", "INTEGER", "NO"),
            IntrospectionRow::new("orders", "customer_id", "INTEGER", "YES"),
            IntrospectionRow::new("orders", "total", "DECIMAL(10,2)", "YES"),
        ]
    }

    #[test]
    fn test_two_rows_one_table() {
        let stream = introspection_stream(
            &[
                IntrospectionRow::new("t", "a", "INT", "YES"),
                IntrospectionRow::new("t", "b", "TEXT", "NO"),
            ],
            10,
        );
        let schema = derive_schema(&stream).unwrap();
        assert_eq!(schema.name, SCHEMA_LABEL);
        assert_eq!(
            serde_json::to_value(&schema.tables).unwrap(),
            serde_json::json!([{
                "name": "t",
                "columns": [
                    {"name": "a", "type": "INT", "nullable": true},
                    {"name": "b", "type": "TEXT", "nullable": false}
                ]
            }])
        );
    }

    #[test]
    fn test_decode_matches_direct_grouping() {
        let rows = sample_rows();
        let expected = group_rows(rows.clone());
        // Several batches so grouping spans batch boundaries.
        let stream = introspection_stream(&rows, 2);
        let schema = derive_schema(&stream).unwrap();
        assert_eq!(schema.tables, expected);
        assert_eq!(schema.tables.len(), 2);
        assert_eq!(schema.tables[1].columns[2].name, "total");
    }

    #[test]
    fn test_decode_is_idempotent() {
        let stream = introspection_stream(&sample_rows(), 3);
        let first = derive_schema(&stream).unwrap();
        let second = derive_schema(&stream).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_nullable_only_for_literal_yes() {
        let tables = group_rows(vec![
            IntrospectionRow::new("t", "a", "INT", "yes"),
            IntrospectionRow::new("t", "b", "INT", "Y"),
            IntrospectionRow::new("t", "c", "INT", "YES"),
        ]);
        let nullable: Vec<bool> = tables[0].columns.iter().map(|c| c.nullable).collect();
        assert_eq!(nullable, vec![false, false, true]);
    }

    #[test]
    fn test_interleaved_tables_keep_first_seen_order() {
        let tables = group_rows(vec![
            IntrospectionRow::new("b", "x", "INT", "NO"),
            IntrospectionRow::new("a", "y", "INT", "NO"),
            IntrospectionRow::new("b", "z", "INT", "NO"),
        ]);
        assert_eq!(tables[0].name, "b");
        assert_eq!(tables[0].columns.len(), 2);
        assert_eq!(tables[1].name, "a");
    }

    #[test]
    fn test_empty_reply_has_no_tables() {
        let stream = introspection_stream(&[], 1);
        let schema = derive_schema(&stream).unwrap();
        assert!(schema.tables.is_empty());
    }

    #[test]
    fn test_large_utf8_columns_are_accepted() {
        let schema = Arc::new(Schema::new(
            REQUIRED_COLUMNS
                .iter()
                .map(|name| Field::new(*name, DataType::LargeUtf8, true))
                .collect::<Vec<_>>(),
        ));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(LargeStringArray::from(vec!["t"])),
                Arc::new(LargeStringArray::from(vec!["a"])),
                Arc::new(LargeStringArray::from(vec!["INT"])),
                Arc::new(LargeStringArray::from(vec![None::<&str>])),
            ],
        )
        .unwrap();
        let rows = rows_from_batches(&[batch]).unwrap();
        assert_eq!(rows, vec![IntrospectionRow::new("t", "a", "INT", "")]);
    }

    #[test]
    fn test_missing_column_is_decode_error() {
        let schema = Arc::new(Schema::new(vec![Field::new("table_name", DataType::Utf8, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["t"]))]).unwrap();
        assert!(matches!(
            rows_from_batches(&[batch]),
            Err(BridgeError::Decode { .. })
        ));
    }
}
