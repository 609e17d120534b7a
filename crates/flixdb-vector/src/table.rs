//! LanceDB connection and housekeeping helpers.
//!
//! Provides database open, ensure-table, SQL literal quoting and typed column
//! accessors shared by the document store and the cache table.
use arrow_array::{Array, ArrayRef, FixedSizeListArray, RecordBatch, RecordBatchIterator};
use arrow_array::cast::AsArray;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};
use std::sync::Arc;

use flixdb_core::{Error, Result};

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(Error::index)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(Error::index)?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await.map_err(Error::index)?;
    Ok(())
}

pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn id_in(ids: &[String]) -> String {
    let list: Vec<String> = ids.iter().map(|id| quote(id)).collect();
    format!("id IN ({})", list.join(", "))
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch.column_by_name(name).ok_or_else(|| Error::index(format!("{name} column missing")))
}

pub fn string_col(batch: &RecordBatch, name: &str, row: usize) -> Result<Option<String>> {
    let col = column(batch, name)?
        .as_string_opt::<i32>()
        .ok_or_else(|| Error::index(format!("{name} column is not utf8")))?;
    Ok(col.is_valid(row).then(|| col.value(row).to_string()))
}

pub fn f64_col(batch: &RecordBatch, name: &str, row: usize) -> Result<Option<f64>> {
    let col = column(batch, name)?
        .as_primitive_opt::<arrow_array::types::Float64Type>()
        .ok_or_else(|| Error::index(format!("{name} column is not f64")))?;
    Ok(col.is_valid(row).then(|| col.value(row)))
}

pub fn f32_col(batch: &RecordBatch, name: &str, row: usize) -> Result<f32> {
    let col = column(batch, name)?
        .as_primitive_opt::<arrow_array::types::Float32Type>()
        .ok_or_else(|| Error::index(format!("{name} column is not f32")))?;
    Ok(col.value(row))
}

pub fn i64_col(batch: &RecordBatch, name: &str, row: usize) -> Result<i64> {
    let col = column(batch, name)?
        .as_primitive_opt::<arrow_array::types::Int64Type>()
        .ok_or_else(|| Error::index(format!("{name} column is not i64")))?;
    Ok(col.value(row))
}

pub fn timestamp_ms_col(batch: &RecordBatch, name: &str, row: usize) -> Result<i64> {
    let col = column(batch, name)?
        .as_primitive_opt::<arrow_array::types::TimestampMillisecondType>()
        .ok_or_else(|| Error::index(format!("{name} column is not a millisecond timestamp")))?;
    Ok(col.value(row))
}

pub fn vector_col(batch: &RecordBatch, row: usize) -> Result<Option<Vec<f32>>> {
    let col = column(batch, "vector")?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| Error::index("vector column is not a fixed-size list"))?;
    if !col.is_valid(row) {
        return Ok(None);
    }
    let list = col.value(row);
    Ok(Some(list.as_primitive::<arrow_array::types::Float32Type>().values().iter().copied().collect()))
}

pub fn vectors_array(vectors: Vec<Option<Vec<f32>>>, dim: i32) -> FixedSizeListArray {
    FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
        vectors.into_iter().map(|v| v.map(|v| v.into_iter().map(Some).collect::<Vec<_>>())),
        dim,
    )
}
