//! LanceDB connection and column helpers.

use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, Int32Array, RecordBatch, StringArray};
use lancedb::{connect, Connection};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

pub fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("missing string column '{}'", name))
}

pub fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow!("missing int column '{}'", name))
}

/// Similarity score for row `i`: `1 - _distance`, or 0 if the store did not
/// return distances.
pub fn score_at(batch: &RecordBatch, i: usize) -> f32 {
    batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .filter(|c| c.is_valid(i))
        .map_or(0.0, |c| 1.0 - c.value(i))
}

/// SQL predicate restricting rows to the given partitions.
pub fn partition_filter<'a, I>(partitions: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let quoted = partitions
        .into_iter()
        .map(|p| format!("'{}'", p.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ");
    format!("partition IN ({quoted})")
}
