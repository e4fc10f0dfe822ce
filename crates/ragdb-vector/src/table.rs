//! LanceDB connection and table helpers for the dense backend.
use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, UInt64Array};
use lancedb::{connect, Connection, Table};
use std::path::Path;
use std::sync::Arc;

use ragdb_core::types::Passage;

use crate::schema::build_arrow_schema;

pub const TABLE_NAME: &str = "passages";

pub async fn open_db(dir: &Path) -> Result<Connection> {
    Ok(connect(dir.to_string_lossy().as_ref()).execute().await?)
}

/// `None` when the table does not exist.
pub async fn open_table(conn: &Connection) -> Result<Option<Table>> {
    let names = conn.table_names().execute().await?;
    if !names.iter().any(|n| n == TABLE_NAME) { return Ok(None); }
    Ok(Some(conn.open_table(TABLE_NAME).execute().await?))
}

/// Create the table from `passages` (all carrying embeddings of `dim`).
pub async fn create_table(conn: &Connection, passages: &[Passage], dim: usize) -> Result<Table> {
    let dim = i32::try_from(dim)?;
    let schema = build_arrow_schema(dim);
    let mut ids = Vec::with_capacity(passages.len());
    let mut ords = Vec::with_capacity(passages.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(passages.len());
    for (ord, p) in passages.iter().enumerate() {
        let e = p.embedding.as_ref().ok_or_else(|| anyhow!("passage {} has no embedding", p.id))?;
        ids.push(p.id.clone());
        ords.push(ord as u64);
        vectors.push(Some(e.iter().map(|&x| Some(x)).collect()));
    }
    let rb = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(UInt64Array::from(ords)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), schema));
    Ok(conn.create_table(TABLE_NAME, reader).execute().await?)
}
