//! Accelerated dense backend on an embedded LanceDB table.
//!
//! Below `flat_threshold` rows the table is searched exhaustively; at or
//! above it an IVF_PQ index (cosine) is trained and queried with refinement.
//! LanceDB is async. Calls run on a process-wide current-thread runtime; from
//! inside a multi-thread tokio runtime the worker is handed off with
//! `block_in_place`, and a current-thread caller gets an error.
use anyhow::{anyhow, bail, Result};
use arrow_array::{Float32Array, StringArray, UInt64Array};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{DistanceType, Table};
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tracing::{debug, info, warn};

use ragdb_core::types::{Passage, SearchHit, SourceKind};

use crate::index_build::{build_ivfpq_index, compute_ivfpq_params};
use crate::table::{create_table, open_db, open_table};

const NPROBES: usize = 20;
const REFINE_FACTOR: u32 = 10;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

pub struct LanceIndex {
    table: Table,
    rows: usize,
    dim: usize,
    indexed: bool,
}

impl LanceIndex {
    /// Write `passages` into a fresh table. The table is staged next to `dir`
    /// and moved into place only once it is complete, so a failed build
    /// leaves the previous table untouched.
    pub fn build(dir: &Path, passages: &[Passage], dim: usize, flat_threshold: usize) -> Result<Self> {
        let staging = sibling(dir, "staging");
        if staging.exists() { std::fs::remove_dir_all(&staging)?; }
        std::fs::create_dir_all(&staging)?;
        let indexed = passages.len() >= flat_threshold;
        let written = block_on(async {
            let conn = open_db(&staging).await?;
            let table = create_table(&conn, passages, dim).await?;
            if indexed {
                let params = compute_ivfpq_params(passages.len(), dim);
                info!(nlist = params.nlist, m = params.m, rows = passages.len(), "building IVF_PQ index");
                build_ivfpq_index(&table, &params).await?;
            }
            Ok::<_, anyhow::Error>(())
        })
        .and_then(|r| r);
        if let Err(e) = written {
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                warn!(error = %cleanup, dir = %staging.display(), "failed to remove staged lance table");
            }
            return Err(e);
        }
        replace_dir(&staging, dir)?;

        let table = block_on(async {
            let conn = open_db(dir).await?;
            open_table(&conn).await?.ok_or_else(|| anyhow!("lance table missing after build"))
        })??;
        Ok(Self { table, rows: passages.len(), dim, indexed })
    }

    /// Reopen the table in `dir` if it holds exactly `passages` (same ids in
    /// the same order), otherwise rebuild it.
    pub fn open_or_build(dir: &Path, passages: &[Passage], dim: usize, flat_threshold: usize) -> Result<Self> {
        if dir.exists() {
            let reopened = block_on(async {
                let conn = open_db(dir).await?;
                let Some(table) = open_table(&conn).await? else { return Ok::<_, anyhow::Error>(None) };
                if table.count_rows(None).await? != passages.len() { return Ok(None); }
                if !holds_passages(&table, passages).await? { return Ok(None); }
                let indexed = !table.list_indices().await?.is_empty();
                Ok(Some((table, indexed)))
            })
            .and_then(|r| r);
            match reopened {
                Ok(Some((table, indexed))) => {
                    info!(rows = passages.len(), indexed, "reopened lance table");
                    return Ok(Self { table, rows: passages.len(), dim, indexed });
                }
                Ok(None) => info!("lance table missing or stale, rebuilding"),
                Err(e) => warn!(error = %e, "failed to reopen lance table, rebuilding"),
            }
        }
        Self::build(dir, passages, dim, flat_threshold)
    }

    pub fn len(&self) -> usize { self.rows }

    pub fn is_empty(&self) -> bool { self.rows == 0 }

    pub fn is_indexed(&self) -> bool { self.indexed }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, SearchHit)>> {
        if k == 0 || self.rows == 0 { return Ok(Vec::new()); }
        anyhow::ensure!(query.len() == self.dim, "query dim {} does not match index dim {}", query.len(), self.dim);
        let mut hits = block_on(async {
            let mut q = self.table.vector_search(query.to_vec())?.distance_type(DistanceType::Cosine).limit(k);
            if self.indexed { q = q.nprobes(NPROBES).refine_factor(REFINE_FACTOR); }
            let mut stream = q.execute().await?;
            let mut hits = Vec::new();
            while let Some(batch) = stream.try_next().await? {
                let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("missing id column"))?;
                let ords = batch.column_by_name("ord").and_then(|c| c.as_any().downcast_ref::<UInt64Array>()).ok_or_else(|| anyhow!("missing ord column"))?;
                let dists = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>()).ok_or_else(|| anyhow!("missing _distance column"))?;
                for i in 0..batch.num_rows() {
                    let score = 1.0 - dists.value(i);
                    hits.push((ords.value(i) as usize, SearchHit { id: ids.value(i).to_string(), score, source: SourceKind::Dense }));
                }
            }
            Ok::<_, anyhow::Error>(hits)
        })??;
        hits.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
        hits.truncate(k);
        Ok(hits)
    }
}

/// True when row `ord` of the table carries the id of `passages[ord]` for every row.
async fn holds_passages(table: &Table, passages: &[Passage]) -> Result<bool> {
    let mut stream = table
        .query()
        .select(Select::columns(&["id", "ord"]))
        .limit(passages.len())
        .execute()
        .await?;
    let mut stored: Vec<(u64, String)> = Vec::with_capacity(passages.len());
    while let Some(batch) = stream.try_next().await? {
        let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("missing id column"))?;
        let ords = batch.column_by_name("ord").and_then(|c| c.as_any().downcast_ref::<UInt64Array>()).ok_or_else(|| anyhow!("missing ord column"))?;
        stored.extend((0..batch.num_rows()).map(|i| (ords.value(i), ids.value(i).to_string())));
    }
    stored.sort_unstable_by_key(|(ord, _)| *ord);
    let same = stored.len() == passages.len()
        && stored.iter().zip(passages).enumerate().all(|(i, ((ord, id), p))| *ord as usize == i && *id == p.id);
    if !same { debug!(rows = stored.len(), "lance table ids differ from passages"); }
    Ok(same)
}

/// `<dir>.<suffix>` next to `dir`.
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.file_name().map(OsString::from).unwrap_or_else(|| OsString::from("lancedb"));
    name.push(".");
    name.push(suffix);
    dir.with_file_name(name)
}

/// Move `staged` to `dir`, restoring the previous `dir` if the move fails.
fn replace_dir(staged: &Path, dir: &Path) -> Result<()> {
    let retired = sibling(dir, "old");
    if retired.exists() { std::fs::remove_dir_all(&retired)?; }
    let had_previous = dir.exists();
    if had_previous { std::fs::rename(dir, &retired)?; }
    if let Err(e) = std::fs::rename(staged, dir) {
        if had_previous { std::fs::rename(&retired, dir)?; }
        return Err(e.into());
    }
    if had_previous {
        if let Err(e) = std::fs::remove_dir_all(&retired) {
            warn!(error = %e, dir = %retired.display(), "failed to remove previous lance table");
        }
    }
    Ok(())
}

fn runtime() -> Result<&'static Runtime> {
    if let Some(rt) = RUNTIME.get() { return Ok(rt); }
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    if let Err(lost) = RUNTIME.set(rt) { lost.shutdown_background(); }
    RUNTIME.get().ok_or_else(|| anyhow!("lance runtime unavailable"))
}

/// Run `fut` to completion on the shared runtime.
fn block_on<F: Future>(fut: F) -> Result<F::Output> {
    let rt = runtime()?;
    match Handle::try_current() {
        Err(_) => Ok(rt.block_on(fut)),
        Ok(h) if h.runtime_flavor() == RuntimeFlavor::MultiThread => Ok(tokio::task::block_in_place(|| rt.block_on(fut))),
        Ok(_) => bail!("lance backend cannot block inside a current-thread tokio runtime; call it through spawn_blocking"),
    }
}
