//! IVF_PQ index parameters and build for the LanceDB dense backend.
use anyhow::Result;
use lancedb::index::{Index, vector::IvfPqIndexBuilder};
use lancedb::{DistanceType, Table};

pub const INDEX_NAME: &str = "vector_ivfpq";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
    pub nbits: usize,
}

pub fn compute_ivfpq_params(total_ready: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (total_ready as f64).sqrt() as usize;
    let mut nlist = std::cmp::min(2 * sqrt_n, 65536);
    // Clamp nlist to be less than total_ready for tiny datasets
    if total_ready > 1 {
        nlist = nlist.clamp(1, total_ready - 1);
    } else {
        nlist = 1;
    }
    // Sub-vector count must divide the dimension.
    let preferred = if dim >= 1024 { 32 } else { 16 };
    let m = [preferred, 16, 8, 4, 2, 1].into_iter().find(|m| dim % m == 0).unwrap_or(1);
    IvfPqParams { nlist, m, nbits: 8 }
}

pub async fn build_ivfpq_index(table: &Table, params: &IvfPqParams) -> Result<()> {
    table
        .create_index(
            &["vector"],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(params.nlist as u32)
                    .num_sub_vectors(params.m as u32),
            ),
        )
        .name(INDEX_NAME.to_string())
        .execute()
        .await?;
    Ok(())
}
