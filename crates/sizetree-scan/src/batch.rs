//! Splitting search results into worker batches.

use std::path::PathBuf;

use itertools::Itertools;

use sizetree_core::MAX_BATCH_SIZE;

/// Batch size for `total` paths spread over `units` workers.
///
/// Aims for one batch per unit, never exceeds [`MAX_BATCH_SIZE`] and is
/// always at least 1.
pub fn chunk_size(total: usize, units: usize) -> usize {
    (total / units.max(1)).clamp(1, MAX_BATCH_SIZE)
}

/// Split `paths` into consecutive batches of [`chunk_size`] paths.
pub fn partition(paths: Vec<PathBuf>, units: usize) -> Vec<Vec<PathBuf>> {
    let size = chunk_size(paths.len(), units);
    paths
        .into_iter()
        .chunks(size)
        .into_iter()
        .map(|chunk| chunk.collect())
        .collect()
}
