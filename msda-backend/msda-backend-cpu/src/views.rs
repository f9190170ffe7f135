use msda_core::WorkPartition;

/// Split a query-indexed `[batch, queries, stride]` buffer into the disjoint
/// pieces each worker owns: `views[worker][batch]` covers the worker's query
/// range within that batch. Workers with an empty range get no pieces.
pub(crate) fn split_by_worker<'a>(
    buf: &'a mut [f32],
    batch: usize,
    queries: usize,
    stride: usize,
    partition: &WorkPartition,
) -> Vec<Vec<&'a mut [f32]>> {
    let mut views: Vec<Vec<&'a mut [f32]>> = (0..partition.workers())
        .map(|_| Vec::with_capacity(batch))
        .collect();
    if partition.chunk_len() == 0 || stride == 0 {
        return views;
    }
    for batch_buf in buf.chunks_mut(queries * stride) {
        for (worker, piece) in batch_buf
            .chunks_mut(partition.chunk_len() * stride)
            .enumerate()
        {
            views[worker].push(piece);
        }
    }
    views
}
