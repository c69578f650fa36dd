//! Identifier partitioning into service-legal batches.

use std::collections::BTreeSet;

use ogc_common::{IdentifierBatch, ObjectId, OgcError, OgcResult};

/// Deduplicate `ids` and chunk them into batches of at most `max_batch_size`.
///
/// Batches are emitted in identifier order so repeated calls produce the same
/// requests.
pub fn partition_ids<I>(ids: I, max_batch_size: usize) -> OgcResult<Vec<IdentifierBatch>>
where
    I: IntoIterator<Item = ObjectId>,
{
    if max_batch_size == 0 {
        return Err(OgcError::input_value(
            "max_batch_size",
            ["a positive number of records"],
        ));
    }

    let unique: Vec<ObjectId> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    Ok(unique
        .chunks(max_batch_size)
        .map(|chunk| IdentifierBatch::new(chunk.to_vec()))
        .collect())
}
