//! Neighbor selection shared by build, insert and vacuum.

use crate::error::Result;

/// Pick at most `capacity` neighbors from `(distance_to_base, id)` candidates.
///
/// Candidates are ordered by distance ascending, ties by id. Duplicates and
/// `owner` are dropped. With `heuristic` a candidate is admitted only if it
/// is strictly closer to the base than to every neighbor admitted before it
/// (Algorithm 4 of the HNSW paper, without backfill); otherwise the closest
/// `capacity` are taken. `pair_distance(a, b)` measures two candidates.
pub fn select_neighbors<F>(
    candidates: &[(f32, u32)],
    capacity: usize,
    heuristic: bool,
    owner: Option<u32>,
    mut pair_distance: F,
) -> Result<Vec<(f32, u32)>>
where
    F: FnMut(u32, u32) -> Result<f32>,
{
    let mut sorted: Vec<(f32, u32)> = candidates
        .iter()
        .copied()
        .filter(|&(_, id)| Some(id) != owner)
        .collect();
    sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    // Keep the first (closest) occurrence of each id.
    let mut seen = std::collections::HashSet::with_capacity(sorted.len());
    sorted.retain(|&(_, id)| seen.insert(id));

    if !heuristic {
        sorted.truncate(capacity);
        return Ok(sorted);
    }

    let mut selected: Vec<(f32, u32)> = Vec::with_capacity(capacity);
    for &(dist_to_base, cid) in &sorted {
        if selected.len() >= capacity {
            break;
        }
        let mut diverse = true;
        for &(_, sid) in &selected {
            if pair_distance(cid, sid)? <= dist_to_base {
                diverse = false;
                break;
            }
        }
        if diverse {
            selected.push((dist_to_base, cid));
        }
    }
    Ok(selected)
}
