//! Partition-to-node allocation.
//!
//! Every node in the pool gets a rendezvous weight for the partition; nodes are ranked
//! by weight (ties broken by id) and the ownership list is read off the top of that
//! ranking. Because each node's weight depends only on `(partition, node id)`:
//!
//! - the result depends on the node set, never on input order;
//! - removing a node that owned the partition shifts everything below it up by one
//!   slot, so survivors keep their relative order and any replacement joins at the tail;
//! - removing a node that did not own the partition changes nothing.
//!
//! With a neighborhood, the ranking is searched for the highest-ranked list containing
//! no neighbor pair. When no such list exists the search falls back to taking
//! independent nodes first and filling the remaining slots in rank order.

use super::hashing::rendezvous_weight;
use super::neighborhood::Neighborhood;
use crate::error::PartitionError;
use crate::membership::types::HasNodeId;

/// Minimum number of branches the neighbor-free search may open.
const SEARCH_BUDGET_FLOOR: usize = 1 << 16;

/// Computes the ordered owner list `[primary, backup_1, ..]` for `partition_no`.
///
/// Returns `min(backup_num + 1, distinct nodes)` nodes. Duplicate ids in `nodes` are
/// collapsed.
pub fn allocate_partition<N>(
    partition_no: u32,
    backup_num: usize,
    nodes: &[N],
    neighborhood: Option<&Neighborhood>,
) -> Result<Vec<N>, PartitionError>
where
    N: HasNodeId + Clone,
{
    if nodes.is_empty() {
        return Err(PartitionError::EmptyNodePool {
            partition: partition_no,
        });
    }

    let mut ranked: Vec<(u64, &N)> = nodes
        .iter()
        .map(|node| (rendezvous_weight(partition_no, node.node_id().as_bytes()), node))
        .collect();
    ranked.sort_by(|(wa, a), (wb, b)| wb.cmp(wa).then_with(|| a.node_id().cmp(b.node_id())));
    ranked.dedup_by(|(_, a), (_, b)| a.node_id() == b.node_id());

    let target = backup_num.saturating_add(1).min(ranked.len());

    let picked: Vec<usize> = match neighborhood {
        Some(neighborhood) if !neighborhood.is_empty() => {
            select_independent(&ranked, target, neighborhood)
        }
        _ => (0..target).collect(),
    };

    Ok(picked.into_iter().map(|idx| ranked[idx].1.clone()).collect())
}

/// Finds the highest-ranked owner list with no neighbor pair.
///
/// The search only branches on candidates compatible with every node already chosen
/// and abandons a branch once too few of them remain to fill the list. It is exact
/// within a budget of `max(2^16, n^2 * target)` branches; past that the result is
/// best-effort and may collocate neighbors.
fn select_independent<N: HasNodeId>(
    ranked: &[(u64, &N)],
    target: usize,
    neighborhood: &Neighborhood,
) -> Vec<usize> {
    let n = ranked.len();
    let mut chosen = Vec::with_capacity(target);
    let mut budget = n
        .saturating_mul(n)
        .saturating_mul(target)
        .max(SEARCH_BUDGET_FLOOR);
    let candidates: Vec<usize> = (0..n).collect();

    if search(ranked, target, neighborhood, &candidates, &mut chosen, &mut budget) {
        return chosen;
    }

    if budget == 0 {
        tracing::warn!(
            "Neighbor-free search over {} nodes exhausted its budget, collocating",
            n
        );
    } else {
        tracing::debug!(
            "No neighbor-free owner list of size {} among {} nodes, collocating",
            target,
            n
        );
    }
    fill_with_collocation(ranked, target, neighborhood)
}

/// `candidates` holds rank indices, ascending, compatible with all of `chosen`.
fn search<N: HasNodeId>(
    ranked: &[(u64, &N)],
    target: usize,
    neighborhood: &Neighborhood,
    candidates: &[usize],
    chosen: &mut Vec<usize>,
    budget: &mut usize,
) -> bool {
    if chosen.len() == target {
        return true;
    }
    let needed = target - chosen.len();

    for (pos, &idx) in candidates.iter().enumerate() {
        if candidates.len() - pos < needed || *budget == 0 {
            return false;
        }
        *budget -= 1;

        let picked = ranked[idx].1.node_id();
        let remaining: Vec<usize> = candidates[pos + 1..]
            .iter()
            .copied()
            .filter(|&other| !neighborhood.are_neighbors(picked, ranked[other].1.node_id()))
            .collect();
        if remaining.len() < needed - 1 {
            continue;
        }

        chosen.push(idx);
        if search(ranked, target, neighborhood, &remaining, chosen, budget) {
            return true;
        }
        chosen.pop();
    }

    false
}

fn fill_with_collocation<N: HasNodeId>(
    ranked: &[(u64, &N)],
    target: usize,
    neighborhood: &Neighborhood,
) -> Vec<usize> {
    let mut picked: Vec<usize> = Vec::with_capacity(target);
    let mut deferred = Vec::new();

    for (idx, (_, node)) in ranked.iter().enumerate() {
        if picked.len() == target {
            break;
        }
        let collides = picked
            .iter()
            .any(|&p| neighborhood.are_neighbors(ranked[p].1.node_id(), node.node_id()));
        if collides {
            deferred.push(idx);
        } else {
            picked.push(idx);
        }
    }

    let missing = target - picked.len();
    picked.extend(deferred.into_iter().take(missing));
    picked
}
