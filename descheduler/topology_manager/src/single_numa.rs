//! Single-NUMA-node admission policy.
//!
//! Resource managers each contribute a list of topology hints for the pod
//! being admitted. The policy keeps only hints compatible with placing the
//! pod on a single NUMA node, intersects them across resources, and admits
//! the pod iff the best merged hint is preferred.

use crate::bitmask::BitMask;

/// One resource manager's placement contribution.
///
/// `affinity = None` means the resource imposes no node constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumaTopologyHint {
    pub affinity: Option<BitMask>,
    pub preferred: bool,
}

impl NumaTopologyHint {
    pub fn new(affinity: Option<BitMask>, preferred: bool) -> Self {
        Self {
            affinity,
            preferred,
        }
    }
}

/// Per-resource filtering step of the single-NUMA-node policy.
///
/// A hint survives iff it is preferred and either contributes no
/// constraint or pins exactly one node. A resource whose list filters down
/// to nothing yields an empty slot, which makes the merge infeasible
/// downstream.
pub fn filter_single_numa_hints(
    all_resources_hints: Vec<Vec<NumaTopologyHint>>,
) -> Vec<Vec<NumaTopologyHint>> {
    all_resources_hints
        .into_iter()
        .map(|hints| {
            hints
                .into_iter()
                .filter(|hint| {
                    hint.preferred
                        && match &hint.affinity {
                            None => true,
                            Some(mask) => mask.count() == 1,
                        }
                })
                .collect()
        })
        .collect()
}

/// Single-NUMA-node topology policy over a fixed set of node ids.
#[derive(Debug, Clone)]
pub struct SingleNumaNodePolicy {
    numa_nodes: Vec<usize>,
}

impl SingleNumaNodePolicy {
    pub fn new(numa_nodes: Vec<usize>) -> Self {
        Self { numa_nodes }
    }

    /// Whether the merged hint admits the pod.
    pub fn can_admit_pod_result(&self, hint: &NumaTopologyHint) -> bool {
        hint.preferred
    }

    /// Merge per-resource hint lists into the best aggregate hint.
    ///
    /// Every combination of one hint per resource is evaluated: affinities
    /// are intersected (a missing affinity contributes the full node set)
    /// and `preferred` is the conjunction of the contributors. The best
    /// candidate is the preferred one with the narrowest affinity; when the
    /// result spans every node it degrades to an unconstrained hint.
    pub fn merge(
        &self,
        all_resources_hints: Vec<Vec<NumaTopologyHint>>,
    ) -> (NumaTopologyHint, bool) {
        let default_affinity =
            BitMask::new(&self.numa_nodes).unwrap_or_else(|_| BitMask::empty());
        let filtered = filter_single_numa_hints(all_resources_hints);

        let mut best: Option<NumaTopologyHint> = None;
        for_each_combination(&filtered, &mut |combination| {
            let mut merged = default_affinity;
            let mut preferred = true;
            for hint in combination {
                if let Some(mask) = &hint.affinity {
                    merged = merged.and(mask);
                }
                preferred = preferred && hint.preferred;
            }
            if merged.is_empty() {
                return;
            }
            let candidate = NumaTopologyHint::new(Some(merged), preferred);
            best = match best.take() {
                None => Some(candidate),
                Some(current) => Some(pick_better(current, candidate)),
            };
        });

        let mut best =
            best.unwrap_or_else(|| NumaTopologyHint::new(Some(default_affinity), false));
        if best.affinity == Some(default_affinity) {
            best.affinity = None;
        }
        let admit = self.can_admit_pod_result(&best);
        (best, admit)
    }
}

fn pick_better(current: NumaTopologyHint, candidate: NumaTopologyHint) -> NumaTopologyHint {
    if candidate.preferred != current.preferred {
        return if candidate.preferred {
            candidate
        } else {
            current
        };
    }
    match (&candidate.affinity, &current.affinity) {
        (Some(c), Some(b)) if c.is_narrower_than(b) => candidate,
        _ => current,
    }
}

/// Invoke `visit` with every combination of one hint per resource. A
/// resource with no hints yields no combinations at all.
fn for_each_combination<'a, F>(lists: &'a [Vec<NumaTopologyHint>], visit: &mut F)
where
    F: FnMut(&[&'a NumaTopologyHint]),
{
    if lists.iter().any(|l| l.is_empty()) {
        return;
    }
    let mut indices = vec![0usize; lists.len()];
    loop {
        let combination: Vec<&NumaTopologyHint> = indices
            .iter()
            .zip(lists.iter())
            .map(|(&i, list)| &list[i])
            .collect();
        visit(&combination);

        // Odometer increment over the per-resource indices.
        let mut pos = lists.len();
        loop {
            if pos == 0 {
                return;
            }
            pos -= 1;
            indices[pos] += 1;
            if indices[pos] < lists[pos].len() {
                break;
            }
            indices[pos] = 0;
        }
    }
}
