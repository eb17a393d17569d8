use super::{NodeFlags, Pbvh, PbvhNode};
use crate::math::Real;
use smallvec::SmallVec;

const TRAVERSAL_STACK_SIZE: usize = 128;

/// Post-order iterator over the nodes of a [`Pbvh`] accepted by a predicate.
///
/// Leaves are yielded when they pass the predicate. Internal nodes passing it are yielded
/// again after both their children were processed.
pub(crate) struct PbvhIter<'a, F: Fn(&PbvhNode) -> bool> {
    nodes: &'a [PbvhNode],
    stack: SmallVec<[(u32, bool); TRAVERSAL_STACK_SIZE]>,
    scb: F,
}

impl<'a, F: Fn(&PbvhNode) -> bool> PbvhIter<'a, F> {
    pub(crate) fn new(nodes: &'a [PbvhNode], scb: F) -> Self {
        let mut stack = SmallVec::new();

        if !nodes.is_empty() {
            stack.push((0, false));
        }

        Self { nodes, stack, scb }
    }
}

impl<F: Fn(&PbvhNode) -> bool> Iterator for PbvhIter<'_, F> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while let Some((id, revisiting)) = self.stack.pop() {
            if revisiting {
                return Some(id);
            }

            let node = &self.nodes[id as usize];

            if !(self.scb)(node) {
                continue;
            }

            if node.is_leaf() {
                return Some(id);
            }

            self.stack.push((id, true));
            self.stack.push((node.children_offset + 1, false));
            self.stack.push((node.children_offset, false));
        }

        None
    }
}

/// A binary search tree, stored in an arena, sorting leaves by their entry distance.
struct OcclusionTree {
    entries: Vec<OcclusionEntry>,
}

struct OcclusionEntry {
    node: u32,
    tmin: Real,
    left: Option<usize>,
    right: Option<usize>,
}

impl OcclusionTree {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn insert(&mut self, node: u32, tmin: Real) {
        let new_id = self.entries.len();
        self.entries.push(OcclusionEntry {
            node,
            tmin,
            left: None,
            right: None,
        });

        if new_id == 0 {
            return;
        }

        let mut curr = 0;
        loop {
            let entry = &mut self.entries[curr];
            let child = if tmin < entry.tmin {
                &mut entry.left
            } else {
                &mut entry.right
            };

            match *child {
                Some(next) => curr = next,
                None => {
                    *child = Some(new_id);
                    return;
                }
            }
        }
    }

    /// The leaves sorted by increasing `tmin`. Equal keys keep their insertion order.
    fn in_order(&self) -> Vec<u32> {
        let mut result = Vec::with_capacity(self.entries.len());
        let mut stack: SmallVec<[usize; 32]> = SmallVec::new();
        let mut curr = (!self.entries.is_empty()).then_some(0);

        loop {
            while let Some(id) = curr {
                stack.push(id);
                curr = self.entries[id].left;
            }

            let Some(id) = stack.pop() else {
                break;
            };

            result.push(self.entries[id].node);
            curr = self.entries[id].right;
        }

        result
    }
}

/// Predicate selecting the leaves tagged with any bit of `flag`, and every internal node.
pub(crate) fn update_search(node: &PbvhNode, flag: NodeFlags) -> bool {
    !node.is_leaf() || node.flag.intersects(flag)
}

/// Mutable references to the nodes at the given indices, in increasing index order.
///
/// The indices must be distinct.
pub(crate) fn nodes_mut_by_index<'a>(
    nodes: &'a mut [PbvhNode],
    indices: &[u32],
) -> Vec<&'a mut PbvhNode> {
    let mut selected = vec![false; nodes.len()];
    for id in indices {
        selected[*id as usize] = true;
    }

    nodes
        .iter_mut()
        .zip(selected)
        .filter_map(|(node, selected)| selected.then_some(node))
        .collect()
}

impl Pbvh {
    /// The leaves accepted by `scb`, in depth-first order.
    ///
    /// `scb` is called on internal nodes too: returning `false` prunes the whole subtree.
    pub fn search_gather(&self, scb: impl Fn(&PbvhNode) -> bool) -> Vec<u32> {
        PbvhIter::new(&self.nodes, scb)
            .filter(|id| self.nodes[*id as usize].is_leaf())
            .collect()
    }

    /// Calls `f` on every leaf accepted by `scb`.
    pub fn search_callback(
        &mut self,
        scb: impl Fn(&PbvhNode) -> bool,
        mut f: impl FnMut(u32, &mut PbvhNode),
    ) {
        for id in self.search_gather(scb) {
            f(id, &mut self.nodes[id as usize]);
        }
    }

    /// Visits the leaves accepted by `scb` from the nearest to the farthest.
    ///
    /// `scb` may write the entry distance of the node into its `tmin` field; leaves are
    /// then sorted by that value. `hit` is called on each leaf in order with the running
    /// closest distance, initialized to `Real::MAX`, which it may lower.
    pub fn search_callback_occluded(
        &mut self,
        mut scb: impl FnMut(&mut PbvhNode) -> bool,
        mut hit: impl FnMut(&Pbvh, u32, &mut Real),
    ) {
        let mut tree = OcclusionTree::new();
        let mut stack: SmallVec<[u32; TRAVERSAL_STACK_SIZE]> = SmallVec::new();

        if !self.nodes.is_empty() {
            stack.push(0);
        }

        while let Some(id) = stack.pop() {
            let node = &mut self.nodes[id as usize];

            if !scb(node) {
                continue;
            }

            if node.is_leaf() {
                tree.insert(id, node.tmin);
            } else {
                stack.push(node.children_offset + 1);
                stack.push(node.children_offset);
            }
        }

        let mut tmin = Real::MAX;
        for leaf in tree.in_order() {
            hit(self, leaf, &mut tmin);
        }
    }
}

#[cfg(test)]
mod test {
    use super::OcclusionTree;

    #[test]
    fn occlusion_tree_sorts_by_distance() {
        let mut tree = OcclusionTree::new();
        for (node, tmin) in [(1, 3.0), (2, 1.0), (3, 2.0), (4, 1.0), (5, 5.0)] {
            tree.insert(node, tmin);
        }
        assert_eq!(tree.in_order(), [2, 4, 3, 1, 5]);
        assert!(OcclusionTree::new().in_order().is_empty());
    }
}
