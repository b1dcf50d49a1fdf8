//! A dynamic Bounding Volume Hierarchy
//! for speeding up collision detection and other spatial queries.
//!
//! Leaves hold fattened AABBs so that small movements don't require touching the tree.
//! Branches are kept balanced with tree rotations on every insertion and removal.

use super::{query::ray_aabb, Ray, AABB};
use crate::settings::{AABB_MARGIN, AABB_MULTIPLIER};

use std::collections::BinaryHeap;

/// Stable identifier of a leaf in a [`DynamicTree`].
///
/// Leaves are never moved around by rebalancing, so the id stays valid
/// until the proxy is destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(pub(crate) usize);

//
// Internal types
//

#[derive(Clone, Copy, Debug)]
struct Node<T> {
    aabb: AABB,
    parent: Option<usize>,
    /// Leaves have height 0, free nodes -1.
    height: i32,
    kind: NodeKind<T>,
}

#[derive(Clone, Copy, Debug)]
enum NodeKind<T> {
    Branch { left: usize, right: usize },
    Leaf { data: T, moved: bool },
    Free { next: Option<usize> },
}

/// A "call stack" for iterative traversal through the tree.
#[derive(Clone, Debug, Default)]
struct Stack(Vec<usize>);

/// Like a Stack, but ordered by reverse distance
/// for traversing the tree in spatial order along a ray.
#[derive(Clone, Debug, Default)]
struct RayStack(BinaryHeap<RayStackEntry>);

impl RayStack {
    fn push(&mut self, node_idx: usize, distance: f64) {
        self.0.push(RayStackEntry { node_idx, distance });
    }

    fn pop(&mut self) -> Option<RayStackEntry> {
        self.0.pop()
    }

    fn peek_t(&self) -> Option<f64> {
        self.0.peek().map(|entry| entry.distance)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct RayStackEntry {
    node_idx: usize,
    distance: f64,
}
impl Eq for RayStackEntry {}
impl PartialOrd for RayStackEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for RayStackEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // reversed to make the max-heap pop the nearest entry first,
        // ties broken by node index to keep traversal deterministic
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.node_idx.cmp(&self.node_idx))
    }
}

//
// The tree itself
//

/// A dynamic AABB tree holding a piece of user data per leaf.
#[derive(Clone, Debug)]
pub struct DynamicTree<T> {
    nodes: Vec<Node<T>>,
    root: Option<usize>,
    free_list: Option<usize>,
    proxy_count: usize,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> DynamicTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            free_list: None,
            proxy_count: 0,
        }
    }

    /// Number of live proxies in the tree.
    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Create a proxy for a tight AABB. The stored AABB is fattened by a margin.
    pub fn create_proxy(&mut self, aabb: AABB, data: T) -> ProxyId {
        let leaf = self.alloc_node(Node {
            aabb: aabb.padded(AABB_MARGIN),
            parent: None,
            height: 0,
            kind: NodeKind::Leaf { data, moved: true },
        });
        self.insert_leaf(leaf);
        self.proxy_count += 1;
        ProxyId(leaf)
    }

    /// Remove a proxy, returning its user data if it existed.
    pub fn destroy_proxy(&mut self, id: ProxyId) -> Option<T> {
        let data = self.user_data(id)?;
        self.remove_leaf(id.0);
        self.free_node(id.0);
        self.proxy_count -= 1;
        Some(data)
    }

    /// Update a proxy with a new tight AABB and the displacement it's predicted to move by.
    ///
    /// The proxy is only reinserted if the tight AABB has left the stored fat AABB,
    /// or if the fat AABB has become much larger than necessary.
    /// Returns whether reinsertion happened.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: AABB, displacement: crate::math::Vec2) -> bool {
        if self.user_data(id).is_none() {
            return false;
        }

        let fat = aabb
            .padded(AABB_MARGIN)
            .extended_by(AABB_MULTIPLIER * displacement);

        let tree_aabb = self.nodes[id.0].aabb;
        if tree_aabb.contains(&aabb) {
            // the tree AABB still contains the object, but it might be too large.
            // objects that were moving fast and then stopped would otherwise
            // keep a huge AABB forever
            let huge = fat.padded(4.0 * AABB_MARGIN);
            if huge.contains(&tree_aabb) {
                return false;
            }
        }

        self.remove_leaf(id.0);
        self.nodes[id.0].aabb = fat;
        self.insert_leaf(id.0);
        if let NodeKind::Leaf { moved, .. } = &mut self.nodes[id.0].kind {
            *moved = true;
        }
        true
    }

    #[inline]
    pub fn user_data(&self, id: ProxyId) -> Option<T> {
        match self.nodes.get(id.0)?.kind {
            NodeKind::Leaf { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Get the fattened AABB stored for a proxy.
    #[inline]
    pub fn fat_aabb(&self, id: ProxyId) -> Option<AABB> {
        let node = self.nodes.get(id.0)?;
        match node.kind {
            NodeKind::Leaf { .. } => Some(node.aabb),
            _ => None,
        }
    }

    /// Whether the proxy was reinserted since the flag was last cleared.
    pub fn was_moved(&self, id: ProxyId) -> bool {
        matches!(
            self.nodes.get(id.0).map(|n| n.kind),
            Some(NodeKind::Leaf { moved: true, .. })
        )
    }

    pub fn clear_moved(&mut self, id: ProxyId) {
        if let Some(NodeKind::Leaf { moved, .. }) = self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            *moved = false;
        }
    }

    /// Height of the tree, 0 for a single leaf or an empty tree.
    pub fn height(&self) -> i32 {
        self.root.map_or(0, |r| self.nodes[r].height)
    }

    /// Largest height difference between the two children of any branch.
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter_map(|n| match n.kind {
                NodeKind::Branch { left, right } => {
                    Some((self.nodes[left].height - self.nodes[right].height).abs())
                }
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Iterate over every proxy whose fat AABB overlaps the given box.
    pub fn query(&self, aabb: AABB) -> AabbIter<'_, T> {
        let mut stack = Stack::default();
        if let Some(root) = self.root {
            stack.0.push(root);
        }
        AabbIter {
            aabb,
            stack,
            nodes: &self.nodes,
        }
    }

    /// Traverse the proxies whose fat AABBs are hit by a ray,
    /// in order of the distance at which the ray enters the AABB.
    ///
    /// `max_t` limits the length of the ray in multiples of `ray.dir`.
    pub fn ray_cast(&self, ray: Ray, max_t: f64) -> RayIter<'_, T> {
        let mut stack = RayStack::default();
        if let Some(root) = self.root {
            if let Some(t) = ray_aabb(ray, self.nodes[root].aabb) {
                if t <= max_t {
                    stack.push(root, t);
                }
            }
        }
        RayIter {
            ray,
            max_t,
            stack,
            nodes: &self.nodes,
        }
    }

    /// Iterate over every live proxy with its fat AABB, for debug drawing.
    pub fn proxies(&self) -> impl '_ + Iterator<Item = (ProxyId, AABB, T)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, node)| match node.kind {
                NodeKind::Leaf { data, .. } => Some((ProxyId(idx), node.aabb, data)),
                _ => None,
            })
    }

    //
    // node pool
    //

    fn alloc_node(&mut self, node: Node<T>) -> usize {
        match self.free_list {
            Some(idx) => {
                if let NodeKind::Free { next } = self.nodes[idx].kind {
                    self.free_list = next;
                }
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.nodes[idx].kind = NodeKind::Free {
            next: self.free_list,
        };
        self.nodes[idx].parent = None;
        self.nodes[idx].height = -1;
        self.free_list = Some(idx);
    }

    fn children(&self, idx: usize) -> Option<(usize, usize)> {
        match self.nodes[idx].kind {
            NodeKind::Branch { left, right } => Some((left, right)),
            _ => None,
        }
    }

    fn set_children(&mut self, idx: usize, left: usize, right: usize) {
        self.nodes[idx].kind = NodeKind::Branch { left, right };
    }

    /// Point the parent of `old` (or the root) at `new` instead.
    fn replace_child(&mut self, parent: Option<usize>, old: usize, new: usize) {
        match parent {
            Some(p) => {
                if let Some((left, right)) = self.children(p) {
                    if left == old {
                        self.set_children(p, new, right);
                    } else {
                        self.set_children(p, left, new);
                    }
                }
            }
            None => self.root = Some(new),
        }
    }

    //
    // structure maintenance
    //

    fn insert_leaf(&mut self, leaf: usize) {
        let Some(root) = self.root else {
            self.root = Some(leaf);
            self.nodes[leaf].parent = None;
            return;
        };

        // find the best sibling for the new leaf using the surface area heuristic
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = root;
        while let Some((left, right)) = self.children(index) {
            let area = self.nodes[index].aabb.perimeter();
            let combined_area = self.nodes[index].aabb.union(&leaf_aabb).perimeter();

            // cost of creating a new parent for this node and the new leaf
            let cost = 2.0 * combined_area;
            // minimum cost of pushing the leaf further down the tree
            let inheritance_cost = 2.0 * (combined_area - area);

            let descend_cost = |child: usize| {
                let child_aabb = self.nodes[child].aabb;
                let union_perimeter = leaf_aabb.union(&child_aabb).perimeter();
                match self.nodes[child].kind {
                    NodeKind::Branch { .. } => {
                        union_perimeter - child_aabb.perimeter() + inheritance_cost
                    }
                    _ => union_perimeter + inheritance_cost,
                }
            };
            let cost_left = descend_cost(left);
            let cost_right = descend_cost(right);

            if cost < cost_left && cost < cost_right {
                break;
            }
            index = if cost_left < cost_right { left } else { right };
        }
        let sibling = index;

        // new branch where the sibling was, holding both the sibling and the leaf
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.alloc_node(Node {
            aabb: leaf_aabb.union(&self.nodes[sibling].aabb),
            parent: old_parent,
            height: self.nodes[sibling].height + 1,
            kind: NodeKind::Branch {
                left: sibling,
                right: leaf,
            },
        });
        self.replace_child(old_parent, sibling, new_parent);
        self.nodes[sibling].parent = Some(new_parent);
        self.nodes[leaf].parent = Some(new_parent);

        self.refit_upwards(self.nodes[leaf].parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }

        let Some(parent) = self.nodes[leaf].parent else {
            return;
        };
        let grandparent = self.nodes[parent].parent;
        let sibling = match self.children(parent) {
            Some((left, right)) if left == leaf => right,
            Some((left, _)) => left,
            None => return,
        };

        // the sibling replaces the parent
        self.replace_child(grandparent, parent, sibling);
        self.nodes[sibling].parent = grandparent;
        self.free_node(parent);
        self.nodes[leaf].parent = None;

        self.refit_upwards(grandparent);
    }

    /// Walk from a node to the root, rebalancing and refitting every branch on the way.
    fn refit_upwards(&mut self, mut index: Option<usize>) {
        while let Some(idx) = index {
            let idx = self.balance(idx);
            if let Some((left, right)) = self.children(idx) {
                self.nodes[idx].height = 1 + self.nodes[left].height.max(self.nodes[right].height);
                self.nodes[idx].aabb = self.nodes[left].aabb.union(&self.nodes[right].aabb);
            }
            index = self.nodes[idx].parent;
        }
    }

    /// Perform a left or right rotation if node `a` is imbalanced.
    /// Returns the new root of the subtree.
    fn balance(&mut self, a: usize) -> usize {
        let Some((b, c)) = self.children(a) else {
            return a;
        };
        if self.nodes[a].height < 2 {
            return a;
        }

        let balance = self.nodes[c].height - self.nodes[b].height;
        if balance > 1 {
            self.rotate_up(a, c, b, false)
        } else if balance < -1 {
            self.rotate_up(a, b, c, true)
        } else {
            a
        }
    }

    /// Rotate the taller child `up` of `a` into `a`'s place.
    /// `other` is `a`'s other child, `up_is_left` tells which side `up` was on.
    fn rotate_up(&mut self, a: usize, up: usize, other: usize, up_is_left: bool) -> usize {
        let Some((f, g)) = self.children(up) else {
            return a;
        };

        // swap a and up
        let a_parent = self.nodes[a].parent;
        self.nodes[up].parent = a_parent;
        self.nodes[a].parent = Some(up);
        self.replace_child(a_parent, a, up);

        // the taller grandchild stays under `up`, the shorter one moves under `a`
        let (keep, give) = if self.nodes[f].height > self.nodes[g].height {
            (f, g)
        } else {
            (g, f)
        };
        self.set_children(up, a, keep);
        if up_is_left {
            self.set_children(a, give, other);
        } else {
            self.set_children(a, other, give);
        }
        self.nodes[give].parent = Some(a);

        self.nodes[a].aabb = self.nodes[other].aabb.union(&self.nodes[give].aabb);
        self.nodes[up].aabb = self.nodes[a].aabb.union(&self.nodes[keep].aabb);
        self.nodes[a].height = 1 + self.nodes[other].height.max(self.nodes[give].height);
        self.nodes[up].height = 1 + self.nodes[a].height.max(self.nodes[keep].height);

        up
    }

    /// Check the structural invariants of the tree. Used in tests.
    #[cfg(test)]
    fn validate(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.proxy_count, 0);
            return;
        };
        assert_eq!(self.nodes[root].parent, None);

        let mut leaves = 0;
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            match node.kind {
                NodeKind::Branch { left, right } => {
                    assert_eq!(self.nodes[left].parent, Some(idx));
                    assert_eq!(self.nodes[right].parent, Some(idx));
                    assert_eq!(
                        node.height,
                        1 + self.nodes[left].height.max(self.nodes[right].height)
                    );
                    assert!(node.aabb.contains(&self.nodes[left].aabb));
                    assert!(node.aabb.contains(&self.nodes[right].aabb));
                    stack.push(left);
                    stack.push(right);
                }
                NodeKind::Leaf { .. } => {
                    assert_eq!(node.height, 0);
                    leaves += 1;
                }
                NodeKind::Free { .. } => panic!("free node reachable from root"),
            }
        }
        assert_eq!(leaves, self.proxy_count);
    }
}

//
// Iterators
//

/// An iterator that yields every proxy whose fat AABB overlaps a given AABB.
#[derive(Debug)]
pub struct AabbIter<'a, T> {
    aabb: AABB,
    stack: Stack,
    nodes: &'a [Node<T>],
}

impl<'a, T: Copy> Iterator for AabbIter<'a, T> {
    type Item = (ProxyId, T);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(idx) = self.stack.0.pop() {
            let node = &self.nodes[idx];
            if !node.aabb.overlaps(&self.aabb) {
                continue;
            }
            match node.kind {
                NodeKind::Branch { left, right } => {
                    // push right first so that left is visited first
                    self.stack.0.push(right);
                    self.stack.0.push(left);
                }
                NodeKind::Leaf { data, .. } => return Some((ProxyId(idx), data)),
                NodeKind::Free { .. } => {}
            }
        }
        None
    }
}

/// An iterator that traverses the tree in spatial order along a ray
/// and yields every proxy whose fat AABB is hit,
/// together with the distance at which the ray enters it.
#[derive(Debug)]
pub struct RayIter<'a, T> {
    ray: Ray,
    max_t: f64,
    stack: RayStack,
    nodes: &'a [Node<T>],
}

impl<'a, T> RayIter<'a, T> {
    /// Entry distance of the next node to be visited.
    /// Nothing yielded after this point can be closer than this.
    pub fn peek_t(&self) -> Option<f64> {
        self.stack.peek_t()
    }

    /// Shorten the ray, skipping everything beyond the new limit.
    pub fn clip(&mut self, max_t: f64) {
        self.max_t = self.max_t.min(max_t);
    }
}

impl<'a, T: Copy> Iterator for RayIter<'a, T> {
    type Item = (ProxyId, T, f64);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(entry) = self.stack.pop() {
            if entry.distance > self.max_t {
                // everything left in the stack is farther away
                self.stack.0.clear();
                return None;
            }
            match self.nodes[entry.node_idx].kind {
                NodeKind::Branch { left, right } => {
                    for child in [left, right] {
                        if let Some(t) = ray_aabb(self.ray, self.nodes[child].aabb) {
                            if t <= self.max_t {
                                self.stack.push(child, t);
                            }
                        }
                    }
                }
                NodeKind::Leaf { data, .. } => {
                    return Some((ProxyId(entry.node_idx), data, entry.distance));
                }
                NodeKind::Free { .. } => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;
    use rand::{Rng, SeedableRng};

    fn random_aabb(rng: &mut impl Rng) -> AABB {
        let center = Vec2::new(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0));
        let half = Vec2::new(rng.gen_range(0.1..3.0), rng.gen_range(0.1..3.0));
        AABB::from_center(center, half)
    }

    #[test]
    fn queries_match_brute_force() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        let mut live: Vec<(ProxyId, usize)> = Vec::new();

        for i in 0..200 {
            let id = tree.create_proxy(random_aabb(&mut rng), i);
            live.push((id, i));
        }
        tree.validate();

        // move some, destroy some
        for _ in 0..100 {
            let (id, _) = live[rng.gen_range(0..live.len())];
            let displacement = Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            tree.move_proxy(id, random_aabb(&mut rng), displacement);
        }
        for _ in 0..50 {
            let (id, data) = live.swap_remove(rng.gen_range(0..live.len()));
            assert_eq!(tree.destroy_proxy(id), Some(data));
        }
        tree.validate();
        assert_eq!(tree.proxy_count(), live.len());

        for _ in 0..20 {
            let query = random_aabb(&mut rng).padded(5.0);
            let mut from_tree: Vec<usize> = tree.query(query).map(|(_, d)| d).collect();
            let mut brute: Vec<usize> = live
                .iter()
                .filter(|(id, _)| tree.fat_aabb(*id).unwrap().overlaps(&query))
                .map(|(_, d)| *d)
                .collect();
            from_tree.sort_unstable();
            brute.sort_unstable();
            assert_eq!(from_tree, brute);
        }
    }

    #[test]
    fn tree_stays_balanced_for_sorted_input() {
        let mut tree: DynamicTree<u32> = DynamicTree::new();
        for i in 0..256 {
            let center = Vec2::new(i as f64 * 3.0, 0.0);
            tree.create_proxy(AABB::from_center(center, Vec2::broadcast(1.0)), i);
        }
        tree.validate();
        assert!(tree.max_balance() <= 1);
        // a degenerate list would have height 255
        assert!(tree.height() < 20, "height {}", tree.height());
    }

    #[test]
    fn small_moves_do_not_reinsert() {
        let mut tree: DynamicTree<()> = DynamicTree::new();
        let aabb = AABB::from_center(Vec2::zero(), Vec2::broadcast(1.0));
        let id = tree.create_proxy(aabb, ());
        tree.clear_moved(id);

        let nudged = AABB::from_center(Vec2::new(0.01, 0.0), Vec2::broadcast(1.0));
        assert!(!tree.move_proxy(id, nudged, Vec2::new(0.01, 0.0)));
        assert!(!tree.was_moved(id));

        let far = AABB::from_center(Vec2::new(5.0, 0.0), Vec2::broadcast(1.0));
        assert!(tree.move_proxy(id, far, Vec2::new(5.0, 0.0)));
        assert!(tree.was_moved(id));
        // fattened in the direction of motion
        let fat = tree.fat_aabb(id).unwrap();
        assert!(fat.contains(&far));
        assert!(fat.max.x > far.max.x + AABB_MULTIPLIER * 5.0 - 1e-9);
    }

    #[test]
    fn freed_nodes_are_reused() {
        let mut tree: DynamicTree<u8> = DynamicTree::new();
        let a = tree.create_proxy(AABB::from_center(Vec2::zero(), Vec2::one()), 0);
        let b = tree.create_proxy(AABB::from_center(Vec2::new(4.0, 0.0), Vec2::one()), 1);
        let node_count = tree.nodes.len();
        tree.destroy_proxy(a);
        assert_eq!(tree.user_data(a), None);
        let c = tree.create_proxy(AABB::from_center(Vec2::new(8.0, 0.0), Vec2::one()), 2);
        assert_eq!(tree.nodes.len(), node_count);
        assert_eq!(tree.user_data(b), Some(1));
        assert_eq!(tree.user_data(c), Some(2));
        tree.validate();
    }

    #[test]
    fn ray_visits_leaves_in_order() {
        let mut tree: DynamicTree<u32> = DynamicTree::new();
        // boxes along the x axis, inserted out of order
        for i in [3u32, 0, 4, 1, 2] {
            let center = Vec2::new(2.0 + i as f64 * 4.0, 0.0);
            tree.create_proxy(AABB::from_center(center, Vec2::one()), i);
        }
        // one off the ray
        tree.create_proxy(AABB::from_center(Vec2::new(6.0, 10.0), Vec2::one()), 99);

        let ray = Ray::between(Vec2::zero(), Vec2::new(100.0, 0.0));
        itertools::assert_equal(tree.ray_cast(ray, 1.0).map(|(_, d, _)| d), 0..5);

        // shorter ray only reaches the first two
        itertools::assert_equal(tree.ray_cast(ray, 0.07).map(|(_, d, _)| d), 0..2);
    }
}
