//! The broad-phase finds pairs of proxies whose fattened AABBs overlap,
//! producing candidates for narrow-phase collision.

use super::{bvh, Ray, AABB};
use crate::math as m;

pub use bvh::ProxyId;

/// A dynamic tree plus bookkeeping of which proxies moved,
/// so that only new potential overlaps need to be looked up every step.
#[derive(Clone, Debug)]
pub struct BroadPhase<T> {
    tree: bvh::DynamicTree<T>,
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<(ProxyId, ProxyId)>,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new() -> Self {
        Self {
            tree: bvh::DynamicTree::new(),
            move_buffer: Vec::new(),
            pair_buffer: Vec::new(),
        }
    }

    /// Create a proxy with a tight AABB. Pairs for it are found on the next `update_pairs`.
    pub fn create_proxy(&mut self, aabb: AABB, data: T) -> ProxyId {
        let id = self.tree.create_proxy(aabb, data);
        self.move_buffer.push(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) {
        self.move_buffer.retain(|moved| *moved != id);
        self.tree.destroy_proxy(id);
    }

    /// Update a proxy's AABB. Only proxies that left their fat AABB
    /// are queued for finding new pairs.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: AABB, displacement: m::Vec2) {
        if self.tree.move_proxy(id, aabb, displacement) {
            self.move_buffer.push(id);
        }
    }

    /// Queue a proxy for pair finding without moving it,
    /// e.g. after its collision filter changed.
    pub fn touch_proxy(&mut self, id: ProxyId) {
        self.move_buffer.push(id);
    }

    #[inline]
    pub fn fat_aabb(&self, id: ProxyId) -> Option<AABB> {
        self.tree.fat_aabb(id)
    }

    #[inline]
    pub fn user_data(&self, id: ProxyId) -> Option<T> {
        self.tree.user_data(id)
    }

    /// Check whether the fat AABBs of two proxies overlap.
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        match (self.tree.fat_aabb(a), self.tree.fat_aabb(b)) {
            (Some(a), Some(b)) => a.overlaps(&b),
            _ => false,
        }
    }

    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    #[inline]
    pub fn tree(&self) -> &bvh::DynamicTree<T> {
        &self.tree
    }

    pub fn query(&self, aabb: AABB) -> bvh::AabbIter<'_, T> {
        self.tree.query(aabb)
    }

    pub fn ray_cast(&self, ray: Ray, max_t: f64) -> bvh::RayIter<'_, T> {
        self.tree.ray_cast(ray, max_t)
    }

    /// Find every new overlapping pair involving a moved proxy and report it.
    ///
    /// Pairs are deduplicated and reported in a deterministic order
    /// sorted by proxy id.
    pub fn update_pairs(&mut self, mut on_pair: impl FnMut(T, T)) {
        self.pair_buffer.clear();

        for &query_id in &self.move_buffer {
            let Some(fat) = self.tree.fat_aabb(query_id) else {
                continue;
            };
            let query_moved = self.tree.was_moved(query_id);
            for (other_id, _) in self.tree.query(fat) {
                if other_id == query_id {
                    continue;
                }
                // both moved: only the one with the smaller id reports the pair,
                // the other one will find it from its own query
                if query_moved && self.tree.was_moved(other_id) && other_id < query_id {
                    continue;
                }
                self.pair_buffer
                    .push((query_id.min(other_id), query_id.max(other_id)));
            }
        }

        for &id in &self.move_buffer {
            self.tree.clear_moved(id);
        }
        self.move_buffer.clear();

        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(a, b) in &self.pair_buffer {
            if let (Some(data_a), Some(data_b)) = (self.tree.user_data(a), self.tree.user_data(b))
            {
                on_pair(data_a, data_b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(x: f64, y: f64) -> AABB {
        AABB::from_center(m::Vec2::new(x, y), m::Vec2::broadcast(0.5))
    }

    fn collect_pairs(bp: &mut BroadPhase<u32>) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        bp.update_pairs(|a, b| pairs.push((a.min(b), a.max(b))));
        pairs.sort_unstable();
        pairs
    }

    #[test]
    fn new_overlaps_reported_once() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(unit_box(0.0, 0.0), 0);
        bp.create_proxy(unit_box(0.8, 0.0), 1);
        bp.create_proxy(unit_box(5.0, 0.0), 2);
        assert_eq!(collect_pairs(&mut bp), vec![(0, 1)]);
        // nothing moved, nothing reported
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn moving_into_overlap_creates_pair() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(unit_box(0.0, 0.0), 0);
        let far = bp.create_proxy(unit_box(5.0, 0.0), 1);
        assert!(collect_pairs(&mut bp).is_empty());

        bp.move_proxy(far, unit_box(0.5, 0.0), m::Vec2::new(-4.5, 0.0));
        assert_eq!(collect_pairs(&mut bp), vec![(0, 1)]);
        assert!(bp.test_overlap(far, ProxyId(0)));
    }

    #[test]
    fn destroyed_proxy_is_not_paired() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(unit_box(0.0, 0.0), 0);
        let b = bp.create_proxy(unit_box(0.5, 0.0), 1);
        bp.destroy_proxy(b);
        assert!(collect_pairs(&mut bp).is_empty());
        assert_eq!(bp.proxy_count(), 1);
    }
}
