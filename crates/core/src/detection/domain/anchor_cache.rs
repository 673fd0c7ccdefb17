use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// `(grid_h, grid_w, stride, anchors_per_position)`.
pub type AnchorKey = (usize, usize, u32, usize);

/// Bounded cache of anchor centers, one entry per feature-map geometry.
///
/// Entries are evicted oldest-first once `capacity` is reached, so a
/// detector fed with changing input sizes cannot grow it without bound.
pub struct AnchorCache {
    capacity: usize,
    entries: HashMap<AnchorKey, Arc<[(f64, f64)]>>,
    order: VecDeque<AnchorKey>,
}

impl AnchorCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Anchor centers `(col * stride, row * stride)` in row-major order,
    /// each repeated `anchors_per_position` times.
    pub fn centers(&mut self, key: AnchorKey) -> Arc<[(f64, f64)]> {
        if let Some(centers) = self.entries.get(&key) {
            return Arc::clone(centers);
        }

        let centers: Arc<[(f64, f64)]> = compute_centers(key).into();
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, Arc::clone(&centers));
        self.order.push_back(key);
        centers
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &AnchorKey) -> bool {
        self.entries.contains_key(key)
    }
}

fn compute_centers((grid_h, grid_w, stride, per_position): AnchorKey) -> Vec<(f64, f64)> {
    let s = stride as f64;
    let mut centers = Vec::with_capacity(grid_h * grid_w * per_position);
    for row in 0..grid_h {
        for col in 0..grid_w {
            for _ in 0..per_position {
                centers.push((col as f64 * s, row as f64 * s));
            }
        }
    }
    centers
}
