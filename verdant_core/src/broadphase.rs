use std::collections::HashMap;

use glam::Vec2;

use crate::instance::{InstanceId, OverlapKind};

/// Cells per tile edge when sizing a grid for a square tile.
const TARGET_CELLS_PER_AXIS: f32 = 20.0;

/// Collision data mirrored out of an instance. Radii are pre-scaled.
#[derive(Debug, Clone, Copy)]
pub struct BroadphaseEntry {
    pub id: InstanceId,
    pub location: Vec2,
    pub collision_radius: f32,
    pub shade_radius: f32,
}

impl BroadphaseEntry {
    pub fn max_radius(&self) -> f32 {
        self.collision_radius.max(self.shade_radius)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlap {
    pub partner: InstanceId,
    pub kind: OverlapKind,
}

/// Uniform-grid spatial index over instance footprints.
///
/// Buckets hold entries by centre point; queries widen their scan window by
/// the largest radius ever inserted, so an entry is found even when its
/// footprint is much larger than a cell. The bound is never shrunk on
/// removal, which only widens later scans.
#[derive(Debug, Clone)]
pub struct Broadphase {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<BroadphaseEntry>>,
    largest_radius: f32,
    len: usize,
}

impl Broadphase {
    pub fn new(cell_size: f32) -> Self {
        debug_assert!(cell_size > 0.0, "broadphase cell size must be positive");
        Self {
            cell_size,
            cells: HashMap::new(),
            largest_radius: 0.0,
            len: 0,
        }
    }

    pub fn sized_for(tile_size: f32) -> Self {
        Self::new((tile_size / TARGET_CELLS_PER_AXIS).max(1.0))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn cell_of(&self, point: Vec2) -> (i32, i32) {
        (
            (point.x / self.cell_size).floor() as i32,
            (point.y / self.cell_size).floor() as i32,
        )
    }

    pub fn insert(&mut self, entry: BroadphaseEntry) {
        self.largest_radius = self.largest_radius.max(entry.max_radius());
        let key = self.cell_of(entry.location);
        self.cells.entry(key).or_default().push(entry);
        self.len += 1;
    }

    /// Removes the entry for `id` bucketed at `location`. Safe to call again
    /// for an already-removed entry; the second call is a no-op.
    pub fn remove(&mut self, id: InstanceId, location: Vec2) -> bool {
        let key = self.cell_of(location);
        let Some(bucket) = self.cells.get_mut(&key) else {
            return false;
        };
        let Some(index) = bucket.iter().position(|entry| entry.id == id) else {
            return false;
        };
        // Plain remove keeps bucket order stable for deterministic scans.
        bucket.remove(index);
        self.len -= 1;
        true
    }

    pub fn contains(&self, id: InstanceId, location: Vec2) -> bool {
        let key = self.cell_of(location);
        self.cells
            .get(&key)
            .is_some_and(|bucket| bucket.iter().any(|entry| entry.id == id))
    }

    /// All overlaps between `probe` and indexed entries, classified as trunk
    /// collision or canopy shade. Collision takes precedence when both discs
    /// intersect. The probe's own id is skipped.
    pub fn overlaps(&self, probe: &BroadphaseEntry) -> Vec<Overlap> {
        let reach = probe.max_radius() + self.largest_radius;
        let min = probe.location - Vec2::splat(reach);
        let max = probe.location + Vec2::splat(reach);
        let mut found = Vec::new();
        self.scan(min, max, |entry| {
            if entry.id == probe.id {
                return;
            }
            let dist_sq = probe.location.distance_squared(entry.location);
            let collide = probe.collision_radius + entry.collision_radius;
            if dist_sq < collide * collide {
                found.push(Overlap {
                    partner: entry.id,
                    kind: OverlapKind::Collision,
                });
                return;
            }
            let shade = probe.shade_radius + entry.shade_radius;
            if dist_sq < shade * shade {
                found.push(Overlap {
                    partner: entry.id,
                    kind: OverlapKind::Shade,
                });
            }
        });
        found
    }

    /// Entries whose footprint disc touches the axis-aligned box.
    pub fn entries_in_box(&self, box_min: Vec2, box_max: Vec2) -> Vec<InstanceId> {
        let min = box_min - Vec2::splat(self.largest_radius);
        let max = box_max + Vec2::splat(self.largest_radius);
        let mut found = Vec::new();
        self.scan(min, max, |entry| {
            let closest = entry.location.clamp(box_min, box_max);
            let radius = entry.max_radius();
            if entry.location.distance_squared(closest) <= radius * radius {
                found.push(entry.id);
            }
        });
        found
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.largest_radius = 0.0;
        self.len = 0;
    }

    /// Visits every entry bucketed inside the window in a fixed cell order.
    fn scan(&self, min: Vec2, max: Vec2, mut visit: impl FnMut(&BroadphaseEntry)) {
        let (min_x, min_y) = self.cell_of(min);
        let (max_x, max_y) = self.cell_of(max);
        for cx in min_x..=max_x {
            for cy in min_y..=max_y {
                let Some(bucket) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                for entry in bucket {
                    visit(entry);
                }
            }
        }
    }
}
