use crate::{concurrency::par_iter_mut1, floating_type_mod::FT, vec2i, V2, V2I};

// large odd multipliers, one per axis (Teschner et al. spatial hashing)
const HASH_MULTIPLIER_X: u32 = 73856093;
const HASH_MULTIPLIER_Y: u32 = 19349663;

const ABSENT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpatialEntry {
    particle_id: u32,
    cell_key: u32,
}

/**
 * Uniform-cell spatial index over particle positions, rebuilt from scratch
 * every step.
 *
 * Each particle is assigned the hash key of its cell. The `(particle_id,
 * cell_key)` entries are sorted by key so that all particles of one key
 * occupy a contiguous run; `start_indices` maps a key to the first entry of
 * its run. The hash is lossy: distinct cells may collide to the same key
 * (the table size equals the particle count), which only widens the
 * candidate set since every candidate is distance-tested precisely.
 *
 * Queries are exhaustive only for `radius <= cell_size`; the solver builds
 * the grid with `cell_size == smoothing_radius`.
 */
pub struct SpatialHashGrid {
    cell_size: FT,
    entries: Vec<SpatialEntry>,
    start_indices: Vec<u32>,
}

impl SpatialHashGrid {
    /// `cell_size` must be positive; the caller validates this as part of the
    /// simulation configuration before any grid is created.
    pub fn new(num_particles: usize, cell_size: FT) -> Self {
        assert!(cell_size > 0., "spatial hash cell size must be positive");
        SpatialHashGrid {
            cell_size,
            entries: vec![
                SpatialEntry {
                    particle_id: 0,
                    cell_key: 0
                };
                num_particles
            ],
            start_indices: vec![ABSENT; num_particles],
        }
    }

    pub fn num_particles(&self) -> usize {
        self.entries.len()
    }

    pub fn cell_size(&self) -> FT {
        self.cell_size
    }

    /// Integer cell coordinate of a point. `floor` is required so that
    /// negative coordinates stay distinct from positive ones (truncation
    /// would merge cells (-1, 0) and (0, 0)).
    pub fn cell_coord(&self, point: V2) -> V2I {
        vec2i(
            (point.x / self.cell_size).floor() as i32,
            (point.y / self.cell_size).floor() as i32,
        )
    }

    fn hash_cell(&self, cell: V2I) -> u32 {
        let a = (cell.x as u32).wrapping_mul(HASH_MULTIPLIER_X);
        let b = (cell.y as u32).wrapping_mul(HASH_MULTIPLIER_Y);
        a.wrapping_add(b) % self.entries.len() as u32
    }

    /// Rebuild the index from the given positions. The whole start table is
    /// overwritten with the sentinel first; stale runs from the previous step
    /// must never leak into the new index.
    pub fn build(&mut self, positions: &[V2]) {
        assert_eq!(
            positions.len(),
            self.entries.len(),
            "spatial hash grid was sized for a different particle count"
        );

        if positions.is_empty() {
            return;
        }

        let cell_size = self.cell_size;
        let table_size = self.entries.len() as u32;
        par_iter_mut1(&mut self.entries, |i, entry| {
            let cell = vec2i(
                (positions[i].x / cell_size).floor() as i32,
                (positions[i].y / cell_size).floor() as i32,
            );
            let a = (cell.x as u32).wrapping_mul(HASH_MULTIPLIER_X);
            let b = (cell.y as u32).wrapping_mul(HASH_MULTIPLIER_Y);
            *entry = SpatialEntry {
                particle_id: i as u32,
                cell_key: a.wrapping_add(b) % table_size,
            };
        });

        // particle order within one key carries no meaning
        self.entries.sort_unstable_by_key(|entry| entry.cell_key);

        for start in self.start_indices.iter_mut() {
            *start = ABSENT;
        }
        for i in 0..self.entries.len() {
            let key = self.entries[i].cell_key;
            if i == 0 || self.entries[i - 1].cell_key != key {
                self.start_indices[key as usize] = i as u32;
            }
        }
    }

    /// Visit every particle whose position is within `radius` of `point`.
    /// `positions` must be the same slice the grid was built from. The 3x3
    /// cell scan only bounds the candidate set; each candidate is tested
    /// against the true squared distance before `visit` runs.
    pub fn for_each_neighbor(&self, positions: &[V2], point: V2, radius: FT, mut visit: impl FnMut(usize)) {
        if self.entries.is_empty() {
            return;
        }

        debug_assert_eq!(positions.len(), self.entries.len());

        let center_cell = self.cell_coord(point);
        let radius_sq = radius * radius;

        // colliding cells share a run; visit each distinct key only once
        let mut seen_keys = [0u32; 9];
        let mut num_seen = 0usize;

        for dy in -1..=1 {
            for dx in -1..=1 {
                let key = self.hash_cell(center_cell + vec2i(dx, dy));
                if seen_keys[..num_seen].contains(&key) {
                    continue;
                }
                seen_keys[num_seen] = key;
                num_seen += 1;

                let start = self.start_indices[key as usize];
                if start == ABSENT {
                    continue;
                }

                for entry in &self.entries[start as usize..] {
                    if entry.cell_key != key {
                        break;
                    }
                    let particle_id = entry.particle_id as usize;
                    if (positions[particle_id] - point).norm_squared() <= radius_sq {
                        visit(particle_id);
                    }
                }
            }
        }
    }
}
