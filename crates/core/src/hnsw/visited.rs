//! Generation-based visited set for graph traversal.
//!
//! Node ids are dense `u32` arena indices, so membership is a single array
//! probe. `clear()` bumps a generation counter instead of zeroing the array.

/// Visited-node tracker reused across the layer searches of one operation.
///
/// The set grows on demand: searches run concurrently with inserts, so a
/// traversal can meet ids appended after the set was sized.
#[derive(Debug)]
pub struct VisitedSet {
    marks: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            marks: vec![0u16; capacity],
            generation: 1,
        }
    }

    /// Forget every mark. Full memset only when the generation wraps.
    pub fn clear(&mut self) {
        if self.generation == u16::MAX {
            self.marks.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Mark `id`. Returns `true` if it had not been visited since the last clear.
    #[inline]
    pub fn insert(&mut self, id: u32) -> bool {
        let idx = id as usize;
        if idx >= self.marks.len() {
            self.marks.resize((idx + 1).max(self.marks.len() * 2), 0);
        }
        if self.marks[idx] == self.generation {
            false
        } else {
            self.marks[idx] = self.generation;
            true
        }
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.marks
            .get(id as usize)
            .is_some_and(|&g| g == self.generation)
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}
