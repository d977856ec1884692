//! Dense offset-to-slot map for one search invocation.
//!
//! Maps candidate offsets in `[-rx, rx] x [-ry, ry]` to indices into the
//! invocation's evaluated-candidate list, giving O(1) 4-connected neighbor
//! lookup during the convergence check. Discarded when the search returns.

/// Offset-indexed slot table over the search window.
pub struct IndexMap {
    rx: i32,
    ry: i32,
    slots: Vec<Option<usize>>,
}

impl IndexMap {
    /// Creates an empty map covering radii `(rx, ry)`.
    pub fn new(rx: usize, ry: usize) -> Self {
        let width = 2 * rx + 1;
        let height = 2 * ry + 1;
        Self {
            rx: rx as i32,
            ry: ry as i32,
            slots: vec![None; width * height],
        }
    }

    #[inline]
    fn index(&self, offset: (i32, i32)) -> Option<usize> {
        let (dx, dy) = offset;
        if dx.abs() > self.rx || dy.abs() > self.ry {
            return None;
        }
        let col = (dx + self.rx) as usize;
        let row = (dy + self.ry) as usize;
        Some(row * (2 * self.rx as usize + 1) + col)
    }

    /// Returns the slot recorded for `offset`, if any.
    pub fn get(&self, offset: (i32, i32)) -> Option<usize> {
        self.index(offset).and_then(|i| self.slots[i])
    }

    /// Records `slot` for `offset`; offsets outside the window are ignored.
    pub fn insert(&mut self, offset: (i32, i32), slot: usize) {
        if let Some(i) = self.index(offset) {
            self.slots[i] = Some(slot);
        }
    }

    /// Slots of the four axis-aligned neighbors, if all are present.
    pub fn neighbors(&self, offset: (i32, i32)) -> Option<[usize; 4]> {
        let (dx, dy) = offset;
        Some([
            self.get((dx - 1, dy))?,
            self.get((dx + 1, dy))?,
            self.get((dx, dy - 1))?,
            self.get((dx, dy + 1))?,
        ])
    }
}
