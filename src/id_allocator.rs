// ===========================================================================
// Id allocation for one cleaning run
// ===========================================================================

/// Hands out monotonically increasing ids. Ids are never reused within a
/// run, even after the node or edge they named has been removed.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next_id: u64,
}

impl IdAllocator {
    pub fn new(start: u64) -> Self {
        Self { next_id: start }
    }

    pub fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}
