/// Hands out small dense integer ids and recycles returned ones.
///
/// A returned id is handed out again before any fresh id, so the ids stay packed near zero and
/// can index directly into a `Vec`.
#[derive(Debug, Default)]
pub struct ManagedIdPool {
    /// Lowest id never handed out.
    next_index: usize,
    available_ids: Vec<usize>,
}

impl ManagedIdPool {
    /// Creates a pool with room for `initial_capacity` returned ids.
    #[inline(always)]
    pub fn new(initial_capacity: usize) -> Self {
        ManagedIdPool {
            next_index: 0,
            available_ids: Vec::with_capacity(initial_capacity),
        }
    }

    /// Takes the most recently returned id, or a fresh one if none is waiting.
    #[inline(always)]
    pub fn take(&mut self) -> usize {
        match self.available_ids.pop() {
            Some(id) => id,
            None => {
                let id = self.next_index;
                self.next_index += 1;
                id
            }
        }
    }

    /// Gives an id back to the pool. The id must not be in use anymore.
    #[inline(always)]
    pub fn return_id(&mut self, id: usize) {
        debug_assert!(id < self.next_index, "This id was never taken from the pool.");
        debug_assert!(
            !self.available_ids.contains(&id),
            "This id was already returned to the pool."
        );
        self.available_ids.push(id);
    }

    /// Gets the number of ids ever handed out, which bounds every live id.
    #[inline(always)]
    pub fn claimed_id_bound(&self) -> usize {
        self.next_index
    }

    /// Gets the number of previously returned ids waiting in the pool.
    #[inline(always)]
    pub fn available_id_count(&self) -> usize {
        self.available_ids.len()
    }
}
