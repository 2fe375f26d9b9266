#![allow(unused_macros)]

/// Locks a `Mutex`, panicking if a previous holder panicked
///
/// ```rust, ignore
///  // LocalMemory records every scratch allocation it owns
///  lock!(self.allocations).push((address, layout));
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().expect("Failed to acquire lock")
    };
}

/// Takes the read side of an `RwLock`
///
/// ```rust, ignore
///  // SimulatedMemory answers size queries under the shared lock
///  let size = read_lock!(self.inner).current_size;
/// ```
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock.read().expect("Failed to acquire read lock")
    };
}

/// Takes the write side of an `RwLock`
///
/// ```rust, ignore
///  // SimulatedMemory unmaps a region under the exclusive lock
///  let released = write_lock!(self.inner).release(address.as_u64());
/// ```
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock.write().expect("Failed to acquire write lock")
    };
}
