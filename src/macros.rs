/// Helper macro for locking items
///
/// ```rust, ignore
///  let sender = lock!(self.sender).take();
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().expect("Failed to acquire lock")
    };
}

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let present = with_read!(seen, |set: &HashSet<String>| set.contains(name));
/// ```
macro_rules! with_read {
    ($rwlock:expr, $closure:expr) => {{
        let guard = $rwlock.read().expect("Failed to acquire read lock");
        $closure(&*guard)
    }};
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  with_write!(seen, |set: &mut HashSet<String>| set.insert(name.to_string()));
/// ```
macro_rules! with_write {
    ($rwlock:expr, $closure:expr) => {{
        let mut guard = $rwlock.write().expect("Failed to acquire write lock");
        $closure(&mut *guard)
    }};
}
