//! The prepare/operate gate.
//!
//! A readers-writer gate with writer priority: any number of shared
//! ("operate") holders run concurrently, an exclusive ("prepare") holder
//! runs alone, and a pending exclusive request blocks new shared requests
//! so preparation is never starved by a stream of queries. std's `RwLock`
//! makes no writer-preference promise, so the gate implements the monitor
//! directly on `Mutex` + `Condvar`.

use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
    active_readers: usize,
    writer_active: bool,
    writers_waiting: usize,
}

/// Exclusive-or-shared gate guarding pool preparation against operation.
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the shared ("operate") side, blocking while an exclusive
    /// holder is active or waiting.
    pub fn shared(&self) -> SharedGuard<'_> {
        let mut state = self.state.lock().unwrap();
        while state.writer_active || state.writers_waiting > 0 {
            state = self.cond.wait(state).unwrap();
        }
        state.active_readers += 1;
        SharedGuard { gate: self }
    }

    /// Acquire the exclusive ("prepare") side, blocking until all granted
    /// shared holders finish. While waiting, new shared requests queue
    /// behind this one.
    pub fn exclusive(&self) -> ExclusiveGuard<'_> {
        let mut state = self.state.lock().unwrap();
        state.writers_waiting += 1;
        while state.writer_active || state.active_readers > 0 {
            state = self.cond.wait(state).unwrap();
        }
        state.writers_waiting -= 1;
        state.writer_active = true;
        ExclusiveGuard { gate: self }
    }
}

/// RAII guard for the shared side; releases on drop.
pub struct SharedGuard<'a> {
    gate: &'a Gate,
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock().unwrap();
        state.active_readers -= 1;
        if state.active_readers == 0 {
            self.gate.cond.notify_all();
        }
    }
}

/// RAII guard for the exclusive side; releases on drop.
pub struct ExclusiveGuard<'a> {
    gate: &'a Gate,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock().unwrap();
        state.writer_active = false;
        self.gate.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn shared_holders_coexist() {
        let gate = Gate::new();
        let a = gate.shared();
        let b = gate.shared();
        drop(a);
        drop(b);
    }

    #[test]
    fn exclusive_waits_for_shared() {
        let gate = Arc::new(Gate::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let shared = gate.shared();

        let writer = {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                let _guard = gate.exclusive();
                order.lock().unwrap().push("exclusive");
            })
        };

        thread::sleep(Duration::from_millis(50));
        order.lock().unwrap().push("release-shared");
        drop(shared);
        writer.join().unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["release-shared", "exclusive"]
        );
    }

    #[test]
    fn pending_exclusive_blocks_new_shared() {
        let gate = Arc::new(Gate::new());
        let exclusive_done = Arc::new(AtomicUsize::new(0));

        let shared = gate.shared();

        let writer = {
            let gate = Arc::clone(&gate);
            let done = Arc::clone(&exclusive_done);
            thread::spawn(move || {
                let _guard = gate.exclusive();
                thread::sleep(Duration::from_millis(50));
                done.store(1, Ordering::SeqCst);
            })
        };

        // Give the writer time to queue, then try a new shared acquisition:
        // it must not be granted before the pending exclusive runs.
        thread::sleep(Duration::from_millis(50));
        let reader = {
            let gate = Arc::clone(&gate);
            let done = Arc::clone(&exclusive_done);
            thread::spawn(move || {
                let _guard = gate.shared();
                assert_eq!(done.load(Ordering::SeqCst), 1);
            })
        };

        drop(shared);
        writer.join().unwrap();
        reader.join().unwrap();
    }

    #[test]
    fn exclusive_holders_serialize() {
        let gate = Arc::new(Gate::new());
        let active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            let active = Arc::clone(&active);
            handles.push(thread::spawn(move || {
                let _guard = gate.exclusive();
                assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                thread::sleep(Duration::from_millis(10));
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
