use crate::runtime::error::ErrorKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;

/// Identity of one interpreter thread within its parallel call group.
#[derive(Clone, Copy, Debug)]
pub struct ThreadContext {
    pub tid: u32,
    pub count: u32,
}

impl ThreadContext {
    pub fn root() -> Self {
        Self { tid: 0, count: 1 }
    }
}

/// Named barriers and named mutexes shared by the threads of one parallel
/// call group. When any thread fails the hub is poisoned: every waiter wakes
/// and fails sympathetically, so the group can be joined and the root cause
/// reported.
pub struct SyncHub {
    barriers: Mutex<HashMap<String, Arc<Rendezvous>>>,
    mutexes: Mutex<HashMap<String, Arc<NamedMutex>>>,
    poisoned: AtomicBool,
}

struct Rendezvous {
    state: Mutex<RendezvousState>,
    cvar: Condvar,
}

struct RendezvousState {
    expected: u32,
    arrived: u32,
    sense: bool,
}

struct NamedMutex {
    state: Mutex<MutexState>,
    cvar: Condvar,
}

#[derive(Default)]
struct MutexState {
    owner: Option<ThreadId>,
    depth: u32,
}

impl SyncHub {
    pub fn new() -> Self {
        Self {
            barriers: Mutex::new(HashMap::new()),
            mutexes: Mutex::new(HashMap::new()),
            poisoned: AtomicBool::new(false),
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Wakes every waiter; called once by the first thread that fails.
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
        for barrier in self.barriers.lock().unwrap().values() {
            let _state = barrier.state.lock().unwrap();
            barrier.cvar.notify_all();
        }
        for mutex in self.mutexes.lock().unwrap().values() {
            let _state = mutex.state.lock().unwrap();
            mutex.cvar.notify_all();
        }
    }

    /// Rendezvous of all `ctx.count` threads on `name`. The expected count is
    /// fixed by the first arrival; reusable for later cycles.
    pub fn barrier(&self, name: &str, ctx: &ThreadContext) -> Result<(), ErrorKind> {
        if self.is_poisoned() {
            return Err(ErrorKind::Sympathetic);
        }
        let barrier = {
            let mut barriers = self.barriers.lock().unwrap();
            Arc::clone(barriers.entry(name.to_string()).or_insert_with(|| {
                Arc::new(Rendezvous {
                    state: Mutex::new(RendezvousState {
                        expected: ctx.count,
                        arrived: 0,
                        sense: false,
                    }),
                    cvar: Condvar::new(),
                })
            }))
        };
        let mut state = barrier.state.lock().unwrap();
        if state.expected != ctx.count {
            return Err(ErrorKind::Sync(format!(
                "Barrier \"{}\" expects {} threads but was reached by a group of {}",
                name, state.expected, ctx.count
            )));
        }
        let my_sense = state.sense;
        state.arrived += 1;
        if state.arrived == state.expected {
            state.arrived = 0;
            state.sense = !my_sense;
            barrier.cvar.notify_all();
            return Ok(());
        }
        while state.sense == my_sense {
            if self.is_poisoned() {
                return Err(ErrorKind::Sympathetic);
            }
            state = barrier.cvar.wait(state).unwrap();
        }
        Ok(())
    }

    /// Acquires the named mutex, re-entrantly for the owning thread. The
    /// returned guard releases on drop, so unwinding a failed body still
    /// releases the lock.
    pub fn acquire(&self, name: &str) -> Result<MutexGuard, ErrorKind> {
        if self.is_poisoned() {
            return Err(ErrorKind::Sympathetic);
        }
        let mutex = {
            let mut mutexes = self.mutexes.lock().unwrap();
            Arc::clone(
                mutexes
                    .entry(name.to_string())
                    .or_insert_with(|| {
                        Arc::new(NamedMutex {
                            state: Mutex::new(MutexState::default()),
                            cvar: Condvar::new(),
                        })
                    }),
            )
        };
        let me = std::thread::current().id();
        {
            let mut state = mutex.state.lock().unwrap();
            loop {
                match state.owner {
                    None => {
                        state.owner = Some(me);
                        state.depth = 1;
                        break;
                    }
                    Some(owner) if owner == me => {
                        state.depth += 1;
                        break;
                    }
                    Some(_) => {
                        if self.is_poisoned() {
                            return Err(ErrorKind::Sympathetic);
                        }
                        state = mutex.cvar.wait(state).unwrap();
                    }
                }
            }
        }
        Ok(MutexGuard { mutex })
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MutexGuard {
    mutex: Arc<NamedMutex>,
}

impl Drop for MutexGuard {
    fn drop(&mut self) {
        let mut state = self.mutex.state.lock().unwrap();
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.mutex.cvar.notify_one();
        }
    }
}
