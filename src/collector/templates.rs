use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{self, AtomicU64};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use log::info;

use crate::entity::ie::InfoElement;
use crate::error::Error;

/// One field of a stored template. `length` is the element length from the
/// wire template, which may differ from the registry length and is what
/// drives positional data decode.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateField {
    pub element: InfoElement,
    pub length: u16,
}

struct Entry {
    fields: Vec<TemplateField>,
    // bumped on every add; a pending expiry only fires on a matching value
    generation: u64,
}

type TemplateMap = HashMap<(u32, u16), Entry>;

/******************************** EXPIRY SCHEDULER ********************************/

#[derive(PartialEq, Eq)]
struct Expiry {
    deadline: Instant,
    obs_domain_id: u32,
    template_id: u16,
    generation: u64,
}

impl Ord for Expiry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.generation.cmp(&other.generation))
    }
}

impl PartialOrd for Expiry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct SchedulerState {
    heap: BinaryHeap<Reverse<Expiry>>,
    closed: bool,
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    cond: Condvar,
}

struct Scheduler {
    shared: Arc<SchedulerShared>,
    handle: Option<thread::JoinHandle<()>>,
}

fn run_scheduler(shared: Arc<SchedulerShared>, templates: Arc<RwLock<TemplateMap>>) {
    let mut state = shared.state.lock().expect("template scheduler mutex poisoned");
    loop {
        if state.closed {
            break;
        }

        let now = Instant::now();
        let deadline = state.heap.peek().map(|Reverse(e)| e.deadline);
        match deadline {
            None => {
                state = shared
                    .cond
                    .wait(state)
                    .expect("template scheduler mutex poisoned");
            }
            Some(deadline) if deadline <= now => {
                let Reverse(expiry) = state.heap.pop().expect("peeked expiry vanished");
                // release the scheduler before touching the template map
                drop(state);

                let key = (expiry.obs_domain_id, expiry.template_id);
                let mut map = templates.write().expect("template map lock poisoned");
                if map.get(&key).map_or(false, |e| e.generation == expiry.generation) {
                    map.remove(&key);
                    info!(
                        "Template with id {} and obs domain {} is expired",
                        expiry.template_id, expiry.obs_domain_id
                    );
                }
                drop(map);

                state = shared.state.lock().expect("template scheduler mutex poisoned");
            }
            Some(deadline) => {
                let (guard, _) = shared
                    .cond
                    .wait_timeout(state, deadline - now)
                    .expect("template scheduler mutex poisoned");
                state = guard;
            }
        }
    }
}

/******************************** TEMPLATE CATALOG ********************************/

/// Per-exporter template bookkeeping: a flat map keyed by
/// (observation domain id, template id), multi-reader / single-writer.
///
/// Over UDP every `add` schedules a one-shot expiry `ttl` from now; re-adding
/// the same key bumps the generation, which voids the pending expiry. With no
/// TTL (reliable transports) templates live until deleted.
pub struct TemplateCatalog {
    templates: Arc<RwLock<TemplateMap>>,
    next_generation: AtomicU64,
    ttl: Duration,
    scheduler: Option<Scheduler>,
}

impl TemplateCatalog {
    /// Catalog for a reliable transport: no expiry.
    pub fn new() -> Self {
        TemplateCatalog {
            templates: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            ttl: Duration::ZERO,
            scheduler: None,
        }
    }

    /// Catalog for an unreliable transport: templates expire `ttl` after the
    /// last add.
    pub fn with_ttl(ttl: Duration) -> Self {
        let templates: Arc<RwLock<TemplateMap>> = Arc::new(RwLock::new(HashMap::new()));
        let shared = Arc::new(SchedulerShared {
            state: Mutex::new(SchedulerState { heap: BinaryHeap::new(), closed: false }),
            cond: Condvar::new(),
        });
        let handle = thread::spawn({
            let shared = shared.clone();
            let templates = templates.clone();
            move || run_scheduler(shared, templates)
        });

        TemplateCatalog {
            templates,
            next_generation: AtomicU64::new(0),
            ttl,
            scheduler: Some(Scheduler { shared, handle: Some(handle) }),
        }
    }

    /// Inserts or wholesale-replaces the template and, over UDP, schedules its
    /// one-shot expiry.
    pub fn add(&self, obs_domain_id: u32, template_id: u16, fields: Vec<TemplateField>) {
        let generation = self.next_generation.fetch_add(1, atomic::Ordering::Relaxed) + 1;
        {
            let mut map = self.templates.write().expect("template map lock poisoned");
            map.insert((obs_domain_id, template_id), Entry { fields, generation });
        }

        if let Some(scheduler) = &self.scheduler {
            let mut state = scheduler
                .shared
                .state
                .lock()
                .expect("template scheduler mutex poisoned");
            state.heap.push(Reverse(Expiry {
                deadline: Instant::now() + self.ttl,
                obs_domain_id,
                template_id,
                generation,
            }));
            scheduler.shared.cond.notify_one();
        }
    }

    pub fn get(&self, obs_domain_id: u32, template_id: u16) -> Result<Vec<TemplateField>, Error> {
        let map = self.templates.read().expect("template map lock poisoned");
        match map.get(&(obs_domain_id, template_id)) {
            Some(entry) => Ok(entry.fields.clone()),
            None => Err(Error::UnknownTemplate { obs_domain_id, template_id }),
        }
    }

    pub fn delete(&self, obs_domain_id: u32, template_id: u16) {
        let mut map = self.templates.write().expect("template map lock poisoned");
        map.remove(&(obs_domain_id, template_id));
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        TemplateCatalog::new()
    }
}

impl Drop for TemplateCatalog {
    fn drop(&mut self) {
        if let Some(scheduler) = &mut self.scheduler {
            {
                let mut state = scheduler
                    .shared
                    .state
                    .lock()
                    .expect("template scheduler mutex poisoned");
                state.closed = true;
                scheduler.shared.cond.notify_one();
            }
            if let Some(handle) = scheduler.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
