//! Thread-local state of a worker thread.
//!
//! Each worker thread records its identity when it starts, so that code running
//! inside a probe (logging, simulated failures) can tell which worker it serves.

use rand::rngs::StdRng;
use rand::Rng as _;
use rand::SeedableRng;
use std::cell::RefCell;

use crate::message::WorkerId;

thread_local! {
    /// Identity of the worker running on this thread, `None` on the boss thread.
    pub static WORKER_ID: RefCell<Option<WorkerId>> = const { RefCell::new(None) };

    /// Per-worker RNG, seeded when the pool has a base seed.
    pub static WORKER_RNG: RefCell<Option<StdRng>> = const { RefCell::new(None) };
}

pub fn current_worker() -> Option<WorkerId> {
    WORKER_ID.with(|id| *id.borrow())
}

pub(crate) fn set_current_worker(worker_id: WorkerId) {
    WORKER_ID.with(|id| *id.borrow_mut() = Some(worker_id));
}

/// Seed this thread's RNG from the pool seed and the worker id.
/// Seed formula: base_seed + worker_id
pub fn init_worker_rng(worker_id: WorkerId, base_seed: u64) {
    WORKER_RNG.with(|rng| {
        let seed = base_seed.wrapping_add(u64::from(worker_id.0));
        *rng.borrow_mut() = Some(StdRng::seed_from_u64(seed));
    })
}

/// Get a random bool from the worker RNG, or the thread RNG when unseeded.
pub fn worker_gen_bool(p: f64) -> bool {
    let p = p.clamp(0.0, 1.0);
    WORKER_RNG.with(|rng| {
        let mut rng_ref = rng.borrow_mut();
        match rng_ref.as_mut() {
            Some(rng) => rng.random_bool(p),
            None => rand::rng().random_bool(p),
        }
    })
}
