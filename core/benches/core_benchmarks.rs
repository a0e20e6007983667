use criterion::{Criterion, black_box, criterion_group, criterion_main};

use tessera_core::pool::{Pool, Poolable};
use tessera_core::sync::{AtomicCounter, Event, Mutex, Semaphore, ThreadLocal, Timeout};

// ---------------------------------------------------------------------------
// Locks and counters
// ---------------------------------------------------------------------------

fn bench_mutex_uncontended(c: &mut Criterion) {
    let mutex = Mutex::new(0u64);
    c.bench_function("mutex_lock_unlock", |b| {
        b.iter(|| {
            *mutex.lock() += black_box(1);
        });
    });
}

fn bench_atomic_counter(c: &mut Criterion) {
    let counter = AtomicCounter::new(0);
    c.bench_function("atomic_counter_increment", |b| {
        b.iter(|| black_box(counter.increment()));
    });
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

fn bench_semaphore_release_acquire(c: &mut Criterion) {
    let semaphore = Semaphore::new(0);
    c.bench_function("semaphore_release_acquire", |b| {
        b.iter(|| {
            semaphore.release(1);
            semaphore.acquire();
        });
    });
}

fn bench_event_poll_signaled(c: &mut Criterion) {
    let event = Event::new(true);
    c.bench_function("event_wait_signaled", |b| {
        b.iter(|| black_box(event.wait_for(Timeout::ZERO)));
    });
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

fn bench_thread_local_access(c: &mut Criterion) {
    let slot = ThreadLocal::<u64>::new();
    c.bench_function("thread_local_with_or_init", |b| {
        b.iter(|| slot.with_or_init(|| 0, |v| *v += black_box(1)));
    });
}

#[derive(Default)]
struct Scratch(Vec<u8>);

impl Poolable for Scratch {
    fn recycle(&mut self) {
        self.0.clear();
    }
}

fn bench_pool_round_trip(c: &mut Criterion) {
    let pool = Pool::new(8);
    c.bench_function("pool_take_give", |b| {
        b.iter(|| {
            let mut scratch = pool.take_or_else(Scratch::default);
            scratch.0.extend_from_slice(black_box(&[1, 2, 3, 4]));
            pool.give(scratch);
        });
    });
}

criterion_group!(
    sync_benches,
    bench_mutex_uncontended,
    bench_atomic_counter,
    bench_semaphore_release_acquire,
    bench_event_poll_signaled,
);

criterion_group!(storage_benches, bench_thread_local_access, bench_pool_round_trip);

criterion_main!(sync_benches, storage_benches);
