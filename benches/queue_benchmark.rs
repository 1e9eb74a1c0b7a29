/*!
 * Message Queue Benchmarks
 *
 * Non-blocking copy and zero-copy paths, plus a cross-thread handoff
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rt_nucleus::{
    Deadline, MessageQueue, Nucleus, NucleusConfig, ParamEx, Policy, QueueAttr, SendMode, ThreadAttr,
};
use std::thread;

fn setup(pool_size: usize, limit: usize) -> (Nucleus, rt_nucleus::ThreadContext, MessageQueue) {
    let nucleus = Nucleus::new(NucleusConfig::single_cpu()).unwrap();
    let main = nucleus.spawn_thread(ThreadAttr::new(50)).unwrap();
    let queue = MessageQueue::create(&nucleus, &main, QueueAttr::new(pool_size).with_limit(limit)).unwrap();
    (nucleus, main, queue)
}

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_read");

    for size in [16usize, 256, 4096] {
        let (_nucleus, main, queue) = setup(64 * 1024, 0);
        let payload = vec![0xA5u8; size];
        let mut dest = vec![0u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                queue.write(black_box(&payload), SendMode::Normal).unwrap();
                queue.read(&main, &mut dest, Deadline::NonBlocking).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_zero_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_send_receive");

    for size in [16usize, 256, 4096] {
        // Slotted pool: 8 slots of 8K each
        let (_nucleus, main, queue) = setup(64 * 1024, 8);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let buf = queue.alloc(size).unwrap();
                queue.send(&buf, size, SendMode::Normal).unwrap();
                let got = queue.receive(&main, Deadline::NonBlocking).unwrap();
                black_box(got.len());
                queue.free(&got).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_cross_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_thread_handoff");
    const BATCH: usize = 100;

    let (nucleus, _main, queue) = setup(64 * 1024, 0);
    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("write_read_100", |b| {
        b.iter(|| {
            let consumer = {
                let nucleus = nucleus.clone();
                let queue = queue.clone();
                thread::spawn(move || {
                    let me = nucleus.spawn_thread(ThreadAttr::new(40)).unwrap();
                    let mut dest = [0u8; 32];
                    for _ in 0..BATCH {
                        queue.read(&me, &mut dest, Deadline::Infinite).unwrap();
                    }
                    nucleus.detach_thread(&me).unwrap();
                })
            };
            for seq in 0..BATCH {
                queue.write(&seq.to_le_bytes(), SendMode::Normal).unwrap();
            }
            consumer.join().unwrap();
        });
    });

    group.finish();
}

fn bench_set_policy(c: &mut Criterion) {
    let nucleus = Nucleus::new(NucleusConfig::default()).unwrap();
    let thread = nucleus.spawn_thread(ThreadAttr::new(10)).unwrap();
    let param = ParamEx::priority(20).with_rr_quantum(std::time::Duration::from_millis(1));

    c.bench_function("set_thread_policy_rr", |b| {
        b.iter(|| nucleus.set_thread_policy(&thread, Policy::RoundRobin, black_box(&param)).unwrap());
    });
}

criterion_group!(benches, bench_write_read, bench_zero_copy, bench_cross_thread, bench_set_policy);
criterion_main!(benches);
