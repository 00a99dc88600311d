// MIT License
//
// Copyright (c) 2026 the htab developers
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation files
// (the "Software"), to deal in the Software without restriction,
// including without limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of the Software,
// and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use htab::HashMap;

fn bench_single_thread_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("htab: single threaded insertion");

    for &numel in [8u64, 64, 512, 4096, 32768].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(numel), &numel, |b, &numel| {
            let map = HashMap::new();

            for i in 0..numel {
                map.insert(i, i);
            }

            b.iter(|| map.insert(black_box(numel + 1), numel + 1))
        });
    }

    group.finish();
}

fn bench_single_thread_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("htab: single threaded get");

    for &numel in [8u64, 64, 512, 4096, 32768].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(numel), &numel, |b, &numel| {
            let map = HashMap::new();

            for i in 0..numel {
                map.insert(i, i);
            }

            b.iter(|| map.get(black_box(&(numel / 2))))
        });
    }

    group.finish();
}

fn bench_multi_thread_insertion(c: &mut Criterion) {
    let num_threads = num_cpus::get().max(2);

    let map = Arc::new(HashMap::new());
    let keep_going = Arc::new(AtomicBool::new(true));

    let threads: Vec<_> = (0..num_threads - 1)
        .map(|i| {
            let map = map.clone();
            let keep_going = keep_going.clone();

            thread::spawn(move || {
                let mut j = i as u64;

                while keep_going.load(Ordering::Relaxed) {
                    map.insert(j, j);
                    map.remove(&j);
                    j += num_threads as u64;
                }
            })
        })
        .collect();

    let mut i = (num_threads - 1) as u64;

    c.bench_function("htab: multi threaded insertion", |b| {
        b.iter(|| {
            map.insert(black_box(i), i);
            i += num_threads as u64;
        })
    });

    keep_going.store(false, Ordering::Relaxed);

    for thread in threads {
        thread.join().unwrap();
    }
}

criterion_group!(
    benches,
    bench_single_thread_insertion,
    bench_single_thread_get,
    bench_multi_thread_insertion
);
criterion_main!(benches);
