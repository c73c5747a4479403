/*
This benchmark measures the cost of the decoder-side frame offer while the render side keeps
cycling request/wait on the same SharedState, with extra threads polling the session flags
the way the tracking loop and render loop do.
*/

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use hmd_stream::session::SharedState;
use std::{
    hint::black_box,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

// Threads polling is_streaming() alongside the decoder
const POLLER_COUNTS: &[usize] = &[0, 2, 4];

// Frames handed over per iteration
const FRAMES: u64 = 2_000;

fn bench_frame_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_slot_handoff");
    group.sample_size(10);

    for &pollers in POLLER_COUNTS {
        group.bench_with_input(BenchmarkId::new("pollers", pollers), &pollers, |b, &pollers| {
            b.iter(|| {
                let state = Arc::new(SharedState::new());
                state.set_resumed(true);
                state.set_active_display_mode(true);
                let done = Arc::new(AtomicBool::new(false));

                let mut handles = Vec::with_capacity(pollers);
                for _ in 0..pollers {
                    let s = state.clone();
                    let d = done.clone();
                    handles.push(thread::spawn(move || {
                        while !d.load(Ordering::Relaxed) {
                            black_box(s.is_streaming());
                        }
                    }));
                }

                // Decoder: offers the next frame until the render side accepts it
                let decoder = {
                    let s = state.clone();
                    thread::spawn(move || {
                        for index in 1..=FRAMES {
                            while !s.offer_frame(index) {
                                std::hint::spin_loop();
                            }
                        }
                    })
                };

                // Render: request + bounded wait, exactly FRAMES times
                let mut consumed = 0u64;
                while consumed < FRAMES {
                    state.begin_request();
                    if state.wait_ready(Duration::from_millis(100), Duration::from_millis(10)).frame_index().is_some() {
                        consumed += 1;
                    }
                }

                let _ = decoder.join();
                done.store(true, Ordering::Relaxed);
                for h in handles {
                    let _ = h.join();
                }
                black_box(consumed)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_frame_handoff);
criterion_main!(benches);
