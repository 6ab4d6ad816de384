//! Buddy heap and device pooling benchmarks:
//! - Raw heap alloc/free for uniform and mixed block sizes
//! - Fragmentation after random-order release
//! - Pooled vs direct storage allocation on the host device
//!
//! Run with: `cargo bench --bench heap_bench`

use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bufferforge::memory::{Block, BuddyHeap};
use bufferforge::{Device, DeviceConfig};

// ============================================================================
// Timing
// ============================================================================

/// Per-iteration timings of one benchmark
struct Timings {
    name: String,
    samples: Vec<Duration>,
}

impl Timings {
    /// Time `iterations` calls of `f` after a short warmup
    fn measure<R>(name: impl Into<String>, iterations: usize, mut f: impl FnMut() -> R) -> Self {
        for _ in 0..iterations.min(5) {
            black_box(f());
        }
        let mut samples: Vec<Duration> = (0..iterations)
            .map(|_| {
                let start = Instant::now();
                black_box(f());
                start.elapsed()
            })
            .collect();
        samples.sort();
        Timings {
            name: name.into(),
            samples,
        }
    }

    fn mean_ms(&self) -> f64 {
        let total: Duration = self.samples.iter().sum();
        total.as_secs_f64() * 1000.0 / self.samples.len().max(1) as f64
    }

    fn percentile_ms(&self, pct: usize) -> f64 {
        let index = (self.samples.len() * pct / 100).min(self.samples.len().saturating_sub(1));
        self.samples
            .get(index)
            .map_or(0.0, |d| d.as_secs_f64() * 1000.0)
    }

    fn print(&self) {
        println!(
            "  {:<48} mean {:>9.3} ms  p50 {:>9.3} ms  p95 {:>9.3} ms  ({} runs)",
            self.name,
            self.mean_ms(),
            self.percentile_ms(50),
            self.percentile_ms(95),
            self.samples.len()
        );
    }
}

fn human_size(bytes: usize) -> String {
    match bytes {
        b if b >= 1 << 20 => format!("{} MiB", b >> 20),
        b if b >= 1 << 10 => format!("{} KiB", b >> 10),
        b => format!("{} B", b),
    }
}

/// Deterministic xorshift so runs are comparable
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

// ============================================================================
// Raw Heap Benchmarks
// ============================================================================

const HEAP_SIZE: usize = 16 << 20;

fn benchmark_uniform_blocks() {
    println!("\nraw heap, uniform blocks in a {} heap", human_size(HEAP_SIZE));

    for block_size in [64usize, 4096, 65536] {
        let count = HEAP_SIZE / block_size;
        let timings = Timings::measure(format!("fill + drain, {} blocks", human_size(block_size)), 20, || {
            let mut heap = BuddyHeap::new((), HEAP_SIZE, 4).expect("power-of-two heap");
            let blocks: Vec<Block> = (0..count).filter_map(|_| heap.alloc(block_size)).collect();
            let filled = blocks.len();
            blocks.into_iter().for_each(|block| heap.free(block));
            filled
        });
        timings.print();
        println!("    {:.3} us per block", timings.mean_ms() * 1000.0 / count as f64);
    }
}

fn benchmark_mixed_sizes() {
    println!("\nraw heap, 10k mixed requests (16 B to 64 KiB), random release");

    let mut fragmentation = 0.0f32;
    let mut live_at_end = 0usize;
    let timings = Timings::measure("mixed alloc/free", 20, || {
        let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
        let mut heap = BuddyHeap::new((), HEAP_SIZE, 4).expect("power-of-two heap");
        let mut live: Vec<Block> = Vec::new();

        for _ in 0..10_000 {
            if live.is_empty() || rng.next() % 3 != 0 {
                if let Some(block) = heap.alloc(16usize << (rng.next() % 13)) {
                    live.push(block);
                }
            } else {
                let index = (rng.next() as usize) % live.len();
                heap.free(live.swap_remove(index));
            }
        }

        fragmentation = heap.fragmentation();
        live_at_end = live.len();
        live.into_iter().for_each(|block| heap.free(block));
    });

    timings.print();
    println!(
        "    {} live blocks, {:.2}% fragmentation before drain",
        live_at_end,
        fragmentation * 100.0
    );
}

// ============================================================================
// Device Pooling Benchmarks
// ============================================================================

/// Time 100 `heap_alloc` calls of `size` bytes held at once
fn time_batch(label: &str, device: &Arc<Device>, size: usize) -> Timings {
    Timings::measure(format!("{} 100 x {}", label, human_size(size)), 50, || {
        (0..100)
            .map(|_| device.heap_alloc(size).expect("storage"))
            .collect::<Vec<_>>()
            .len()
    })
}

fn benchmark_pooled_vs_direct() {
    println!("\nhost device, pooled vs direct storage");

    let pooled = Device::cpu();
    let direct = Device::cpu_with_config(DeviceConfig::host().with_pooling(false))
        .expect("valid host config");

    for size in [256usize, 16 << 10, 1 << 20] {
        let pooled_timings = time_batch("pooled", &pooled, size);
        let direct_timings = time_batch("direct", &direct, size);
        pooled_timings.print();
        direct_timings.print();
        println!(
            "    direct / pooled: {:.2}x",
            direct_timings.mean_ms() / pooled_timings.mean_ms().max(f64::EPSILON)
        );
    }

    if let Ok(stats) = pooled.stats() {
        println!("\n  pooled device after run: {}", stats);
    }
}

fn main() {
    println!("bufferforge heap benchmarks");

    benchmark_uniform_blocks();
    benchmark_mixed_sizes();
    benchmark_pooled_vs_direct();
}
