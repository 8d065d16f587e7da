use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serial_vcp::osal::{StreamBuffer, Timing};
use serial_vcp::socket::format::format_to;
use serial_vcp::Arg;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn bench_stream_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_buffer");
    for &chunk in &[8usize, 32, 64] {
        group.throughput(Throughput::Bytes(chunk as u64));
        group.bench_function(format!("send_receive_{chunk}"), |b| {
            let buffer = StreamBuffer::new(1024);
            let data = vec![0x5Au8; chunk];
            let mut out = vec![0u8; chunk];
            b.iter(|| {
                buffer.send(black_box(&data), Timing::Immediate);
                black_box(buffer.receive(&mut out, Timing::Immediate));
            })
        });
    }

    group.throughput(Throughput::Bytes(64 * 1024));
    group.bench_function("cross_thread_64k", |b| {
        b.iter(|| {
            let buffer = Arc::new(StreamBuffer::new(1024));
            let producer = buffer.clone();
            let handle = thread::spawn(move || {
                let block = [0xA5u8; 256];
                for _ in 0..256 {
                    producer.send(&block, Timing::Forever);
                }
            });
            let mut out = [0u8; 64];
            let mut total = 0;
            while total < 64 * 1024 {
                total += buffer.receive(&mut out, Timing::Forever);
            }
            handle.join().unwrap();
            black_box(total);
        })
    });
    group.finish();
}

pub fn bench_format(c: &mut Criterion) {
    c.bench_function("format_mixed_fields", |b| {
        b.iter(|| {
            let mut count = 0usize;
            let args = [Arg::from(42i32), Arg::from("link"), Arg::from(3.25f64)];
            format_to(
                black_box("id=%05d name=%-8s t=%.2f\n"),
                &mut args.iter().copied(),
                &mut |_| {
                    count += 1;
                    Ok(())
                },
            )
            .unwrap();
            black_box(count);
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_stream_buffer, bench_format
}
criterion_main!(benches);
