use criterion::{Criterion, black_box, criterion_group, criterion_main};

use barbot_core::{StepConverter, Status};

fn bench_conversions(c: &mut Criterion) {
    let conv = StepConverter::new(4, 5.0, 803.0);
    c.bench_function("mm_to_steps", |b| {
        b.iter(|| {
            let mut acc = 0i64;
            for mm in 0..800 {
                acc ^= conv.target_steps(black_box(mm as f32));
            }
            acc
        })
    });
    c.bench_function("steps_to_mm", |b| {
        b.iter(|| {
            let mut acc = 0.0f32;
            for steps in (0..16_000).step_by(4) {
                acc += conv.steps_to_mm(black_box(steps));
            }
            acc
        })
    });
    c.bench_function("status_error_partition", |b| {
        let statuses = [
            Status::Idle,
            Status::Drafting,
            Status::ErrorBus,
            Status::ErrorIngredientEmpty,
            Status::Mixing,
        ];
        b.iter(|| statuses.iter().filter(|s| s.is_error()).count())
    });
}

criterion_group!(benches, bench_conversions);
criterion_main!(benches);
