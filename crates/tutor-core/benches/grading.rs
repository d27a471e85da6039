use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tutor_core::grader::{build_grading_prompt, parse_grader_output};

fn bench_parse_grader_output(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_grader_output");

    let well_formed = "4\nGood work, but show the subtraction step.\n- Forgets to apply the operation to both sides\n- Sign error when moving terms";
    let decorated = "**5/5.**\n\nExcellent.\n\nNone";
    let malformed = "The student seems to understand the idea.\nMostly right.";

    group.bench_function("well_formed", |b| {
        b.iter(|| parse_grader_output(black_box(well_formed)))
    });

    group.bench_function("decorated", |b| {
        b.iter(|| parse_grader_output(black_box(decorated)))
    });

    group.bench_function("malformed", |b| {
        b.iter(|| parse_grader_output(black_box(malformed)))
    });

    group.finish();
}

fn bench_build_prompt(c: &mut Criterion) {
    c.bench_function("build_grading_prompt", |b| {
        b.iter(|| {
            build_grading_prompt(
                black_box("Solve for x: 2x + 4 = 10"),
                black_box("3"),
                black_box("I subtracted 4 and divided by 2, so x = 3"),
                black_box("Topic: Solving Linear Equations"),
            )
        })
    });
}

criterion_group!(benches, bench_parse_grader_output, bench_build_prompt);
criterion_main!(benches);
