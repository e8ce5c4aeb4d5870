use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kiasm::parser::{parse_str, render};
use kiasm::variant::{augment_schematic, store_schematic};
use kiasm::SynthesisLayout;
use std::path::PathBuf;

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("demo")
        .join(name);
    std::fs::read_to_string(path).expect("fixture")
}

fn bench_round_trip(c: &mut Criterion) {
    let content = fixture("demo.kicad_sch");

    c.bench_function("parse_schematic", |b| {
        b.iter(|| parse_str(black_box(&content)))
    });

    let document = parse_str(&content).expect("parse");
    c.bench_function("render_schematic", |b| b.iter(|| render(black_box(&document))));
}

fn bench_switch_in_memory(c: &mut Criterion) {
    let content = fixture("demo.kicad_sch");
    let layout = SynthesisLayout::default();

    c.bench_function("switch_schematic", |b| {
        b.iter(|| {
            let mut document = parse_str(black_box(&content)).expect("parse");
            store_schematic(&mut document, "def", &[]);
            augment_schematic(&mut document, black_box("lite"), &[], &layout).expect("augment");
            render(&document)
        });
    });
}

criterion_group!(benches, bench_round_trip, bench_switch_in_memory);
criterion_main!(benches);
