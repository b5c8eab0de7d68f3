use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rig_dna::{DnaAsset, MemoryReader};
use rig_logic::{RigLogic, RigState};

fn load(name: &str) -> MemoryReader {
    let asset: DnaAsset = rig_test_fixtures::dna::load(name).expect("load dna fixture");
    MemoryReader::new(asset)
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    let head = load("head_minimal");
    let head_rig = RigLogic::from_reader(&head).expect("compile head");
    let mut head_state = RigState::new(&head_rig);
    group.bench_function("head_lod0", |b| {
        b.iter(|| {
            head_state.set_gui_control(0, 0.5).ok();
            head_rig.evaluate(&mut head_state, black_box(0));
            black_box(head_state.joint_outputs()[21])
        });
    });

    let body = load("body_rbf");
    let body_rig = RigLogic::from_reader(&body).expect("compile body");
    let mut body_state = RigState::new(&body_rig);
    let half = std::f64::consts::FRAC_PI_8;
    group.bench_function("body_rbf", |b| {
        b.iter(|| {
            body_state.set_raw_control(0, half.sin()).ok();
            body_state.set_raw_control(3, half.cos()).ok();
            body_rig.calculate(&mut body_state);
            black_box(body_state.joint_outputs()[40])
        });
    });

    group.finish();
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
