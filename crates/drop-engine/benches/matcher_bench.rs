//! 规则匹配性能基准测试
//!
//! 针对 RuleMatcher 的各类触发与 YAML 编译进行细粒度测试。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use drop_engine::matcher::RuleMatcher;
use drop_engine::probability::SeededRoller;
use drop_engine::testing::FixedRoller;
use drop_engine::{CatchState, SnapshotCompiler};
use std::fmt::Write;
use std::hint::black_box;

/// 生成包含 n 条工具规则的配置，只有最后一条匹配钻石镐
fn rules_with_tools(n: usize) -> String {
    let mut yaml = String::from("dig:\n");
    for i in 0..n.saturating_sub(1) {
        let _ = write!(
            yaml,
            "  tool_{i}:\n    pattern: \"TOOL_{i}_.*\"\n    dig-type:\n      STONE:\n        d:\n          chance: 1\n"
        );
    }
    yaml.push_str(
        "  diamond:\n    pattern: \".*_PICKAXE\"\n    y:\n      world: 64\n    dig-type:\n      STONE:\n",
    );
    for j in 0..5 {
        let _ = write!(yaml, "        drop_{j}:\n          chance: {}\n", j + 1);
    }
    yaml.push_str(
        "consume:\n  GOLDEN_APPLE:\n    a:\n      chance: 10\n  \"*\":\n    b:\n      chance: 5\n",
    );
    yaml.push_str("fishing:\n  f1:\n    chance: 1\n  f2:\n    chance: 2\n  f3:\n    chance: 3\n");
    yaml.push_str(
        "enchant:\n  e:\n    item-pattern: \".*_SWORD\"\n    enchant-pattern: \"sharpness|smite\"\n    min-level: 20\n    chance: 10\n",
    );
    yaml
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_yaml");

    for n in [1, 10, 100] {
        let yaml = rules_with_tools(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &yaml, |b, yaml| {
            let mut compiler = SnapshotCompiler::new();
            b.iter(|| compiler.compile_yaml(black_box(yaml), None).unwrap())
        });
    }

    group.finish();
}

fn bench_block_break(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_block_break");
    // 抽样全部落空，遍历整张掉落表
    let miss = FixedRoller(0.999_999);

    for n in [1, 10, 100] {
        let (snapshot, _) = SnapshotCompiler::new()
            .compile_yaml(&rules_with_tools(n), None)
            .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &snapshot, |b, snapshot| {
            let matcher = RuleMatcher::new(snapshot, &miss);
            b.iter(|| {
                matcher.match_block_break(
                    black_box("DIAMOND_PICKAXE"),
                    black_box("STONE"),
                    "world",
                    12,
                    1.2,
                )
            })
        });
    }

    group.finish();
}

fn bench_other_triggers(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_other_triggers");
    let (snapshot, _) = SnapshotCompiler::new()
        .compile_yaml(&rules_with_tools(10), None)
        .unwrap();
    let roller = SeededRoller::new(7);
    let matcher = RuleMatcher::new(&snapshot, &roller);
    let enchants = vec!["unbreaking".to_string(), "smite".to_string()];

    group.bench_function("consume", |b| {
        b.iter(|| matcher.match_consume(black_box("GOLDEN_APPLE"), 1.5))
    });

    group.bench_function("fishing", |b| {
        b.iter(|| matcher.match_fish(black_box(CatchState::CaughtFish), 1.5))
    });

    group.bench_function("enchant", |b| {
        b.iter(|| matcher.match_enchant(black_box("DIAMOND_SWORD"), &enchants, 30, 1.5))
    });

    group.finish();
}

criterion_group!(benches, bench_compile, bench_block_break, bench_other_triggers);
criterion_main!(benches);
