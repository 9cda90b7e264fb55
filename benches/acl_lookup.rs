use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use slircd_services::acl::{AccessTarget, Actor, Identity};
use slircd_services::db::{self, Database};
use slircd_services::flags::codec::{bitmask_to_flags, flags_to_bitmask};
use slircd_services::state::{AclSettings, Channel};
use slircd_services::{FlagRegistry, ServiceState};
use std::hint::black_box;

// A channel with a few hundred account entries, a handful of groups and
// a long tail of hostmask entries, roughly what a busy network channel
// accumulates over the years.
fn busy_state() -> ServiceState {
    let mut st = ServiceState::new(FlagRegistry::with_core_flags(), AclSettings::default());
    st.channels
        .insert(Channel::new("#busy", 1_700_000_000))
        .expect("channel");
    let actor = Actor::system();
    let op = flags_to_bitmask(&st.flags, "+AOiotv", 0);
    let akick = st.flags.akick();

    for i in 0..300 {
        let id = st
            .register_account(&format!("user{i}"), "hash", "u@example.com")
            .expect("account");
        st.add_or_merge("#busy", &AccessTarget::Entity(id), op, 0, &actor)
            .expect("grant");
    }
    for i in 0..200 {
        let mask = AccessTarget::Host(format!("*!*@*.spam{i}.example"));
        st.add_or_merge("#busy", &mask, akick, 0, &actor)
            .expect("akick");
    }
    st
}

fn query_benchmark(c: &mut Criterion) {
    let st = busy_state();
    let member = Identity::account(st.entities.find("user150").expect("user"))
        .with_mask("user150!u@host.example");
    let stranger = Identity::anonymous("x!y@host.spam199.example");

    let mut group = c.benchmark_group("query");
    group.throughput(Throughput::Elements(1));
    group.bench_function("effective_flags", |b| {
        b.iter(|| st.effective_flags(black_box("#busy"), black_box(&member)))
    });
    group.bench_function("is_banned_last_mask", |b| {
        b.iter(|| st.is_banned(black_box("#busy"), black_box(&stranger)))
    });
    group.finish();
}

fn codec_benchmark(c: &mut Criterion) {
    let reg = FlagRegistry::with_core_flags();
    let mut group = c.benchmark_group("codec");
    group.bench_function("parse", |b| {
        b.iter(|| flags_to_bitmask(&reg, black_box("+AOiotv-s"), 0))
    });
    group.bench_function("render", |b| {
        b.iter(|| bitmask_to_flags(&reg, black_box(0x0001_f0ff)))
    });
    group.finish();
}

fn database_benchmark(c: &mut Criterion) {
    let st = busy_state();
    let text = db::render(&st).expect("render");
    let db = Database::new("bench.db", ".new", true);

    let mut group = c.benchmark_group("database");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("render", |b| b.iter(|| db::render(black_box(&st))));
    group.bench_function("load", |b| {
        b.iter(|| {
            let mut fresh =
                ServiceState::new(FlagRegistry::with_core_flags(), AclSettings::default());
            db.load_str(&mut fresh, black_box(&text))
        })
    });
    group.finish();
}

criterion_group!(benches, query_benchmark, codec_benchmark, database_benchmark);
criterion_main!(benches);
