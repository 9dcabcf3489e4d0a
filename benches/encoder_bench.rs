//! Benchmark for bid validation, encoding and call data building

use cipher_bond::abi::CallSignature;
use cipher_bond::bond::BondCatalog;
use cipher_bond::encoder::FixedPointEncoder;
use cipher_bond::validator::{parse_amount, validate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for raw in ["100000", "150000.25", "999999999.123456789012345678"].iter() {
        let amount = parse_amount(raw).unwrap();
        let encoder = FixedPointEncoder::default();

        group.bench_with_input(BenchmarkId::new("fixed_point", raw), &amount, |b, amount| {
            b.iter(|| black_box(encoder.encode(black_box(amount))))
        });
    }

    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let catalog = BondCatalog::demo();
    let bond = catalog.get("1").unwrap();

    c.bench_function("validate_bid", |b| {
        b.iter(|| black_box(validate(bond, black_box("150000.50"), true)))
    });
}

fn bench_call_data(c: &mut Criterion) {
    let call = CallSignature::parse("placeEncryptedBid(uint256,uint256)").unwrap();
    let encoded = FixedPointEncoder::default()
        .encode(&parse_amount("150000").unwrap())
        .unwrap();

    c.bench_function("encode_call", |b| {
        b.iter(|| black_box(call.encode_call(black_box(&[1, encoded.as_u128()]))))
    });
}

criterion_group!(benches, bench_encode, bench_validate, bench_call_data);
criterion_main!(benches);
