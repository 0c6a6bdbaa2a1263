//! Benchmarks for account decoding and message encoding

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pyth_stream::broadcast::BroadcastMessage;
use pyth_stream::oracle::layout::{self, fixtures};
use pyth_stream::oracle::AccountKey;
use pyth_stream::stream::PriceEvent;

fn benchmark_decode_price(c: &mut Criterion) {
    let key = AccountKey::new([2; 32]);
    let mut fixture = fixtures::PriceFixture::new(AccountKey::new([1; 32]));
    fixture.price = 6_512_345_678_900;
    fixture.confidence = 1_234_567;
    fixture.last_slot = 250_000_000;
    fixture.valid_slot = 250_000_000;
    let data = fixture.encode();

    c.bench_function("decode_price", |b| {
        b.iter(|| layout::decode_price(key, black_box(&data)))
    });
}

fn benchmark_decode_product(c: &mut Criterion) {
    let key = AccountKey::new([1; 32]);
    let data = fixtures::product(
        Some(AccountKey::new([2; 32])),
        &[
            ("symbol", "Crypto.BTC/USD"),
            ("asset_type", "Crypto"),
            ("quote_currency", "USD"),
            ("description", "BTC/USD"),
            ("generic_symbol", "BTCUSD"),
            ("base", "BTC"),
        ],
    );

    c.bench_function("decode_product", |b| {
        b.iter(|| layout::decode_product(key, black_box(&data)))
    });
}

fn benchmark_encode_message(c: &mut Criterion) {
    let fixture = fixtures::PriceFixture {
        price: 6_512_345_678_900,
        confidence: 1_234_567,
        ..fixtures::PriceFixture::new(AccountKey::new([1; 32]))
    };
    let decoded = layout::decode_price(AccountKey::new([2; 32]), &fixture.encode())
        .expect("valid fixture");
    let event = PriceEvent::new(&decoded.account, Some("Crypto.BTC/USD"));

    c.bench_function("encode_price_message", |b| {
        b.iter(|| BroadcastMessage::from(black_box(&event)).to_json())
    });
}

criterion_group!(
    benches,
    benchmark_decode_price,
    benchmark_decode_product,
    benchmark_encode_message
);
criterion_main!(benches);
