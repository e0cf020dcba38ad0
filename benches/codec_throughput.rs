//! Benchmark suite for token codec throughput
//!
//! Measures:
//! - Bare datum encoding and decoding through the token stream
//! - Reading with and without writer/reader resolution
//! - Container file round trips per codec
//!
//! # Configuration
//!
//! - `BENCH_SAMPLE_SIZE`: Number of samples to collect (default: 100)
//! - `BENCH_MEASUREMENT_TIME`: Measurement time in seconds (default: 5)
//! - `BENCH_RECORDS`: Records per iteration (default: 10000)
//!
//! ```bash
//! BENCH_SAMPLE_SIZE=30 BENCH_MEASUREMENT_TIME=2 cargo bench
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use jetcodec::{
    AvroGenerator, AvroParser, AvroValue, Codec, ContainerOptions, GeneratorConfig,
    ParserConfig, Schema, SchemaPair, Token,
};

const WRITER_SCHEMA: &str = r#"{"type": "record", "name": "Trade", "fields": [
    {"name": "id", "type": "long"},
    {"name": "symbol", "type": "string"},
    {"name": "price", "type": "double"},
    {"name": "size", "type": "int"},
    {"name": "venue", "type": ["null", "string"]},
    {"name": "flags", "type": {"type": "array", "items": "int"}}
]}"#;

const READER_SCHEMA: &str = r#"{"type": "record", "name": "Trade", "fields": [
    {"name": "id", "type": "long"},
    {"name": "price", "type": "double"},
    {"name": "size", "type": "long"},
    {"name": "side", "type": "string", "default": "buy"}
]}"#;

/// Configure Criterion based on environment variables
fn configure_criterion() -> Criterion {
    let mut criterion = Criterion::default();

    if let Ok(sample_size) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(size) = sample_size.parse::<usize>() {
            criterion = criterion.sample_size(size);
        } else {
            eprintln!("Warning: Invalid BENCH_SAMPLE_SIZE value: {}", sample_size);
        }
    }

    if let Ok(measurement_time) = std::env::var("BENCH_MEASUREMENT_TIME") {
        if let Ok(secs) = measurement_time.parse::<u64>() {
            criterion = criterion.measurement_time(Duration::from_secs(secs));
        } else {
            eprintln!(
                "Warning: Invalid BENCH_MEASUREMENT_TIME value: {}",
                measurement_time
            );
        }
    }

    criterion
}

fn record_count() -> usize {
    std::env::var("BENCH_RECORDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10_000)
}

fn trade(i: usize) -> AvroValue {
    let venue = if i % 4 == 0 {
        AvroValue::Null
    } else {
        "XNAS".into()
    };
    AvroValue::object([
        ("id", AvroValue::Long(i as i64)),
        ("symbol", format!("SYM{}", i % 97).into()),
        ("price", (100.0 + (i % 1000) as f64 / 8.0).into()),
        ("size", ((i % 500) as i32).into()),
        ("venue", venue),
        (
            "flags",
            AvroValue::Array((0..(i % 4) as i32).map(AvroValue::Int).collect()),
        ),
    ])
}

fn encode(schema: &Arc<Schema>, values: &[AvroValue], config: GeneratorConfig) -> Vec<u8> {
    let mut generator = AvroGenerator::new(Vec::new(), Arc::clone(schema), config).unwrap();
    for value in values {
        generator.write_value(value).unwrap();
    }
    generator.finish().unwrap()
}

/// Pull every token without materializing values.
fn drain(mut parser: AvroParser<'_>) -> usize {
    let mut tokens = 0;
    while parser.next_token().unwrap() != Token::EndOfStream {
        tokens += 1;
    }
    tokens
}

fn bench_datums(c: &mut Criterion) {
    let schema = Arc::new(Schema::parse(WRITER_SCHEMA).unwrap());
    let reader = Arc::new(Schema::parse(READER_SCHEMA).unwrap());
    let values: Vec<AvroValue> = (0..record_count()).map(trade).collect();
    let bytes = encode(&schema, &values, GeneratorConfig::default());

    let mut group = c.benchmark_group("datum");
    group.throughput(Throughput::Elements(values.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| black_box(encode(&schema, &values, GeneratorConfig::default())))
    });

    group.bench_function("tokens", |b| {
        b.iter(|| {
            let parser =
                AvroParser::new(&bytes[..], Arc::clone(&schema), ParserConfig::default()).unwrap();
            black_box(drain(parser))
        })
    });

    let pair = SchemaPair::resolve(Arc::clone(&schema), reader).unwrap();
    group.bench_function("tokens_resolved", |b| {
        b.iter(|| {
            let parser = AvroParser::raw(&bytes[..], pair.clone(), ParserConfig::default()).unwrap();
            black_box(drain(parser))
        })
    });

    group.bench_function("values", |b| {
        b.iter(|| {
            let mut parser =
                AvroParser::new(&bytes[..], Arc::clone(&schema), ParserConfig::default()).unwrap();
            let mut count = 0;
            while let Some(value) = parser.next_value().unwrap() {
                black_box(value);
                count += 1;
            }
            count
        })
    });

    group.finish();
}

fn bench_containers(c: &mut Criterion) {
    let schema = Arc::new(Schema::parse(WRITER_SCHEMA).unwrap());
    let values: Vec<AvroValue> = (0..record_count()).map(trade).collect();

    let codecs = [Codec::Null, Codec::Deflate, Codec::Snappy, Codec::Zstandard];
    let mut group = c.benchmark_group("container");
    group.throughput(Throughput::Elements(values.len() as u64));

    for codec in codecs.into_iter().filter(Codec::is_enabled) {
        let config = GeneratorConfig::new().with_container(ContainerOptions::new().with_codec(codec));
        let file = encode(&schema, &values, config.clone());

        group.bench_with_input(BenchmarkId::new("write", codec.name()), &config, |b, config| {
            b.iter(|| black_box(encode(&schema, &values, config.clone())))
        });

        group.bench_with_input(BenchmarkId::new("read", codec.name()), &file, |b, file| {
            b.iter(|| {
                let parser = AvroParser::container(&file[..], None, ParserConfig::default()).unwrap();
                black_box(drain(parser))
            })
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = bench_datums, bench_containers
}
criterion_main!(benches);
