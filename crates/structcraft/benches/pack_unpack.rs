use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use structcraft::{ArrayDef, ByteOrder, Field, Length, Record, Schema, SchemaBuilder, Value};

fn gen_schema(field_count: usize) -> Arc<Schema> {
    let mut builder = SchemaBuilder::new("Flat").byte_order(ByteOrder::Little);

    for i in 0..field_count {
        builder = builder.scalar(format!("f{}", i), Field::ushort());
    }

    builder.compile().unwrap()
}

fn gen_packet(len: usize) -> Vec<u8> {
    // Deterministic but non-trivial pattern
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

fn bench_flat(c: &mut Criterion) {
    for &field_count in &[1usize, 10, 50, 100] {
        let schema = gen_schema(field_count);
        let packet = gen_packet(field_count * 2);
        let record = Record::from_bytes(&schema, &packet).unwrap();

        c.bench_function(&format!("unpack_{}_fields", field_count), |b| {
            b.iter(|| record.unpack(&packet).unwrap())
        });
        c.bench_function(&format!("pack_{}_fields", field_count), |b| {
            b.iter(|| record.pack().unwrap())
        });
    }
}

fn bench_array(c: &mut Criterion) {
    let point = SchemaBuilder::new("Point")
        .byte_order(ByteOrder::Little)
        .scalar("x", Field::double())
        .scalar("y", Field::double())
        .compile()
        .unwrap();
    let path = SchemaBuilder::new("Path")
        .byte_order(ByteOrder::Little)
        .scalar("count", Field::uint())
        .array("points", ArrayDef::of_records(&point, Length::field("count")))
        .compile()
        .unwrap();

    for &count in &[10usize, 100] {
        let record = Record::new(&path).unwrap();
        record.set("count", count).unwrap();
        let points = record.array("points").unwrap();
        for i in 0..count {
            points
                .append(Value::List(vec![(i as f64).into(), (i as f64 * 2.0).into()]))
                .unwrap();
        }
        let packet = record.pack().unwrap();

        c.bench_function(&format!("unpack_path_{}_points", count), |b| {
            b.iter(|| Record::from_bytes(&path, &packet).unwrap())
        });
        c.bench_function(&format!("pack_path_{}_points", count), |b| {
            b.iter(|| record.pack().unwrap())
        });
    }
}

criterion_group!(benches, bench_flat, bench_array);
criterion_main!(benches);
