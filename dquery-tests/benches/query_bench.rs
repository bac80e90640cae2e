/// Performance benchmarks for DynamoQuery
///
/// Run with: cargo bench -p dquery-tests

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dquery_api::format::{build_request, ExpressionMap, ExpressionName};
use dquery_api::{DynamoQuery, DynamoTable};
use dquery_core::expression::{ConditionExpression, ProjectionExpression, UpdateExpression};
use dquery_core::{record, DataTable, TableKeys, Value};
use dquery_test_utils::{seeded_users_table, test_config, user_record, user_records, users_table};

fn bench_build_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_request");

    for values in [1usize, 10, 50] {
        let mut expressions = ExpressionMap::new();
        expressions.insert(
            ExpressionName::Condition,
            ConditionExpression::is_in("name", "names")
                .and(ConditionExpression::gte("age", "min_age"))
                .into(),
        );
        expressions.insert(
            ExpressionName::Update,
            UpdateExpression::new().set(["name", "age"]).into(),
        );
        expressions.insert(
            ExpressionName::Projection,
            ProjectionExpression::new(["pk", "sk", "name"]).into(),
        );
        let names: Vec<Value> = (0..values).map(|i| Value::from(format!("user{}", i))).collect();
        let data = record! {
            "name" => "user0",
            "age" => 30,
            "names" => Value::L(names),
            "min_age" => 18,
        };

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("list_values", values), &data, |b, data| {
            b.iter(|| build_request(black_box(&expressions), black_box(data)).unwrap());
        });
    }
    group.finish();
}

fn bench_batch_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_write");

    for rows in [25usize, 250, 1000] {
        let input = user_records(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("rows", rows), &input, |b, input| {
            b.iter(|| {
                let mut query = DynamoQuery::build_batch_update_item().with_config(test_config());
                query.table(users_table(), Some(TableKeys::with_sort_key("pk", "sk")));
                query.execute(black_box(input)).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_query_pages(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_pages");

    for page_size in [10usize, 100, 1000] {
        let table = seeded_users_table(1000);
        let manager = DynamoTable::new(table).with_config(test_config().with_max_page_size(page_size));

        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::new("page_size", page_size), &manager, |b, manager| {
            b.iter(|| {
                let count = manager.query("user").execute().unwrap().count();
                black_box(count)
            });
        });
    }
    group.finish();
}

fn bench_data_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_table");

    for rows in [100usize, 1000] {
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("add_records", rows), &rows, |b, &rows| {
            b.iter(|| {
                let mut table = DataTable::new();
                table
                    .add_records((0..rows).map(|i| black_box(user_record(i))))
                    .unwrap();
                table
            });
        });

        let mut table = user_records(rows);
        table.add_table(&[&user_records(rows)]).unwrap();
        group.bench_with_input(BenchmarkId::new("drop_duplicates", rows), &table, |b, table| {
            b.iter(|| table.drop_duplicates_with(black_box(&["pk", "sk"][..]), true).unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_build_request,
    bench_batch_write,
    bench_query_pages,
    bench_data_table
);
criterion_main!(benches);
