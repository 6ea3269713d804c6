use std::collections::HashMap;

use pmcnorm::normalize::{as_cumulative, as_rate};
use pmcnorm::table::{DataType, Field, Row, Schema, SchemaMismatch, Table, TableError, Value};
use quickcheck::{quickcheck, Arbitrary, Gen, TestResult};

const COUNTER: &str = "cumulative_llc_misses";
const DERIVED: &str = "llc_misses";

/// One raw sample, before it becomes a table row.
#[derive(Debug, Clone)]
struct RawSample {
    cpu: i64,
    ts: i64,
    counter: i64,
    enabled: i64,
    running: i64,
    tag: String,
    noise: f64,
}

/// Per-CPU monotonic sample sets with strictly increasing timestamps.
#[derive(Debug, Clone)]
struct SampleSet(Vec<RawSample>);

fn small(g: &mut Gen, max: u32) -> i64 {
    i64::from(u32::arbitrary(g) % (max + 1))
}

impl Arbitrary for SampleSet {
    fn arbitrary(g: &mut Gen) -> Self {
        let cpus = 1 + small(g, 3);
        let mut samples = Vec::new();
        for cpu in 0..cpus {
            let n = small(g, 12);
            let (mut ts, mut counter, mut enabled, mut running) = (small(g, 1_000), 0, 0, 0);
            for _ in 0..n {
                ts += 1 + small(g, 500);
                counter += small(g, 10_000);
                // Enabled time may stall, which yields degenerate spans.
                let enabled_step = small(g, 50);
                enabled += enabled_step;
                running += small(g, enabled_step as u32);
                samples.push(RawSample {
                    cpu,
                    ts,
                    counter,
                    enabled,
                    running,
                    tag: format!("cpu{cpu}-{ts}"),
                    noise: f64::arbitrary(g),
                });
            }
        }
        SampleSet(samples)
    }
}

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("tag", DataType::Utf8),
        Field::new("cpu", DataType::Int64),
        Field::new("ts_uptime_us", DataType::Int64),
        Field::new(COUNTER, DataType::Int64),
        Field::new("pmu_enabled_time_us", DataType::Int64),
        Field::new("pmu_running_time_us", DataType::Int64),
        Field::new("noise", DataType::Float64),
    ])
    .expect("schema")
}

fn to_table(samples: &[RawSample]) -> Table {
    let rows = samples
        .iter()
        .map(|s| {
            vec![
                Value::from(s.tag.as_str()),
                Value::Int(s.cpu),
                Value::Int(s.ts),
                Value::Int(s.counter),
                Value::Int(s.enabled),
                Value::Int(s.running),
                Value::Float(s.noise),
            ]
        })
        .collect();
    Table::new(schema(), rows).expect("table")
}

/// Deterministic Fisher-Yates driven by `seed`.
fn shuffled(samples: &[RawSample], seed: u64) -> Vec<RawSample> {
    let mut out = samples.to_vec();
    let mut state = seed | 1;
    for i in (1..out.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state % (i as u64 + 1)) as usize;
        out.swap(i, j);
    }
    out
}

/// Bit-exact row identity, so `NaN` compares equal to itself.
fn row_key(row: &Row) -> Vec<String> {
    row.iter()
        .map(|v| match v {
            Value::Float(f) => format!("f{:016x}", f.to_bits()),
            other => format!("{other:?}"),
        })
        .collect()
}

fn sorted_keys(table: &Table) -> Vec<Vec<String>> {
    let mut keys: Vec<_> = table.rows().iter().map(row_key).collect();
    keys.sort();
    keys
}

fn column_index(table: &Table, name: &str) -> usize {
    table.column_index(name).expect("column exists")
}

#[test]
fn test_ordering_invariance() {
    fn prop(set: SampleSet, seed: u64) -> bool {
        let original = to_table(&set.0);
        let permuted = to_table(&shuffled(&set.0, seed));

        let rate_a = as_rate(&original, COUNTER, DERIVED).expect("rate");
        let rate_b = as_rate(&permuted, COUNTER, DERIVED).expect("rate");
        let cum_a = as_cumulative(&original, COUNTER, DERIVED).expect("cumulative");
        let cum_b = as_cumulative(&permuted, COUNTER, DERIVED).expect("cumulative");

        sorted_keys(&rate_a) == sorted_keys(&rate_b) && sorted_keys(&cum_a) == sorted_keys(&cum_b)
    }
    quickcheck(prop as fn(SampleSet, u64) -> bool);
}

#[test]
fn test_cumulative_is_prefix_sum_of_rate() {
    fn prop(set: SampleSet) -> TestResult {
        let table = to_table(&set.0);
        let rate = as_rate(&table, COUNTER, DERIVED).expect("rate");
        let cum = as_cumulative(&table, COUNTER, DERIVED).expect("cumulative");
        if rate.num_rows() != cum.num_rows() {
            return TestResult::failed();
        }

        let cpu = column_index(&rate, "cpu");
        let derived = column_index(&rate, DERIVED);
        let mut totals: HashMap<i64, f64> = HashMap::new();

        for (r, c) in rate.rows().iter().zip(cum.rows()) {
            let cpu = r[cpu].as_i64().expect("cpu");
            let rate_value = r[derived].as_f64().expect("rate");
            let cum_value = c[derived].as_f64().expect("cumulative");

            if rate_value.is_nan() {
                if !cum_value.is_nan() {
                    return TestResult::failed();
                }
                continue;
            }

            let total = totals.entry(cpu).or_insert(0.0);
            *total += rate_value;
            let tolerance = 1e-9 * total.abs().max(1.0);
            if (cum_value - *total).abs() > tolerance {
                return TestResult::failed();
            }
        }
        TestResult::passed()
    }
    quickcheck(prop as fn(SampleSet) -> TestResult);
}

#[test]
fn test_pass_through_columns_are_bit_identical() {
    fn prop(set: SampleSet) -> bool {
        let table = to_table(&set.0);
        let out = as_rate(&table, COUNTER, DERIVED).expect("rate");
        if out.num_rows() != table.num_rows() {
            return false;
        }

        let by_tag: HashMap<&str, &RawSample> =
            set.0.iter().map(|s| (s.tag.as_str(), s)).collect();
        let tag = column_index(&out, "tag");
        let ts = column_index(&out, "ts_uptime_us");
        let noise = column_index(&out, "noise");

        out.rows().iter().all(|row| {
            let source = by_tag[row[tag].as_str().expect("tag")];
            row[ts] == Value::Int(source.ts)
                && matches!(row[noise], Value::Float(f) if f.to_bits() == source.noise.to_bits())
        })
    }
    quickcheck(prop as fn(SampleSet) -> bool);
}

#[test]
fn test_partitions_do_not_mix() {
    fn prop(set: SampleSet) -> bool {
        let all = as_cumulative(&to_table(&set.0), COUNTER, DERIVED).expect("cumulative");
        let cpu0: Vec<RawSample> = set.0.iter().filter(|s| s.cpu == 0).cloned().collect();
        let alone = as_cumulative(&to_table(&cpu0), COUNTER, DERIVED).expect("cumulative");

        let cpu = column_index(&all, "cpu");
        let from_all: Vec<Vec<String>> = all
            .rows()
            .iter()
            .filter(|r| r[cpu] == Value::Int(0))
            .map(row_key)
            .collect();
        let from_alone: Vec<Vec<String>> = alone.rows().iter().map(row_key).collect();
        from_all == from_alone
    }
    quickcheck(prop as fn(SampleSet) -> bool);
}

#[test]
fn test_rows_within_cpu_are_time_ordered() {
    fn prop(set: SampleSet, seed: u64) -> bool {
        let out = as_rate(&to_table(&shuffled(&set.0, seed)), COUNTER, DERIVED).expect("rate");
        let cpu = column_index(&out, "cpu");
        let ts = column_index(&out, "ts_uptime_us");
        out.rows().windows(2).all(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            a[cpu] != b[cpu] || a[ts].as_i64() < b[ts].as_i64()
        })
    }
    quickcheck(prop as fn(SampleSet, u64) -> bool);
}

#[test]
fn test_first_sample_policy() {
    let rows = vec![RawSample {
        cpu: 2,
        ts: 10,
        counter: 4_000,
        enabled: 80,
        running: 20,
        tag: "only".to_string(),
        noise: 0.0,
    }];
    let out = as_rate(&to_table(&rows), COUNTER, DERIVED).expect("rate");
    let value = out.column_f64(DERIVED).expect("derived")[0];
    assert!((value - 4_000.0 * (20.0 / 80.0)).abs() < 1e-9);
}

#[test]
fn test_missing_enabled_time_fails_before_processing() {
    let table = to_table(&[RawSample {
        cpu: 0,
        ts: 1,
        counter: 1,
        enabled: 1,
        running: 1,
        tag: "a".to_string(),
        noise: 0.0,
    }]);
    let stripped = table
        .select(&["tag", "cpu", "ts_uptime_us", COUNTER, "pmu_running_time_us"])
        .expect("select");

    for result in [
        as_rate(&stripped, COUNTER, DERIVED),
        as_cumulative(&stripped, COUNTER, DERIVED),
    ] {
        assert_eq!(
            result.unwrap_err(),
            TableError::SchemaMismatch {
                table: "samples".to_string(),
                source: SchemaMismatch::MissingColumn {
                    column: "pmu_enabled_time_us".to_string()
                },
            }
        );
    }
}
