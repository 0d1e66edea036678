//! Property-based tests for the summary and QA stages.
//!
//! These check invariants that must hold for any input: quantiles stay within
//! the data, summaries have one row per distinct group key, filters only ever
//! remove rows, and re-running the QA engine changes nothing.

use proptest::prelude::*;
use std::collections::BTreeSet;
use survey_guard::aggregate::{summarize, CardinalityPolicy};
use survey_guard::config::{AggFunction, FilterSpec, Predicate, SummaryDef};
use survey_guard::diagnostics::Diagnostics;
use survey_guard::filter::apply_filter;
use survey_guard::qa::{quantile, IqrBounds, QaEngine};
use survey_guard::table::{Table, Value};

fn optional_int() -> impl Strategy<Value = Value> {
    prop::option::of(-50i64..500).prop_map(Value::from)
}

fn optional_site() -> impl Strategy<Value = Value> {
    prop::option::of(prop::sample::select(vec!["A", "B", "C", "D"])).prop_map(Value::from)
}

fn survey_table(rows: Vec<(Value, Value)>) -> Table {
    let (sites, counts): (Vec<Value>, Vec<Value>) = rows.into_iter().unzip();
    Table::new("VegCommunitySurvey")
        .with_column("Site", sites)
        .unwrap()
        .with_column("Count", counts)
        .unwrap()
}

proptest! {
    #[test]
    fn quantiles_stay_within_data(mut values in prop::collection::vec(-1e6f64..1e6, 1..64), p in 0.0f64..=1.0) {
        values.sort_by(f64::total_cmp);
        let q = quantile(&values, p).unwrap();
        prop_assert!(q >= values[0] && q <= values[values.len() - 1]);

        let q1 = quantile(&values, 0.25).unwrap();
        let q3 = quantile(&values, 0.75).unwrap();
        prop_assert!(q1 <= q3);
    }

    #[test]
    fn iqr_bounds_contain_quartiles(values in prop::collection::vec(optional_int(), 1..64)) {
        match IqrBounds::from_values(&values, 1.5) {
            Some(bounds) => {
                prop_assert!(bounds.lower <= bounds.q1);
                prop_assert!(bounds.upper >= bounds.q3);
            }
            None => prop_assert!(values.iter().all(Value::is_null)),
        }
    }

    #[test]
    fn one_row_per_distinct_group(rows in prop::collection::vec((optional_site(), optional_int()), 1..80)) {
        let expected: BTreeSet<String> = rows
            .iter()
            .map(|(site, _)| if site.is_null() { "Missing".to_string() } else { site.to_string() })
            .collect();
        let table = survey_table(rows);
        let def = SummaryDef::new("VegCommunitySurvey", ["Site"])
            .aggregate("Count", vec![AggFunction::Count, AggFunction::Sum]);

        let mut diagnostics = Diagnostics::new();
        let summary = summarize("s", &def, &table, &CardinalityPolicy::default(), &mut diagnostics).unwrap();

        prop_assert_eq!(summary.num_rows(), expected.len());
        prop_assert_eq!(summary.table().num_columns(), 3);
        let keys: Vec<String> = summary
            .table()
            .column("Site")
            .unwrap()
            .values()
            .iter()
            .map(Value::to_string)
            .collect();
        prop_assert_eq!(keys, expected.into_iter().collect::<Vec<_>>());

        let total: i64 = summary
            .table()
            .column("Count\nrecords")
            .unwrap()
            .values()
            .iter()
            .filter_map(Value::as_i64)
            .sum();
        let non_null = table.column("Count").unwrap().values().iter().filter(|v| !v.is_null()).count();
        prop_assert_eq!(total as usize, non_null);
    }

    #[test]
    fn filters_only_remove_rows(rows in prop::collection::vec((optional_site(), optional_int()), 0..60), threshold in -50i64..500) {
        let table = survey_table(rows);
        let spec = FilterSpec::new().predicate("Count", Predicate::GreaterThan(Value::Int(threshold)));

        let mut diagnostics = Diagnostics::new();
        let filtered = apply_filter(&spec, &table, "s", &mut diagnostics);

        prop_assert!(filtered.num_rows() <= table.num_rows());
        prop_assert_eq!(filtered.column_names(), table.column_names());
        for value in filtered.column("Count").unwrap().values() {
            prop_assert!(value.as_i64().is_some_and(|v| v > threshold));
        }
    }

    #[test]
    fn qa_engine_is_idempotent(rows in prop::collection::vec((optional_site(), optional_int()), 1..60)) {
        let table = survey_table(rows);
        let def = SummaryDef::new("VegCommunitySurvey", ["Site"])
            .aggregate("Count", vec![AggFunction::Sum, AggFunction::Max, AggFunction::Count]);

        let mut diagnostics = Diagnostics::new();
        let summary = summarize("s", &def, &table, &CardinalityPolicy::default(), &mut diagnostics).unwrap();
        let engine = QaEngine::default();
        let once = engine.annotate("s", summary, &mut diagnostics).unwrap();
        let twice = engine.annotate("s", once.clone(), &mut diagnostics).unwrap();

        prop_assert_eq!(twice, once);
    }
}
