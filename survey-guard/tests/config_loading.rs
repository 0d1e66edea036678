//! Loading pipeline configurations from disk.

use std::io::Write;
use survey_guard::config::{FilterCondition, JoinType, PipelineConfig, Predicate};
use survey_guard::error::QaError;
use survey_guard::table::Value;
use tempfile::NamedTempFile;

const VEGETATION: &str = r#"{
    "joins": {
        "VegCommunitySurvey": {"right": "VegSamplingUnits", "on": ["SamplingUnitID"], "how": "left"},
        "VegSpeciesAbundance": {"right": "VegCommunitySurvey", "on": ["SamplingUnitID"], "how": "full"}
    },
    "summaries": {
        "Plot survey effort": {
            "table": "VegCommunitySurvey",
            "group_by": ["Year", "Month", "SamplePointName"],
            "summary": {
                "SampleDate": ["min", "max"],
                "SamplingUnitID": ["nunique", "count"],
                "SoilMoisture": "count",
                "QuadratPlotID": "count"
            },
            "filter": {"TransectID": "is null", "Year": {">": 2020, "bogus": 1}},
            "note": "Check that every plot was surveyed once per trip."
        },
        "Cover": {
            "table": "VegSpeciesAbundance",
            "group_by": ["SamplingUnitID"],
            "summary": {"TotalCover": "sum"},
            "sum_columns": ["GroundCover", "CanopyCover"],
            "new_column_name": "TotalCover"
        }
    },
    "engine": {
        "cardinality": {"max_groups": 80},
        "qa": {"max_survey_days": 10}
    }
}"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(VEGETATION);
    let config = PipelineConfig::from_json_file(file.path()).unwrap();

    assert_eq!(config.joins.len(), 2);
    assert_eq!(config.joins[1].how, JoinType::Outer);
    assert_eq!(
        config.summaries.keys().collect::<Vec<_>>(),
        vec!["Plot survey effort", "Cover"]
    );
    assert_eq!(config.engine.cardinality.max_groups, 80);
    assert_eq!(config.engine.qa.max_survey_days, 10);
    assert_eq!(config.engine.qa.cover_upper_bound, 101.0);

    let effort = config.summaries.get("Plot survey effort").unwrap();
    assert_eq!(
        effort.summary.keys().collect::<Vec<_>>(),
        vec!["SampleDate", "SamplingUnitID", "SoilMoisture", "QuadratPlotID"]
    );
    assert!(effort.note.is_some());

    let filter = effort.filter.as_ref().unwrap();
    let terms = filter.terms();
    assert_eq!(terms.keys().collect::<Vec<_>>(), vec!["TransectID", "Year"]);
    assert_eq!(terms["TransectID"], FilterCondition::IsNull);
    match &terms["Year"] {
        FilterCondition::Predicates(predicates) => {
            assert!(predicates.contains(&Predicate::GreaterThan(Value::Int(2020))));
            assert!(predicates
                .iter()
                .any(|p| matches!(p, Predicate::Unsupported { operator, .. } if operator == "bogus")));
        }
        other => panic!("unexpected condition {other:?}"),
    }

    let cover = config.summaries.get("Cover").unwrap();
    assert_eq!(cover.derived_sum().map(|(_, name)| name), Some("TotalCover"));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PipelineConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, QaError::Io(_)));
}

#[test]
fn test_bad_join_how_is_rejected() {
    let file = write_config(
        r#"{"joins": {"A": {"right": "B", "on": ["id"], "how": "cross"}}}"#,
    );
    let err = PipelineConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, QaError::Json(_)));
}

#[test]
fn test_half_configured_sum_is_rejected() {
    let file = write_config(
        r#"{"summaries": {"s": {
            "table": "t",
            "group_by": ["g"],
            "summary": {"a": "sum"},
            "sum_columns": ["a", "b"]
        }}}"#,
    );
    let err = PipelineConfig::from_json_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("sum_columns and new_column_name"));
}

#[test]
fn test_empty_document_is_an_empty_pipeline() {
    let config = PipelineConfig::from_json_str("{}").unwrap();
    assert!(config.joins.is_empty());
    assert!(config.summaries.is_empty());
}
