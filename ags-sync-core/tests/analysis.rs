use ags_sync_core::analysis::{AnalysisReport, Issue};
use ags_sync_core::contract::{RawAnalysis, RawIssue, RawLayer};
use tempfile::tempdir;

fn layer(name: &str, long_name: Option<&str>) -> RawLayer {
    RawLayer {
        name: name.into(),
        long_name: long_name.map(str::to_string),
    }
}

#[test]
fn raw_analysis_json_from_the_toolchain_parses() {
    let json = r#"{
        "messages": [],
        "warnings": [
            {"key": ["Layer's data source is not registered", 24011],
             "layers": [{"name": "Parcels", "longName": "Cadastre\\Parcels"}]}
        ]
    }"#;
    let raw: RawAnalysis = serde_json::from_str(json).unwrap();
    assert!(raw.errors.is_empty());
    assert_eq!(raw.warnings[0].key.1, 24011);
}

#[test]
fn normalization_merges_repeated_keys_in_order() {
    let raw = RawAnalysis {
        warnings: vec![
            RawIssue {
                key: ("Missing scale range".into(), 10016),
                layers: vec![layer("Roads", None)],
            },
            RawIssue {
                key: ("Symbol is not supported".into(), 30003),
                layers: vec![],
            },
            RawIssue {
                key: ("Missing scale range".into(), 10016),
                layers: vec![layer("Rivers", Some("Hydro\\Rivers")), layer("Roads", None)],
            },
        ],
        ..Default::default()
    };

    let report = AnalysisReport::from_raw(raw);

    assert_eq!(
        report.warnings,
        vec![
            Issue {
                text: "Missing scale range".into(),
                code: 10016,
                layers: vec!["Roads".into(), "Hydro\\Rivers".into()],
            },
            Issue {
                text: "Symbol is not supported".into(),
                code: 30003,
                layers: vec![],
            },
        ]
    );
    assert!(!report.has_errors());
}

#[test]
fn describe_lists_sections_in_severity_order() {
    let report = AnalysisReport {
        messages: vec![Issue {
            text: "Service will be published".into(),
            code: 1,
            layers: vec![],
        }],
        warnings: vec![],
        errors: vec![Issue {
            text: "Unsupported layer type".into(),
            code: 3,
            layers: vec!["A".into(), "B".into()],
        }],
    };

    assert_eq!(
        report.describe(),
        "MESSAGES:\n  Service will be published (code 1)\nERRORS:\n  Unsupported layer type (code 3)\n    applies to layers: A,B\n"
    );
    assert_eq!(
        report.describe_errors(),
        "  Unsupported layer type (code 3)\n    applies to layers: A,B\n"
    );
}

#[test]
fn cache_survives_a_round_trip_and_ignores_garbage() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("map.issues.json");
    let report = AnalysisReport {
        errors: vec![Issue {
            text: "Broken".into(),
            code: 9,
            layers: vec!["X".into()],
        }],
        ..Default::default()
    };

    report.store(&path);
    assert_eq!(AnalysisReport::load(&path), Some(report));

    std::fs::write(&path, "not json").unwrap();
    assert_eq!(AnalysisReport::load(&path), None);
    assert_eq!(AnalysisReport::load(&dir.path().join("absent.json")), None);
}
