use std::fs;

use dv_conformance::{
    CaseStatus, HarnessConfig, HarnessError, SuiteOptions, enforce_green, run_fixture_suite,
    run_fixture_suite_with_options, run_smoke,
};

#[test]
fn smoke_report_is_stable() {
    let cfg = HarnessConfig::default_paths();
    let report = run_smoke(&cfg);
    assert_eq!(report.suite, "smoke");
    assert!(report.fixture_count >= 1);
    assert!(report.strict_mode);
    assert!(cfg.case_fixture_root().exists());
}

#[test]
fn fixture_suite_is_green() {
    let cfg = HarnessConfig::default_paths();
    let report = run_fixture_suite(&cfg).expect("suite should run");
    let failures: Vec<_> = report
        .failures()
        .map(|failure| (failure.case_id.clone(), failure.mismatch.clone()))
        .collect();
    assert!(failures.is_empty(), "failing cases: {failures:?}");
    assert_eq!(report.passed, report.fixture_count);
    enforce_green(&report).expect("green");
}

#[test]
fn case_filter_selects_by_prefix() {
    let cfg = HarnessConfig::default_paths();
    let options = SuiteOptions {
        case_filter: Some("reduction_".to_owned()),
    };
    let report = run_fixture_suite_with_options(&cfg, &options).expect("suite should run");
    assert_eq!(report.suite, "cases:reduction_");
    assert_eq!(report.fixture_count, 4);
    assert!(
        report
            .results
            .iter()
            .all(|result| result.case_id.starts_with("reduction_"))
    );
}

#[test]
fn hardened_case_records_evidence() {
    let cfg = HarnessConfig::default_paths();
    let options = SuiteOptions {
        case_filter: Some("role_wildcard_empty_roles".to_owned()),
    };
    let report = run_fixture_suite_with_options(&cfg, &options).expect("suite should run");
    assert_eq!(report.fixture_count, 1);
    assert_eq!(report.results[0].evidence_records, 2);
    assert_eq!(report.results[0].status, CaseStatus::Pass);
}

#[test]
fn empty_suite_is_not_green() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = HarnessConfig {
        fixture_root: dir.path().to_path_buf(),
        strict_mode: true,
    };
    let report = run_fixture_suite(&cfg).expect("suite should run");
    assert_eq!(report.fixture_count, 0);
    assert!(!report.is_green());
    assert!(matches!(
        enforce_green(&report),
        Err(HarnessError::NotGreen { fixture_count: 0, .. })
    ));
}

#[test]
fn custom_fixture_root_reports_mismatches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cases = dir.path().join("cases").join("nested");
    fs::create_dir_all(&cases).expect("mkdir");
    fs::write(
        cases.join("wrong_wire.json"),
        r#"{
            "case_id": "wrong_wire",
            "mode": "strict",
            "operation": "reduction_serialize",
            "reduction": {"sample": {"count": 10}},
            "expected_wire": {"Top": {"Count": 10}}
        }"#,
    )
    .expect("write fixture");
    fs::write(cases.join("notes.txt"), "ignored").expect("write note");

    let cfg = HarnessConfig {
        fixture_root: dir.path().to_path_buf(),
        strict_mode: true,
    };
    assert_eq!(run_smoke(&cfg).fixture_count, 1);

    let report = run_fixture_suite(&cfg).expect("suite should run");
    assert_eq!(report.failed, 1);
    let mismatch = report.results[0].mismatch.as_deref().expect("mismatch");
    assert!(mismatch.contains("wire mismatch"), "{mismatch}");
    assert!(mismatch.contains("Sample"), "{mismatch}");
}

#[test]
fn malformed_fixture_names_its_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cases = dir.path().join("cases");
    fs::create_dir_all(&cases).expect("mkdir");
    fs::write(cases.join("broken.json"), "{\"case_id\": 1}").expect("write fixture");

    let cfg = HarnessConfig {
        fixture_root: dir.path().to_path_buf(),
        strict_mode: true,
    };
    let err = run_fixture_suite(&cfg).expect_err("malformed fixture");
    assert!(matches!(err, HarnessError::Fixture { .. }));
    assert!(err.to_string().contains("broken.json"));
}
