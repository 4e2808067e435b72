#![forbid(unsafe_code)]

use dv_conformance::{HarnessConfig, SuiteOptions, enforce_green, run_fixture_suite_with_options};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut case_filter: Option<String> = None;
    let mut require_green = false;
    let mut json = false;
    let mut relaxed = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--case-filter" => {
                let value = args
                    .next()
                    .ok_or("--case-filter requires a value (e.g. reduction_)")?;
                case_filter = Some(value);
            }
            "--require-green" => {
                require_green = true;
            }
            "--json" => {
                json = true;
            }
            "--relaxed" => {
                relaxed = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    let mut config = HarnessConfig::default_paths();
    config.strict_mode = !relaxed;
    let options = SuiteOptions { case_filter };

    let report = run_fixture_suite_with_options(&config, &options)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "suite={} fixtures={} passed={} failed={} green={}",
            report.suite,
            report.fixture_count,
            report.passed,
            report.failed,
            report.is_green()
        );
        for failure in report.failures() {
            println!(
                "FAIL case={} operation={:?} mismatch={}",
                failure.case_id,
                failure.operation,
                failure.mismatch.as_deref().unwrap_or("<none>")
            );
        }
    }

    if require_green {
        enforce_green(&report)?;
    }
    Ok(())
}

fn print_help() {
    println!(
        "dv-conformance-cli\n\
         Usage:\n\
         \tdv-conformance-cli [--case-filter <prefix>] [--json] [--relaxed] [--require-green]\n\
         Options:\n\
         \t--case-filter <prefix>  Run only cases whose id starts with <prefix>\n\
         \t--json                  Print the full report as JSON\n\
         \t--relaxed               Run strict-mode cases under the hardened policy\n\
         \t--require-green         Exit non-zero when any case fails\n\
         \t-h, --help              Show this help"
    );
}
