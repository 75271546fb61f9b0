//! COM Harness Integration Test Runner
//!
//! Runs every integration test category and prints a summary.
//!
//! USAGE:
//!   cargo run -p integration-tests
//!
//! Or run one category directly:
//!   cargo test -p integration-tests --test scenario_tests
//!   cargo test -p integration-tests --test apartment_tests
//!   cargo test -p integration-tests --test callback_tests

use std::process::Command;
use std::time::{Duration, Instant};

struct TestCategory {
    name: &'static str,
    description: &'static str,
    test_name: &'static str,
}

const TEST_CATEGORIES: &[TestCategory] = &[
    TestCategory {
        name: "Scenarios",
        description: "Built-in scenarios, binding resolution, activation",
        test_name: "scenario_tests",
    },
    TestCategory {
        name: "Apartments",
        description: "STA serialization, MTA concurrency, object placement",
        test_name: "apartment_tests",
    },
    TestCategory {
        name: "Callbacks",
        description: "Server-to-harness calls, reference release, shutdown",
        test_name: "callback_tests",
    },
];

fn print_banner() {
    println!("{}", "=".repeat(80));
    println!("                   COM Client Harness Integration Tests");
    println!("{}", "=".repeat(80));
    println!();
}

fn print_test_categories() {
    println!("Test Categories:");
    println!("{}", "-".repeat(80));
    for (i, cat) in TEST_CATEGORIES.iter().enumerate() {
        println!("  {}. {} - {}", i + 1, cat.name, cat.description);
    }
    println!("{}", "-".repeat(80));
    println!();
}

fn run_test_category(category: &TestCategory) -> (bool, Duration, String) {
    println!("\n{}", "=".repeat(80));
    println!("Running: {}", category.name);
    println!("{}", "=".repeat(80));

    let start = Instant::now();
    let output = Command::new("cargo")
        .args(["test", "-p", "integration-tests", "--test", category.test_name])
        .output();
    let duration = start.elapsed();

    match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stdout.is_empty() {
                println!("{stdout}");
            }
            if !output.status.success() && !stderr.is_empty() {
                eprintln!("{stderr}");
            }

            let success = output.status.success();
            let summary = if success {
                "PASSED".to_string()
            } else {
                format!("FAILED (exit code: {:?})", output.status.code())
            };
            (success, duration, summary)
        }
        Err(e) => (false, duration, format!("Failed to execute: {e}")),
    }
}

fn main() {
    print_banner();
    print_test_categories();

    let total_start = Instant::now();
    let results: Vec<_> = TEST_CATEGORIES
        .iter()
        .map(|category| {
            let (success, duration, summary) = run_test_category(category);
            (category.name, success, duration, summary)
        })
        .collect();
    let total_duration = total_start.elapsed();

    println!("\n{}", "=".repeat(80));
    println!("FINAL SUMMARY");
    println!("{}", "=".repeat(80));

    let passed = results.iter().filter(|(_, s, _, _)| *s).count();
    let failed = results.len() - passed;
    println!("\nCategories: {} | Passed: {} | Failed: {}", results.len(), passed, failed);
    println!("Total Duration: {total_duration:?}");
    println!();

    println!("{:<20} {:<10} {:<15} Details", "Category", "Status", "Duration");
    println!("{}", "-".repeat(80));
    for (name, success, duration, summary) in &results {
        let status = if *success { "PASS" } else { "FAIL" };
        println!("{:<20} {:<10} {:<15?} {}", name, status, duration, summary);
    }
    println!("{}", "=".repeat(80));

    if failed > 0 {
        println!("\nSome tests failed!");
        std::process::exit(1);
    }
    println!("\nAll tests passed!");
}
