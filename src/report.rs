//! Result reporting collaborators.
//!
//! Pure notification sinks: the driver pushes one success report or one
//! failure message per run and consumes nothing back.

use crate::driver::RunReport;

pub trait Reporter {
    fn report_success(&self, report: &RunReport);
    fn report_failure(&self, message: &str, errno: Option<i32>);
}

/// Human-readable output in the classic "Result / Time Taken" shape.
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report_success(&self, report: &RunReport) {
        println!("Result: {}", report.result);
        println!("Time Taken: {}", report.duration_us);
    }

    fn report_failure(&self, message: &str, errno: Option<i32>) {
        match errno {
            Some(code) => eprintln!("{}\nLast error: {}", message, code),
            None => eprintln!("{}", message),
        }
    }
}

/// Machine-readable output, one JSON object per run.
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report_success(&self, report: &RunReport) {
        if let Ok(line) = serde_json::to_string(report) {
            println!("{}", line);
        }
    }

    fn report_failure(&self, message: &str, errno: Option<i32>) {
        let line = serde_json::json!({ "error": message, "errno": errno });
        eprintln!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_report_serializes() {
        let report = RunReport {
            result: 42,
            duration_us: 17,
            region_size: 40960,
            bytes_written: 40906,
            body_repetitions: 294,
            pinned_core: Some(0),
        };
        let line = serde_json::to_string(&report).unwrap();
        assert!(line.contains("\"result\":42"));
        assert!(line.contains("\"duration_us\":17"));
    }
}
