//! Persisted result artifacts: after a run, the outcome is written as two
//! tabular files, one of delivered addresses and one of failures with their
//! error message.

use std::path::Path;

use crate::domain::SendResult;

pub fn write_reports(
    results: &[SendResult],
    sent_path: &Path,
    failed_path: &Path,
) -> Result<(), csv::Error> {
    let mut sent = csv::Writer::from_path(sent_path)?;
    sent.write_record(["email"])?;
    for r in results.iter().filter(|r| r.success) {
        sent.write_record([r.email.as_str()])?;
    }
    sent.flush()?;

    let mut failed = csv::Writer::from_path(failed_path)?;
    failed.write_record(["email", "error"])?;
    for r in results.iter().filter(|r| !r.success) {
        failed.write_record([r.email.as_str(), r.error.as_deref().unwrap_or("unknown error")])?;
    }
    failed.flush()?;

    Ok(())
}
