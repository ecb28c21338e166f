//! `nfcd` daemon entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    match nfcd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(target: "nfcd::process", %error, "daemon exited with error");
            ExitCode::FAILURE
        }
    }
}
