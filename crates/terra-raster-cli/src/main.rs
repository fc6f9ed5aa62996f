mod error;
mod logging;
mod run;
mod settings;

use settings::Settings;
use std::process::ExitCode;

fn main() -> ExitCode {
    let settings = Settings::from_cli();
    logging::setup_logging();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = std::io::stdout().lock();
    match rt.block_on(run::run(settings, &mut stdout)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
