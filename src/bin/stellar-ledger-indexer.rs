use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match stellar_ledger_indexer::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "indexer exited with an error");
            ExitCode::FAILURE
        }
    }
}
