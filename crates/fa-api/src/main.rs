#[tokio::main]
async fn main() {
    if let Err(err) = fa_api::run().await {
        tracing::error!(error = %err, "fa-api exited with error");
        eprintln!("fa-api: {err}");
        std::process::exit(1);
    }
}
