#[tokio::main]
async fn main() -> eyre::Result<()> {
    dispatch_worker::run().await
}
