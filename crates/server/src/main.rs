#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pchat_server::run().await
}
