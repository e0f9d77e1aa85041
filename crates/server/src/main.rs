#[tokio::main]
async fn main() -> anyhow::Result<()> {
    groundrag_server::start().await
}
