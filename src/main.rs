#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sagebot_lib::run().await
}
