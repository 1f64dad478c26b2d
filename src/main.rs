//! Verification engine server binary.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vproof_engine::server::run().await
}
