#[tokio::main]
async fn main() -> anyhow::Result<()> {
    virtual_drive_lib::run().await
}
