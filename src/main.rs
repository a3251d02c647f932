#[tokio::main]
async fn main() {
    to4ka::start_server().await;
}
