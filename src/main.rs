#[tokio::main]
async fn main() {
    std::process::exit(publipostage::run().await);
}
