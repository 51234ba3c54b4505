use otlp_ingress::core::IngressApp;

#[tokio::main]
async fn main() {
    if let Err(e) = IngressApp::run().await {
        eprintln!("\nError: {}\n", e);
        std::process::exit(1);
    }
}
