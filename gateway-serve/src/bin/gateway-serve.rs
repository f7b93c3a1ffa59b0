//! Standalone entry point: loads config, initializes logging, then runs the
//! WebSocket RPC facade until killed.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    gateway_config::load_and_apply("gateway", None).ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr = std::env::var("GATEWAY_WS_ADDR").ok();
    if let Err(e) = gateway_serve::run_serve(addr.as_deref(), false).await {
        eprintln!("gateway-serve: {e}");
        std::process::exit(1);
    }
    Ok(())
}
