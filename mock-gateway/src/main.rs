use mock_gateway::Gateway;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let account = std::env::var("GATEWAY_ACCOUNT").unwrap_or_else(|_| "user01".to_string());
    let password = std::env::var("GATEWAY_PASSWORD").unwrap_or_else(|_| "password".to_string());

    let gateway = Gateway::new(&account, &password);
    gateway.add_mail("0000000000000000002", "second", "hello again");
    gateway.add_mail("0000000000000000001", "first", "hello");

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, %account, "mock gateway listening");
    mock_gateway::run(listener, gateway).await
}
