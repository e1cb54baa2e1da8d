use std::sync::Arc;

use brokerdesk_api::app::{build_app, services::build_services};
use brokerdesk_api::config::AuthSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    brokerdesk_observability::init();

    let settings = AuthSettings::from_env()?;
    let services = Arc::new(build_services(&settings).await?);
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
