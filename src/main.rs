use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::error::Error;

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rtracker=info,rocket=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    rtracker::build(rocket::Config::figment()).launch().await?;

    Ok(())
}
