use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nowpay::config::MIN_RECOMMENDED_SECRET_LEN;
use nowpay_ipn_server::config::ServerConfig;
use nowpay_ipn_server::routes;
use nowpay_ipn_server::state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            tracing::error!(
                "Refusing to start — NOWPAYMENTS_IPN_SECRET is required to verify callbacks. \
                 Copy it from the merchant dashboard (Store Settings → IPN secret key)."
            );
            std::process::exit(1);
        }
    };

    if config.secret_is_weak() {
        tracing::warn!(
            "NOWPAYMENTS_IPN_SECRET is only {} bytes (minimum {} recommended) — \
             check it was copied in full",
            config.ipn_secret.len(),
            MIN_RECOMMENDED_SECRET_LEN
        );
    }

    let state = web::Data::new(AppState::from_config(&config));
    let port = config.port;
    let rate_limit_rpm = config.rate_limit_rpm;

    tracing::info!("NOWPayments IPN receiver listening on port {port}");
    tracing::info!(mode = %config.signature_mode, "Signature mode");
    tracing::info!("Rate limit: {rate_limit_rpm} req/min per IP");
    tracing::info!("  POST http://localhost:{port}/webhooks/nowpayments");

    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm)
        .finish()
    {
        Some(conf) => conf,
        None => {
            tracing::error!("invalid rate limiter configuration");
            std::process::exit(1);
        }
    };

    HttpServer::new(move || {
        App::new()
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(65_536))
            .service(routes::health)
            .service(routes::metrics_endpoint)
            .service(routes::ipn_callback)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
