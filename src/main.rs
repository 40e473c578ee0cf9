mod app;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod observations;
mod seed;
mod state;
mod storage;
mod uploads;

#[cfg(test)]
mod test_support;

use rand::{rngs::StdRng, SeedableRng};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "climbermap=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = state::AppState::init().await?;

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("seed") {
        let count = seed::parse_count(args.next().as_deref())?;
        let mut rng = StdRng::from_entropy();
        seed::seed_demo(state.users.as_ref(), state.observations.as_ref(), count, &mut rng)
            .await?;
        return Ok(());
    }

    let app = app::build_app(state);
    app::serve(app).await
}
