use nightfall::config::db::DbProfile;
use nightfall::config::engine::EngineConfig;
use nightfall::infra::state::build_engine;
use nightfall::ingress;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

mod telemetry;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    // Environment variables must be set by the runtime environment:
    // - Docker: Set via docker-compose env_file or docker run --env-file
    // - Local dev: Source env files manually (e.g., set -a; . ./.env; set +a)
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid engine configuration: {e}");
            std::process::exit(1);
        }
    };

    let engine = match build_engine()
        .with_config(config)
        .with_db(DbProfile::Prod)
        .build()
        .await
    {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("❌ Failed to build engine: {e}");
            std::process::exit(1);
        }
    };

    match engine.init().await {
        Ok(recovery) => eprintln!(
            "✅ Engine ready ({} sessions restored, {} skipped)",
            recovery.restored.len(),
            recovery.skipped.len()
        ),
        Err(e) => {
            eprintln!("❌ Failed to recover sessions: {e}");
            std::process::exit(1);
        }
    }
    engine.spawn_monitor();

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    if let Err(e) = ingress::serve(&engine, stdin, stdout, shutdown).await {
        eprintln!("❌ Ingress stopped: {e}");
    }
    engine.shutdown().await;
}
