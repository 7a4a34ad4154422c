use anyhow::Result;
use clap::Parser;

use holdfast_core::config::HoldfastConfig;
use holdfast_daemon::cli::DaemonCli;
use holdfast_daemon::logging;
use holdfast_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드 — 파일이 없으면 기본값으로 동작
    let mut config = if cli.config.exists() {
        HoldfastConfig::load(&cli.config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?
    } else {
        let mut config = HoldfastConfig::default();
        config.apply_env_overrides();
        config
    };

    // CLI 오버라이드 (설정 파일과 환경변수보다 우선)
    if let Some(log_level) = cli.log_level {
        config.general.log_level = log_level;
    }
    if let Some(log_format) = cli.log_format {
        config.general.log_format = log_format;
    }
    if let Some(pid_file) = cli.pid_file {
        config.general.pid_file = pid_file;
    }
    if cli.dry_run {
        config.engine.dry_run = true;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    // --validate: 요약 출력 후 종료
    if cli.validate {
        let resolved = config.resolve_engine();
        println!("Configuration valid: {}", cli.config.display());
        println!(
            "  Receiver: {}:{}",
            config.receiver.listen_addr, config.receiver.port
        );
        println!("  Policy count: {}", resolved.policies.len());
        println!("  Dry run: {}", resolved.dry_run);
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    if config.engine.dry_run {
        tracing::warn!("running in dry-run mode - no actions will be executed");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "holdfast-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("holdfast-daemon shut down");
    Ok(())
}
