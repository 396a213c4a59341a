//! 自定义掉落引擎命令行入口
//!
//! 提供规则检查、模拟、记录查询、过期清理与常驻热更新模式。

use clap::Parser;
use drop_engine::cli::{Cli, CommandRunner, Commands, SimulationOptions};
use drops_shared::config::AppConfig;
use drops_shared::observability;
use tracing::{info, warn};

const SERVICE_NAME: &str = "drop-engine";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 统一加载配置：config/default.toml、环境与服务专属文件，再叠加 DROPS_ 环境变量
    let loaded = match &cli.config_dir {
        Some(dir) => {
            let env = std::env::var("DROPS_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load_from_dir(SERVICE_NAME, &env, dir)
        }
        None => AppConfig::load(SERVICE_NAME),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    if let Commands::Simulate { metrics: true, .. } = &cli.command {
        config.observability.metrics_enabled = true;
    }

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let guard = observability::init(&obs_config)?;

    info!(environment = %config.environment, "Configuration loaded");

    let runner = CommandRunner::new(config);

    match cli.command {
        Commands::Check { rules } => {
            let rules = runner.rules_path(rules);
            runner.run_check(&rules)?;
        }
        Commands::Simulate {
            rules,
            events,
            player,
            permissions,
            global,
            seed,
            tool,
            block,
            y,
            world,
            food,
            item,
            enchants,
            level,
            metrics,
        } => {
            let options = SimulationOptions {
                rules: runner.rules_path(rules),
                events,
                player,
                permissions,
                global,
                seed,
                tool,
                block,
                y,
                world,
                food,
                item,
                enchants,
                level,
            };
            let summary = runner.run_simulate(&options)?;
            runner.print_simulation(&summary);

            if metrics {
                match guard.render_metrics() {
                    Some(text) => println!("\n{}", text),
                    None => warn!("指标记录器未安装"),
                }
            }
        }
        Commands::Logs { player, days } => {
            runner.run_logs(&player, days)?;
        }
        Commands::Sweep { today } => {
            runner.run_sweep(today)?;
        }
        Commands::Watch => {
            runner.run_watch().await?;
        }
    }

    Ok(())
}
