//! CLI 命令定义
//!
//! 使用 clap derive 宏定义命令行接口结构。

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 自定义掉落引擎命令行工具
#[derive(Parser, Debug)]
#[command(name = "drop-engine")]
#[command(version, about = "自定义掉落规则工具")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 配置目录，默认读取 CONFIG_DIR 或 ./config
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// 日志级别，覆盖配置文件中的 observability.log_level
    #[arg(short, long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 编译规则文件并输出统计与警告
    Check {
        /// 规则文件，默认使用配置中的 rules.path
        rules: Option<PathBuf>,
    },

    /// 用合成事件评估规则
    ///
    /// 每类触发各生成 N 个事件，事件之间跳过全部冷却窗口。
    Simulate {
        /// 规则文件，默认使用配置中的 rules.path
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// 每类触发的事件数
        #[arg(short = 'n', long, default_value = "1000")]
        events: usize,

        /// 模拟玩家名
        #[arg(short, long, default_value = "Steve")]
        player: String,

        /// 玩家拥有的权限，可重复
        #[arg(long = "permission")]
        permissions: Vec<String>,

        /// 全局倍率
        #[arg(short, long)]
        global: Option<f64>,

        /// 随机种子，指定后结果可复现
        #[arg(long)]
        seed: Option<u64>,

        /// 挖掘工具
        #[arg(long, default_value = "DIAMOND_PICKAXE")]
        tool: String,

        /// 被挖掘的方块
        #[arg(long, default_value = "STONE")]
        block: String,

        /// 方块高度
        #[arg(long, default_value = "12", allow_hyphen_values = true)]
        y: i32,

        /// 世界名
        #[arg(long, default_value = "world")]
        world: String,

        /// 食用的物品
        #[arg(long, default_value = "GOLDEN_APPLE")]
        food: String,

        /// 被附魔的物品
        #[arg(long, default_value = "DIAMOND_SWORD")]
        item: String,

        /// 附魔名称，可重复
        #[arg(long = "enchant", default_values_t = vec!["sharpness".to_string()])]
        enchants: Vec<String>,

        /// 附魔消耗等级
        #[arg(long, default_value = "30")]
        level: i32,

        /// 结束后输出 Prometheus 格式的指标
        #[arg(long)]
        metrics: bool,
    },

    /// 查询玩家最近的获取记录
    Logs {
        /// 玩家名
        player: String,

        /// 天数（1-30）
        #[arg(short, long, default_value = "1")]
        days: u32,
    },

    /// 执行一次过期记录清理
    Sweep {
        /// 以该日期为今天（YYYY-MM-DD），默认本地日期
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// 常驻运行：规则热更新、定时清理，从标准输入读取管理指令
    Watch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_check() {
        let cli = Cli::try_parse_from(["drop-engine", "check", "rules.yml"]).unwrap();
        match cli.command {
            Commands::Check { rules } => assert_eq!(rules, Some(PathBuf::from("rules.yml"))),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_simulate_defaults() {
        let cli = Cli::try_parse_from(["drop-engine", "simulate"]).unwrap();
        match cli.command {
            Commands::Simulate {
                events,
                player,
                permissions,
                enchants,
                metrics,
                ..
            } => {
                assert_eq!(events, 1000);
                assert_eq!(player, "Steve");
                assert!(permissions.is_empty());
                assert_eq!(enchants, vec!["sharpness".to_string()]);
                assert!(!metrics);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_simulate_repeated_permissions() {
        let cli = Cli::try_parse_from([
            "drop-engine",
            "simulate",
            "-n",
            "10",
            "--permission",
            "cu.drop.120",
            "--permission",
            "cu.drop.150",
            "--y",
            "-20",
            "--metrics",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate {
                events,
                permissions,
                y,
                metrics,
                ..
            } => {
                assert_eq!(events, 10);
                assert_eq!(permissions.len(), 2);
                assert_eq!(y, -20);
                assert!(metrics);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_sweep_date() {
        let cli = Cli::try_parse_from(["drop-engine", "sweep", "--today", "2024-05-01"]).unwrap();
        match cli.command {
            Commands::Sweep { today } => {
                assert_eq!(today, NaiveDate::from_ymd_opt(2024, 5, 1));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        assert!(Cli::try_parse_from(["drop-engine", "sweep", "--today", "yesterday"]).is_err());
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "drop-engine",
            "--config-dir",
            "/etc/drops",
            "-l",
            "debug",
            "logs",
            "Alex",
            "-d",
            "7",
        ])
        .unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/etc/drops")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Logs { days: 7, .. }));
    }
}
