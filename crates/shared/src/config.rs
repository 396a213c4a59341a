//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。
//! 这里只包含服务级设置（冷却窗口、日志目录、可观测性等），
//! 掉落规则本身放在独立的 YAML 规则文件中，由 drop-engine 编译。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 规则文件配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 规则文件路径（YAML）
    pub path: PathBuf,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config/rules.yml"),
        }
    }
}

/// 引擎运行参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 全局防刷冷却（所有触发源共享），毫秒
    pub reward_cooldown_ms: u64,
    /// 挖掘事件自身的去重窗口，毫秒
    pub break_cooldown_ms: u64,
    /// 加成权限前缀，形如 `cu.drop.150`
    pub bonus_permission_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reward_cooldown_ms: 5000,
            break_cooldown_ms: 200,
            bonus_permission_namespace: "cu.drop".to_string(),
        }
    }
}

/// 玩家获取记录存储配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogStoreConfig {
    /// 日志根目录，按 年/月/日 分目录
    pub dir: PathBuf,
    /// 保留天数，<= 0 表示不清理
    pub retention_days: i64,
    /// 清理任务间隔（小时）
    pub sweep_interval_hours: u64,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/player_logs"),
            retention_days: 30,
            sweep_interval_hours: 24,
        }
    }
}

/// 规则文件热更新配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    /// debounce 窗口，避免编辑器连续写入触发多次重载
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub rules: RulesConfig,
    pub engine: EngineConfig,
    pub log_store: LogStoreConfig,
    pub watch: WatchConfig,
    pub observability: crate::observability::ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "drop-engine".to_string(),
            environment: "development".to_string(),
            rules: RulesConfig::default(),
            engine: EngineConfig::default(),
            log_store: LogStoreConfig::default(),
            watch: WatchConfig::default(),
            observability: Default::default(),
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（DROPS_ 前缀，双下划线分隔层级，如 DROPS_ENGINE__REWARD_COOLDOWN_MS）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("DROPS_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from_dir(service_name, &env, Path::new(&config_dir))
    }

    /// 从指定目录加载（测试与 CLI `--config-dir` 使用）
    pub fn load_from_dir(
        service_name: &str,
        env: &str,
        config_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix("DROPS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
