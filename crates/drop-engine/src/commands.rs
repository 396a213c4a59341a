//! 管理与玩家指令
//!
//! 指令层只做参数解析和回复文本组装，状态变更全部委托给 [`DropEngine`]。
//! 参数错误返回失败回复，不改变任何状态。

use crate::engine::DropEngine;
use crate::executor::translate_colors;
use crate::host::Title;
use crate::models::Actor;
use drops_shared::observability::metrics as drop_metrics;
use std::sync::Arc;
use tracing::{info, warn};

/// 最近记录查询的天数上限
pub const MAX_LOG_DAYS: u32 = 30;

const TITLE_FADE_IN: i32 = 10;
const TITLE_STAY: i32 = 70;
const TITLE_FADE_OUT: i32 = 20;

/// 指令回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub success: bool,
    pub lines: Vec<String>,
}

impl CommandReply {
    fn ok(lines: Vec<String>) -> Self {
        Self {
            success: true,
            lines,
        }
    }

    fn fail(line: impl Into<String>) -> Self {
        Self {
            success: false,
            lines: vec![line.into()],
        }
    }
}

/// 倍率显示为 `2.0`、`1.5` 的形式
pub fn format_multiplier(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

pub struct CommandService {
    engine: Arc<DropEngine>,
}

impl CommandService {
    pub fn new(engine: Arc<DropEngine>) -> Self {
        Self { engine }
    }

    /// 按子命令分发；`sender` 为 `None` 表示控制台
    pub fn dispatch(&self, sender: Option<&Actor>, args: &[&str]) -> CommandReply {
        match args.first().copied() {
            Some("reload") => self.reload(),
            Some("ip") => self.set_global_multiplier(args.get(1).copied().unwrap_or("")),
            Some("mylogs") => match sender {
                Some(actor) => self.recent_acquisitions(actor, args.get(1).copied()),
                None => CommandReply::fail("只有玩家可以使用此命令!"),
            },
            Some("mybonus") => match sender {
                Some(actor) => self.personal_bonus(actor),
                None => CommandReply::fail("只有玩家可以使用此命令!"),
            },
            _ => self.help(),
        }
    }

    /// 重新读取规则文件
    pub fn reload(&self) -> CommandReply {
        match self.engine.reload() {
            Ok(outcome) => {
                let mut lines = vec![
                    "配置已重新加载!".to_string(),
                    outcome.counts.to_string(),
                ];
                if !outcome.warnings.is_empty() {
                    lines.push(format!("配置警告 {} 条:", outcome.warnings.len()));
                    lines.extend(outcome.warnings.iter().map(|w| format!("  - {}", w)));
                }
                CommandReply::ok(lines)
            }
            Err(e) => CommandReply::fail(format!("重载配置失败: {}", e)),
        }
    }

    /// 设置全局倍率并向全服展示标题
    pub fn set_global_multiplier(&self, arg: &str) -> CommandReply {
        let arg = arg.trim();
        if arg.is_empty() {
            return CommandReply::fail("用法: /ip <倍率>");
        }
        let Ok(value) = arg.parse::<f64>() else {
            return CommandReply::fail(format!("无效的概率值: {}", arg));
        };

        let snapshot = match self.engine.set_global_multiplier(value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(arg = %arg, error = %e, "拒绝设置全局倍率");
                return CommandReply::fail(format!("无效的概率值: {}", arg));
            }
        };

        let amount = format_multiplier(value);
        let title = Title {
            fade_in: TITLE_FADE_IN,
            stay: TITLE_STAY,
            fade_out: TITLE_FADE_OUT,
            title: translate_colors(&snapshot.messages.title.replace("%amount%", &amount)),
            subtitle: translate_colors(
                &snapshot
                    .messages
                    .subtitle
                    .replace("%now%", &amount)
                    .replace("%basic%", "1.0")
                    .replace("%total%", &amount),
            ),
        };
        if let Err(e) = self.engine.presenter().broadcast_title(&title) {
            drop_metrics::record_action_failure("title");
            warn!(error = %e, "全局倍率标题广播失败");
        }

        info!(global_multiplier = value, "全局倍率已通过指令更新");
        CommandReply::ok(vec![format!("全局概率倍率已设置为: {}", amount)])
    }

    /// 玩家的加成权限与倍率
    pub fn personal_bonus(&self, actor: &Actor) -> CommandReply {
        let permissions = self.engine.bonus_permissions(actor);
        let multiplier = self.engine.player_multiplier(actor);
        let nodes = if permissions.is_empty() {
            "无".to_string()
        } else {
            permissions
                .iter()
                .map(|p| p.node.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let percent = (multiplier * 100.0).round() as i64;

        CommandReply::ok(vec![
            "===== 您的概率加成信息 =====".to_string(),
            format!("加成权限: {}", nodes),
            format!("加成百分比: {}%", percent),
            format!("加成倍率: {}", format_multiplier(multiplier)),
            "========================".to_string(),
        ])
    }

    /// 最近 N 天的获取记录，默认 1 天
    pub fn recent_acquisitions(&self, actor: &Actor, arg: Option<&str>) -> CommandReply {
        let days = match arg.map(str::trim).filter(|a| !a.is_empty()) {
            None => 1,
            Some(raw) => match raw.parse::<i64>() {
                Ok(days) if (1..=i64::from(MAX_LOG_DAYS)).contains(&days) => days as u32,
                Ok(_) => {
                    return CommandReply::fail(format!("天数必须在1-{}之间", MAX_LOG_DAYS));
                }
                Err(_) => return CommandReply::fail(format!("无效的天数: {}", raw)),
            },
        };

        let entries = match self.engine.acquisition_log().recent(&actor.name, days) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(player = %actor.name, error = %e, "查询获取记录失败");
                return CommandReply::fail("查询获取记录失败，请联系管理员");
            }
        };

        if entries.is_empty() {
            return CommandReply::ok(vec![format!("最近{}天内没有获取物品的记录", days)]);
        }

        let mut lines = Vec::with_capacity(entries.len() + 3);
        lines.push(format!("===== 物品获取记录 ({}天内) =====", days));
        lines.extend(
            entries
                .iter()
                .map(|e| format!("{}: {}", e.timestamp_label, e.text)),
        );
        lines.push("===============================".to_string());
        lines.push(format!("共找到 {} 条记录", entries.len()));
        CommandReply::ok(lines)
    }

    pub fn help(&self) -> CommandReply {
        CommandReply::ok(
            [
                "===== CustomDrops 帮助 =====",
                "/customdrop reload - 重新加载配置",
                "/customdrop ip <倍率> - 设置全局概率倍率",
                "/customdrop mylogs [天数] - 查看物品获取记录",
                "/customdrop mybonus - 查看概率加成信息",
                "========================",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        MemoryAcquisitionLog, Presented, RecordingPresenter, StaticPermissions, actor,
    };
    use chrono::{NaiveDate, NaiveTime};
    use std::io::Write;

    struct Fixture {
        service: CommandService,
        engine: Arc<DropEngine>,
        presenter: Arc<RecordingPresenter>,
        log: Arc<MemoryAcquisitionLog>,
        rules_file: tempfile::NamedTempFile,
    }

    fn fixture(rules: &str) -> Fixture {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(rules.as_bytes()).unwrap();

        let presenter = Arc::new(RecordingPresenter::new());
        let log = Arc::new(MemoryAcquisitionLog::new());
        let permissions = StaticPermissions::new().with("Steve", &["cu.drop.120", "cu.drop.150", "other.perm"]);
        let engine = Arc::new(
            DropEngine::builder()
                .presenter(presenter.clone())
                .permissions(Arc::new(permissions))
                .acquisition_log(log.clone())
                .rules_path(file.path())
                .build()
                .unwrap(),
        );
        Fixture {
            service: CommandService::new(Arc::clone(&engine)),
            engine,
            presenter,
            log,
            rules_file: file,
        }
    }

    const RULES: &str = r#"
global:
  message:
    title: "&6全局 x%amount%"
    sub-title: "当前 %now% 基础 %basic% 全局 %total%"
fishing:
  treasure:
    chance: 5
"#;

    #[test]
    fn test_reload_reports_counts_and_warnings() {
        let f = fixture(&format!("{}\nenchant:\n  bad:\n    item-pattern: \"[\"\n", RULES));
        let reply = f.service.reload();
        assert!(reply.success);
        assert_eq!(reply.lines[0], "配置已重新加载!");
        assert!(reply.lines[1].contains("钓鱼 1 个"));
        assert!(reply.lines.iter().any(|l| l.starts_with("配置警告")));
    }

    #[test]
    fn test_reload_parse_error_keeps_state() {
        let f = fixture(RULES);
        assert!(f.service.reload().success);
        let generation = f.engine.snapshot().generation;

        std::fs::write(f.rules_file.path(), "fishing: [broken").unwrap();
        let reply = f.service.reload();
        assert!(!reply.success);
        assert!(reply.lines[0].starts_with("重载配置失败"));
        assert_eq!(f.engine.snapshot().generation, generation);
    }

    #[test]
    fn test_set_global_multiplier_broadcasts_title() {
        let f = fixture(RULES);
        f.service.reload();

        let reply = f.service.set_global_multiplier("2");
        assert!(reply.success);
        assert_eq!(reply.lines, vec!["全局概率倍率已设置为: 2.0".to_string()]);
        assert_eq!(f.engine.snapshot().global_multiplier, 2.0);

        let calls = f.presenter.calls();
        let Some(Presented::BroadcastTitle(title)) = calls.last() else {
            panic!("expected a broadcast title, got {:?}", calls);
        };
        assert_eq!(title.title, "§6全局 x2.0");
        assert_eq!(title.subtitle, "当前 2.0 基础 1.0 全局 2.0");
    }

    #[test]
    fn test_set_global_multiplier_rejects_bad_input() {
        let f = fixture(RULES);
        for bad in ["abc", "-1", "NaN", "inf", ""] {
            let reply = f.service.set_global_multiplier(bad);
            assert!(!reply.success, "{} should be rejected", bad);
        }
        assert_eq!(f.engine.snapshot().global_multiplier, 1.0);
        assert!(f.presenter.calls().is_empty());
    }

    #[test]
    fn test_personal_bonus() {
        let f = fixture(RULES);
        let reply = f.service.personal_bonus(&actor("Steve"));
        assert_eq!(reply.lines[1], "加成权限: cu.drop.120, cu.drop.150");
        assert_eq!(reply.lines[2], "加成百分比: 150%");
        assert_eq!(reply.lines[3], "加成倍率: 1.5");

        let reply = f.service.personal_bonus(&actor("Alex"));
        assert_eq!(reply.lines[1], "加成权限: 无");
        assert_eq!(reply.lines[3], "加成倍率: 0.0");
    }

    #[test]
    fn test_recent_acquisitions_arguments() {
        let f = fixture(RULES);
        let steve = actor("Steve");
        for bad in ["0", "31", "-3", "abc"] {
            assert!(!f.service.recent_acquisitions(&steve, Some(bad)).success);
        }

        let reply = f.service.recent_acquisitions(&steve, None);
        assert!(reply.success);
        assert_eq!(reply.lines, vec!["最近1天内没有获取物品的记录".to_string()]);
    }

    #[test]
    fn test_recent_acquisitions_lists_entries() {
        let f = fixture(RULES);
        let today = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();
        f.log.set_today(today);
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        f.log.record_at("Steve", "钻石", "挖矿", today.and_time(time));
        f.log.record_at(
            "Steve",
            "宝藏",
            "钓鱼",
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap().and_time(time),
        );

        let reply = f.service.recent_acquisitions(&actor("Steve"), Some("7"));
        assert!(reply.success);
        assert_eq!(reply.lines[0], "===== 物品获取记录 (7天内) =====");
        assert_eq!(reply.lines[1], "2024-05-07 09:30:00: 钻石(挖矿)");
        assert_eq!(reply.lines[2], "2024-05-02 09:30:00: 宝藏(钓鱼)");
        assert_eq!(reply.lines.last().unwrap(), "共找到 2 条记录");
    }

    #[test]
    fn test_dispatch_routes_subcommands() {
        let f = fixture(RULES);
        assert!(f.service.dispatch(None, &["reload"]).success);
        assert!(!f.service.dispatch(None, &["mylogs"]).success);
        assert!(!f.service.dispatch(None, &["ip"]).success);
        assert_eq!(f.service.dispatch(None, &[]), f.service.help());
        assert!(f.service.dispatch(Some(&actor("Steve")), &["mybonus"]).success);
    }

    #[test]
    fn test_format_multiplier() {
        assert_eq!(format_multiplier(1.0), "1.0");
        assert_eq!(format_multiplier(2.5), "2.5");
        assert_eq!(format_multiplier(0.0), "0.0");
    }
}
