//! 奖励动作执行器
//!
//! 动作字符串按字面前缀解析：
//!
//! | 前缀 | 效果 |
//! |---|---|
//! | `[CMD]` | 控制台指令 |
//! | `[BD]` | 全服广播 |
//! | `[TITLE]` | `fadeIn;stay;fadeOut;title;subtitle`，必须正好 5 段 |
//! | `[ACTION]` | 动作栏 |
//! | 无前缀 | 聊天消息 |
//!
//! 单个动作失败只记录告警，不影响后续动作。

use crate::error::{DropError, Result};
use crate::host::{AcquisitionLog, Presenter, Title};
use crate::models::{Actor, TriggerKind};
use crate::snapshot::DropRule;
use drops_shared::observability::metrics as drop_metrics;
use std::sync::Arc;
use tracing::{debug, warn};

const CMD_PREFIX: &str = "[CMD]";
const BROADCAST_PREFIX: &str = "[BD]";
const TITLE_PREFIX: &str = "[TITLE]";
const ACTION_BAR_PREFIX: &str = "[ACTION]";

const TITLE_FIELDS: usize = 5;

/// 解析后的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardAction<'a> {
    Command(&'a str),
    Broadcast(&'a str),
    Title(&'a str),
    ActionBar(&'a str),
    Chat(&'a str),
}

impl<'a> RewardAction<'a> {
    pub fn parse(raw: &'a str) -> Self {
        if let Some(payload) = raw.strip_prefix(CMD_PREFIX) {
            Self::Command(payload)
        } else if let Some(payload) = raw.strip_prefix(BROADCAST_PREFIX) {
            Self::Broadcast(payload)
        } else if let Some(payload) = raw.strip_prefix(TITLE_PREFIX) {
            Self::Title(payload)
        } else if let Some(payload) = raw.strip_prefix(ACTION_BAR_PREFIX) {
            Self::ActionBar(payload)
        } else {
            Self::Chat(raw)
        }
    }

    /// 指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Broadcast(_) => "broadcast",
            Self::Title(_) => "title",
            Self::ActionBar(_) => "action_bar",
            Self::Chat(_) => "chat",
        }
    }
}

/// 替换 `%player%` 与 `%world%`
pub fn apply_placeholders(text: &str, actor: &Actor) -> String {
    text.replace("%player%", &actor.name)
        .replace("%world%", &actor.world)
}

fn is_color_code(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}

/// `&` 颜色代码转换为 `§`
pub fn translate_colors(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(&next) if c == '&' && is_color_code(next) => {
                out.push('§');
                out.push(next.to_ascii_lowercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// 去掉 `&` 与 `§` 颜色代码
pub fn strip_colors(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(&next) if (c == '&' || c == '§') && is_color_code(next) => {
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// 日志中的物品名：第一个无前缀的非空动作（去色），否则用掉落名
pub fn item_label(drop: &DropRule) -> String {
    drop.actions
        .iter()
        .find(|a| !a.is_empty() && !a.starts_with('['))
        .map(|a| strip_colors(a))
        .filter(|label| !label.trim().is_empty())
        .unwrap_or_else(|| drop.name.clone())
}

/// 解析标题动作；段数不是 5 时返回 `Ok(None)`
pub fn parse_title(payload: &str, actor: &Actor) -> Result<Option<Title>> {
    let fields: Vec<&str> = payload.split(';').collect();
    if fields.len() != TITLE_FIELDS {
        return Ok(None);
    }

    let timing = |i: usize, name: &str| -> Result<i32> {
        fields[i].trim().parse::<i32>().map_err(|_| {
            DropError::Presentation(format!("标题 {} 不是整数: '{}'", name, fields[i]))
        })
    };

    Ok(Some(Title {
        fade_in: timing(0, "fadeIn")?,
        stay: timing(1, "stay")?,
        fade_out: timing(2, "fadeOut")?,
        title: translate_colors(&apply_placeholders(fields[3], actor)),
        subtitle: translate_colors(&apply_placeholders(fields[4], actor)),
    }))
}

/// 一次执行的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct ActionExecutor {
    presenter: Arc<dyn Presenter>,
    log: Arc<dyn AcquisitionLog>,
}

impl ActionExecutor {
    pub fn new(presenter: Arc<dyn Presenter>, log: Arc<dyn AcquisitionLog>) -> Self {
        Self { presenter, log }
    }

    /// 记录获取并依次执行掉落的全部动作
    pub fn execute(&self, actor: &Actor, drop: &DropRule, kind: TriggerKind) -> ExecutionReport {
        let label = item_label(drop);
        self.log.record(actor, &label, kind.label());

        let mut report = ExecutionReport::default();
        for raw in &drop.actions {
            let action = RewardAction::parse(raw);
            match self.run(actor, &action) {
                Ok(true) => report.executed += 1,
                Ok(false) => {
                    report.skipped += 1;
                    warn!(
                        player = %actor.name,
                        drop = %drop.name,
                        action = %raw,
                        "标题动作需要 5 个字段，已跳过"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    drop_metrics::record_action_failure(action.kind());
                    warn!(
                        player = %actor.name,
                        drop = %drop.name,
                        action = %raw,
                        code = e.code(),
                        error = %e,
                        "执行动作失败"
                    );
                }
            }
        }

        debug!(
            player = %actor.name,
            drop = %drop.name,
            executed = report.executed,
            failed = report.failed,
            "奖励动作执行完成"
        );
        report
    }

    /// 返回 `Ok(false)` 表示动作被跳过
    fn run(&self, actor: &Actor, action: &RewardAction<'_>) -> Result<bool> {
        match action {
            RewardAction::Command(payload) => {
                // 指令原样交给控制台，不做颜色转换
                let command = apply_placeholders(payload, actor);
                self.presenter.dispatch_command(command.trim_start())?;
            }
            RewardAction::Broadcast(payload) => {
                let message = translate_colors(&apply_placeholders(payload, actor));
                self.presenter.broadcast(&message)?;
            }
            RewardAction::Title(payload) => match parse_title(payload, actor)? {
                Some(title) => self.presenter.send_title(actor, &title)?,
                None => return Ok(false),
            },
            RewardAction::ActionBar(payload) => {
                let message = translate_colors(&apply_placeholders(payload, actor));
                self.presenter.send_action_bar(actor, &message)?;
            }
            RewardAction::Chat(payload) => {
                let message = translate_colors(&apply_placeholders(payload, actor));
                self.presenter.send_message(actor, &message)?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MockAcquisitionLog, MockPresenter};
    use uuid::Uuid;

    fn steve() -> Actor {
        Actor::new(Uuid::new_v4(), "Steve", "world_nether")
    }

    fn drop_with(actions: &[&str]) -> DropRule {
        DropRule {
            name: "diamond".to_string(),
            base_chance: 0.5,
            actions: actions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn quiet_log() -> MockAcquisitionLog {
        let mut log = MockAcquisitionLog::new();
        log.expect_record().return_const(());
        log
    }

    #[test]
    fn test_parse_prefixes() {
        assert_eq!(
            RewardAction::parse("[CMD]give %player% diamond"),
            RewardAction::Command("give %player% diamond")
        );
        assert_eq!(RewardAction::parse("[BD]hi"), RewardAction::Broadcast("hi"));
        assert_eq!(
            RewardAction::parse("[TITLE]1;2;3;a;b"),
            RewardAction::Title("1;2;3;a;b")
        );
        assert_eq!(RewardAction::parse("[ACTION]bar"), RewardAction::ActionBar("bar"));
        assert_eq!(RewardAction::parse("[cmd]x"), RewardAction::Chat("[cmd]x"));
        assert_eq!(RewardAction::parse("hello"), RewardAction::Chat("hello"));
    }

    #[test]
    fn test_colors() {
        assert_eq!(translate_colors("&a绿色&Lbold & done"), "§a绿色§lbold & done");
        assert_eq!(strip_colors("&b钻石§r!"), "钻石!");
        assert_eq!(strip_colors("a&"), "a&");
    }

    #[test]
    fn test_item_label() {
        let drop = drop_with(&["[CMD]give", "", "&b稀有钻石", "second"]);
        assert_eq!(item_label(&drop), "稀有钻石");

        let drop = drop_with(&["[CMD]give", "[BD]x"]);
        assert_eq!(item_label(&drop), "diamond");
    }

    #[test]
    fn test_parse_title_field_count() {
        let actor = steve();
        assert!(parse_title("10;70;20;hi", &actor).unwrap().is_none());
        assert!(parse_title("10;70;20;hi;sub;extra", &actor).unwrap().is_none());

        let title = parse_title("10;70;20;&e%player%;在 %world%", &actor)
            .unwrap()
            .unwrap();
        assert_eq!(title.fade_in, 10);
        assert_eq!(title.stay, 70);
        assert_eq!(title.fade_out, 20);
        assert_eq!(title.title, "§eSteve");
        assert_eq!(title.subtitle, "在 world_nether");
    }

    #[test]
    fn test_parse_title_non_numeric() {
        let err = parse_title("a;70;20;t;s", &steve()).unwrap_err();
        assert!(matches!(err, DropError::Presentation(_)));
    }

    #[test]
    fn test_execute_all_kinds() {
        let actor = steve();
        let mut presenter = MockPresenter::new();
        presenter
            .expect_dispatch_command()
            .withf(|cmd| cmd == "give Steve diamond 1")
            .times(1)
            .returning(|_| Ok(()));
        presenter
            .expect_broadcast()
            .withf(|msg| msg == "§6Steve 挖到了钻石")
            .times(1)
            .returning(|_| Ok(()));
        presenter
            .expect_send_title()
            .times(1)
            .returning(|_, _| Ok(()));
        presenter
            .expect_send_action_bar()
            .withf(|_, msg| msg == "world_nether")
            .times(1)
            .returning(|_, _| Ok(()));
        presenter
            .expect_send_message()
            .withf(|_, msg| msg == "§b钻石")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut log = MockAcquisitionLog::new();
        log.expect_record()
            .withf(|a, label, source| a.name == "Steve" && label == "钻石" && source == "挖矿")
            .times(1)
            .return_const(());

        let executor = ActionExecutor::new(Arc::new(presenter), Arc::new(log));
        let drop = drop_with(&[
            "[CMD]give %player% diamond 1",
            "[BD]&6%player% 挖到了钻石",
            "[TITLE]10;70;20;恭喜;%player%",
            "[ACTION]%world%",
            "&b钻石",
        ]);

        let report = executor.execute(&actor, &drop, TriggerKind::BlockBreak);
        assert_eq!(report.executed, 5);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_failed_action_does_not_abort_rest() {
        let mut presenter = MockPresenter::new();
        presenter
            .expect_dispatch_command()
            .times(1)
            .returning(|_| Err(DropError::Presentation("console offline".into())));
        presenter.expect_send_title().never();
        presenter
            .expect_send_message()
            .times(1)
            .returning(|_, _| Ok(()));

        let executor = ActionExecutor::new(Arc::new(presenter), Arc::new(quiet_log()));
        let drop = drop_with(&[
            "[CMD]broken",
            "[TITLE]x;70;20;t;s",
            "[TITLE]only;three;fields",
            "still delivered",
        ]);

        let report = executor.execute(&steve(), &drop, TriggerKind::Fishing);
        assert_eq!(
            report,
            ExecutionReport {
                executed: 1,
                skipped: 1,
                failed: 2
            }
        );
    }

    #[test]
    fn test_command_keeps_ampersand() {
        let mut presenter = MockPresenter::new();
        presenter
            .expect_dispatch_command()
            .withf(|cmd| cmd == "say &aSteve")
            .times(1)
            .returning(|_| Ok(()));
        let executor = ActionExecutor::new(Arc::new(presenter), Arc::new(quiet_log()));
        executor.execute(&steve(), &drop_with(&["[CMD] say &a%player%"]), TriggerKind::Enchant);
    }
}
