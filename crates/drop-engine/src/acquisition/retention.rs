use crate::error::Result;
use chrono::{Days, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// 一次清理的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 删除的日目录
    pub removed_days: Vec<NaiveDate>,
    /// 删除的空月/年目录数
    pub pruned_dirs: usize,
}

/// 获取记录保留期清理
///
/// 依据目录名中的日期判断，不看文件修改时间。
pub struct RetentionSweeper {
    root: PathBuf,
    retention_days: i64,
}

impl RetentionSweeper {
    pub fn new(root: impl AsRef<Path>, retention_days: i64) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            retention_days,
        }
    }

    /// 保留期 <= 0 表示不清理
    pub fn is_enabled(&self) -> bool {
        self.retention_days > 0
    }

    /// 删除早于 `today - retention_days` 的日目录，并移除清空后的月、年目录
    #[instrument(skip(self), fields(root = %self.root.display(), retention_days = self.retention_days))]
    pub fn sweep(&self, today: NaiveDate) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        if !self.is_enabled() || !self.root.is_dir() {
            return Ok(report);
        }

        let Some(cutoff) = today.checked_sub_days(Days::new(self.retention_days.unsigned_abs()))
        else {
            return Ok(report);
        };

        for year_dir in numbered_dirs(&self.root)? {
            // 超出 i32 的年份不是本存储写出的目录
            let Ok(year) = i32::try_from(year_dir.number) else {
                continue;
            };
            for month_dir in numbered_dirs(&year_dir.path)? {
                for day_dir in numbered_dirs(&month_dir.path)? {
                    let Some(date) = NaiveDate::from_ymd_opt(year, month_dir.number, day_dir.number)
                    else {
                        continue;
                    };
                    if date < cutoff {
                        match fs::remove_dir_all(&day_dir.path) {
                            Ok(()) => report.removed_days.push(date),
                            Err(e) => {
                                warn!(path = %day_dir.path.display(), error = %e, "删除过期记录目录失败")
                            }
                        }
                    }
                }
                if remove_if_empty(&month_dir.path) {
                    report.pruned_dirs += 1;
                }
            }
            if remove_if_empty(&year_dir.path) {
                report.pruned_dirs += 1;
            }
        }

        report.removed_days.sort();
        info!(
            removed = report.removed_days.len(),
            pruned = report.pruned_dirs,
            %cutoff,
            "过期获取记录清理完成"
        );
        Ok(report)
    }
}

struct NumberedDir {
    number: u32,
    path: PathBuf,
}

/// 名称为纯数字的子目录，其它条目忽略
fn numbered_dirs(parent: &Path) -> Result<Vec<NumberedDir>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(number) = name.to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        dirs.push(NumberedDir {
            number,
            path: entry.path(),
        });
    }
    Ok(dirs)
}

fn remove_if_empty(dir: &Path) -> bool {
    let is_empty = fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    is_empty && fs::remove_dir(dir).is_ok()
}
