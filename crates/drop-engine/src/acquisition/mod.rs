//! 玩家获取记录
//!
//! 按天分目录的追加式存储：`root/YYYY/MM/DD/<player>.jsonl`，
//! 每行一个 `{time, entry}` 对象。写入由后台线程完成，事件路径只投递消息；
//! 过期目录由 [`RetentionSweeper`] 独立清理。

mod file;
mod retention;

pub use file::FileAcquisitionLog;
pub use retention::{RetentionSweeper, SweepReport};

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// 某一天的目录
pub fn day_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(date.format("%Y").to_string())
        .join(date.format("%m").to_string())
        .join(date.format("%d").to_string())
}

/// 玩家名转文件名
///
/// 字母数字、下划线与连字符原样保留，其余字节按 `%XX` 编码，
/// 不同玩家名总是得到不同的文件名。
pub fn player_file_name(player: &str) -> String {
    let mut safe = String::with_capacity(player.len() + 6);
    for byte in player.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            safe.push(char::from(byte));
        } else {
            safe.push_str(&format!("%{:02X}", byte));
        }
    }
    format!("{}.jsonl", safe)
}

/// 记录文本：`物品(来源)`
pub fn entry_text(item_label: &str, source_label: &str) -> String {
    format!("{}({})", item_label, source_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_dir_layout() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            day_dir(Path::new("/logs"), date),
            PathBuf::from("/logs/2024/03/07")
        );
    }

    #[test]
    fn test_player_file_name() {
        assert_eq!(player_file_name("Steve_01"), "Steve_01.jsonl");
        assert_eq!(player_file_name("../evil"), "%2E%2E%2Fevil.jsonl");
        assert_eq!(player_file_name("张三"), "%E5%BC%A0%E4%B8%89.jsonl");
    }

    #[test]
    fn test_player_file_name_is_injective() {
        assert_ne!(player_file_name("Steve Two"), player_file_name("Steve_Two"));
        assert_ne!(player_file_name("张三"), player_file_name("李四"));
        assert_ne!(player_file_name("a%20b"), player_file_name("a b"));
    }

    #[test]
    fn test_entry_text() {
        assert_eq!(entry_text("钻石", "挖矿"), "钻石(挖矿)");
    }
}
