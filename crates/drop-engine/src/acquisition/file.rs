use super::{day_dir, entry_text, player_file_name};
use crate::error::{DropError, Result};
use crate::host::{AcquisitionLog, LogEntry};
use crate::models::Actor;
use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const QUEUE_CAPACITY: usize = 4096;
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// 文件中的一行
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogLine {
    time: String,
    entry: String,
}

enum WriterCommand {
    Append {
        date: NaiveDate,
        player: String,
        line: LogLine,
    },
    Flush(Sender<()>),
    Shutdown,
}

/// 文件获取记录
///
/// `record` 只向有界队列投递，队列满时丢弃并告警，不阻塞事件线程。
pub struct FileAcquisitionLog {
    root: PathBuf,
    tx: Sender<WriterCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FileAcquisitionLog {
    /// 创建存储并启动后台写线程
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let (tx, rx) = bounded::<WriterCommand>(QUEUE_CAPACITY);
        let worker_root = root.clone();
        let handle = thread::Builder::new()
            .name("drops-log-writer".into())
            .spawn(move || run_writer(worker_root, rx))?;

        info!(root = %root.display(), "获取记录存储已启动");
        Ok(Self {
            root,
            tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 以指定时间记录（`record` 使用本地当前时间）
    pub fn record_at(&self, player: &str, item_label: &str, source_label: &str, at: NaiveDateTime) {
        let command = WriterCommand::Append {
            date: at.date(),
            player: player.to_string(),
            line: LogLine {
                time: at.format("%H:%M:%S").to_string(),
                entry: entry_text(item_label, source_label),
            },
        };

        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(player = %player, "获取记录队列已满，丢弃本条记录");
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!(player = %player, "获取记录写线程已停止，丢弃本条记录");
            }
        }
    }

    /// 等待队列中已投递的记录全部落盘
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.tx
            .send(WriterCommand::Flush(ack_tx))
            .map_err(|_| DropError::LogStore("写线程已停止".to_string()))?;
        ack_rx
            .recv_timeout(FLUSH_TIMEOUT)
            .map_err(|_| DropError::LogStore("等待落盘超时".to_string()))
    }

    /// 以 `today` 为起点向前查询 `days` 天
    pub fn recent_from(&self, player: &str, days: u32, today: NaiveDate) -> Result<Vec<LogEntry>> {
        // 先落盘，保证刚记录的条目可见；写线程已停止时直接读文件
        if let Err(e) = self.flush() {
            debug!(error = %e, "查询前落盘失败");
        }

        let file_name = player_file_name(player);
        let mut entries = Vec::new();
        for offset in 0..days {
            let Some(date) = today.checked_sub_days(Days::new(u64::from(offset))) else {
                break;
            };
            let path = day_dir(&self.root, date).join(&file_name);
            if !path.exists() {
                continue;
            }
            read_day(&path, date, &mut entries)?;
        }
        Ok(entries)
    }

    /// 停止写线程，等待队列排空
    pub fn shutdown(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if self.tx.send(WriterCommand::Shutdown).is_ok() && handle.join().is_err() {
            warn!("获取记录写线程异常退出");
        }
        info!("获取记录存储已关闭");
    }
}

impl AcquisitionLog for FileAcquisitionLog {
    fn record(&self, actor: &Actor, item_label: &str, source_label: &str) {
        self.record_at(
            &actor.name,
            item_label,
            source_label,
            Local::now().naive_local(),
        );
    }

    fn recent(&self, player_name: &str, days: u32) -> Result<Vec<LogEntry>> {
        self.recent_from(player_name, days, Local::now().date_naive())
    }
}

impl Drop for FileAcquisitionLog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_writer(root: PathBuf, rx: Receiver<WriterCommand>) {
    while let Ok(command) = rx.recv() {
        match command {
            WriterCommand::Append { date, player, line } => {
                if let Err(e) = append_line(&root, date, &player, &line) {
                    warn!(player = %player, error = %e, "写入获取记录失败");
                }
            }
            WriterCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            WriterCommand::Shutdown => break,
        }
    }
    debug!("获取记录写线程退出");
}

fn append_line(root: &Path, date: NaiveDate, player: &str, line: &LogLine) -> Result<()> {
    let dir = day_dir(root, date);
    fs::create_dir_all(&dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(player_file_name(player)))?;
    let mut json = serde_json::to_string(line)?;
    json.push('\n');
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn read_day(path: &Path, date: NaiveDate, out: &mut Vec<LogEntry>) -> Result<()> {
    let reader = BufReader::new(fs::File::open(path)?);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogLine>(&line) {
            Ok(parsed) => out.push(LogEntry {
                timestamp_label: format!("{} {}", date.format("%Y-%m-%d"), parsed.time),
                text: parsed.entry,
            }),
            Err(e) => {
                warn!(path = %path.display(), line = index + 1, error = %e, "跳过损坏的记录行");
            }
        }
    }
    Ok(())
}
