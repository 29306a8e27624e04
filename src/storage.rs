use crate::format::{self, LogLine};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

pub const LOG_FILE_NAME: &str = "logdata.txt";
const ROTATING_PREFIX: &str = "dataLog";
const ROTATING_EXTENSION: &str = ".csv";

/// Bytes read from the end of the artifact when looking for the last line
const TAIL_WINDOW: u64 = 4096;

/// Where session output goes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogTarget {
    /// One append-only artifact; sessions delimited by START/END markers
    SingleFile { path: PathBuf },
    /// One `dataLogNNNNN.csv` per session inside `dir`
    Rotating { dir: PathBuf },
}

impl LogTarget {
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        LogTarget::SingleFile {
            path: dir.into().join(LOG_FILE_NAME),
        }
    }

    pub fn uses_markers(&self) -> bool {
        matches!(self, LogTarget::SingleFile { .. })
    }
}

/// Close an artifact left open by a crash.
///
/// If the last non-empty line is not an `END` marker, a synthetic
/// `END,<now_ms>` is appended. Running it again finds the END and does
/// nothing. A missing artifact is created empty. Returns whether a marker was
/// written.
pub async fn repair_unterminated(path: &Path, now_ms: i64) -> io::Result<bool> {
    if fs::metadata(path).await.is_err() {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(path, "").await?;
        return Ok(false);
    }

    let (last, ends_with_newline) = read_tail(path).await?;
    let needs_end = match last.as_deref().map(format::classify) {
        None => false,
        Some(LogLine::End(_)) => false,
        Some(_) => true,
    };
    if !needs_end {
        return Ok(false);
    }

    let mut file = OpenOptions::new().append(true).open(path).await?;
    let mut text = String::new();
    if !ends_with_newline {
        text.push('\n');
    }
    text.push_str(&format::end_marker(now_ms));
    text.push('\n');
    file.write_all(text.as_bytes()).await?;
    file.flush().await?;
    log::warn!(
        "[storage] {} ended without END marker; appended END,{}",
        path.display(),
        now_ms
    );
    Ok(true)
}

/// Last non-empty line of a file, without its newline.
pub async fn last_line(path: &Path) -> io::Result<Option<String>> {
    Ok(read_tail(path).await?.0)
}

async fn read_tail(path: &Path) -> io::Result<(Option<String>, bool)> {
    let mut file = fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let start = len.saturating_sub(TAIL_WINDOW);
    file.seek(io::SeekFrom::Start(start)).await?;
    let mut bytes = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut bytes).await?;

    let text = String::from_utf8_lossy(&bytes);
    let ends_with_newline = text.is_empty() || text.ends_with('\n');
    let last = text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim_end_matches('\r').to_string());
    Ok((last, ends_with_newline))
}

pub fn rotating_file_name(number: u32) -> String {
    format!("{}{:05}{}", ROTATING_PREFIX, number, ROTATING_EXTENSION)
}

pub fn parse_log_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(ROTATING_PREFIX)?
        .strip_suffix(ROTATING_EXTENSION)?
        .parse()
        .ok()
}

/// Highest `dataLogNNNNN.csv` number present in `dir`, or 0
pub async fn last_log_number(dir: &Path) -> io::Result<u32> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut highest = 0;
    while let Some(entry) = entries.next_entry().await? {
        if let Some(number) = entry.file_name().to_str().and_then(parse_log_number) {
            highest = highest.max(number);
        }
    }
    Ok(highest)
}

/// Hands out sequential rotating file paths.
///
/// The directory is scanned once, at the first request; later numbers come
/// from the in-memory counter.
#[derive(Debug)]
pub struct LogRotation {
    dir: PathBuf,
    last: Option<u32>,
}

impl LogRotation {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last: None,
        }
    }

    pub async fn next_path(&mut self) -> io::Result<PathBuf> {
        let last = match self.last {
            Some(n) => n,
            None => {
                fs::create_dir_all(&self.dir).await?;
                last_log_number(&self.dir).await?
            }
        };
        let next = last + 1;
        self.last = Some(next);
        Ok(self.dir.join(rotating_file_name(next)))
    }
}

enum WriteCommand {
    Append {
        text: String,
        ack: oneshot::Sender<io::Result<()>>,
    },
    Truncate {
        ack: oneshot::Sender<io::Result<()>>,
    },
    Switch {
        path: PathBuf,
        ack: oneshot::Sender<io::Result<()>>,
    },
    LastLine {
        reply: oneshot::Sender<io::Result<Option<String>>>,
    },
}

/// Handle to the single task that owns the artifact.
///
/// Every write goes through one queue, so at most one write is in flight
/// and appends land in the order they were sent.
#[derive(Clone)]
pub struct LogWriter {
    tx: mpsc::Sender<WriteCommand>,
    path: Arc<RwLock<PathBuf>>,
}

impl LogWriter {
    /// Spawn the writer task; must be called inside a tokio runtime.
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let shared = Arc::new(RwLock::new(path.clone()));
        tokio::spawn(writer_loop(rx, path, Arc::clone(&shared)));
        Self { tx, path: shared }
    }

    /// Path currently being written
    pub fn path(&self) -> PathBuf {
        self.path
            .read()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub async fn append(&self, text: String) -> io::Result<()> {
        let (ack, rx) = oneshot::channel();
        self.send(WriteCommand::Append { text, ack }).await?;
        rx.await.map_err(|_| writer_gone())?
    }

    pub async fn append_line(&self, line: &str) -> io::Result<()> {
        let mut text = String::with_capacity(line.len() + 1);
        text.push_str(line);
        text.push('\n');
        self.append(text).await
    }

    /// Empty the current artifact
    pub async fn truncate(&self) -> io::Result<()> {
        let (ack, rx) = oneshot::channel();
        self.send(WriteCommand::Truncate { ack }).await?;
        rx.await.map_err(|_| writer_gone())?
    }

    /// Close the current artifact and direct later writes to `path`
    pub async fn switch_to(&self, path: PathBuf) -> io::Result<()> {
        let (ack, rx) = oneshot::channel();
        self.send(WriteCommand::Switch { path, ack }).await?;
        rx.await.map_err(|_| writer_gone())?
    }

    /// Last non-empty line, read after every queued write has landed
    pub async fn last_line(&self) -> io::Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.send(WriteCommand::LastLine { reply }).await?;
        rx.await.map_err(|_| writer_gone())?
    }

    async fn send(&self, command: WriteCommand) -> io::Result<()> {
        self.tx.send(command).await.map_err(|_| writer_gone())
    }
}

fn writer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "log writer task stopped")
}

async fn writer_loop(
    mut rx: mpsc::Receiver<WriteCommand>,
    mut path: PathBuf,
    shared: Arc<RwLock<PathBuf>>,
) {
    let mut file: Option<fs::File> = None;

    while let Some(command) = rx.recv().await {
        match command {
            WriteCommand::Append { text, ack } => {
                let result = append_to(&mut file, &path, text.as_bytes()).await;
                if result.is_err() {
                    // Reopen on the next write
                    file = None;
                }
                let _ = ack.send(result);
            }
            WriteCommand::Truncate { ack } => {
                file = None;
                let _ = ack.send(fs::write(&path, "").await);
            }
            WriteCommand::Switch { path: next, ack } => {
                let result = match file.take() {
                    Some(mut f) => f.flush().await,
                    None => Ok(()),
                };
                path = next;
                if let Ok(mut current) = shared.write() {
                    *current = path.clone();
                }
                let _ = ack.send(result);
            }
            WriteCommand::LastLine { reply } => {
                if let Some(f) = file.as_mut() {
                    if let Err(e) = f.flush().await {
                        let _ = reply.send(Err(e));
                        continue;
                    }
                }
                let _ = reply.send(last_line(&path).await);
            }
        }
    }
}

async fn append_to(file: &mut Option<fs::File>, path: &Path, bytes: &[u8]) -> io::Result<()> {
    if file.is_none() {
        let opened = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        *file = Some(opened);
    }
    if let Some(f) = file.as_mut() {
        f.write_all(bytes).await?;
        f.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn read(path: &Path) -> String {
        fs::read_to_string(path).await.unwrap()
    }

    #[tokio::test]
    async fn test_repair_appends_end_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        fs::write(&path, "START,100\nDate,Time,SampleRate\n01/01/2024,00:00:00.00,5.000\n")
            .await
            .unwrap();

        assert!(repair_unterminated(&path, 200).await.unwrap());
        assert!(!repair_unterminated(&path, 300).await.unwrap());

        let content = read(&path).await;
        assert!(content.ends_with("5.000\nEND,200\n"));
        assert_eq!(content.matches("END,").count(), 1);
    }

    #[tokio::test]
    async fn test_repair_without_trailing_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        fs::write(&path, "START,100\n01/01/2024,00:00:00.00,5.0").await.unwrap();

        assert!(repair_unterminated(&path, 150).await.unwrap());
        assert_eq!(
            read(&path).await,
            "START,100\n01/01/2024,00:00:00.00,5.0\nEND,150\n"
        );
    }

    #[tokio::test]
    async fn test_repair_leaves_closed_and_empty_artifacts() {
        let dir = tempdir().unwrap();
        let closed = dir.path().join("closed.txt");
        fs::write(&closed, "START,1\nEND,2\n").await.unwrap();
        assert!(!repair_unterminated(&closed, 3).await.unwrap());
        assert_eq!(read(&closed).await, "START,1\nEND,2\n");

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "").await.unwrap();
        assert!(!repair_unterminated(&empty, 3).await.unwrap());
        assert_eq!(read(&empty).await, "");
    }

    #[tokio::test]
    async fn test_repair_creates_missing_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(LOG_FILE_NAME);
        assert!(!repair_unterminated(&path, 1).await.unwrap());
        assert_eq!(read(&path).await, "");
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let writer = LogWriter::spawn(path.clone());

        let mut tasks = Vec::new();
        for task in 0..8 {
            let writer = writer.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    writer
                        .append_line(&format!("task{},line{},payload", task, i))
                        .await
                        .unwrap();
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let content = read(&path).await;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 200);
        assert!(lines.iter().all(|l| l.starts_with("task") && l.ends_with(",payload")));
        // Per-task order preserved
        for task in 0..8 {
            let prefix = format!("task{},", task);
            let own: Vec<&&str> = lines.iter().filter(|l| l.starts_with(&prefix)).collect();
            for (i, line) in own.iter().enumerate() {
                assert_eq!(**line, format!("task{},line{},payload", task, i));
            }
        }
    }

    #[tokio::test]
    async fn test_session_block_reads_back_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let writer = LogWriter::spawn(path.clone());
        let records: Vec<String> = (0..12)
            .map(|i| format!("03/07/2024,10:00:{:02}.00,1013.{:02},5.000", i, i * 7))
            .collect();

        writer.append_line(&format::start_marker(1_000)).await.unwrap();
        writer.append_line("Date,Time,Pressure,SampleRate").await.unwrap();
        for record in &records {
            writer.append_line(record).await.unwrap();
        }
        writer.append_line(&format::end_marker(2_000)).await.unwrap();
        assert_eq!(writer.last_line().await.unwrap().as_deref(), Some("END,2000"));

        let content = read(&path).await;
        let lines: Vec<LogLine> = content
            .lines()
            .map(format::classify)
            .filter(|line| !matches!(line, LogLine::Header(_)))
            .collect();
        assert_eq!(lines.len(), records.len() + 2);
        assert_eq!(lines.first(), Some(&LogLine::Start(1_000)));
        assert_eq!(lines.last(), Some(&LogLine::End(2_000)));

        let body: Vec<&str> = lines[1..lines.len() - 1]
            .iter()
            .filter_map(|line| match line {
                LogLine::Record(record) => Some(*record),
                _ => None,
            })
            .collect();
        let expected: Vec<&str> = records.iter().map(String::as_str).collect();
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn test_truncate_and_last_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let writer = LogWriter::spawn(path.clone());

        writer.append_line("START,1").await.unwrap();
        writer.append_line("END,2").await.unwrap();
        assert_eq!(writer.last_line().await.unwrap().as_deref(), Some("END,2"));

        writer.truncate().await.unwrap();
        assert_eq!(read(&path).await, "");
        assert_eq!(writer.last_line().await.unwrap(), None);

        writer.append_line("START,3").await.unwrap();
        assert_eq!(read(&path).await, "START,3\n");
    }

    #[tokio::test]
    async fn test_switch_redirects_writes() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.csv");
        let second = dir.path().join("b.csv");
        let writer = LogWriter::spawn(first.clone());

        writer.append_line("one").await.unwrap();
        writer.switch_to(second.clone()).await.unwrap();
        writer.append_line("two").await.unwrap();

        assert_eq!(writer.path(), second);
        assert_eq!(read(&first).await, "one\n");
        assert_eq!(read(&second).await, "two\n");
    }

    #[test]
    fn test_rotating_names() {
        assert_eq!(rotating_file_name(7), "dataLog00007.csv");
        assert_eq!(parse_log_number("dataLog00042.csv"), Some(42));
        assert_eq!(parse_log_number("dataLog00042.txt"), None);
        assert_eq!(parse_log_number("other00042.csv"), None);
    }

    #[tokio::test]
    async fn test_rotation_continues_after_highest_number() {
        let dir = tempdir().unwrap();
        for name in ["dataLog00003.csv", "dataLog00011.csv", "notes.txt", "dataLog00009.csv"] {
            fs::write(dir.path().join(name), "").await.unwrap();
        }

        let mut rotation = LogRotation::new(dir.path());
        assert_eq!(
            rotation.next_path().await.unwrap(),
            dir.path().join("dataLog00012.csv")
        );
        assert_eq!(
            rotation.next_path().await.unwrap(),
            dir.path().join("dataLog00013.csv")
        );
    }

    #[tokio::test]
    async fn test_rotation_in_missing_directory_starts_at_one() {
        let dir = tempdir().unwrap();
        let mut rotation = LogRotation::new(dir.path().join("logs"));
        assert_eq!(
            rotation.next_path().await.unwrap(),
            dir.path().join("logs").join("dataLog00001.csv")
        );
    }
}
