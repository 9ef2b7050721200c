//! FIFO transport
//!
//! Every message travels as one newline-terminated frame. A sender opens the
//! FIFO, writes its frame and closes; the watcher reads until every writer has
//! closed and splits what it got into frames, since concurrent senders can
//! share one read session. Frames are at most `PIPE_BUF` bytes so a single
//! write never interleaves with another sender's.
//!
//! Writes are bounded by a timeout. A FIFO that exists on disk but never gets
//! a reader within that window belongs to a watcher that died without cleaning
//! up, so the writer removes it and reports [`ChannelError::StaleChannel`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use super::error::{ChannelError, Result};

/// Default bound on how long a write may wait for a reader
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause between non-blocking open/write attempts
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Terminates every frame
const DELIMITER: u8 = b'\n';

/// Largest frame (payload plus delimiter) the pipe writes atomically
pub const MAX_FRAME_LEN: usize = libc::PIPE_BUF;

/// A channel created by this process, deleted exactly once on release or drop
#[derive(Debug)]
pub struct OwnedChannel {
    path: PathBuf,
    released: AtomicBool,
}

impl OwnedChannel {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the FIFO. Returns false if it was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        match delete(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Channel removed"),
            Err(e) => tracing::warn!("Failed to remove channel: {}", e),
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for OwnedChannel {
    fn drop(&mut self) {
        self.release();
    }
}

/// Create the FIFO at `path` (mode 0600)
///
/// Fails with [`ChannelError::AlreadyExists`] if anything occupies the path,
/// live or stale; the caller decides whether to clean up.
pub fn create(path: &Path) -> Result<OwnedChannel> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ChannelError::io(parent, e))?;
    }

    match mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR) {
        Ok(()) => {}
        Err(nix::errno::Errno::EEXIST) => {
            return Err(ChannelError::AlreadyExists(path.to_path_buf()));
        }
        Err(errno) => return Err(ChannelError::io(path, io::Error::from(errno))),
    }

    tracing::debug!(path = %path.display(), "Channel created");
    Ok(OwnedChannel {
        path: path.to_path_buf(),
        released: AtomicBool::new(false),
    })
}

/// Read side of one write session
#[derive(Debug)]
pub struct ChannelReader {
    path: PathBuf,
    file: File,
}

/// Open a channel for reading, blocking until a writer connects
pub fn open_for_read(path: &Path) -> Result<ChannelReader> {
    match File::open(path) {
        Ok(file) => Ok(ChannelReader {
            path: path.to_path_buf(),
            file,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(ChannelError::ChannelNotFound(path.to_path_buf()))
        }
        Err(e) => Err(ChannelError::io(path, e)),
    }
}

impl ChannelReader {
    /// Read until every writer has closed its end and split into frames
    ///
    /// An empty session yields no frames. Empty frames are skipped and a
    /// final frame without a delimiter is still returned.
    pub fn read_once(&mut self) -> Result<Vec<String>> {
        let mut buf = Vec::new();
        self.file
            .read_to_end(&mut buf)
            .map_err(|e| ChannelError::io(&self.path, e))?;

        Ok(buf
            .split(|&b| b == DELIMITER)
            .filter(|frame| !frame.is_empty())
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect())
    }
}

/// Check that `payload` fits in a single frame
pub fn validate_payload(payload: &str) -> Result<()> {
    if payload.as_bytes().contains(&DELIMITER) {
        return Err(ChannelError::InvalidPayload {
            reason: "must not contain a newline",
        });
    }
    if payload.len() + 1 > MAX_FRAME_LEN {
        return Err(ChannelError::InvalidPayload {
            reason: "too long for a single pipe write",
        });
    }
    Ok(())
}

/// Write `payload` plus the delimiter to the channel at `path`
///
/// Both the open and the write are non-blocking and retried until `timeout`
/// elapses. On expiry the channel is considered stale and deleted.
pub fn write(path: &Path, payload: &str, timeout: Duration) -> Result<()> {
    validate_payload(payload)?;

    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ChannelError::ChannelNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(ChannelError::io(path, e)),
    };
    if !meta.file_type().is_fifo() {
        return Err(ChannelError::NotAChannel(path.to_path_buf()));
    }

    let deadline = Instant::now() + timeout;
    let mut file = open_for_write(path, deadline)?;

    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.extend_from_slice(payload.as_bytes());
    frame.push(DELIMITER);

    let mut written = 0;
    while written < frame.len() {
        match file.write(&frame[written..]) {
            Ok(0) => return Err(ChannelError::io(path, ErrorKind::WriteZero.into())),
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(remove_stale(path));
                }
                thread::sleep(RETRY_INTERVAL);
            }
            Err(e) => return Err(ChannelError::io(path, e)),
        }
    }
    file.flush().map_err(|e| ChannelError::io(path, e))?;

    tracing::debug!(path = %path.display(), bytes = frame.len(), "Wrote message");
    Ok(())
}

/// Open the write end without blocking on a missing reader
///
/// `ENXIO` means no reader has the FIFO open. A live watcher re-opens its end
/// between sessions, so the open is retried until the deadline.
fn open_for_write(path: &Path, deadline: Instant) -> Result<File> {
    loop {
        match OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
        {
            Ok(file) => return Ok(file),
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                if Instant::now() >= deadline {
                    return Err(remove_stale(path));
                }
                thread::sleep(RETRY_INTERVAL);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ChannelError::ChannelNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ChannelError::io(path, e)),
        }
    }
}

fn remove_stale(path: &Path) -> ChannelError {
    tracing::warn!(path = %path.display(), "No reader on channel, removing it");
    if let Err(e) = delete(path) {
        tracing::warn!("Failed to remove stale channel: {}", e);
    }
    ChannelError::StaleChannel(path.to_path_buf())
}

/// Remove a channel. A channel that is already gone counts as removed.
pub fn delete(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ChannelError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn spawn_reader(path: PathBuf) -> thread::JoinHandle<Vec<String>> {
        thread::spawn(move || open_for_read(&path).unwrap().read_once().unwrap())
    }

    /// Connect a writer without sending anything, retrying until a reader
    /// is attached
    fn connect_writer(path: &Path) -> File {
        loop {
            match OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
            {
                Ok(file) => return file,
                Err(_) => thread::sleep(RETRY_INTERVAL),
            }
        }
    }

    #[test]
    fn test_create_makes_fifo() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pysl.1");
        let channel = create(&path).unwrap();

        let meta = fs::symlink_metadata(channel.path()).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[test]
    fn test_create_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("pysl.1");
        let channel = create(&path).unwrap();
        assert!(channel.path().exists());
    }

    #[test]
    fn test_create_collision() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pysl.1");
        let _first = create(&path).unwrap();

        let err = create(&path).unwrap_err();
        assert!(matches!(err, ChannelError::AlreadyExists(p) if p == path));
    }

    #[test]
    fn test_create_collides_with_regular_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pysl.1");
        fs::write(&path, "leftover").unwrap();

        assert!(matches!(
            create(&path).unwrap_err(),
            ChannelError::AlreadyExists(_)
        ));
    }

    #[test]
    fn test_release_deletes_exactly_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pysl.1");
        let channel = create(&path).unwrap();

        assert!(channel.release());
        assert!(!path.exists());
        assert!(channel.is_released());

        // A new owner may take the path; a second release must not touch it
        let successor = create(&path).unwrap();
        assert!(!channel.release());
        drop(channel);
        assert!(successor.path().exists());
    }

    #[test]
    fn test_drop_deletes_channel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pysl.1");
        {
            let _channel = create(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pysl.gone");
        assert!(delete(&path).is_ok());
        assert!(delete(&path).is_ok());
    }

    #[test]
    fn test_write_then_read_session() {
        let dir = TempDir::new().unwrap();
        let channel = create(&dir.path().join("pysl.1")).unwrap();

        let reader = spawn_reader(channel.path().to_path_buf());
        write(channel.path(), "broadcast%%hello", DEFAULT_WRITE_TIMEOUT).unwrap();

        assert_eq!(reader.join().unwrap(), vec!["broadcast%%hello"]);
    }

    #[test]
    fn test_shared_session_splits_frames() {
        let dir = TempDir::new().unwrap();
        let channel = create(&dir.path().join("pysl.1")).unwrap();

        let reader = spawn_reader(channel.path().to_path_buf());
        // Holding one writer open keeps the session going across both sends
        let mut held = connect_writer(channel.path());
        write(channel.path(), "broadcast%%first", DEFAULT_WRITE_TIMEOUT).unwrap();
        held.write_all(b"%%second\n").unwrap();
        drop(held);

        assert_eq!(
            reader.join().unwrap(),
            vec!["broadcast%%first", "%%second"]
        );
    }

    #[test]
    fn test_unterminated_frame_is_kept() {
        let dir = TempDir::new().unwrap();
        let channel = create(&dir.path().join("pysl.1")).unwrap();

        let reader = spawn_reader(channel.path().to_path_buf());
        let mut writer = connect_writer(channel.path());
        writer.write_all(b"one\n\ntwo").unwrap();
        drop(writer);

        assert_eq!(reader.join().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn test_write_rejects_multiline_payload() {
        let dir = TempDir::new().unwrap();
        let channel = create(&dir.path().join("pysl.1")).unwrap();

        let err = write(channel.path(), "two\nlines", DEFAULT_WRITE_TIMEOUT).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidPayload { .. }));
        assert!(channel.path().exists());
    }

    #[test]
    fn test_validate_payload_length() {
        assert!(validate_payload(&"x".repeat(MAX_FRAME_LEN - 1)).is_ok());
        assert!(matches!(
            validate_payload(&"x".repeat(MAX_FRAME_LEN)),
            Err(ChannelError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_empty_session_reads_no_frames() {
        let dir = TempDir::new().unwrap();
        let channel = create(&dir.path().join("pysl.1")).unwrap();

        let reader = spawn_reader(channel.path().to_path_buf());
        // Open and close without writing anything
        drop(connect_writer(channel.path()));

        assert!(reader.join().unwrap().is_empty());
    }

    #[test]
    fn test_write_missing_channel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pysl.missing");

        let err = write(&path, "hello", DEFAULT_WRITE_TIMEOUT).unwrap_err();
        assert!(matches!(err, ChannelError::ChannelNotFound(p) if p == path));
    }

    #[test]
    fn test_write_regular_file_is_not_a_channel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pysl.file");
        fs::write(&path, "").unwrap();

        let err = write(&path, "hello", DEFAULT_WRITE_TIMEOUT).unwrap_err();
        assert!(matches!(err, ChannelError::NotAChannel(_)));
        assert!(path.exists());
    }

    #[test]
    fn test_write_to_stale_channel_times_out_and_removes_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pysl.stale");
        // Simulate a watcher killed without cleanup
        mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();

        let timeout = Duration::from_millis(200);
        let started = Instant::now();
        let err = write(&path, "hello", timeout).unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, ChannelError::StaleChannel(p) if p == path));
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(2));
        assert!(!path.exists());
    }

    #[test]
    fn test_write_waits_for_late_reader() {
        let dir = TempDir::new().unwrap();
        let channel = create(&dir.path().join("pysl.1")).unwrap();
        let path = channel.path().to_path_buf();

        let reader = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            open_for_read(&path).unwrap().read_once().unwrap()
        });
        write(channel.path(), "late", DEFAULT_WRITE_TIMEOUT).unwrap();

        assert_eq!(reader.join().unwrap(), vec!["late"]);
        assert!(channel.path().exists());
    }

    #[test]
    fn test_open_for_read_missing_channel() {
        let dir = TempDir::new().unwrap();
        let err = open_for_read(&dir.path().join("pysl.none")).unwrap_err();
        assert!(matches!(err, ChannelError::ChannelNotFound(_)));
    }
}
