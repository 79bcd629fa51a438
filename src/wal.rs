use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// Frames claiming a larger payload are treated as corruption.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

fn encode_frame(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

enum Frame {
    /// An intact event and the bytes its frame took.
    Event(Event, u64),
    /// Clean end of file.
    End,
    /// Torn or corrupt frame; nothing after it is trusted.
    Damaged(&'static str),
}

/// `Ok(false)` on EOF before the buffer is full.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    match reader.read(&mut len_buf[..1])? {
        0 => return Ok(Frame::End),
        _ => {
            if !read_full(reader, &mut len_buf[1..])? {
                return Ok(Frame::Damaged("truncated length"));
            }
        }
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Ok(Frame::Damaged("implausible frame length"));
    }

    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? {
        return Ok(Frame::Damaged("truncated payload"));
    }
    let mut crc_buf = [0u8; 4];
    if !read_full(reader, &mut crc_buf)? {
        return Ok(Frame::Damaged("truncated checksum"));
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Frame::Damaged("checksum mismatch"));
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Frame::Event(event, (len + 8) as u64)),
        Err(_) => Ok(Frame::Damaged("undecodable payload")),
    }
}

/// Read intact frames from the start of the log. Returns the events and the
/// byte length they cover; anything past that length is a damaged tail.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut intact = 0u64;
    loop {
        match read_frame(&mut reader)? {
            Frame::Event(event, len) => {
                intact += len;
                events.push(event);
            }
            Frame::End => break,
            Frame::Damaged(reason) => {
                warn!(
                    "WAL {}: {reason} after {} events, discarding the rest",
                    path.display(),
                    events.len()
                );
                break;
            }
        }
    }
    Ok((events, intact))
}

/// Append-only event log.
///
/// Each frame is `[u32 len][bincode Event][u32 crc32]`, little-endian. Frames
/// are staged in memory and written by `flush_sync`. The file never keeps
/// bytes past the last successful sync: a failed write is cut back off, and
/// `open` cuts off a torn tail left by a crash. Later appends therefore never
/// land behind a damaged frame.
pub struct Wal {
    file: File,
    path: PathBuf,
    staged: Vec<u8>,
    staged_frames: u64,
    /// File length as of the last successful sync.
    committed_len: u64,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let (_, intact) = scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > intact {
            warn!(
                "WAL {}: truncating {} damaged bytes at the tail",
                path.display(),
                on_disk - intact
            );
            file.set_len(intact)?;
            file.sync_all()?;
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            staged: Vec::new(),
            staged_frames: 0,
            committed_len: intact,
            appends_since_compact: 0,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Stage one frame. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_frame(&mut self.staged, event)?;
        self.staged_frames += 1;
        Ok(())
    }

    /// Write and sync every staged frame. On failure nothing staged is kept,
    /// in memory or on disk.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let written = self
            .file
            .write_all(&self.staged)
            .and_then(|()| self.file.sync_data());
        match written {
            Ok(()) => {
                self.committed_len += self.staged.len() as u64;
                self.appends_since_compact += self.staged_frames;
                self.discard_staged();
                Ok(())
            }
            Err(e) => {
                self.discard_staged();
                self.truncate_uncommitted()?;
                Err(e)
            }
        }
    }

    /// Drop frames staged since the last flush.
    pub fn discard_staged(&mut self) {
        self.staged.clear();
        self.staged_frames = 0;
    }

    /// Cut the file back to its length at the last successful sync.
    fn truncate_uncommitted(&mut self) -> io::Result<()> {
        self.file.set_len(self.committed_len)?;
        self.file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the log with `events`. The new log is written and synced to a
    /// side file first, then renamed over the old one, so a crash leaves
    /// either the old log or the new one.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        self.flush_sync()?;
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                encode_frame(&mut writer, event)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.committed_len = self.file.metadata()?.len();
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Read every intact event. A missing file is an empty log; a damaged
    /// frame ends the replay and everything from it on is ignored.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }
}
