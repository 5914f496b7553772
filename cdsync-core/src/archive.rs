//! Minimal streaming archive envelope (design §4, spec §6's encoder/decoder
//! contracts). Not the subject of the grounding ledger — its only job is to
//! be a faithful, real collaborator so the driver's tee/request logic has
//! something concrete to drive, both in production and in tests.
//!
//! Wire format (one linear byte stream, readable top to bottom):
//!
//! ```text
//! entry  := dir-entry | file-entry | end-entry
//! dir    := 0x01 ++ path_len:uvarint ++ path ++ mode:u32le
//! file   := 0x02 ++ path_len:uvarint ++ path ++ mode:u32le ++ size:uvarint ++ size bytes of content
//! end    := 0x00
//! ```
//!
//! A single regular file or block device base is encoded as one file entry
//! with an empty path, so the format and the pipeline are uniform across all
//! three base kinds.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{CdsyncError, Result};

const TAG_END: u8 = 0x00;
const TAG_DIR: u8 = 0x01;
const TAG_FILE: u8 = 0x02;

const PAYLOAD_CHUNK: usize = 64 * 1024;

fn put_uvarint(out: &mut Vec<u8>, mut x: u64) {
    while x >= 0x80 {
        out.push((x as u8) | 0x80);
        x >>= 7;
    }
    out.push(x as u8);
}

/// Decode a uvarint from the front of `buf`, returning `(value, bytes consumed)`.
/// `None` if `buf` does not yet contain a complete varint.
fn get_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut x: u64 = 0;
    let mut s: u32 = 0;
    for (i, &byte) in buf.iter().enumerate().take(10) {
        if byte < 0x80 {
            x |= (byte as u64) << s;
            return Some((x, i + 1));
        }
        x |= ((byte & 0x7f) as u64) << s;
        s += 7;
    }
    None
}

fn mode_of(md: &fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        md.permissions().mode()
    }
    #[cfg(not(unix))]
    {
        if md.is_dir() { 0o40755 } else { 0o100644 }
    }
}

/// What the base being encoded/decoded is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseMode {
    Regular,
    Directory,
    BlockDevice,
}

#[derive(Debug, PartialEq, Eq)]
pub enum EncodeStep {
    Finished,
    NextFile,
    Data,
}

struct PlannedFile {
    rel_path: String,
    abs_path: PathBuf,
    mode: u32,
    size: u64,
    is_dir: bool,
    /// Already-open handle for the single-entry (regular file / block
    /// device) base; directory entries are reopened by path lazily instead,
    /// since holding one fd per tree entry would be wasteful.
    content: Option<File>,
}

enum EncodePhase {
    /// About to emit this entry's header.
    Header(usize),
    /// Streaming this entry's content; `sent` bytes of it emitted so far.
    Content { index: usize, file: File, sent: u64 },
    Trailer,
    Done,
}

/// Walks a base (directory, regular file, or block device) and emits the
/// archive byte stream described above, one `step()` at a time.
pub struct Encoder {
    entries: Vec<PlannedFile>,
    phase: EncodePhase,
    buf: Vec<u8>,
    current_path: Option<String>,
    current_mode: Option<u32>,
}

impl Encoder {
    /// Walk `base_path` as a directory tree, emitting a dir/file entry for
    /// everything under it in name order.
    pub fn new_directory(base_path: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(base_path).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.path() == base_path {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(base_path)
                .expect("walkdir entries are under base_path")
                .to_string_lossy()
                .replace('\\', "/");
            let md = entry.metadata().map_err(std::io::Error::from)?;
            entries.push(PlannedFile {
                rel_path: rel,
                abs_path: entry.path().to_path_buf(),
                mode: mode_of(&md),
                size: if md.is_dir() { 0 } else { md.len() },
                is_dir: md.is_dir(),
                content: None,
            });
        }
        Ok(Self {
            entries,
            phase: EncodePhase::Header(0),
            buf: Vec::new(),
            current_path: None,
            current_mode: None,
        })
    }

    /// Treat an already-open handle as the sole archive entry — the regular
    /// file / block device base case. Ownership of `base` transfers in.
    /// Block devices are read the same way; their size is taken from
    /// `stat()` rather than streamed to an unknown length, a deliberate
    /// simplification over raw block-special-file handling.
    pub fn new_single(base: File) -> Result<Self> {
        let size = base.metadata().map(|m| m.len()).unwrap_or(0);
        let mode = base.metadata().map(|m| mode_of(&m)).unwrap_or(0o100644);
        let entries = vec![PlannedFile {
            rel_path: String::new(),
            abs_path: PathBuf::new(),
            mode,
            size,
            is_dir: false,
            content: Some(base),
        }];
        Ok(Self {
            entries,
            phase: EncodePhase::Header(0),
            buf: Vec::new(),
            current_path: None,
            current_mode: None,
        })
    }

    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    pub fn current_mode(&self) -> Option<u32> {
        self.current_mode
    }

    pub fn get_data(&self) -> &[u8] {
        &self.buf
    }

    pub fn step(&mut self) -> Result<EncodeStep> {
        loop {
            match &self.phase {
                EncodePhase::Header(index) => {
                    let index = *index;
                    if index >= self.entries.len() {
                        self.phase = EncodePhase::Trailer;
                        continue;
                    }
                    let entry = &self.entries[index];
                    self.current_path = Some(entry.rel_path.clone());
                    self.current_mode = Some(entry.mode);

                    let mut header = Vec::with_capacity(16 + entry.rel_path.len());
                    header.push(if entry.is_dir { TAG_DIR } else { TAG_FILE });
                    put_uvarint(&mut header, entry.rel_path.len() as u64);
                    header.extend_from_slice(entry.rel_path.as_bytes());
                    header.extend_from_slice(&entry.mode.to_le_bytes());
                    if !entry.is_dir {
                        put_uvarint(&mut header, entry.size);
                    }
                    self.buf = header;

                    self.phase = if entry.is_dir || entry.size == 0 {
                        EncodePhase::Header(index + 1)
                    } else {
                        let file = match self.entries[index].content.take() {
                            Some(f) => f,
                            None => File::open(&self.entries[index].abs_path)?,
                        };
                        EncodePhase::Content {
                            index,
                            file,
                            sent: 0,
                        }
                    };
                    return Ok(EncodeStep::NextFile);
                }
                EncodePhase::Content { .. } => {
                    let (index, mut file, sent) = match std::mem::replace(
                        &mut self.phase,
                        EncodePhase::Header(0),
                    ) {
                        EncodePhase::Content { index, file, sent } => (index, file, sent),
                        _ => unreachable!(),
                    };
                    let total = self.entries[index].size;
                    let want = ((total - sent) as usize).min(PAYLOAD_CHUNK);
                    let mut chunk = vec![0u8; want];
                    file.read_exact(&mut chunk)?;
                    let new_sent = sent + want as u64;
                    self.buf = chunk;
                    self.phase = if new_sent >= total {
                        EncodePhase::Header(index + 1)
                    } else {
                        EncodePhase::Content {
                            index,
                            file,
                            sent: new_sent,
                        }
                    };
                    return Ok(EncodeStep::Data);
                }
                EncodePhase::Trailer => {
                    self.buf = vec![TAG_END];
                    self.phase = EncodePhase::Done;
                    return Ok(EncodeStep::Data);
                }
                EncodePhase::Done => {
                    self.buf.clear();
                    return Ok(EncodeStep::Finished);
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeStep {
    Finished,
    NextFile,
    Step,
    Payload,
    Request,
}

enum Target {
    Directory(PathBuf),
    File(File),
}

enum DecodePhase {
    Header,
    Payload { remaining: u64 },
    Finished,
}

/// Consumes the byte stream `Encoder` produces and reconstructs the base.
pub struct Decoder {
    target: Target,
    buf: Vec<u8>,
    eof_signaled: bool,
    phase: DecodePhase,
    current_path: Option<String>,
    current_mode: Option<u32>,
    current_file: Option<File>,
}

impl Decoder {
    pub fn new_directory(root: PathBuf) -> Self {
        Self {
            target: Target::Directory(root),
            buf: Vec::new(),
            eof_signaled: false,
            phase: DecodePhase::Header,
            current_path: None,
            current_mode: None,
            current_file: None,
        }
    }

    pub fn new_single_file(file: File) -> Self {
        Self {
            target: Target::File(file),
            buf: Vec::new(),
            eof_signaled: false,
            phase: DecodePhase::Header,
            current_path: None,
            current_mode: None,
            current_file: None,
        }
    }

    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    pub fn current_mode(&self) -> Option<u32> {
        self.current_mode
    }

    pub fn put_data(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_eof(&mut self) {
        self.eof_signaled = true;
    }

    fn base_path_for(&self, rel: &str) -> Option<PathBuf> {
        match &self.target {
            Target::Directory(root) => Some(root.join(rel)),
            Target::File(_) => None,
        }
    }

    pub fn step(&mut self) -> Result<DecodeStep> {
        loop {
            match &self.phase {
                DecodePhase::Header => {
                    if self.buf.is_empty() {
                        if self.eof_signaled {
                            return Err(CdsyncError::BadMessage(
                                "archive truncated before end marker".into(),
                            ));
                        }
                        return Ok(DecodeStep::Request);
                    }
                    let tag = self.buf[0];
                    if tag == TAG_END {
                        self.buf.drain(..1);
                        self.phase = DecodePhase::Finished;
                        return Ok(DecodeStep::Finished);
                    }
                    let rest = &self.buf[1..];
                    let Some((path_len, n1)) = get_uvarint(rest) else {
                        return self.request_or_eof_error();
                    };
                    let path_len = path_len as usize;
                    let header_fixed_len = 1 + n1 + path_len + 4;
                    if self.buf.len() < header_fixed_len {
                        return self.request_or_eof_error();
                    }
                    let path_start = 1 + n1;
                    let path = String::from_utf8_lossy(
                        &self.buf[path_start..path_start + path_len],
                    )
                    .into_owned();
                    let mode_start = path_start + path_len;
                    let mode = u32::from_le_bytes(
                        self.buf[mode_start..mode_start + 4].try_into().unwrap(),
                    );

                    if tag == TAG_DIR {
                        if let Some(dir) = self.base_path_for(&path) {
                            fs::create_dir_all(&dir).or_else(|e| {
                                if e.kind() == std::io::ErrorKind::AlreadyExists {
                                    Ok(())
                                } else {
                                    Err(e)
                                }
                            })?;
                        }
                        self.current_path = Some(path);
                        self.current_mode = Some(mode);
                        self.buf.drain(..header_fixed_len);
                        return Ok(DecodeStep::NextFile);
                    }

                    if tag != TAG_FILE {
                        return Err(CdsyncError::BadMessage(format!(
                            "unknown archive entry tag {tag:#x}"
                        )));
                    }

                    let Some((size, n2)) = get_uvarint(&self.buf[mode_start + 4..]) else {
                        return self.request_or_eof_error();
                    };
                    let header_len = header_fixed_len + n2;
                    if self.buf.len() < header_len {
                        return self.request_or_eof_error();
                    }

                    self.current_path = Some(path.clone());
                    self.current_mode = Some(mode);
                    self.current_file = Some(match &self.target {
                        Target::Directory(root) => {
                            let full = root.join(&path);
                            if let Some(parent) = full.parent() {
                                fs::create_dir_all(parent)?;
                            }
                            File::create(full)?
                        }
                        Target::File(f) => f.try_clone()?,
                    });
                    self.buf.drain(..header_len);
                    self.phase = DecodePhase::Payload { remaining: size };
                    return Ok(DecodeStep::NextFile);
                }
                DecodePhase::Payload { remaining } => {
                    let remaining = *remaining;
                    if remaining == 0 {
                        self.current_file = None;
                        self.phase = DecodePhase::Header;
                        return Ok(DecodeStep::Step);
                    }
                    if self.buf.is_empty() {
                        if self.eof_signaled {
                            return Err(CdsyncError::BadMessage(
                                "archive truncated mid-payload".into(),
                            ));
                        }
                        return Ok(DecodeStep::Request);
                    }
                    let take = (self.buf.len() as u64).min(remaining) as usize;
                    let chunk: Vec<u8> = self.buf.drain(..take).collect();
                    if let Some(f) = &mut self.current_file {
                        f.write_all(&chunk)?;
                    }
                    self.phase = DecodePhase::Payload {
                        remaining: remaining - take as u64,
                    };
                    return Ok(DecodeStep::Payload);
                }
                DecodePhase::Finished => return Ok(DecodeStep::Finished),
            }
        }
    }

    fn request_or_eof_error(&self) -> Result<DecodeStep> {
        if self.eof_signaled {
            Err(CdsyncError::BadMessage(
                "archive truncated mid-header".into(),
            ))
        } else {
            Ok(DecodeStep::Request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_encoder(enc: &mut Encoder) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            match enc.step().unwrap() {
                EncodeStep::Finished => break,
                EncodeStep::NextFile | EncodeStep::Data => out.extend_from_slice(enc.get_data()),
            }
        }
        out
    }

    #[test]
    fn single_regular_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("a");
        std::fs::write(&src_path, b"hello world").unwrap();
        let base = File::open(&src_path).unwrap();

        let mut enc = Encoder::new_single(base).unwrap();
        let bytes = drain_encoder(&mut enc);

        let dest_path = dir.path().join("a-out");
        let dest = File::create(&dest_path).unwrap();
        let mut dec = Decoder::new_single_file(dest);
        dec.put_data(&bytes);
        dec.put_eof();
        loop {
            match dec.step().unwrap() {
                DecodeStep::Finished => break,
                _ => continue,
            }
        }

        assert_eq!(std::fs::read(&dest_path).unwrap(), b"hello world");
    }

    #[test]
    fn directory_with_duplicate_files_round_trips() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a"), b"hello").unwrap();
        std::fs::write(src.path().join("b"), b"hello").unwrap();

        let mut enc = Encoder::new_directory(src.path()).unwrap();
        let bytes = drain_encoder(&mut enc);

        let out_root = tempfile::tempdir().unwrap();
        let mut dec = Decoder::new_directory(out_root.path().to_path_buf());
        dec.put_data(&bytes);
        dec.put_eof();
        loop {
            match dec.step().unwrap() {
                DecodeStep::Finished => break,
                _ => continue,
            }
        }

        assert_eq!(std::fs::read(out_root.path().join("a")).unwrap(), b"hello");
        assert_eq!(std::fs::read(out_root.path().join("b")).unwrap(), b"hello");
    }

    #[test]
    fn request_returned_when_buffer_underfull() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("a");
        std::fs::write(&src_path, b"x").unwrap();
        let base = File::open(&src_path).unwrap();
        let mut enc = Encoder::new_single(base).unwrap();
        let bytes = drain_encoder(&mut enc);

        let dest = File::create(dir.path().join("a-out")).unwrap();
        let mut dec = Decoder::new_single_file(dest);
        assert_eq!(dec.step().unwrap(), DecodeStep::Request);

        // feed one byte at a time; the decoder must never error while waiting
        for &byte in &bytes[..bytes.len() - 1] {
            dec.put_data(&[byte]);
            let _ = dec.step();
        }
        dec.put_data(&bytes[bytes.len() - 1..]);
        dec.put_eof();
        loop {
            match dec.step().unwrap() {
                DecodeStep::Finished => break,
                _ => continue,
            }
        }
    }
}
