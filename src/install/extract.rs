//! Streaming archive extraction.
//!
//! [`ArchiveExtractor`] accepts the archive as a sequence of byte chunks,
//! exactly as they arrive from the network, and writes files below a
//! destination directory. The format is sniffed from the first bytes:
//!
//! - gzip (`1f 8b`): decompressed with `flate2` and parsed as tar
//! - zip (`PK\x03\x04`): buffered and extracted with the `zip` crate on finish
//! - anything else: parsed as plain tar
//!
//! Tar archives are parsed block by block while they stream in, so a
//! truncated or corrupt archive is detected at the exact byte where it stops
//! making sense. Entries that would land outside the destination are
//! rejected.

use crate::utils::fs::{ensure_dir, is_plain_relative};
use anyhow::{Context, Result, anyhow, bail};
use flate2::write::GzDecoder;
use std::fs::File;
use std::io::{self, Cursor, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

const BLOCK: usize = 512;
const SNIFF_LEN: usize = 4;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: [u8; 4] = *b"PK\x05\x06";

enum Backend {
    Sniffing(Vec<u8>),
    Gzip(Box<GzDecoder<TarStream>>),
    Tar(TarStream),
    Zip(Vec<u8>),
}

/// Push-driven extractor for gzip/tar/zip archives.
pub struct ArchiveExtractor {
    dest: PathBuf,
    backend: Backend,
    bytes_in: u64,
}

impl ArchiveExtractor {
    /// Extracts into `dest`, which must exist.
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            backend: Backend::Sniffing(Vec::with_capacity(SNIFF_LEN)),
            bytes_in: 0,
        }
    }

    /// Feeds the next chunk of the archive.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.bytes_in += data.len() as u64;
        if let Backend::Sniffing(head) = &mut self.backend {
            head.extend_from_slice(data);
            if head.len() < SNIFF_LEN {
                return Ok(());
            }
            let head = std::mem::take(head);
            self.select_backend(&head);
            return self.forward(&head);
        }
        self.forward(data)
    }

    fn select_backend(&mut self, head: &[u8]) {
        self.backend = if head.starts_with(&GZIP_MAGIC) {
            debug!("Extracting gzip-compressed tar into {}", self.dest.display());
            Backend::Gzip(Box::new(GzDecoder::new(TarStream::new(&self.dest))))
        } else if head.starts_with(&ZIP_MAGIC) || head.starts_with(&ZIP_EMPTY_MAGIC) {
            debug!("Extracting zip archive into {}", self.dest.display());
            Backend::Zip(Vec::new())
        } else {
            debug!("Extracting tar archive into {}", self.dest.display());
            Backend::Tar(TarStream::new(&self.dest))
        };
    }

    fn forward(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.backend {
            Backend::Sniffing(head) => head.extend_from_slice(data),
            Backend::Gzip(decoder) => decoder.write_all(data).context("gzip stream")?,
            Backend::Tar(tar) => tar.write_all(data).context("tar stream")?,
            Backend::Zip(buffer) => buffer.extend_from_slice(data),
        }
        Ok(())
    }

    /// Completes extraction. Fails if the archive was empty, truncated,
    /// followed by trailing data, or otherwise unreadable.
    pub fn finish(mut self) -> Result<()> {
        if let Backend::Sniffing(head) = &mut self.backend {
            if head.is_empty() {
                bail!("archive is empty");
            }
            let head = std::mem::take(head);
            self.select_backend(&head);
            self.forward(&head)?;
        }

        match self.backend {
            Backend::Sniffing(_) => Err(anyhow!("archive format not detected")),
            Backend::Gzip(decoder) => {
                let decoder = *decoder;
                let tar = decoder.finish().context("gzip stream")?;
                tar.finish()
            }
            Backend::Tar(tar) => tar.finish(),
            Backend::Zip(buffer) => {
                if !ends_with_zip_directory(&buffer) {
                    bail!("zip archive is truncated or followed by trailing data");
                }
                let mut archive =
                    zip::ZipArchive::new(Cursor::new(buffer)).context("zip central directory")?;
                for i in 0..archive.len() {
                    let entry = archive.by_index(i).context("zip entry")?;
                    if entry.enclosed_name().is_none() {
                        bail!("zip entry escapes the destination: {}", entry.name());
                    }
                }
                archive.extract(&self.dest).context("zip extraction")?;
                Ok(())
            }
        }
    }

    /// Bytes fed so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }
}

const EOCD_SIGNATURE: [u8; 4] = *b"PK\x05\x06";
const EOCD_LEN: usize = 22;

/// True if the buffer ends exactly with an end-of-central-directory record
/// and its comment.
fn ends_with_zip_directory(buffer: &[u8]) -> bool {
    if buffer.len() < EOCD_LEN {
        return false;
    }
    (0..=buffer.len() - EOCD_LEN).rev().any(|pos| {
        buffer[pos..pos + 4] == EOCD_SIGNATURE && {
            let comment_len = usize::from(u16::from_le_bytes([buffer[pos + 20], buffer[pos + 21]]));
            pos + EOCD_LEN + comment_len == buffer.len()
        }
    })
}

/// Where the data of the current tar entry goes.
enum Sink {
    File(File),
    LongName(Vec<u8>),
    Pax(Vec<u8>),
    Skip,
}

enum TarState {
    Header,
    Entry {
        sink: Sink,
        remaining: u64,
        padding: u64,
    },
    End,
}

/// Incremental tar reader implementing [`Write`].
struct TarStream {
    dest: PathBuf,
    block: Vec<u8>,
    state: TarState,
    long_name: Option<PathBuf>,
    zero_blocks: u8,
    entries: usize,
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

impl TarStream {
    fn new(dest: &Path) -> Self {
        Self {
            dest: dest.to_path_buf(),
            block: Vec::with_capacity(BLOCK),
            state: TarState::Header,
            long_name: None,
            zero_blocks: 0,
            entries: 0,
        }
    }

    fn feed(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            match &mut self.state {
                TarState::Header => {
                    let take = (BLOCK - self.block.len()).min(data.len());
                    self.block.extend_from_slice(&data[..take]);
                    data = &data[take..];
                    if self.block.len() == BLOCK {
                        let block = std::mem::replace(&mut self.block, Vec::with_capacity(BLOCK));
                        self.on_header(&block)?;
                    }
                }
                TarState::Entry {
                    sink,
                    remaining,
                    padding,
                } => {
                    if *remaining > 0 {
                        let take = usize::try_from(*remaining).unwrap_or(usize::MAX).min(data.len());
                        match sink {
                            Sink::File(file) => file.write_all(&data[..take])?,
                            Sink::LongName(buf) | Sink::Pax(buf) => {
                                buf.extend_from_slice(&data[..take]);
                            }
                            Sink::Skip => {}
                        }
                        *remaining -= take as u64;
                        data = &data[take..];
                    } else {
                        let take = usize::try_from(*padding).unwrap_or(usize::MAX).min(data.len());
                        *padding -= take as u64;
                        data = &data[take..];
                    }
                    if *remaining == 0 && *padding == 0 {
                        self.end_entry()?;
                    }
                }
                TarState::End => {
                    if data.iter().any(|&b| b != 0) {
                        return Err(invalid("unexpected data after end of tar archive"));
                    }
                    data = &[];
                }
            }
        }
        Ok(())
    }

    fn on_header(&mut self, block: &[u8]) -> io::Result<()> {
        if block.iter().all(|&b| b == 0) {
            self.zero_blocks += 1;
            if self.zero_blocks >= 2 {
                self.state = TarState::End;
            }
            return Ok(());
        }
        if self.zero_blocks > 0 {
            return Err(invalid("tar header after end-of-archive marker"));
        }

        let header = tar::Header::from_byte_slice(block);
        verify_checksum(header, block)?;

        let size = header.entry_size()?;
        let padding = (BLOCK as u64 - size % BLOCK as u64) % BLOCK as u64;
        let entry_type = header.entry_type();

        let sink = if entry_type.is_gnu_longname() {
            Sink::LongName(Vec::new())
        } else if entry_type.is_pax_local_extensions() || entry_type.is_pax_global_extensions() {
            Sink::Pax(Vec::new())
        } else {
            let path = match self.long_name.take() {
                Some(path) => path,
                None => header.path()?.into_owned(),
            };
            self.open_entry(&path, entry_type)?
        };

        self.state = TarState::Entry {
            sink,
            remaining: size,
            padding,
        };
        if size == 0 {
            self.end_entry()?;
        }
        Ok(())
    }

    fn open_entry(&mut self, path: &Path, entry_type: tar::EntryType) -> io::Result<Sink> {
        let is_dir = entry_type.is_dir();
        if is_dir && !path.components().any(|c| matches!(c, Component::Normal(_))) {
            return Ok(Sink::Skip);
        }
        if !is_plain_relative(path) {
            return Err(invalid(format!("tar entry escapes the destination: {}", path.display())));
        }

        let target = self.dest.join(path);
        if is_dir {
            ensure_dir(&target).map_err(io::Error::other)?;
            return Ok(Sink::Skip);
        }
        if entry_type.is_file() || entry_type == tar::EntryType::Continuous {
            if let Some(parent) = target.parent() {
                ensure_dir(parent).map_err(io::Error::other)?;
            }
            return Ok(Sink::File(File::create(&target)?));
        }

        warn!("Skipping unsupported tar entry {} ({entry_type:?})", path.display());
        Ok(Sink::Skip)
    }

    fn end_entry(&mut self) -> io::Result<()> {
        let state = std::mem::replace(&mut self.state, TarState::Header);
        if let TarState::Entry {
            sink, ..
        } = state
        {
            match sink {
                Sink::File(mut file) => {
                    file.flush()?;
                    self.entries += 1;
                }
                Sink::LongName(bytes) => {
                    let name = String::from_utf8_lossy(&bytes);
                    self.long_name = Some(PathBuf::from(name.trim_end_matches('\0')));
                }
                Sink::Pax(bytes) => {
                    if let Some(path) = pax_path(&bytes) {
                        self.long_name = Some(path);
                    }
                }
                Sink::Skip => self.entries += 1,
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        match self.state {
            TarState::End => {}
            TarState::Header if self.block.is_empty() => {
                // Some writers omit the end-of-archive marker
                debug!("tar archive ended without end-of-archive marker");
            }
            TarState::Header => bail!("tar archive truncated inside a header"),
            TarState::Entry {
                ..
            } => bail!("tar archive truncated inside an entry"),
        }
        if self.entries == 0 {
            bail!("tar archive contains no entries");
        }
        Ok(())
    }
}

impl Write for TarStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.feed(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn verify_checksum(header: &tar::Header, block: &[u8]) -> io::Result<()> {
    let expected = header.cksum()?;
    let actual: u32 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| if (148..156).contains(&i) { u32::from(b' ') } else { u32::from(b) })
        .sum();
    if expected != actual {
        return Err(invalid("tar header checksum mismatch"));
    }
    Ok(())
}

/// Extracts the `path` record from PAX extended header data
/// (`"<len> path=<value>\n"` records).
fn pax_path(data: &[u8]) -> Option<PathBuf> {
    let text = std::str::from_utf8(data).ok()?;
    text.lines().find_map(|record| {
        let (_len, kv) = record.split_once(' ')?;
        kv.strip_prefix("path=").map(PathBuf::from)
    })
}
