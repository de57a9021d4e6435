//! Memory-mapped readers for event files.
//!
//! Binary layout (little-endian):
//!
//! | bytes | content |
//! |---|---|
//! | 4 | magic `MDEV` |
//! | 4 | `u32` format version |
//! | 4 | `u32` number of dimensions |
//! | 8 | `u64` number of events |
//! | ... | per event: coordinates, signal, error squared, all `f32` |

use crate::{Error, Result};
use memmap2::Mmap;
use mdevents_core::EventBatch;
use rayon::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// File magic of binary event files.
pub const MAGIC: &[u8; 4] = b"MDEV";
/// Current binary format version.
pub const FORMAT_VERSION: u32 = 1;
/// Size of the binary header in bytes.
pub const HEADER_LEN: usize = 20;

/// Header of a binary event file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFileHeader {
    /// Format version.
    pub version: u32,
    /// Dimensions per event.
    pub num_dims: usize,
    /// Number of events.
    pub num_events: usize,
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl EventFileHeader {
    /// Parses and checks the header at the start of `bytes`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for a short file, a wrong magic or an
    /// unsupported version.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::InvalidFormat(format!(
                "file of {} bytes is shorter than the {HEADER_LEN}-byte header",
                bytes.len()
            )));
        }
        if bytes[..4] != MAGIC[..] {
            return Err(Error::InvalidFormat("missing MDEV magic".to_string()));
        }
        let version = read_u32(bytes, 4);
        if version != FORMAT_VERSION {
            return Err(Error::InvalidFormat(format!(
                "unsupported format version {version}"
            )));
        }
        let num_dims = read_u32(bytes, 8) as usize;
        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[12..HEADER_LEN]);
        let num_events = usize::try_from(u64::from_le_bytes(count))
            .map_err(|_| Error::InvalidFormat("event count overflows usize".to_string()))?;
        if num_dims == 0 {
            return Err(Error::InvalidFormat("zero dimensions".to_string()));
        }
        Ok(Self {
            version,
            num_dims,
            num_events,
        })
    }

    /// Encodes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(MAGIC);
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(&u32::try_from(self.num_dims).unwrap_or(u32::MAX).to_le_bytes());
        out[12..].copy_from_slice(&(self.num_events as u64).to_le_bytes());
        out
    }
}

/// Reader for binary event files.
///
/// The file is memory mapped, so decoding a chunk only touches the pages
/// that hold it.
pub struct EventFileReader {
    mmap: Mmap,
    path: PathBuf,
    header: EventFileHeader,
}

impl EventFileReader {
    /// Maps a binary event file and validates its header.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file cannot be opened or mapped, and
    /// [`Error::InvalidFormat`] for a bad header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // SAFETY: the map is read-only and event files are not rewritten
        // while a reader holds them.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        let header = EventFileHeader::parse(&mmap)?;
        Ok(Self { mmap, path, header })
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the mapped file in bytes.
    #[must_use]
    pub fn file_len(&self) -> usize {
        self.mmap.len()
    }

    /// The event payload and its per-event stride, once the payload length
    /// matches the header.
    fn checked_payload(&self) -> Result<(&[u8], usize)> {
        let payload = &self.mmap[HEADER_LEN..];
        let stride = EventBatch::bytes_per_event(self.header.num_dims);
        let expected = self.header.num_events.checked_mul(stride).ok_or_else(|| {
            Error::InvalidFormat(format!(
                "header declares {} events of {stride} bytes, more than addressable (file: {})",
                self.header.num_events,
                self.path.display()
            ))
        })?;
        if payload.len() != expected {
            return Err(Error::InvalidFormat(format!(
                "expected {expected} bytes of events, found {} (file: {})",
                payload.len(),
                self.path.display()
            )));
        }
        Ok((payload, stride))
    }

    /// The parsed header.
    #[must_use]
    pub fn header(&self) -> &EventFileHeader {
        &self.header
    }

    /// Dimensions per event.
    #[must_use]
    pub fn num_dims(&self) -> usize {
        self.header.num_dims
    }

    /// Number of events declared by the header.
    #[must_use]
    pub fn num_events(&self) -> usize {
        self.header.num_events
    }

    /// Decodes every event.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the payload length disagrees with
    /// the header.
    pub fn read_batch(&self) -> Result<EventBatch> {
        let (payload, _) = self.checked_payload()?;
        Ok(EventBatch::from_le_bytes(self.header.num_dims, payload)?)
    }

    /// Decodes the events in chunks of at most `chunk_events`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the payload length disagrees with
    /// the header.
    pub fn read_chunks(&self, chunk_events: usize) -> Result<Vec<EventBatch>> {
        let (payload, stride) = self.checked_payload()?;
        let num_dims = self.header.num_dims;
        payload
            .par_chunks(stride.saturating_mul(chunk_events.max(1)))
            .map(|chunk| EventBatch::from_le_bytes(num_dims, chunk).map_err(Error::from))
            .collect()
    }
}

/// Reads events from a CSV file.
///
/// Every non-empty line that does not start with `#` holds
/// `c0,...,c{n-1},signal,error_sq`; a leading header line is skipped. The
/// dimensionality is taken from the first data line.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] for a malformed line or inconsistent
/// column counts.
pub fn read_events_csv<P: AsRef<Path>>(path: P) -> Result<EventBatch> {
    let text = std::fs::read_to_string(&path)?;
    let rows: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .collect();
    let data = match rows.first() {
        Some((_, first)) if first.split(',').any(|f| f.trim().parse::<f32>().is_err()) => &rows[1..],
        _ => &rows[..],
    };

    let parsed: Vec<Vec<f32>> = data
        .par_iter()
        .map(|&(line_no, line)| {
            line.split(',')
                .map(|field| {
                    field.trim().parse::<f32>().map_err(|e| {
                        Error::InvalidFormat(format!("line {line_no}: {e} in {field:?}"))
                    })
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect::<Result<_>>()?;

    let Some(width) = parsed.first().map(Vec::len) else {
        return Ok(EventBatch::new(0));
    };
    if width < 3 {
        return Err(Error::InvalidFormat(format!(
            "{width} columns; need coordinates, signal and error squared"
        )));
    }
    let num_dims = width - 2;
    let mut batch = EventBatch::with_capacity(num_dims, parsed.len());
    for (row, &(line_no, _)) in parsed.iter().zip(data) {
        if row.len() != width {
            return Err(Error::InvalidFormat(format!(
                "line {line_no}: {} columns, expected {width}",
                row.len()
            )));
        }
        batch.push_parts(&row[..num_dims], row[num_dims], row[num_dims + 1])?;
    }
    log::debug!(
        "read {} {num_dims}-dimensional events from {}",
        batch.len(),
        path.as_ref().display()
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = EventFileHeader {
            version: FORMAT_VERSION,
            num_dims: 2,
            num_events: 0,
        }
        .to_bytes();
        assert_eq!(EventFileHeader::parse(&bytes).unwrap().num_dims, 2);
        bytes[0] = b'X';
        assert!(matches!(
            EventFileHeader::parse(&bytes),
            Err(Error::InvalidFormat(_))
        ));
        assert!(EventFileHeader::parse(&bytes[..10]).is_err());
    }

    #[test]
    fn test_truncated_payload() {
        let mut file = NamedTempFile::new().unwrap();
        let header = EventFileHeader {
            version: FORMAT_VERSION,
            num_dims: 1,
            num_events: 2,
        };
        file.write_all(&header.to_bytes()).unwrap();
        file.write_all(&[0u8; 12]).unwrap();
        file.flush().unwrap();

        let reader = EventFileReader::open(file.path()).unwrap();
        assert_eq!(reader.num_events(), 2);
        assert_eq!(reader.file_len(), HEADER_LEN + 12);
        assert!(reader.read_batch().is_err());
        assert!(reader.read_chunks(1).is_err());
    }

    #[test]
    fn test_read_csv_with_header_and_comments() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# generated").unwrap();
        writeln!(file, "x0,x1,signal,error_sq").unwrap();
        writeln!(file, "1.0, 2.0, 3.0, 4.0").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "5,6,7,8").unwrap();
        file.flush().unwrap();

        let batch = read_events_csv(file.path()).unwrap();
        assert_eq!(batch.num_dims(), 2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.coords(1), &[5.0, 6.0]);
        assert_eq!(batch.signals(), &[3.0, 7.0]);
    }

    #[test]
    fn test_read_csv_ragged_rows() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1,2,3").unwrap();
        writeln!(file, "1,2,3,4").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            read_events_csv(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }
}
