//! File writers for events and binned grids.

use crate::reader::{EventFileHeader, FORMAT_VERSION};
use crate::Result;
use mdevents_core::{EventBatch, MdHistoGrid};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writer for event and histogram output.
pub struct EventFileWriter {
    writer: BufWriter<File>,
}

impl EventFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes events as CSV with a `x0,...,signal,error_sq` header.
    ///
    /// # Errors
    /// Returns an error if a write fails.
    pub fn write_events_csv(&mut self, events: &EventBatch) -> Result<()> {
        let header: Vec<String> = (0..events.num_dims()).map(|d| format!("x{d}")).collect();
        writeln!(self.writer, "{},signal,error_sq", header.join(","))?;

        for event in events.iter() {
            for c in event.coords {
                write!(self.writer, "{c},")?;
            }
            writeln!(self.writer, "{},{}", event.signal, event.error_sq)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes events in the binary event-file format read by
    /// [`crate::EventFileReader`].
    ///
    /// # Errors
    /// Returns an error if a write fails.
    pub fn write_events_binary(&mut self, events: &EventBatch) -> Result<()> {
        let header = EventFileHeader {
            version: FORMAT_VERSION,
            num_dims: events.num_dims(),
            num_events: events.len(),
        };
        self.writer.write_all(&header.to_bytes())?;
        let mut payload = Vec::new();
        events.write_le_bytes(&mut payload);
        self.writer.write_all(&payload)?;

        self.writer.flush()?;
        Ok(())
    }

    /// Writes a grid as CSV, one cell per row in linear-index order.
    ///
    /// # Errors
    /// Returns an error if a write fails.
    pub fn write_histo_csv(&mut self, grid: &MdHistoGrid) -> Result<()> {
        writeln!(self.writer, "index,signal,error,num_events")?;
        for i in 0..grid.len() {
            writeln!(
                self.writer,
                "{i},{},{},{}",
                grid.signal_at(i).unwrap_or_default(),
                grid.error_at(i).unwrap_or_default(),
                grid.num_events_at(i).unwrap_or_default()
            )?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{read_events_csv, EventFileReader, HEADER_LEN};
    use mdevents_core::MdEvent;
    use tempfile::NamedTempFile;

    fn events() -> EventBatch {
        vec![
            MdEvent::new(vec![1.5, 2.5], 1.0, 0.25),
            MdEvent::new(vec![10.25, 20.75], 2.0, 4.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_write_events_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = EventFileWriter::create(file.path()).unwrap();
        writer.write_events_csv(&events()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("x0,x1,signal,error_sq\n"));
        assert!(content.contains("1.5,2.5,1,0.25"));
        assert!(content.contains("10.25,20.75,2,4"));
        assert_eq!(read_events_csv(file.path()).unwrap(), events());
    }

    #[test]
    fn test_write_events_binary() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = EventFileWriter::create(file.path()).unwrap();
        writer.write_events_binary(&events()).unwrap();

        let data = std::fs::read(file.path()).unwrap();
        // header + 2 events * 4 f32
        assert_eq!(data.len(), HEADER_LEN + 2 * 16);

        let reader = EventFileReader::open(file.path()).unwrap();
        assert_eq!(reader.num_dims(), 2);
        assert_eq!(reader.read_batch().unwrap(), events());
        let chunks = reader.read_chunks(1).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].coords(0), &[10.25, 20.75]);
    }

    #[test]
    fn test_write_histo_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut grid = MdHistoGrid::new(&[2, 2]).unwrap();
        grid.set_at(3, 9.0, 4.0).unwrap();
        let mut writer = EventFileWriter::create(file.path()).unwrap();
        writer.write_histo_csv(&grid).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content.lines().count(), 5);
        assert!(content.contains("3,9,2,0"));
    }
}
