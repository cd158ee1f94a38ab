use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single record as `[u32: len][bincode: Event][u32: crc32]`.
fn encode_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only event journal — the authoritative store behind the engine.
///
/// Records are length-prefixed and CRC-guarded, so a crash mid-append
/// loses at most the torn tail, never an acknowledged event: appends are
/// flushed and fsynced before the engine applies them in memory.
pub struct Journal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Journal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Buffer a record without flushing. Call `flush_sync` after the batch
    /// to durably commit everything buffered (group commit).
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the buffer and fsync the file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Append one record and fsync immediately. Test convenience; the
    /// engine goes through the group-commit writer instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Phase one of compaction: write the replacement journal to a temp
    /// file and fsync it. Slow I/O — runs outside the writer's batch path.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("journal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Phase two: atomically rename the temp file over the journal and
    /// reopen for appending.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("journal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Read back every valid record. A truncated or CRC-corrupt tail ends
    /// replay silently; everything before it is returned.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // torn tail
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    use crate::model::{CalendarSlot, Span};

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("seatgrid_test_journal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn hold_event() -> Event {
        Event::HoldPlaced {
            seat_id: Ulid::new(),
            slot_id: Ulid::new(),
            user_id: Ulid::new(),
            expires_at: 1_700_000_600_000,
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.journal");
        let seat_id = Ulid::new();
        let events = vec![
            Event::SlotsGenerated {
                seat_id,
                slots: vec![CalendarSlot::new(
                    Ulid::new(),
                    seat_id,
                    Span::new(1_700_000_000_000, 1_700_003_600_000),
                )],
            },
            hold_event(),
        ];

        {
            let mut journal = Journal::open(&path).unwrap();
            for e in &events {
                journal.append(e).unwrap();
            }
        }

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed, events);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_discards_torn_tail() {
        let path = tmp_path("torn_tail.journal");
        let event = hold_event();

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8; 6]).unwrap(); // partial length + some bytes
        }

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed, vec![event]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file_is_empty() {
        let path = tmp_path("nonexistent.journal");
        assert!(Journal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("bad_crc.journal");
        let payload = bincode::serialize(&hold_event()).unwrap();
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }
        assert!(Journal::replay(&path).unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_shrinks_and_survives_appends() {
        let path = tmp_path("compact.journal");
        let seat_id = Ulid::new();
        let slot_id = Ulid::new();
        let generated = Event::SlotsGenerated {
            seat_id,
            slots: vec![CalendarSlot::new(
                slot_id,
                seat_id,
                Span::new(1_700_000_000_000, 1_700_003_600_000),
            )],
        };

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.append(&generated).unwrap();
            // churn: hold + release, many times over
            for _ in 0..10 {
                journal
                    .append(&Event::HoldPlaced {
                        seat_id,
                        slot_id,
                        user_id: Ulid::new(),
                        expires_at: 1_700_000_600_000,
                    })
                    .unwrap();
                journal
                    .append(&Event::SlotReleased { seat_id, slot_id })
                    .unwrap();
            }
        }
        let before = fs::metadata(&path).unwrap().len();

        let after_event = hold_event();
        {
            let mut journal = Journal::open(&path).unwrap();
            Journal::write_compact_file(&path, std::slice::from_ref(&generated)).unwrap();
            journal.swap_compact_file().unwrap();
            assert_eq!(journal.appends_since_compact(), 0);
            journal.append(&after_event).unwrap();
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted journal should shrink: {after} < {before}");

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed, vec![generated, after_event]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_appends_commit_on_flush() {
        let path = tmp_path("buffered.journal");
        let events: Vec<Event> = (0..5).map(|_| hold_event()).collect();

        {
            let mut journal = Journal::open(&path).unwrap();
            for e in &events {
                journal.append_buffered(e).unwrap();
            }
            assert_eq!(journal.appends_since_compact(), 5);
            journal.flush_sync().unwrap();
        }

        assert_eq!(Journal::replay(&path).unwrap(), events);
        let _ = fs::remove_file(&path);
    }
}
