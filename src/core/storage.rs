//! Step logs: a plain CSV writer and a compact chunked binary format.
//!
//! Binary layout:
//! - magic `NEMALOG1`, version `u32`
//! - `NAME` chunk: neuron count then length-prefixed UTF-8 names
//! - any number of `ROWS` chunks: row count, then per row a `u64` step index
//!   followed by one `f32` per neuron in declaration order
//!
//! Every chunk payload is LZ4-compressed and preceded by its uncompressed length.

use std::io::{self, Read, Write};

use crate::connectome::NeuronState;
use crate::error::{NemabotError, Result};

pub const MAGIC: &[u8; 8] = b"NEMALOG1";
pub const VERSION_CURRENT: u32 = 1;

const TAG_NAMES: [u8; 4] = *b"NAME";
const TAG_ROWS: [u8; 4] = *b"ROWS";

/// Rows buffered before a `ROWS` chunk is compressed and written.
pub const ROWS_PER_CHUNK: usize = 256;

/// Receives one row of committed activations per step.
pub trait StepSink: Send + Sync {
    /// Called once with the column names before any row.
    fn begin(&mut self, names: &[String]) -> io::Result<()>;

    fn record(&mut self, step: u64, states: &[NeuronState]) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()>;
}

pub fn compress_lz4(input: &[u8]) -> Vec<u8> {
    lz4_flex::compress(input)
}

pub fn decompress_lz4(input: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
    lz4_flex::decompress(input, expected_size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "lz4 decompression failed"))
}

pub fn write_u32_le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u64_le<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f32_le<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_u32_le(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    Ok(u64::from_le_bytes(read_exact::<8, _>(r)?))
}

pub fn read_f32_le<R: Read>(r: &mut R) -> io::Result<f32> {
    Ok(f32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_string<R: Read>(r: &mut R) -> io::Result<String> {
    let n = read_u32_le(r)? as usize;
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid utf-8 string"))
}

/// Tag, total length (including the 4-byte uncompressed length), uncompressed
/// length, compressed payload.
pub fn write_chunk_lz4<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    let compressed = compress_lz4(payload);
    let total_len = 4u32.saturating_add(
        u32::try_from(compressed.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?,
    );
    w.write_all(&tag)?;
    write_u32_le(w, total_len)?;
    write_u32_le(w, payload.len() as u32)?;
    w.write_all(&compressed)
}

/// Next chunk, or `None` at a clean end of stream.
pub fn read_chunk_lz4<R: Read>(r: &mut R) -> io::Result<Option<([u8; 4], Vec<u8>)>> {
    let tag = match read_exact::<4, _>(r) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let len = read_u32_le(r)?;
    let mut take = r.take(len as u64);
    let uncompressed_len = read_u32_le(&mut take)? as usize;
    let mut compressed = Vec::with_capacity((len as usize).saturating_sub(4));
    take.read_to_end(&mut compressed)?;
    if compressed.len() + 4 != len as usize {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated chunk",
        ));
    }
    Ok(Some((tag, decompress_lz4(&compressed, uncompressed_len)?)))
}

/// `iteration,<name>,<name>,...` then one line per step.
pub struct CsvStepLog<W: Write> {
    out: W,
}

impl<W: Write> CsvStepLog<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_values(&mut self, step: u64, values: impl Iterator<Item = f32>) -> io::Result<()> {
        write!(self.out, "{step}")?;
        for v in values {
            write!(self.out, ",{v}")?;
        }
        writeln!(self.out)
    }
}

impl<W: Write + Send + Sync> StepSink for CsvStepLog<W> {
    fn begin(&mut self, names: &[String]) -> io::Result<()> {
        write!(self.out, "iteration")?;
        for n in names {
            write!(self.out, ",{n}")?;
        }
        writeln!(self.out)
    }

    fn record(&mut self, step: u64, states: &[NeuronState]) -> io::Result<()> {
        self.write_values(step, states.iter().map(|s| s.current))
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Binary step log writer. Rows are buffered and written in compressed chunks.
pub struct BinaryStepLog<W: Write> {
    out: W,
    columns: usize,
    pending: Vec<u8>,
    pending_rows: u32,
}

impl<W: Write> BinaryStepLog<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            columns: 0,
            pending: Vec::new(),
            pending_rows: 0,
        }
    }

    fn flush_rows(&mut self) -> io::Result<()> {
        if self.pending_rows == 0 {
            return Ok(());
        }
        let mut payload = Vec::with_capacity(4 + self.pending.len());
        write_u32_le(&mut payload, self.pending_rows)?;
        payload.extend_from_slice(&self.pending);
        write_chunk_lz4(&mut self.out, TAG_ROWS, &payload)?;
        self.pending.clear();
        self.pending_rows = 0;
        Ok(())
    }
}

impl<W: Write + Send + Sync> StepSink for BinaryStepLog<W> {
    fn begin(&mut self, names: &[String]) -> io::Result<()> {
        self.columns = names.len();
        self.out.write_all(MAGIC)?;
        write_u32_le(&mut self.out, VERSION_CURRENT)?;

        let mut payload = Vec::new();
        write_u32_le(&mut payload, names.len() as u32)?;
        for n in names {
            write_string(&mut payload, n)?;
        }
        write_chunk_lz4(&mut self.out, TAG_NAMES, &payload)
    }

    fn record(&mut self, step: u64, states: &[NeuronState]) -> io::Result<()> {
        if states.len() != self.columns {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "row width does not match header",
            ));
        }
        write_u64_le(&mut self.pending, step)?;
        for s in states {
            write_f32_le(&mut self.pending, s.current)?;
        }
        self.pending_rows += 1;
        if self.pending_rows as usize >= ROWS_PER_CHUNK {
            self.flush_rows()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.flush_rows()?;
        self.out.flush()
    }
}

impl<W: Write> Drop for BinaryStepLog<W> {
    fn drop(&mut self) {
        // Best effort; explicit `finish` reports errors.
        let _ = self.flush_rows();
    }
}

/// A fully decoded step log.
#[derive(Debug, Clone, PartialEq)]
pub struct StepLogData {
    pub names: Vec<String>,
    pub rows: Vec<(u64, Vec<f32>)>,
}

impl StepLogData {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let magic = read_exact::<8, _>(r)?;
        if &magic != MAGIC {
            return Err(NemabotError::LogFormat("bad step log magic".into()));
        }
        let version = read_u32_le(r)?;
        if version != VERSION_CURRENT {
            return Err(NemabotError::LogFormat(format!(
                "unsupported step log version {version}"
            )));
        }

        let mut names: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        while let Some((tag, payload)) = read_chunk_lz4(r)? {
            let mut cursor = io::Cursor::new(payload);
            match &tag {
                b"NAME" => {
                    let n = read_u32_le(&mut cursor)? as usize;
                    let mut list = Vec::with_capacity(n);
                    for _ in 0..n {
                        list.push(read_string(&mut cursor)?);
                    }
                    names = Some(list);
                }
                b"ROWS" => {
                    let Some(columns) = names.as_ref().map(Vec::len) else {
                        return Err(NemabotError::LogFormat("rows before names".into()));
                    };
                    let count = read_u32_le(&mut cursor)?;
                    for _ in 0..count {
                        let step = read_u64_le(&mut cursor)?;
                        let values = (0..columns)
                            .map(|_| read_f32_le(&mut cursor))
                            .collect::<io::Result<Vec<f32>>>()?;
                        rows.push((step, values));
                    }
                }
                // Unknown chunks are skipped.
                _ => {}
            }
        }

        let names = names.ok_or_else(|| NemabotError::LogFormat("missing NAME chunk".into()))?;
        Ok(Self { names, rows })
    }

    /// Re-emit as CSV in the same shape `CsvStepLog` writes.
    pub fn write_csv<W: Write + Send + Sync>(&self, out: W) -> io::Result<W> {
        let mut csv = CsvStepLog::new(out);
        csv.begin(&self.names)?;
        for (step, values) in &self.rows {
            csv.write_values(*step, values.iter().copied())?;
        }
        csv.finish()?;
        Ok(csv.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["ADFL".into(), "RIAL".into(), "MDL07".into()]
    }

    fn row(values: [f32; 3]) -> Vec<NeuronState> {
        values
            .iter()
            .map(|&v| NeuronState {
                current: v,
                ..NeuronState::resting(0.0)
            })
            .collect()
    }

    #[test]
    fn csv_header_and_rows() {
        let mut log = CsvStepLog::new(Vec::new());
        log.begin(&names()).unwrap();
        log.record(1, &row([0.0, 15.0, -10.0])).unwrap();
        log.record(2, &row([-15.0, 13.5, 2.0])).unwrap();
        let text = String::from_utf8(log.into_inner()).unwrap();
        assert_eq!(
            text,
            "iteration,ADFL,RIAL,MDL07\n1,0,15,-10\n2,-15,13.5,2\n"
        );
    }

    #[test]
    fn binary_log_spans_several_chunks() {
        let mut buf = Vec::new();
        {
            let mut log = BinaryStepLog::new(&mut buf);
            log.begin(&names()).unwrap();
            for step in 1..=(ROWS_PER_CHUNK as u64 * 2 + 3) {
                log.record(step, &row([step as f32, -1.0, 0.5])).unwrap();
            }
            log.finish().unwrap();
        }
        let data = StepLogData::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(data.names, names());
        assert_eq!(data.rows.len(), ROWS_PER_CHUNK * 2 + 3);
        assert_eq!(data.rows[0], (1, vec![1.0, -1.0, 0.5]));
        let last = data.rows.last().unwrap();
        assert_eq!(last.0, ROWS_PER_CHUNK as u64 * 2 + 3);
    }

    #[test]
    fn dropped_writer_flushes_pending_rows() {
        let mut buf = Vec::new();
        {
            let mut log = BinaryStepLog::new(&mut buf);
            log.begin(&names()).unwrap();
            log.record(1, &row([1.0, 2.0, 3.0])).unwrap();
        }
        let data = StepLogData::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(data.rows.len(), 1);
    }

    #[test]
    fn binary_dump_matches_csv_writer() {
        let mut bin = Vec::new();
        let mut csv = CsvStepLog::new(Vec::new());
        {
            let mut log = BinaryStepLog::new(&mut bin);
            log.begin(&names()).unwrap();
            csv.begin(&names()).unwrap();
            for (i, r) in [[0.0, 15.0, -10.0], [-15.0, 13.5, 2.0]].into_iter().enumerate() {
                log.record(i as u64 + 1, &row(r)).unwrap();
                csv.record(i as u64 + 1, &row(r)).unwrap();
            }
            log.finish().unwrap();
        }
        let data = StepLogData::read_from(&mut bin.as_slice()).unwrap();
        let dumped = data.write_csv(Vec::new()).unwrap();
        assert_eq!(dumped, csv.into_inner());
    }

    #[test]
    fn rejects_bad_magic_and_width() {
        let err = StepLogData::read_from(&mut &b"NOTALOG!\x01\0\0\0"[..]).unwrap_err();
        assert!(matches!(err, NemabotError::LogFormat(_)));

        let mut log = BinaryStepLog::new(Vec::new());
        log.begin(&names()).unwrap();
        assert!(log.record(1, &row([1.0, 2.0, 3.0])[..2]).is_err());
    }
}
