use anyhow::{bail, Context, Result};
use log::warn;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One raw IMU sample exactly as the logger wrote it.
///
/// `timestamp_ms` is the device's monotonic millisecond counter; it may roll
/// over during long recordings (handled in `preprocessing`). The axis fields
/// are raw sensor counts at ±2 g / ±250 dps full scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImuSample {
    pub timestamp_ms: u32,
    pub ax_raw: i16,
    pub ay_raw: i16,
    pub az_raw: i16,
    pub gx_raw: i16,
    pub gy_raw: i16,
    pub gz_raw: i16,
}

/// Size of one little-endian record in the binary log format.
pub const RECORD_SIZE: usize = 16;

fn decode_record(chunk: &[u8]) -> ImuSample {
    ImuSample {
        timestamp_ms: u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        ax_raw: i16::from_le_bytes([chunk[4], chunk[5]]),
        ay_raw: i16::from_le_bytes([chunk[6], chunk[7]]),
        az_raw: i16::from_le_bytes([chunk[8], chunk[9]]),
        gx_raw: i16::from_le_bytes([chunk[10], chunk[11]]),
        gy_raw: i16::from_le_bytes([chunk[12], chunk[13]]),
        gz_raw: i16::from_le_bytes([chunk[14], chunk[15]]),
    }
}

/// Decode a stream of fixed 16-byte records until end-of-stream.
///
/// A trailing partial record (the logger was powered off mid-write) is
/// skipped with a warning rather than treated as corruption.
pub fn decode_binary(bytes: &[u8]) -> Vec<ImuSample> {
    let remainder = bytes.len() % RECORD_SIZE;
    if remainder != 0 {
        warn!("Skipping {} trailing bytes of a partial record", remainder);
    }
    bytes.chunks_exact(RECORD_SIZE).map(decode_record).collect()
}

pub fn read_binary_file(path: &Path) -> Result<Vec<ImuSample>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    Ok(decode_binary(&bytes))
}

/// Column names accepted for each field, first match wins.
const CSV_COLUMNS: [(&str, &[&str]); 7] = [
    ("timestamp", &["timestamp", "timestamp_ms", "ts"]),
    ("ax", &["ax", "ax_raw"]),
    ("ay", &["ay", "ay_raw"]),
    ("az", &["az", "az_raw"]),
    ("gx", &["gx", "gx_raw"]),
    ("gy", &["gy", "gy_raw"]),
    ("gz", &["gz", "gz_raw"]),
];

fn resolve_columns(headers: &csv::StringRecord) -> Result<[usize; 7]> {
    let mut indices = [0usize; 7];
    for (slot, (canonical, aliases)) in CSV_COLUMNS.iter().enumerate() {
        let found = headers.iter().position(|h| {
            let h = h.trim();
            aliases.iter().any(|a| h.eq_ignore_ascii_case(a))
        });
        match found {
            Some(idx) => indices[slot] = idx,
            None => bail!("CSV header is missing a {} column", canonical),
        }
    }
    Ok(indices)
}

pub fn read_csv<R: std::io::Read>(reader: R) -> Result<Vec<ImuSample>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true) // Handle variable number of fields
        .trim(csv::Trim::All)
        .from_reader(reader);

    let indices = resolve_columns(rdr.headers()?)?;
    let mut samples = Vec::new();

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let field = |slot: usize| -> Result<&str> {
            record
                .get(indices[slot])
                .with_context(|| format!("Row {}: missing column {}", row + 1, indices[slot]))
        };

        let sample = ImuSample {
            timestamp_ms: field(0)?
                .parse()
                .with_context(|| format!("Row {}: bad timestamp", row + 1))?,
            ax_raw: field(1)?.parse().with_context(|| format!("Row {}: bad ax", row + 1))?,
            ay_raw: field(2)?.parse().with_context(|| format!("Row {}: bad ay", row + 1))?,
            az_raw: field(3)?.parse().with_context(|| format!("Row {}: bad az", row + 1))?,
            gx_raw: field(4)?.parse().with_context(|| format!("Row {}: bad gx", row + 1))?,
            gy_raw: field(5)?.parse().with_context(|| format!("Row {}: bad gy", row + 1))?,
            gz_raw: field(6)?.parse().with_context(|| format!("Row {}: bad gz", row + 1))?,
        };
        samples.push(sample);
    }

    Ok(samples)
}

pub fn read_csv_file(path: &Path) -> Result<Vec<ImuSample>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    read_csv(std::io::BufReader::new(file))
}

/// Collect the recordings under `input_path`.
///
/// A plain file is returned as-is; a directory is walked for `.bin` and
/// `.csv` files, sorted by path so batch runs are deterministic.
pub fn collect_recordings(input_path: &Path) -> Result<Vec<PathBuf>> {
    if input_path.is_file() {
        return Ok(vec![input_path.to_path_buf()]);
    }
    if !input_path.is_dir() {
        bail!("Input path does not exist: {}", input_path.display());
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(input_path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("bin") | Some("csv") | Some("BIN") | Some("CSV")
            )
        })
        .collect();
    paths.sort();
    Ok(paths)
}
