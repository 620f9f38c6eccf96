//! ACH File Store
//!
//! The controller's working directory holds merged work-in-progress files
//! named `YYYYMMDD-<routingNumber>-<seq>.ach` (optionally `.gpg`). This
//! module owns that convention: sequence encoding, outbound filename
//! templating, locating the latest mergable file for a routing number, and
//! bulk-parsing a directory ahead of upload.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::debug;

use crate::ach::{AchError, AchFile, FileHeader};

/// Outbound filename template. `{date}` renders as `%Y%m%d`, `{seq}` via the
/// 1-9/A-Z sequence encoding; a `.gpg` suffix is appended for encrypted
/// uploads. ODFIs can override this per routing number.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{date}-{routing}-{seq}.ach";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid ACH file sequence: {0}")]
    InvalidSequence(String),

    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: AchError,
    },

    #[error(transparent)]
    Ach(#[from] AchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a file sequence number: `1..=9` as digits, `10..=35` as `A..=Z`.
pub fn encode_seq(n: u8) -> Result<char, StoreError> {
    match n {
        1..=9 => Ok((b'0' + n) as char),
        10..=35 => Ok((b'A' + (n - 10)) as char),
        _ => Err(StoreError::InvalidSequence(n.to_string())),
    }
}

/// Inverse of [`encode_seq`].
pub fn decode_seq(s: &str) -> Result<u8, StoreError> {
    let mut chars = s.chars();
    let (c, rest) = (chars.next(), chars.next());
    match (c, rest) {
        (Some(c @ '1'..='9'), None) => Ok(c as u8 - b'0'),
        (Some(c @ 'A'..='Z'), None) => Ok(c as u8 - b'A' + 10),
        _ => Err(StoreError::InvalidSequence(s.to_string())),
    }
}

/// Render an outbound ACH filename from a template.
pub fn render_filename(
    template: &str,
    routing_number: &str,
    seq: u8,
    gpg: bool,
) -> Result<String, StoreError> {
    let date = Local::now().format("%Y%m%d").to_string();
    let mut name = template
        .replace("{date}", &date)
        .replace("{routing}", routing_number)
        .replace("{seq}", &encode_seq(seq)?.to_string());
    if gpg {
        name.push_str(".gpg");
    }
    Ok(name)
}

/// The default filename for a merged file: `YYYYMMDD-<routing>-<seq>.ach`.
pub fn ach_filename(routing_number: &str, seq: u8) -> Result<String, StoreError> {
    render_filename(DEFAULT_FILENAME_TEMPLATE, routing_number, seq, false)
}

/// Pieces of a merged filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub date: String,
    pub routing_number: String,
    pub seq: u8,
    pub gpg: bool,
}

/// Parse `YYYYMMDD-<routing>-<seq>.ach[.gpg]`. Returns `None` for names not
/// shaped like the convention at all; an error for a convention-shaped name
/// whose sequence does not decode.
pub fn parse_filename(filename: &str) -> Result<Option<ParsedFilename>, StoreError> {
    let gpg = filename.ends_with(".gpg");
    let stem = filename
        .strip_suffix(".gpg")
        .unwrap_or(filename)
        .strip_suffix(".ach");
    let stem = match stem {
        Some(s) => s,
        None => return Ok(None),
    };
    let mut parts = stem.splitn(3, '-');
    let (date, routing, seq) = match (parts.next(), parts.next(), parts.next()) {
        (Some(d), Some(r), Some(s)) => (d, r, s),
        _ => return Ok(None),
    };
    if date.len() != 8
        || !date.chars().all(|c| c.is_ascii_digit())
        || routing.len() != 9
        || !routing.chars().all(|c| c.is_ascii_digit())
    {
        return Ok(None);
    }
    let seq = decode_seq(seq)?;
    Ok(Some(ParsedFilename {
        date: date.to_string(),
        routing_number: routing.to_string(),
        seq,
        gpg,
    }))
}

/// A work-in-progress ACH file for one destination routing number and date.
#[derive(Debug, Clone)]
pub struct MergableFile {
    pub filepath: PathBuf,
    pub file: AchFile,
}

impl MergableFile {
    pub fn filename(&self) -> String {
        self.filepath
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The filename's sequence number.
    pub fn seq(&self) -> Result<u8, StoreError> {
        match parse_filename(&self.filename())? {
            Some(parsed) => Ok(parsed.seq),
            None => Err(StoreError::InvalidSequence(self.filename())),
        }
    }

    /// Write the canonical form to `filepath`.
    pub fn write(&self) -> Result<(), StoreError> {
        let fd = fs::File::create(&self.filepath)?;
        let mut writer = BufWriter::new(fd);
        self.file.write(&mut writer)?;
        Ok(())
    }
}

/// Parse one ACH file from disk.
pub fn parse_ach_filepath(path: &Path) -> Result<AchFile, StoreError> {
    let fd = fs::File::open(path).map_err(StoreError::Io)?;
    AchFile::parse(fd).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Find today's highest-sequence merged file for a routing number.
///
/// When no file exists and `reference` is given, an empty sequence-1
/// mergable is synthesized from the reference's header (keyed on the
/// reference's immediate destination). Without a reference, `None` is
/// returned instead of synthesizing.
pub fn latest_merged(
    routing_number: &str,
    reference: Option<&AchFile>,
    dir: &Path,
) -> Result<Option<MergableFile>, StoreError> {
    let today = Local::now().format("%Y%m%d").to_string();
    let mut best: Option<(u8, PathBuf)> = None;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let parsed = match parse_filename(&name)? {
            Some(p) => p,
            None => continue,
        };
        if parsed.gpg || parsed.date != today || parsed.routing_number != routing_number {
            continue;
        }
        if best.as_ref().map(|(seq, _)| parsed.seq > *seq).unwrap_or(true) {
            best = Some((parsed.seq, entry.path()));
        }
    }

    if let Some((_, path)) = best {
        let file = parse_ach_filepath(&path)?;
        return Ok(Some(MergableFile { filepath: path, file }));
    }

    let reference = match reference {
        Some(f) => f,
        None => return Ok(None),
    };

    let now = Local::now();
    let header = FileHeader {
        immediate_destination: reference.header.immediate_destination.clone(),
        immediate_origin: reference.header.immediate_origin.clone(),
        file_creation_date: now.format("%y%m%d").to_string(),
        file_creation_time: now.format("%H%M").to_string(),
        file_id_modifier: 'A',
        immediate_destination_name: reference.header.immediate_destination_name.clone(),
        immediate_origin_name: reference.header.immediate_origin_name.clone(),
        reference_code: String::new(),
    };
    let filename = ach_filename(&reference.header.immediate_destination, 1)?;
    debug!(filename = %filename, "synthesizing new mergable file");
    Ok(Some(MergableFile {
        filepath: dir.join(filename),
        file: AchFile::new(header),
    }))
}

/// Parse every `*.ach` file under `dir`. Any malformed file fails the whole
/// call so the upload phase never ships partial content.
pub fn grab_all(dir: &Path) -> Result<Vec<MergableFile>, StoreError> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().map(|e| e != "ach").unwrap_or(true) {
            continue;
        }
        let file = parse_ach_filepath(&path)?;
        out.push(MergableFile {
            filepath: path,
            file,
        });
    }
    Ok(out)
}
