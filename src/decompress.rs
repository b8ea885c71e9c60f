// src/decompress.rs

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{CsvError, Result};

/// Compression wrapping an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zip,
    Bzip2,
}

impl Compression {
    /// Guess from the file extension; anything unrecognized is plain.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("gz") | Some("gzip") => Compression::Gzip,
            Some("zip") => Compression::Zip,
            Some("bz2") => Compression::Bzip2,
            _ => Compression::None,
        }
    }
}

impl FromStr for Compression {
    type Err = CsvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Compression::None),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "zip" => Ok(Compression::Zip),
            "bz2" | "bzip2" => Ok(Compression::Bzip2),
            other => Err(CsvError::UnsupportedFormat(other.to_string())),
        }
    }
}

fn invalid_data(e: impl std::error::Error + Send + Sync + 'static) -> CsvError {
    CsvError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Open `path` as a decompressed byte stream.
///
/// Zip archives are buffered in memory: the first `.csv` entry is used, or
/// the first file if none is named `.csv`.
pub fn open(path: &Path, compression: Compression) -> Result<Box<dyn Read + Send>> {
    match compression {
        Compression::None => Ok(Box::new(BufReader::new(File::open(path)?))),
        Compression::Gzip => Ok(Box::new(MultiGzDecoder::new(BufReader::new(File::open(
            path,
        )?)))),
        Compression::Zip => {
            let mut archive = ZipArchive::new(File::open(path)?).map_err(invalid_data)?;

            let mut chosen = None;
            for i in 0..archive.len() {
                let entry = archive.by_index(i).map_err(invalid_data)?;
                if !entry.is_file() {
                    continue;
                }
                if entry.name().to_lowercase().ends_with(".csv") {
                    chosen = Some(i);
                    break;
                }
                chosen.get_or_insert(i);
            }
            let index = chosen.ok_or_else(|| {
                CsvError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("zip archive {} has no file entries", path.display()),
                ))
            })?;

            let mut entry = archive.by_index(index).map_err(invalid_data)?;
            debug!(entry = entry.name(), size = entry.size(), "reading zip entry");
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            Ok(Box::new(Cursor::new(buf)))
        }
        Compression::Bzip2 => Err(CsvError::UnsupportedFormat("bz2".into())),
    }
}
