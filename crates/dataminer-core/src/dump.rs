//! Output files for extraction routines.
//!
//! Artifacts go into a dump directory (created on demand). JSON artifacts
//! are pretty-printed with two-space indentation.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{DataminerError, DataminerResult};

/// Create `dir` if needed and open `dir/file_name` for writing, truncating it
///
/// ## Errors
///
/// - `Io`: the directory or file couldn't be created
pub fn new_dump(dir: impl AsRef<Path>, file_name: &str) -> DataminerResult<BufWriter<File>>
{
    let path = dump_path(dir.as_ref(), file_name)?;
    let file = File::create(&path)?;
    tracing::debug!(path = %path.display(), "Opened dump");
    Ok(BufWriter::new(file))
}

/// Serialize `value` as indented JSON into `dir/file_name`, returning the path written
///
/// ## Errors
///
/// - `Io`: the file couldn't be created or written
///
/// ## Example
///
/// ```rust
/// use std::collections::BTreeMap;
///
/// use dataminer_core::dump::write_json;
///
/// let dir = std::env::temp_dir().join("dataminer-doc-dump");
/// let mut classes = BTreeMap::new();
/// classes.insert("GD_Soldier.Character.CharClass_Soldier", "Roland");
///
/// let path = write_json(&dir, "Player Classes.json", &classes)?;
/// let text = std::fs::read_to_string(path)?;
/// assert!(text.contains("\n  \"GD_Soldier.Character.CharClass_Soldier\": \"Roland\""));
/// # Ok::<(), dataminer_core::error::DataminerError>(())
/// ```
pub fn write_json<T: Serialize + ?Sized>(dir: impl AsRef<Path>, file_name: &str, value: &T) -> DataminerResult<PathBuf>
{
    let path = dump_path(dir.as_ref(), file_name)?;
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, value).map_err(std::io::Error::from)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    tracing::info!(path = %path.display(), "Wrote dump");
    Ok(path)
}

fn dump_path(dir: &Path, file_name: &str) -> DataminerResult<PathBuf>
{
    // A dump is a single file inside the dump directory
    if file_name.is_empty() || Path::new(file_name).file_name() != Some(OsStr::new(file_name)) {
        return Err(DataminerError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid dump file name: {file_name:?}"),
        )));
    }

    fs::create_dir_all(dir)?;
    Ok(dir.join(file_name))
}
