//! `/proc/<pid>/maps` parsing and main module lookup.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DataminerResult;
use crate::locator::image_name_matches;
use crate::types::{Address, ModuleInfo, ProcessId};

/// One line of `/proc/<pid>/maps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mapping
{
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub offset: u64,
    pub path: Option<String>,
}

/// Parse a single maps line
///
/// The path is everything after the fifth field, so paths containing spaces
/// (common for Steam libraries) survive intact.
pub(crate) fn parse_line(line: &str) -> Option<Mapping>
{
    let mut rest = line;
    let mut fields = [""; 5];
    for field in &mut fields {
        let trimmed = rest.trim_start();
        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        *field = &trimmed[..end];
        rest = &trimmed[end..];
    }

    let (start, end) = fields[0].split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    let offset = u64::from_str_radix(fields[2], 16).ok()?;
    let path = rest.trim();

    Some(Mapping {
        start,
        end,
        perms: fields[1].to_string(),
        offset,
        path: (!path.is_empty()).then(|| path.to_string()),
    })
}

pub(crate) fn read_maps(pid: ProcessId) -> DataminerResult<Vec<Mapping>>
{
    let contents = fs::read_to_string(format!("/proc/{pid}/maps"))?;
    Ok(contents.lines().filter_map(parse_line).collect())
}

/// Find the main executable image among the mappings
///
/// Under Wine the `.exe` is mapped from its Linux path, so the image is
/// matched by file name first; `exe` (the native executable) is the fallback.
pub(crate) fn main_module(mappings: &[Mapping], name: &str, exe: Option<&Path>) -> Option<ModuleInfo>
{
    let by_name = |mapping: &&Mapping| {
        mapping
            .path
            .as_deref()
            .and_then(|path| Path::new(path).file_name())
            .is_some_and(|file| image_name_matches(&file.to_string_lossy(), name))
    };

    let image_path = mappings
        .iter()
        .find(by_name)
        .and_then(|mapping| mapping.path.clone())
        .or_else(|| exe.map(|exe| exe.to_string_lossy().into_owned()))?;

    let image: Vec<&Mapping> = mappings
        .iter()
        .filter(|mapping| mapping.path.as_deref() == Some(image_path.as_str()))
        .collect();

    let base = image
        .iter()
        .filter(|mapping| mapping.offset == 0)
        .map(|mapping| mapping.start)
        .min()?;
    let end = image.iter().map(|mapping| mapping.end).max()?;

    let path = PathBuf::from(&image_path);
    let file_name = path
        .file_name()
        .map_or_else(|| image_path.clone(), |file| file.to_string_lossy().into_owned());

    Some(ModuleInfo::new(file_name, path, Address::new(base), end.saturating_sub(base)))
}
