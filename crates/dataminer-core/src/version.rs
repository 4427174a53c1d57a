//! # Version Resources
//!
//! Reads the product version out of a PE image's `VS_VERSIONINFO` resource.
//!
//! The version resource is a tree of variable-length nodes. Every node is
//!
//! ```text
//! u16  wLength        total length of the node including children
//! u16  wValueLength   length of the value (in u16 units for text values)
//! u16  wType          1 = text, 0 = binary
//! u16[] szKey         NUL-terminated UTF-16 key
//! ..   padding        to a 32-bit boundary
//! ..   Value
//! ..   padding        to a 32-bit boundary
//! ..   Children
//! ```
//!
//! The root (`VS_VERSION_INFO`) carries a `VS_FIXEDFILEINFO` as its value and
//! a `StringFileInfo` child with one string table per language. The
//! `ProductVersion` string is preferred; the numeric product version from
//! the fixed info is the fallback.
//!
//! ## References
//!
//! - [VS_VERSIONINFO](https://learn.microsoft.com/en-us/windows/win32/menurc/vs-versioninfo)
//! - [VS_FIXEDFILEINFO](https://learn.microsoft.com/en-us/windows/win32/api/verrsrc/ns-verrsrc-vs_fixedfileinfo)

use std::fs;
use std::path::Path;

use object::read::pe::{ImageNtHeaders, PeFile, ResourceDirectoryEntryData, ResourceNameOrId};
use object::{pe, FileKind, LittleEndian};

use crate::error::{DataminerError, DataminerResult};

const VERSION_INFO_KEY: &str = "VS_VERSION_INFO";
const STRING_FILE_INFO_KEY: &str = "StringFileInfo";
const PRODUCT_VERSION_KEY: &str = "ProductVersion";
const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
const NODE_HEADER_LEN: usize = 6;

/// Read the product version of the PE image at `path`
///
/// ## Errors
///
/// - `Io`: the file can't be read
/// - `VersionResource`: not a PE image, or no usable version resource
pub fn read_product_version(path: &Path) -> DataminerResult<String>
{
    let data = fs::read(path)?;
    product_version_from_image(&data)
}

/// Product version of an in-memory PE image
///
/// ## Errors
///
/// - `VersionResource`: not a PE image, or no usable version resource
pub fn product_version_from_image(data: &[u8]) -> DataminerResult<String>
{
    let resource = match FileKind::parse(data) {
        Ok(FileKind::Pe32) => version_resource::<pe::ImageNtHeaders32>(data)?,
        Ok(FileKind::Pe64) => version_resource::<pe::ImageNtHeaders64>(data)?,
        Ok(kind) => return Err(resource_error(format!("unsupported image kind {kind:?}"))),
        Err(e) => return Err(resource_error(e)),
    };
    product_version_from_resource(resource)
}

/// Product version from a raw `VS_VERSIONINFO` block
///
/// ## Errors
///
/// - `VersionResource`: malformed block, or neither a `ProductVersion` string
///   nor a fixed file info is present
pub fn product_version_from_resource(resource: &[u8]) -> DataminerResult<String>
{
    let (root, _) = parse_node(resource)?;
    if root.key != VERSION_INFO_KEY {
        return Err(resource_error(format!("unexpected root key {:?}", root.key)));
    }

    for child in Nodes::new(root.children) {
        let child = child?;
        if child.key != STRING_FILE_INFO_KEY {
            continue;
        }
        for table in Nodes::new(child.children) {
            for entry in Nodes::new(table?.children) {
                let entry = entry?;
                if entry.key == PRODUCT_VERSION_KEY {
                    let version = decode_text(entry.value);
                    if !version.is_empty() {
                        return Ok(version);
                    }
                }
            }
        }
    }

    fixed_product_version(root.value).ok_or_else(|| resource_error("no product version present"))
}

/// Locate the raw `RT_VERSION` resource data inside a PE image
fn version_resource<Pe: ImageNtHeaders>(data: &[u8]) -> DataminerResult<&[u8]>
{
    let file = PeFile::<Pe>::parse(data).map_err(resource_error)?;
    let sections = file.section_table();
    let directory = file
        .data_directories()
        .resource_directory(data, &sections)
        .map_err(resource_error)?
        .ok_or_else(|| resource_error("image has no resource directory"))?;

    let root = directory.root().map_err(resource_error)?;
    let version_type = root
        .entries
        .iter()
        .find(|entry| matches!(entry.name_or_id(), ResourceNameOrId::Id(id) if id == pe::RT_VERSION))
        .ok_or_else(|| resource_error("image has no version resource"))?;

    // type -> name -> language -> data; take the first entry at each level
    let mut level = version_type.data(directory).map_err(resource_error)?;
    let entry = loop {
        match level {
            ResourceDirectoryEntryData::Table(table) => {
                let first = table
                    .entries
                    .first()
                    .ok_or_else(|| resource_error("empty version resource table"))?;
                level = first.data(directory).map_err(resource_error)?;
            }
            ResourceDirectoryEntryData::Data(entry) => break entry,
        }
    };

    let rva = entry.offset_to_data.get(LittleEndian);
    let size = entry.size.get(LittleEndian) as usize;
    sections
        .pe_data_at(data, rva)
        .and_then(|bytes| bytes.get(..size))
        .ok_or_else(|| resource_error("version resource data lies outside the image"))
}

struct VersionNode<'a>
{
    key: String,
    value: &'a [u8],
    children: &'a [u8],
}

/// Parse one node at the start of `data`, returning it and the aligned length it occupies
fn parse_node(data: &[u8]) -> DataminerResult<(VersionNode<'_>, usize)>
{
    let length = usize::from(read_u16(data, 0)?);
    if length < NODE_HEADER_LEN || length > data.len() {
        return Err(resource_error(format!("node length {length} out of bounds")));
    }
    let node = &data[..length];
    let value_length = usize::from(read_u16(node, 2)?);
    let value_type = read_u16(node, 4)?;

    let mut offset = NODE_HEADER_LEN;
    let mut key = Vec::new();
    loop {
        let unit = read_u16(node, offset)?;
        offset += 2;
        if unit == 0 {
            break;
        }
        key.push(unit);
    }

    let value_start = align4(offset).min(length);
    let value_size = if value_type == 1 { value_length * 2 } else { value_length };
    let value_end = (value_start + value_size).min(length);
    let children_start = align4(value_end).min(length);

    Ok((
        VersionNode {
            key: String::from_utf16_lossy(&key),
            value: &node[value_start..value_end],
            children: &node[children_start..],
        },
        align4(length),
    ))
}

/// Iterator over sibling nodes
struct Nodes<'a>
{
    rest: &'a [u8],
}

impl<'a> Nodes<'a>
{
    fn new(data: &'a [u8]) -> Self
    {
        Self { rest: data }
    }
}

impl<'a> Iterator for Nodes<'a>
{
    type Item = DataminerResult<VersionNode<'a>>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.rest.len() < NODE_HEADER_LEN {
            return None;
        }
        match parse_node(self.rest) {
            Ok((node, consumed)) => {
                self.rest = &self.rest[consumed.min(self.rest.len())..];
                Some(Ok(node))
            }
            Err(e) => {
                self.rest = &[];
                Some(Err(e))
            }
        }
    }
}

fn fixed_product_version(value: &[u8]) -> Option<String>
{
    let word = |offset: usize| -> Option<u32> {
        let bytes = value.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    };

    if word(0)? != FIXED_FILE_INFO_SIGNATURE {
        return None;
    }
    let most = word(16)?;
    let least = word(20)?;
    Some(format!(
        "{}.{}.{}.{}",
        most >> 16,
        most & 0xffff,
        least >> 16,
        least & 0xffff
    ))
}

fn decode_text(value: &[u8]) -> String
{
    let units: Vec<u16> = value
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units).trim().to_string()
}

fn read_u16(data: &[u8], offset: usize) -> DataminerResult<u16>
{
    data.get(offset..offset + 2)
        .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
        .ok_or_else(|| resource_error(format!("truncated node at offset {offset}")))
}

const fn align4(value: usize) -> usize
{
    (value + 3) & !3
}

fn resource_error(reason: impl std::fmt::Display) -> DataminerError
{
    DataminerError::VersionResource(reason.to_string())
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn utf16z(text: &str) -> Vec<u8>
    {
        text.encode_utf16().chain(std::iter::once(0)).flat_map(u16::to_le_bytes).collect()
    }

    fn pad(bytes: &mut Vec<u8>)
    {
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
    }

    /// Build a node the way resource compilers lay it out
    fn node(key: &str, text: bool, value: &[u8], children: &[u8]) -> Vec<u8>
    {
        let mut out = vec![0u8; NODE_HEADER_LEN];
        out.extend(utf16z(key));
        pad(&mut out);
        out.extend_from_slice(value);
        pad(&mut out);
        out.extend_from_slice(children);

        let length = u16::try_from(out.len()).unwrap();
        let value_length = if text { value.len() / 2 } else { value.len() };
        out[0..2].copy_from_slice(&length.to_le_bytes());
        out[2..4].copy_from_slice(&u16::try_from(value_length).unwrap().to_le_bytes());
        out[4..6].copy_from_slice(&u16::from(text).to_le_bytes());
        pad(&mut out);
        out
    }

    fn fixed_info(most: u32, least: u32) -> Vec<u8>
    {
        let mut info = vec![0u8; 52];
        info[0..4].copy_from_slice(&FIXED_FILE_INFO_SIGNATURE.to_le_bytes());
        info[16..20].copy_from_slice(&most.to_le_bytes());
        info[20..24].copy_from_slice(&least.to_le_bytes());
        info
    }

    fn version_info(strings: &[(&str, &str)], fixed: &[u8]) -> Vec<u8>
    {
        let entries: Vec<u8> = strings
            .iter()
            .flat_map(|(key, value)| node(key, true, &utf16z(value), &[]))
            .collect();
        let table = node("040904b0", true, &[], &entries);
        let string_file_info = node(STRING_FILE_INFO_KEY, true, &[], &table);
        node(VERSION_INFO_KEY, false, fixed, &string_file_info)
    }

    #[test]
    fn test_product_version_string_is_preferred()
    {
        let resource = version_info(
            &[("FileVersion", "1.0.0.1"), ("ProductVersion", "1.0.0.124")],
            &fixed_info(0x0001_0000, 0x0000_0001),
        );
        assert_eq!(product_version_from_resource(&resource).unwrap(), "1.0.0.124");
    }

    #[test]
    fn test_fixed_info_fallback()
    {
        let resource = version_info(&[("FileVersion", "1.0.0.1")], &fixed_info(0x0001_0002, 0x0003_007c));
        assert_eq!(product_version_from_resource(&resource).unwrap(), "1.2.3.124");
    }

    #[test]
    fn test_wrong_root_key()
    {
        let resource = node("SOMETHING_ELSE", false, &fixed_info(1, 1), &[]);
        assert!(matches!(
            product_version_from_resource(&resource),
            Err(DataminerError::VersionResource(_))
        ));
    }

    #[test]
    fn test_truncated_resource()
    {
        let resource = version_info(&[("ProductVersion", "1.0.0.124")], &fixed_info(1, 1));
        let truncated = &resource[..resource.len() / 2];
        assert!(product_version_from_resource(truncated).is_err());
    }

    #[test]
    fn test_not_a_pe_image()
    {
        assert!(matches!(
            product_version_from_image(b"definitely not an executable"),
            Err(DataminerError::VersionResource(_))
        ));
    }
}
