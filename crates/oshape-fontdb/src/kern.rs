//! Legacy `kern` table: subtable headers and format 0 pairs
//!
//! Two layouts share the tag. The OpenType one starts with a `u16` version
//! of 0, the Apple one with a `u32` version of 0x00010000. Only the header
//! bits the planner asks about and the plain pair lists are read.

use std::collections::HashMap;

use read_fonts::FontData;

const OT_CROSS_STREAM: u16 = 0x0004;
const OT_HORIZONTAL: u16 = 0x0001;
const AAT_VERTICAL: u16 = 0x8000;
const AAT_CROSS_STREAM: u16 = 0x4000;
const AAT_VARIATION: u16 = 0x2000;

/// What the planner needs to know about a font's legacy kerning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernInfo {
    /// Some subtable is a state machine (format 1)
    pub machine: bool,
    /// Some subtable moves glyphs across the line
    pub cross_stream: bool,
    pairs: HashMap<(u16, u16), i32>,
}

impl KernInfo {
    /// Summed horizontal adjustment for an ordered glyph pair
    pub fn pair(&self, left: u32, right: u32) -> i32 {
        let (Ok(left), Ok(right)) = (u16::try_from(left), u16::try_from(right)) else {
            return 0;
        };
        self.pairs.get(&(left, right)).copied().unwrap_or(0)
    }

    pub fn has_pairs(&self) -> bool {
        !self.pairs.is_empty()
    }
}

struct SubtableHeader {
    format: u8,
    horizontal: bool,
    cross_stream: bool,
    /// Offset of the format-specific body
    body: usize,
    end: usize,
}

/// Reads a `kern` table; malformed data yields whatever parsed before it
pub fn parse(data: FontData<'_>) -> KernInfo {
    let mut info = KernInfo::default();
    let Some(headers) = subtable_headers(data) else {
        log::debug!("Unrecognized kern table version");
        return info;
    };

    for header in headers {
        info.cross_stream |= header.cross_stream;
        match header.format {
            0 if header.horizontal && !header.cross_stream => {
                read_pairs(data, &header, &mut info.pairs);
            },
            1 => info.machine = true,
            _ => {},
        }
    }
    info
}

fn subtable_headers(data: FontData<'_>) -> Option<Vec<SubtableHeader>> {
    let version = data.read_at::<u16>(0).ok()?;
    let mut headers = Vec::new();

    if version == 0 {
        let count = data.read_at::<u16>(2).ok()?;
        let mut offset = 4usize;
        for _ in 0..count {
            let (Ok(length), Ok(coverage)) = (
                data.read_at::<u16>(offset + 2),
                data.read_at::<u16>(offset + 4),
            ) else {
                break;
            };
            headers.push(SubtableHeader {
                format: (coverage >> 8) as u8,
                horizontal: coverage & OT_HORIZONTAL != 0,
                cross_stream: coverage & OT_CROSS_STREAM != 0,
                body: offset + 6,
                end: offset + usize::from(length),
            });
            if length == 0 {
                break;
            }
            offset += usize::from(length);
        }
        return Some(headers);
    }

    if data.read_at::<u32>(0).ok()? == 0x0001_0000 {
        let count = data.read_at::<u32>(4).ok()?;
        let mut offset = 8usize;
        for _ in 0..count {
            let (Ok(length), Ok(coverage)) = (
                data.read_at::<u32>(offset),
                data.read_at::<u16>(offset + 4),
            ) else {
                break;
            };
            let length = length as usize;
            headers.push(SubtableHeader {
                format: (coverage & 0xFF) as u8,
                horizontal: coverage & (AAT_VERTICAL | AAT_VARIATION) == 0,
                cross_stream: coverage & AAT_CROSS_STREAM != 0,
                body: offset + 8,
                end: offset + length,
            });
            if length == 0 {
                break;
            }
            offset += length;
        }
        return Some(headers);
    }

    None
}

fn read_pairs(data: FontData<'_>, header: &SubtableHeader, pairs: &mut HashMap<(u16, u16), i32>) {
    let Ok(count) = data.read_at::<u16>(header.body) else {
        return;
    };
    // nPairs, searchRange, entrySelector, rangeShift
    let mut offset = header.body + 8;
    for _ in 0..count {
        if offset + 6 > header.end {
            break;
        }
        let (Ok(left), Ok(right), Ok(value)) = (
            data.read_at::<u16>(offset),
            data.read_at::<u16>(offset + 2),
            data.read_at::<i16>(offset + 4),
        ) else {
            break;
        };
        *pairs.entry((left, right)).or_insert(0) += i32::from(value);
        offset += 6;
    }
}
