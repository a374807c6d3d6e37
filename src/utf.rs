//! MUTF-8 (Java/Dalvik "modified UTF-8") conversion. DEX string data is
//! length-prefixed MUTF-8; equality and ordering throughout this crate still
//! operate on the raw bytes (see [`crate::dex::reader::DexReader::get_string_bytes`])
//! since the format's own sort order is defined over bytes, not code points.
//! Decoding to a real `String` is only needed for `Decode*` query output.

pub fn mutf8_to_str(data: &[u8]) -> crate::Result<String> {
    let utf16 = mutf8_to_utf16(data);
    Ok(String::from_utf16(&utf16)?)
}

pub fn mutf8_to_str_lossy(data: &[u8]) -> String {
    let utf16 = mutf8_to_utf16(data);
    String::from_utf16_lossy(&utf16)
}

pub fn str_to_mutf8(s: &str) -> Vec<u8> {
    let utf16: Vec<u16> = s.encode_utf16().collect();
    utf16_to_mutf8(&utf16)
}

#[inline]
fn utf16_from_utf8(data: &[u8], offset: &mut usize) -> u32 {
    let one = data[*offset];
    *offset += 1;
    if one & 0x80 == 0 {
        return one as u32;
    }

    let two = data[*offset];
    *offset += 1;
    if one & 0x20 == 0 {
        return ((one & 0x1f) as u32) << 6 | (two & 0x3F) as u32;
    }

    let three = data[*offset];
    *offset += 1;
    if one & 0x10 == 0 {
        return ((one & 0x0f) as u32) << 12 | ((two & 0x3F) as u32) << 6 | (three & 0x3F) as u32;
    }

    let four = data[*offset];
    *offset += 1;
    let code_point = ((one & 0x0F) as u32) << 18
        | ((two & 0x3F) as u32) << 12
        | ((three & 0x3F) as u32) << 6
        | (four & 0x3F) as u32;

    let mut surrogate_pair: u32 = 0;
    surrogate_pair |= ((code_point >> 10) + 0xd7c0) & 0xFFFF;
    surrogate_pair |= ((code_point & 0x03FF) + 0xdc80) << 16;
    surrogate_pair
}

#[inline(always)]
fn trailing_utf16_char(pair: u32) -> u16 {
    (pair >> 16) as u16
}

#[inline(always)]
fn leading_utf16_char(pair: u32) -> u16 {
    (pair & 0xFFFF) as u16
}

fn mutf8_len(data: &[u8]) -> usize {
    let mut len = 0;
    let mut idx = 0;
    while idx < data.len() {
        let ic = data[idx];
        idx += 1;
        len += 1;
        if ic & 0x80 == 0 {
            continue;
        }
        idx += 1;
        if ic & 0x20 == 0 {
            continue;
        }
        idx += 1;
        if ic & 0x10 == 0 {
            continue;
        }
        // four-byte encoding decodes to a surrogate pair, two UTF-16 units
        idx += 1;
        len += 1;
    }
    len
}

fn mutf8_to_utf16(data: &[u8]) -> Vec<u16> {
    if data.is_empty() {
        return Vec::new();
    }
    let out_chars = mutf8_len(data);
    if data.len() == out_chars {
        // common case: pure ASCII
        return data.iter().map(|b| *b as u16).collect();
    }

    let mut out = Vec::with_capacity(out_chars);
    let mut idx = 0;
    while idx < data.len() {
        let ch = utf16_from_utf8(data, &mut idx);
        let leading = leading_utf16_char(ch);
        let trailing = trailing_utf16_char(ch);
        out.push(leading);
        if trailing != 0 {
            out.push(trailing);
        }
    }
    out
}

fn utf16_to_mutf8(utf16: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(utf16.len());
    let mut idx = 0;
    while idx < utf16.len() {
        let ch = utf16[idx];
        if ch != 0 && ch < 0x80 {
            out.push(ch as u8);
        } else if ch < 0x800 {
            out.push(((ch >> 6) | 0xC0) as u8);
            out.push(((ch & 0x3F) | 0x80) as u8);
        } else {
            out.push(((ch >> 12) | 0xE0) as u8);
            out.push((((ch >> 6) & 0x3F) | 0x80) as u8);
            out.push(((ch & 0x3F) | 0x80) as u8);
        }
        idx += 1;
    }
    out
}
