// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Length-value field helpers

use crate::ApduError;

/// Read a single byte, advancing the index
pub(crate) fn read_u8(buff: &[u8], index: &mut usize) -> Result<u8, ApduError> {
    let v = *buff.get(*index).ok_or(ApduError::InvalidLength)?;
    *index += 1;
    Ok(v)
}

/// Read `n` bytes, advancing the index
pub(crate) fn read_bytes<'a>(
    buff: &'a [u8],
    index: &mut usize,
    n: usize,
) -> Result<&'a [u8], ApduError> {
    if buff.len() < *index + n {
        return Err(ApduError::InvalidLength);
    }

    let b = &buff[*index..][..n];
    *index += n;

    Ok(b)
}

/// Read a length-prefixed byte field
pub(crate) fn read_lv<'a>(buff: &'a [u8], index: &mut usize) -> Result<&'a [u8], ApduError> {
    let n = read_u8(buff, index)? as usize;
    read_bytes(buff, index, n)
}

/// Read a length-prefixed UTF-8 field
pub(crate) fn read_lv_str(buff: &[u8], index: &mut usize) -> Result<String, ApduError> {
    let b = read_lv(buff, index)?;
    let s = core::str::from_utf8(b).map_err(|_| ApduError::Utf8)?;
    Ok(s.to_string())
}

/// Write a length-prefixed byte field
pub(crate) fn write_lv(buff: &mut [u8], index: &mut usize, v: &[u8]) -> Result<(), ApduError> {
    if v.len() > u8::MAX as usize {
        return Err(ApduError::InvalidEncoding);
    }
    if buff.len() < *index + 1 + v.len() {
        return Err(ApduError::InvalidLength);
    }

    buff[*index] = v.len() as u8;
    buff[*index + 1..][..v.len()].copy_from_slice(v);
    *index += 1 + v.len();

    Ok(())
}
