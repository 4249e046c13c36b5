//! Request payload diagnostics.
//!
//! The bridge never interprets request bytes on the data path; they are
//! forwarded to the device verbatim. These helpers only decide whether a
//! payload looks like a whole number of fixed-width elements and render it
//! for logs.

use thiserror::Error;

/// A payload whose length is not a multiple of the element width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("payload of {len} bytes is not a whole number of {width}-byte elements")]
pub struct MalformedPayload {
    /// Payload length in bytes.
    pub len: usize,
    /// Expected element width in bytes.
    pub width: usize,
}

/// Returns the number of `width`-byte elements in `data`.
pub const fn check_element_width(data: &[u8], width: usize) -> Result<usize, MalformedPayload> {
    if width == 0 || data.len() % width != 0 {
        return Err(MalformedPayload {
            len: data.len(),
            width,
        });
    }
    Ok(data.len() / width)
}

/// Decodes little-endian `i32` values.
pub fn decode_i32s(data: &[u8]) -> Result<Vec<i32>, MalformedPayload> {
    let _ = check_element_width(data, 4)?;
    Ok(data
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Decodes little-endian `f64` values.
pub fn decode_f64s(data: &[u8]) -> Result<Vec<f64>, MalformedPayload> {
    let _ = check_element_width(data, 8)?;
    Ok(data
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect())
}

/// Renders a payload for logs: decoded values when the width fits, hex otherwise.
pub fn describe(data: &[u8], width: usize) -> String {
    let decoded = match width {
        4 => decode_i32s(data).map(|v| format!("{v:?}")),
        8 => decode_f64s(data).map(|v| format!("{v:?}")),
        _ => Err(MalformedPayload {
            len: data.len(),
            width,
        }),
    };
    decoded.unwrap_or_else(|_| {
        let hex: Vec<String> = data.iter().map(|b| format!("{b:02x}")).collect();
        format!("[{}]", hex.join(" "))
    })
}
