use encoding_rs::Encoding;

use crate::error::{PreviewError, Result};

/// Extensions (lowercase, with dot) whose payload is shown as text.
pub const TEXT_EXTENSIONS: &[&str] = &[".tdf", ".fbi", ".gui", ".ota", ".txt", ".ini", ".cfg", ".bos"];

pub fn is_text_extension(ext: &str) -> bool {
    TEXT_EXTENSIONS.iter().any(|t| t.eq_ignore_ascii_case(ext))
}

/// Decode with a fixed single-byte code page. No BOM sniffing: the code page is part of the
/// format, not a guess.
pub fn decode_text(bytes: &[u8], encoding_label: &str) -> Result<String> {
    let enc = Encoding::for_label(encoding_label.as_bytes()).ok_or_else(|| {
        PreviewError::ConfigurationMissing(format!("unknown text encoding '{encoding_label}'"))
    })?;
    if !enc.is_single_byte() {
        return Err(PreviewError::ConfigurationMissing(format!(
            "text encoding '{encoding_label}' is not a single-byte code page"
        )));
    }
    let (cow, _had_errors) = enc.decode_without_bom_handling(bytes);
    Ok(cow.into_owned())
}
