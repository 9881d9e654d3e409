use encoding_rs::{UTF_8, WINDOWS_1252};
use std::fs;
use std::io;
use std::path::Path;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decode bytes as UTF-8, falling back to Windows-1252.
///
/// Windows-1252 maps every byte, so Latin-1 files decode as well and no
/// character is lost.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        return text.into_owned();
    }

    log::debug!("input is not valid UTF-8, decoding as Windows-1252");
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Read a whole text file with [`decode_text`].
pub fn read_text_file(path: &Path) -> io::Result<String> {
    fs::read(path).map(|bytes| decode_text(&bytes))
}
