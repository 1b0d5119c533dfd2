use std::fmt::Write;

const PER_LINE: usize = 16;

/// Classic 16-column dump of at most `limit` bytes: 8-digit hex offset, two groups of eight
/// byte columns, then an ASCII gutter. Every line ends with a newline.
pub fn hex_dump(bytes: &[u8], limit: usize) -> String {
    let shown = bytes.len().min(limit);
    let mut out = String::with_capacity(shown.div_ceil(PER_LINE) * 78 + 64);

    for (n, line) in bytes[..shown].chunks(PER_LINE).enumerate() {
        let _ = write!(out, "{:08X}  ", n * PER_LINE);
        for j in 0..PER_LINE {
            match line.get(j) {
                Some(b) => {
                    let _ = write!(out, "{b:02X} ");
                }
                None => out.push_str("   "),
            }
            if j == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        out.extend(line.iter().map(|&b| {
            if (0x20..0x7F).contains(&b) { b as char } else { '.' }
        }));
        out.push_str("|\n");
    }

    if bytes.len() > shown {
        let _ = write!(out, "\n... ({} more bytes not shown)\n", bytes.len() - shown);
    }
    out
}

/// Dump preceded by the file banner used by the hex view.
pub fn hex_view(path: &str, bytes: &[u8], limit: usize) -> String {
    format!(
        "Binary file: {path}\nFile size: {} bytes\n\nHex dump:\n\n{}",
        bytes.len(),
        hex_dump(bytes, limit)
    )
}
