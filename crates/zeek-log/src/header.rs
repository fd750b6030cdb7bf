//! Zeek TSV comment-header parsing.

use std::io::BufRead;

use anyhow::{bail, Context, Result};

/// The metadata Zeek writes as `#`-prefixed comment lines ahead of the TSV
/// body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsvHeader {
    pub separator: String,
    pub set_separator: String,
    pub empty_field: String,
    pub unset_field: String,
    pub fields: Vec<String>,
    pub types: Vec<String>,
    pub object_type: String,
}

impl Default for TsvHeader {
    fn default() -> Self {
        Self {
            separator: "\t".to_string(),
            set_separator: ",".to_string(),
            empty_field: "(empty)".to_string(),
            unset_field: "-".to_string(),
            fields: Vec::new(),
            types: Vec::new(),
            object_type: String::new(),
        }
    }
}

impl TsvHeader {
    /// Scans the comment preamble off `reader`. The scan necessarily
    /// consumes the first body line, so it is returned alongside the
    /// header; `None` means the file held nothing but comments.
    pub fn parse<R: BufRead + ?Sized>(reader: &mut R) -> Result<(TsvHeader, Option<String>)> {
        let mut header = TsvHeader::default();
        let mut line = String::new();

        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .context("failed reading log header")?;
            if read == 0 {
                header.validate()?;
                return Ok((header, None));
            }

            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.trim().is_empty() {
                continue;
            }
            if !trimmed.starts_with('#') {
                header.validate()?;
                return Ok((header, Some(trimmed.to_string())));
            }

            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            let directive = tokens[0].trim_start_matches('#');
            match directive {
                "separator" => {
                    header.separator = unescape_separator(tokens.get(1).copied().unwrap_or(""))?;
                }
                "set_separator" => {
                    header.set_separator = tokens.get(1).copied().unwrap_or("").to_string();
                }
                "empty_field" => {
                    header.empty_field = tokens.get(1).copied().unwrap_or("").to_string();
                }
                "unset_field" => {
                    header.unset_field = tokens.get(1).copied().unwrap_or("").to_string();
                }
                "fields" => {
                    header.fields = tokens[1..].iter().map(|s| s.to_string()).collect();
                }
                "types" => {
                    header.types = tokens[1..].iter().map(|s| s.to_string()).collect();
                }
                "path" => {
                    header.object_type = tokens.get(1).copied().unwrap_or("").to_string();
                }
                // #open / #close timestamps carry no schema
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.fields.len() != self.types.len() {
            bail!(
                "field name / type count mismatch: {} names, {} types",
                self.fields.len(),
                self.types.len()
            );
        }
        Ok(())
    }
}

/// Zeek writes the separator itself escaped, e.g. `\x09` for tab.
fn unescape_separator(raw: &str) -> Result<String> {
    if let Some(hex) = raw.strip_prefix("\\x") {
        let byte = u8::from_str_radix(hex, 16)
            .with_context(|| format!("invalid separator escape {raw:?}"))?;
        Ok((byte as char).to_string())
    } else {
        Ok(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#separator \\x09\n\
#set_separator\t,\n\
#empty_field\t(empty)\n\
#unset_field\t-\n\
#path\thttp\n\
#open\t2023-02-11-00-00-01\n\
#fields\tts\tid.orig_h\tid.resp_h\thost\tmethod\n\
#types\ttime\taddr\taddr\tstring\tstring\n\
1602518000.755342\t10.0.0.5\t192.168.10.2\texample.com\tCONNECT\n";

    #[test]
    fn parses_preamble_and_returns_first_body_line() {
        let mut reader = SAMPLE.as_bytes();
        let (header, first) = TsvHeader::parse(&mut reader).expect("parse");

        assert_eq!(header.separator, "\t");
        assert_eq!(header.set_separator, ",");
        assert_eq!(header.empty_field, "(empty)");
        assert_eq!(header.unset_field, "-");
        assert_eq!(header.object_type, "http");
        assert_eq!(
            header.fields,
            vec!["ts", "id.orig_h", "id.resp_h", "host", "method"]
        );
        assert_eq!(header.types.len(), 5);
        assert_eq!(
            first.as_deref(),
            Some("1602518000.755342\t10.0.0.5\t192.168.10.2\texample.com\tCONNECT")
        );
    }

    #[test]
    fn rejects_mismatched_fields_and_types() {
        let text = "#fields\tts\thost\n#types\ttime\n1.0\tx\n";
        let mut reader = text.as_bytes();
        assert!(TsvHeader::parse(&mut reader).is_err());
    }

    #[test]
    fn comment_only_file_yields_no_body() {
        let text = "#separator \\x09\n#fields\tts\n#types\ttime\n";
        let mut reader = text.as_bytes();
        let (header, first) = TsvHeader::parse(&mut reader).expect("parse");
        assert_eq!(header.fields, vec!["ts"]);
        assert!(first.is_none());
    }

    #[test]
    fn separator_unescape() {
        assert_eq!(unescape_separator("\\x09").expect("tab"), "\t");
        assert_eq!(unescape_separator("\\x2c").expect("comma"), ",");
        assert!(unescape_separator("\\xzz").is_err());
    }
}
