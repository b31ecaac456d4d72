//! Text encodings offered for caption files

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Character that has no representation in the target encoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("text cannot be encoded as {encoding}")]
pub struct UnmappableText {
    pub encoding: TextEncoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Gbk,
    /// UTF-16 little endian with byte order mark
    Utf16,
    Ascii,
    ShiftJis,
    Latin1,
}

impl TextEncoding {
    pub const ALL: [TextEncoding; 6] = [
        TextEncoding::Utf8,
        TextEncoding::Gbk,
        TextEncoding::Utf16,
        TextEncoding::Ascii,
        TextEncoding::ShiftJis,
        TextEncoding::Latin1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Gbk => "gbk",
            TextEncoding::Utf16 => "utf-16",
            TextEncoding::Ascii => "ascii",
            TextEncoding::ShiftJis => "shift_jis",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    /// Encode `text`, failing if any character is unmappable
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, UnmappableText> {
        let unmappable = || UnmappableText { encoding: *self };
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Utf16 => {
                let mut bytes = vec![0xFF, 0xFE];
                for unit in text.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                }
                Ok(bytes)
            }
            TextEncoding::Ascii => {
                if text.is_ascii() {
                    Ok(text.as_bytes().to_vec())
                } else {
                    Err(unmappable())
                }
            }
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| unmappable()))
                .collect(),
            TextEncoding::Gbk | TextEncoding::ShiftJis => {
                let encoding = if *self == TextEncoding::Gbk {
                    encoding_rs::GBK
                } else {
                    encoding_rs::SHIFT_JIS
                };
                let (bytes, _, had_errors) = encoding.encode(text);
                if had_errors {
                    Err(unmappable())
                } else {
                    Ok(bytes.into_owned())
                }
            }
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextEncoding {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        TextEncoding::ALL
            .into_iter()
            .find(|encoding| encoding.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::invalid_input("encoding", format!("unsupported encoding \"{}\"", s)))
    }
}
