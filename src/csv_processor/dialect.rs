use crate::utils::{Result, TapError};
use std::borrow::Cow;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Text encoding applied to raw field bytes before typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// UTF-8 with an optional leading byte order mark.
    Utf8Sig,
    Latin1,
    Ascii,
}

impl Encoding {
    pub fn from_label(label: &str) -> Result<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "utf-8-sig" | "utf8-sig" => Ok(Encoding::Utf8Sig),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Encoding::Latin1),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            _ => Err(TapError::UnknownEncoding(label.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf8Sig => "utf-8-sig",
            Encoding::Latin1 => "latin-1",
            Encoding::Ascii => "ascii",
        }
    }

    /// Decodes one field. `None` means the bytes are not valid in this encoding.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            Encoding::Utf8 | Encoding::Utf8Sig => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            Encoding::Ascii => {
                if bytes.is_ascii() {
                    std::str::from_utf8(bytes).ok().map(Cow::Borrowed)
                } else {
                    None
                }
            }
            Encoding::Latin1 => Some(Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())),
        }
    }

    /// Removes a UTF-8 byte order mark from the first field of a file.
    pub fn strip_bom<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        match self {
            Encoding::Utf8Sig => bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes),
            _ => bytes,
        }
    }
}

/// Concrete tokenization rules for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub encoding: Encoding,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            encoding: Encoding::Utf8,
        }
    }
}

impl Dialect {
    /// Known presets: `excel`, `excel-tab`, `unix`.
    pub fn preset(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "excel" | "unix" => Ok(Self::default()),
            "excel-tab" => Ok(Self {
                delimiter: b'\t',
                ..Self::default()
            }),
            _ => Err(TapError::UnknownDialect(name.to_string())),
        }
    }

    /// Starts from the named preset (or the comma default) and applies overrides.
    pub fn resolve(
        delimiter: Option<&str>,
        dialect: Option<&str>,
        quotechar: Option<&str>,
        encoding: Option<&str>,
    ) -> Result<Self> {
        let mut resolved = match dialect {
            Some(name) => Self::preset(name)?,
            None => Self::default(),
        };

        if let Some(d) = delimiter {
            resolved.delimiter = single_byte("delimiter", d)?;
        }
        if let Some(q) = quotechar {
            resolved.quote = single_byte("quotechar", q)?;
        }
        if let Some(e) = encoding {
            resolved.encoding = Encoding::from_label(e)?;
        }

        if resolved.delimiter == resolved.quote {
            return Err(TapError::ConfigError(format!(
                "delimiter and quotechar must differ, both are '{}'",
                char::from(resolved.delimiter)
            )));
        }

        Ok(resolved)
    }

    pub fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut rb = csv::ReaderBuilder::new();
        rb.delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(true)
            .has_headers(false)
            .flexible(true);
        rb
    }
}

fn single_byte(option: &str, value: &str) -> Result<u8> {
    match value.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(TapError::ConfigError(format!(
            "{} must be a single ASCII character, got '{}'",
            option, value
        ))),
    }
}
