use url::Url;

/// Width of the calendar date that follows the field separator.
pub const DATE_WIDTH: usize = 10;

const SEPARATOR: u8 = b',';

/// One parsed log line. Lives only long enough to be counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitRecord {
    pub path: String,
    pub date: String,
}

/// How the path is isolated from the field before the separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extraction {
    /// Find the URL token and keep its path component.
    #[default]
    UrlPath,
    /// Take everything between a fixed-width prefix and the separator.
    FixedOffset(usize),
}

// Host prepended to rooted request targets such as `/index.html?x=1`.
const PLACEHOLDER_ORIGIN: &str = "http://localhost";

pub struct RecordParser {
    extraction: Extraction,
}

impl RecordParser {
    pub fn new(extraction: Extraction) -> Self {
        Self { extraction }
    }

    /// Parses one line (with or without its terminator). `None` means the
    /// line is noise and must be skipped.
    pub fn parse(&self, line: &[u8]) -> Option<VisitRecord> {
        let comma = line.iter().position(|&b| b == SEPARATOR)?;
        let field = &line[..comma];

        let date_bytes = line.get(comma + 1..comma + 1 + DATE_WIDTH)?;
        let date = String::from_utf8_lossy(date_bytes).into_owned();

        let path = match self.extraction {
            Extraction::UrlPath => self.url_path(&String::from_utf8_lossy(field))?,
            Extraction::FixedOffset(prefix) => {
                let raw = field.get(prefix..)?;
                String::from_utf8_lossy(raw).into_owned()
            }
        };

        if path.is_empty() {
            return None;
        }
        Some(VisitRecord { path, date })
    }

    fn url_path(&self, field: &str) -> Option<String> {
        let token = find_url_token(field)?;
        // Rooted targets keep their full path, even `//a/x` or a query
        // carrying another URL.
        let url = if token.starts_with('/') {
            Url::parse(&format!("{PLACEHOLDER_ORIGIN}{token}")).ok()?
        } else {
            Url::parse(token).ok()?
        };
        Some(url.path().to_string())
    }
}

/// First whitespace-delimited token that looks like an absolute URL or a
/// rooted path.
pub fn find_url_token(field: &str) -> Option<&str> {
    field
        .split_ascii_whitespace()
        .find(|token| token.contains("://") || token.starts_with('/'))
}

/// Strips a trailing `\n` or `\r\n`.
pub fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
