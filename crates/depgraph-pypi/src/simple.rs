//! Lazy scan of the Simple index line stream.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PypiError, Result};

static PACKAGE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/simple/(?P<name>[A-Za-z0-9._\-]+)").unwrap());

/// Incremental scanner over the streamed `/simple/` body.
///
/// Yields package names in index order (alphabetical in practice, not
/// guaranteed) without buffering the multi-megabyte response. Names are
/// whatever the index links carry; callers canonicalize on insert.
pub struct SimpleIndexScanner {
    url: String,
    response: reqwest::Response,
    buffer: String,
    exhausted: bool,
}

impl SimpleIndexScanner {
    pub(crate) fn new(url: String, response: reqwest::Response) -> Self {
        Self {
            url,
            response,
            buffer: String::new(),
            exhausted: false,
        }
    }

    /// The next package name, or `None` once the stream is drained.
    pub async fn next_name(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(newline) = self.buffer.find('\n') {
                let line: String = self.buffer.drain(..=newline).collect();
                if let Some(captures) = PACKAGE_NAME_RE.captures(&line) {
                    return Ok(Some(captures["name"].to_string()));
                }
                continue;
            }

            if self.exhausted {
                let line = std::mem::take(&mut self.buffer);
                return Ok(PACKAGE_NAME_RE
                    .captures(&line)
                    .map(|captures| captures["name"].to_string()));
            }

            match self.response.chunk().await {
                Ok(Some(bytes)) => self.buffer.push_str(&String::from_utf8_lossy(&bytes)),
                Ok(None) => self.exhausted = true,
                Err(source) => {
                    return Err(PypiError::Request {
                        url: self.url.clone(),
                        source,
                    });
                }
            }
        }
    }
}
