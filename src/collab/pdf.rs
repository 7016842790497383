//! The PDF extractor boundary (§6.7).
//!
//! No real PDF parsing crate appears anywhere in the pack, so the core does
//! not ship a "real" PDF backend — only the trait and a plain-text fallback
//! (bytes are assumed to already be UTF-8 text, one page) for callers who
//! hand the core a plain-text alternative source per §3.1's "source handle
//! (PDF bytes or a plain-text alternative)". A real PDF-backed
//! implementation is the outer API's responsibility to supply.

use async_trait::async_trait;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// Malformed input produces `ErrCorruptSource`, never a partial result.
#[async_trait]
pub trait PdfExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> Result<Vec<PageText>>;
}

pub struct PlainTextExtractor;

#[async_trait]
impl PdfExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| CoreError::corrupt_source(format!("not valid UTF-8 text: {e}")))?;
        if text.trim().is_empty() {
            return Err(CoreError::corrupt_source("empty source"));
        }
        Ok(vec![PageText {
            page_number: 1,
            text: text.to_string(),
        }])
    }
}

#[cfg(any(test, feature = "test-util"))]
pub struct FakePdfExtractor {
    pub pages: Vec<PageText>,
    pub fail: bool,
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl PdfExtractor for FakePdfExtractor {
    async fn extract(&self, _bytes: &[u8]) -> Result<Vec<PageText>> {
        if self.fail {
            return Err(CoreError::corrupt_source("fake extractor configured to fail"));
        }
        Ok(self.pages.clone())
    }
}
