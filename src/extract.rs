//! Document extraction collaborator
//!
//! Given a product reference (URL or raw pasted text), produce either a
//! structured coverage list or a cash-value schedule. Extraction-level
//! failures are reported as `AdvisorError::Extraction` so the
//! orchestrator can turn them into a user-facing parse failure instead
//! of a fault.

use crate::error::AdvisorError;
use crate::models::{CashValueEntry, CoverageItem};
use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Structured result of extracting a product document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedDocument {
    /// HTML-style product page: title plus a coverage table.
    Coverage {
        title: String,
        coverage: Vec<CoverageItem>,
    },
    /// Cash-value schedule, e.g. from a policy illustration.
    CashFlow { cash_values: Vec<CashValueEntry> },
}

/// Trait for document extraction (network controlled)
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, reference: &str) -> Result<ExtractedDocument>;
}

/// Fetches product pages over HTTP and scrapes them; falls back to
/// scanning the reference itself when it is not a URL.
pub struct HttpDocumentExtractor {
    client: reqwest::Client,
}

impl HttpDocumentExtractor {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }
}

impl Default for HttpDocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentExtractor for HttpDocumentExtractor {
    async fn extract(&self, reference: &str) -> Result<ExtractedDocument> {
        let reference = reference.trim();

        if !reference.starts_with("http://") && !reference.starts_with("https://") {
            debug!("Reference is not a URL, scanning as raw policy text");
            return extract_from_text(reference);
        }

        let response = self
            .client
            .get(reference)
            .send()
            .await
            .map_err(|e| AdvisorError::Extraction(format!("Request failed: {}", e)))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let is_pdf = content_type.contains("application/pdf")
            || reference.to_lowercase().ends_with(".pdf");

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdvisorError::Extraction(format!("Body read failed: {}", e)))?;
        let body = String::from_utf8_lossy(&bytes);

        if is_pdf {
            // No binary PDF decoding here; scan whatever text survived.
            let cash_values = scan_cash_value_rows(&body);
            if cash_values.is_empty() {
                warn!("PDF reference yielded no cash-value rows");
                return Err(AdvisorError::Extraction(
                    "No cash-value rows found in PDF document".to_string(),
                ));
            }
            return Ok(ExtractedDocument::CashFlow { cash_values });
        }

        let title = html_title(&body).unwrap_or_else(|| "未取得產品名稱".to_string());
        let coverage = scrape_coverage_table(&body);

        debug!(
            title = %title,
            coverage_rows = coverage.len(),
            "Extracted HTML product page"
        );

        Ok(ExtractedDocument::Coverage { title, coverage })
    }
}

/// Scan raw pasted policy text: cash-value rows win; otherwise treat
/// colon-separated lines as coverage items.
fn extract_from_text(text: &str) -> Result<ExtractedDocument> {
    let cash_values = scan_cash_value_rows(text);
    if !cash_values.is_empty() {
        return Ok(ExtractedDocument::CashFlow { cash_values });
    }

    let coverage = scan_coverage_lines(text);
    if coverage.is_empty() {
        return Err(AdvisorError::Extraction(
            "No coverage items or cash-value rows found in pasted text".to_string(),
        ));
    }

    Ok(ExtractedDocument::Coverage {
        title: "文字條款".to_string(),
        coverage,
    })
}

fn cash_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})年\s*([\d,]+)元?").expect("valid regex"))
}

/// Parse `《n》年 《amount》元` schedule rows, one per line.
pub fn scan_cash_value_rows(text: &str) -> Vec<CashValueEntry> {
    let re = cash_row_re();
    let mut rows = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = re.captures(line) {
            let period_index: u32 = match caps[1].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let cash_value: u64 = match caps[2].replace(',', "").parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            rows.push(CashValueEntry {
                period_index,
                cash_value,
            });
        }
    }

    rows
}

/// Parse `item：amount` lines from pasted clause text.
fn scan_coverage_lines(text: &str) -> Vec<CoverageItem> {
    let mut items = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((category, amount)) = line.split_once('：').or_else(|| line.split_once(':'))
        else {
            continue;
        };
        let category = category.trim();
        let amount = amount.trim();
        if !category.is_empty() && !amount.is_empty() {
            items.push(CoverageItem {
                category: category.to_string(),
                amount_text: amount.to_string(),
            });
        }
    }

    items
}

fn og_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<meta[^>]*property="og:title"[^>]*content="([^"]*)""#).expect("valid regex")
    })
}

fn title_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<title[^>]*>(.*?)</title>").expect("valid regex"))
}

fn tr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<tr[^>]*>(.*?)</tr>").expect("valid regex"))
}

fn td_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<td[^>]*>(.*?)</td>").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

/// Page title: `og:title` meta first, then the `<title>` tag.
fn html_title(html: &str) -> Option<String> {
    let from_meta = og_title_re()
        .captures(html)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| !t.is_empty());
    if from_meta.is_some() {
        return from_meta;
    }

    title_tag_re()
        .captures(html)
        .map(|caps| strip_tags(&caps[1]).trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Collect `{item, amount}` pairs from every table row with at least
/// two cells.
fn scrape_coverage_table(html: &str) -> Vec<CoverageItem> {
    let mut coverage = Vec::new();

    for row in tr_re().captures_iter(html) {
        let cells: Vec<String> = td_re()
            .captures_iter(&row[1])
            .map(|caps| strip_tags(&caps[1]).trim().to_string())
            .collect();

        if cells.len() >= 2 && !cells[0].is_empty() && !cells[1].is_empty() {
            coverage.push(CoverageItem {
                category: cells[0].clone(),
                amount_text: cells[1].clone(),
            });
        }
    }

    coverage
}

fn strip_tags(fragment: &str) -> String {
    tag_re().replace_all(fragment, "").to_string()
}

/// Mock extractor for development & testing
/// Keeps the pipeline functional without network access
pub struct MockExtractor {
    document: ExtractedDocument,
}

impl MockExtractor {
    pub fn new(document: ExtractedDocument) -> Self {
        Self { document }
    }

    /// Sample coverage-table document.
    pub fn sample_coverage() -> Self {
        Self::new(ExtractedDocument::Coverage {
            title: "安心終身壽險".to_string(),
            coverage: vec![
                CoverageItem {
                    category: "身故保險金".to_string(),
                    amount_text: "1,000,000元".to_string(),
                },
                CoverageItem {
                    category: "住院醫療日額".to_string(),
                    amount_text: "2,000元".to_string(),
                },
            ],
        })
    }
}

#[async_trait]
impl DocumentExtractor for MockExtractor {
    async fn extract(&self, _reference: &str) -> Result<ExtractedDocument> {
        Ok(self.document.clone())
    }
}
