//! Core data models for the policy intake advisor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

/// Policy category chosen at the first intake step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    Wealth,
    Protection,
    Medical,
}

impl PolicyType {
    /// The exact user-facing label the intake step matches against.
    pub fn label(&self) -> &'static str {
        match self {
            PolicyType::Wealth => "財富型",
            PolicyType::Protection => "保障型",
            PolicyType::Medical => "醫療型",
        }
    }

    /// Exact-match parse of a trimmed user message.
    pub fn from_label(text: &str) -> Option<Self> {
        match text {
            "財富型" => Some(PolicyType::Wealth),
            "保障型" => Some(PolicyType::Protection),
            "醫療型" => Some(PolicyType::Medical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "男",
            Gender::Female => "女",
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        match text {
            "男" => Some(Gender::Male),
            "女" => Some(Gender::Female),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

//
// ================= Profile =================
//

/// Analysis-only fields the intake flow does not ask for yet.
/// Matches the fixed defaults of the upstream advisory sheet.
pub const DEFAULT_ANNUAL_INCOME: u64 = 600_000;
pub const DEFAULT_DEBT: u64 = 0;
pub const DEFAULT_DEPENDENT_COST: u64 = 0;

/// The completed applicant record. Only ever constructed once all six
/// intake fields are collected; partial profiles never leave the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub policy_type: PolicyType,
    /// Monthly premium budget, currency-minor-unit-agnostic.
    pub monthly_budget: u32,
    pub age: u32,
    pub gender: Gender,
    /// Occupation class, 1..=4.
    pub occupation_class: u8,
    /// Product page URL or raw policy text, accepted unvalidated.
    pub product_reference: String,
    pub annual_income: u64,
    pub debt: u64,
    pub dependent_cost: u64,
}

//
// ================= Extracted Documents =================
//

/// One coverage row scraped from a product document. Amounts are free
/// text and must be numerically normalized before comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoverageItem {
    pub category: String,
    pub amount_text: String,
}

/// One row of a cash-value schedule. Period numbering may have gaps;
/// only the final entry's value is treated as a terminal inflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CashValueEntry {
    pub period_index: u32,
    pub cash_value: u64,
}

//
// ================= Gap Analysis =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryGap {
    pub need: u64,
    pub have: u64,
    /// Shortfall, clamped at zero.
    pub gap: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GapResult {
    pub life: CategoryGap,
    pub critical: CategoryGap,
    pub accident: CategoryGap,
    pub medical: CategoryGap,
    /// One suggestion per category with a positive gap, in fixed
    /// category order; a single all-clear sentence otherwise.
    pub advisories: Vec<String>,
}

//
// ================= Persisted Record =================
//

/// The finalized artifact handed to the profile sink after analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub record_id: Uuid,
    pub user_id: String,
    pub profile: Profile,
    pub product_reference: String,
    pub document_title: String,
    pub gap: GapResult,
    /// Best-effort IRR estimate; `None` when the schedule had no
    /// meaningful input or the policy is not cash-value based.
    pub irr: Option<f64>,
    pub created_at: DateTime<Utc>,
}

//
// ================= Outbound =================
//

/// Reply produced by one `advance` call. `Silent` is the intentional
/// no-reply case for invalid age input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Silent,
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        OutboundMessage::Text(body.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutboundMessage::Text(body) => Some(body),
            OutboundMessage::Silent => None,
        }
    }
}
