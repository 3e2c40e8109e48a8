//! Coverage-gap analysis
//!
//! Pure and deterministic: identical profile + coverage input always
//! produces byte-identical output, including advisory ordering. The
//! need multipliers are fixed heuristic constants, not actuarial truth.

use crate::models::{CategoryGap, CoverageItem, GapResult, Profile};

const LIFE_KEYWORDS: &[&str] = &["壽險", "身故", "死亡"];
const CRITICAL_KEYWORDS: &[&str] = &["重大", "重疾"];
const ACCIDENT_KEYWORDS: &[&str] = &["意外"];
const MEDICAL_KEYWORDS: &[&str] = &["醫療", "住院"];

/// Fixed need for critical-illness cover, in currency units.
const CRITICAL_NEED: u64 = 1_000_000;
/// Fixed need for hospitalization/medical cover, in currency units.
const MEDICAL_NEED: u64 = 500_000;

/// Compute per-category need/have/gap plus the advisory list.
pub fn analyze_gap(profile: &Profile, coverage: &[CoverageItem]) -> GapResult {
    let life_need = profile
        .annual_income
        .saturating_mul(5)
        .saturating_add(profile.debt)
        .saturating_add(profile.dependent_cost);
    let accident_need = profile.annual_income.saturating_mul(3);

    let life = category_gap(life_need, held_amount(coverage, LIFE_KEYWORDS));
    let critical = category_gap(CRITICAL_NEED, held_amount(coverage, CRITICAL_KEYWORDS));
    let accident = category_gap(accident_need, held_amount(coverage, ACCIDENT_KEYWORDS));
    let medical = category_gap(MEDICAL_NEED, held_amount(coverage, MEDICAL_KEYWORDS));

    let mut advisories = Vec::new();
    if life.gap > 0 {
        advisories.push(format!(
            "壽險保障缺口約 {} 元，建議補強定期壽險或增額型壽險。",
            life.gap
        ));
    }
    if critical.gap > 0 {
        advisories.push(format!(
            "重大疾病保障缺口約 {} 元，建議補強重大傷病或重疾險。",
            critical.gap
        ));
    }
    if accident.gap > 0 {
        advisories.push(format!(
            "意外保障缺口約 {} 元，建議補強意外傷害險。",
            accident.gap
        ));
    }
    if medical.gap > 0 {
        advisories.push(format!(
            "醫療保障缺口約 {} 元，建議補強住院醫療或實支實付險。",
            medical.gap
        ));
    }
    if advisories.is_empty() {
        advisories.push("目前保障大致足夠，建議定期檢視保單內容。".to_string());
    }

    GapResult {
        life,
        critical,
        accident,
        medical,
        advisories,
    }
}

fn category_gap(need: u64, have: u64) -> CategoryGap {
    CategoryGap {
        need,
        have,
        gap: need.saturating_sub(have),
    }
}

/// Held amount for a category: the first coverage item whose combined
/// category + amount text contains any keyword, numerically normalized.
fn held_amount(coverage: &[CoverageItem], keywords: &[&str]) -> u64 {
    for item in coverage {
        let label = format!("{}{}", item.category, item.amount_text);
        if keywords.iter().any(|kw| label.contains(kw)) {
            return normalize_amount(&item.amount_text);
        }
    }
    0
}

/// Normalize a free-text amount: strip thousands separators and currency
/// markers, then parse the leading digit run. Unparsable text maps to
/// zero, never an error.
pub(crate) fn normalize_amount(text: &str) -> u64 {
    let cleaned = text
        .replace(',', "")
        .replace("NT$", "")
        .replace('$', "")
        .replace('元', "");

    let digits: String = cleaned
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Gender, PolicyType, DEFAULT_ANNUAL_INCOME, DEFAULT_DEBT, DEFAULT_DEPENDENT_COST,
    };

    fn test_profile() -> Profile {
        Profile {
            policy_type: PolicyType::Protection,
            monthly_budget: 3000,
            age: 30,
            gender: Gender::Male,
            occupation_class: 2,
            product_reference: "http://example.test/policy".to_string(),
            annual_income: DEFAULT_ANNUAL_INCOME,
            debt: DEFAULT_DEBT,
            dependent_cost: DEFAULT_DEPENDENT_COST,
        }
    }

    fn item(category: &str, amount_text: &str) -> CoverageItem {
        CoverageItem {
            category: category.to_string(),
            amount_text: amount_text.to_string(),
        }
    }

    #[test]
    fn empty_coverage_yields_full_needs_as_gaps() {
        let result = analyze_gap(&test_profile(), &[]);

        assert_eq!(result.life.need, 3_000_000);
        assert_eq!(result.life.have, 0);
        assert_eq!(result.life.gap, 3_000_000);
        assert_eq!(result.critical.gap, 1_000_000);
        assert_eq!(result.accident.gap, 1_800_000);
        assert_eq!(result.medical.gap, 500_000);
        assert_eq!(result.advisories.len(), 4);
    }

    #[test]
    fn matched_coverage_reduces_gap() {
        let coverage = vec![
            item("身故保險金", "2,000,000元"),
            item("住院醫療日額", "500000"),
        ];
        let result = analyze_gap(&test_profile(), &coverage);

        assert_eq!(result.life.have, 2_000_000);
        assert_eq!(result.life.gap, 1_000_000);
        assert_eq!(result.medical.have, 500_000);
        assert_eq!(result.medical.gap, 0);
        // Medical is fully covered, so only three advisories remain.
        assert_eq!(result.advisories.len(), 3);
    }

    #[test]
    fn first_matching_item_wins() {
        let coverage = vec![
            item("意外身故保險金", "1,000,000元"),
            item("壽險保額", "9,999,999元"),
        ];
        let result = analyze_gap(&test_profile(), &coverage);

        // The first item matches both life and accident keywords.
        assert_eq!(result.life.have, 1_000_000);
        assert_eq!(result.accident.have, 1_000_000);
    }

    #[test]
    fn gap_never_negative() {
        let coverage = vec![item("壽險", "99,999,999元")];
        let result = analyze_gap(&test_profile(), &coverage);
        assert_eq!(result.life.gap, 0);
    }

    #[test]
    fn fully_covered_emits_single_all_clear() {
        let coverage = vec![
            item("壽險身故", "5,000,000元"),
            item("重大疾病", "1,000,000元"),
            item("意外傷害", "2,000,000元"),
            item("住院醫療", "500,000元"),
        ];
        let result = analyze_gap(&test_profile(), &coverage);

        assert_eq!(result.advisories.len(), 1);
        assert!(result.advisories[0].contains("足夠"));
    }

    #[test]
    fn amount_normalization() {
        assert_eq!(normalize_amount("1,000,000元"), 1_000_000);
        assert_eq!(normalize_amount("NT$500,000"), 500_000);
        assert_eq!(normalize_amount(" 120000 "), 120_000);
        // parseInt semantics: leading digits only.
        assert_eq!(normalize_amount("100萬"), 100);
        assert_eq!(normalize_amount("面議"), 0);
        assert_eq!(normalize_amount(""), 0);
    }

    #[test]
    fn analysis_is_deterministic() {
        let coverage = vec![item("身故", "1,234,567元"), item("醫療", "300,000元")];
        let first = analyze_gap(&test_profile(), &coverage);
        let second = analyze_gap(&test_profile(), &coverage);
        assert_eq!(first, second);
    }
}
