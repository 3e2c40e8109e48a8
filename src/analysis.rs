//! Analysis orchestrator - runs once the intake flow completes
//!
//! EXTRACT → GAP → (IRR for wealth policies) → NARRATIVE → PERSIST → SUMMARY
//!
//! Best-effort pipeline, not transactional: a persisted record without a
//! narrative is acceptable and nothing is rolled back.

use crate::error::AdvisorError;
use crate::extract::{DocumentExtractor, ExtractedDocument};
use crate::finance::{estimate_irr, IrrEstimate};
use crate::gap::analyze_gap;
use crate::models::{AnalysisRecord, CashValueEntry, CoverageItem, PolicyType, Profile};
use crate::narrative::{fallback_script, irr_caveat, NarrativeGenerator};
use crate::store::{stable_record_id, ProfileSink};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Title substituted for cash-value documents, which carry no name.
const CASHFLOW_DOC_TITLE: &str = "現金價值表保單（未取得產品名稱）";

/// Outcome of a completed analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// Composed user-facing summary text.
    Summary(String),
    /// The extractor could not parse the reference; nothing else ran.
    ParseFailed,
}

/// Coordinates the external collaborators around the two calculators.
pub struct AnalysisOrchestrator {
    extractor: Arc<dyn DocumentExtractor>,
    narrator: Arc<dyn NarrativeGenerator>,
    sink: Arc<dyn ProfileSink>,
}

impl AnalysisOrchestrator {
    pub fn new(
        extractor: Arc<dyn DocumentExtractor>,
        narrator: Arc<dyn NarrativeGenerator>,
        sink: Arc<dyn ProfileSink>,
    ) -> Self {
        Self {
            extractor,
            narrator,
            sink,
        }
    }

    /// Run the full analysis for a completed profile.
    pub async fn run_analysis(&self, user_id: &str, profile: &Profile) -> Result<AnalysisOutcome> {
        info!(
            user_id = %user_id,
            policy_type = %profile.policy_type,
            reference = %profile.product_reference,
            "Analysis: starting"
        );

        // === EXTRACT ===
        let document = match self.extractor.extract(&profile.product_reference).await {
            Ok(document) => document,
            Err(AdvisorError::Extraction(reason)) => {
                warn!(user_id = %user_id, reason = %reason, "Analysis: extraction failed");
                return Ok(AnalysisOutcome::ParseFailed);
            }
            Err(other) => return Err(other),
        };

        let (title, coverage, cash_values): (String, Vec<CoverageItem>, Vec<CashValueEntry>) =
            match document {
                ExtractedDocument::Coverage { title, coverage } => (title, coverage, Vec::new()),
                ExtractedDocument::CashFlow { cash_values } => {
                    (CASHFLOW_DOC_TITLE.to_string(), Vec::new(), cash_values)
                }
            };

        // === GAP ===
        let gap = analyze_gap(profile, &coverage);
        debug!(
            life_gap = gap.life.gap,
            medical_gap = gap.medical.gap,
            "Analysis: gap computed"
        );

        // === IRR ===
        // Only wealth policies with a cash-value schedule get an estimate.
        let irr: Option<IrrEstimate> = if profile.policy_type == PolicyType::Wealth {
            let annual_outflow = f64::from(profile.monthly_budget) * 12.0;
            estimate_irr(&cash_values, annual_outflow)
        } else {
            None
        };

        // === NARRATIVE ===
        let script = match self
            .narrator
            .generate(profile, &gap, &title, irr.as_ref())
            .await
        {
            Ok(script) => script,
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "Analysis: narrative failed, using fallback");
                fallback_script(&gap, &title)
            }
        };

        // === PERSIST ===
        let record = AnalysisRecord {
            record_id: stable_record_id(user_id),
            user_id: user_id.to_string(),
            profile: profile.clone(),
            product_reference: profile.product_reference.clone(),
            document_title: title.clone(),
            gap,
            irr: irr.map(|estimate| estimate.rate),
            created_at: Utc::now(),
        };
        if let Err(error) = self.sink.save(&record).await {
            warn!(user_id = %user_id, error = %error, "Analysis: profile save failed");
        }

        // === SUMMARY ===
        let mut summary = format!("✅ 保單解析完成：{}\n", title);
        if let Some(estimate) = irr {
            summary.push_str(&format!(
                "估算 IRR 約為 {:.2}%（假設以年繳 {} 元、繳至現金價值表末年）{}\n",
                estimate.rate * 100.0,
                u64::from(profile.monthly_budget) * 12,
                irr_caveat(&estimate),
            ));
        }
        summary.push_str(&format!(
            "我幫你整理了一份可用於向客戶說明的話術草稿：\n\n{}",
            script
        ));

        info!(user_id = %user_id, "Analysis: complete");
        Ok(AnalysisOutcome::Summary(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::MockExtractor;
    use crate::models::{
        Gender, DEFAULT_ANNUAL_INCOME, DEFAULT_DEBT, DEFAULT_DEPENDENT_COST,
    };
    use crate::narrative::MockNarrator;
    use crate::store::InMemoryProfileSink;
    use async_trait::async_trait;

    struct FailingExtractor;

    #[async_trait]
    impl DocumentExtractor for FailingExtractor {
        async fn extract(&self, _reference: &str) -> Result<ExtractedDocument> {
            Err(AdvisorError::Extraction("connection refused".to_string()))
        }
    }

    struct FailingNarrator;

    #[async_trait]
    impl NarrativeGenerator for FailingNarrator {
        async fn generate(
            &self,
            _profile: &Profile,
            _gap: &crate::models::GapResult,
            _title: &str,
            _irr: Option<&IrrEstimate>,
        ) -> Result<String> {
            Err(AdvisorError::Narrative("quota exceeded".to_string()))
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ProfileSink for FailingSink {
        async fn save(&self, _record: &AnalysisRecord) -> Result<()> {
            Err(AdvisorError::Persistence("connection lost".to_string()))
        }

        async fn load(&self, _user_id: &str) -> Result<Option<AnalysisRecord>> {
            Ok(None)
        }
    }

    fn test_profile(policy_type: PolicyType) -> Profile {
        Profile {
            policy_type,
            monthly_budget: 10_000,
            age: 30,
            gender: Gender::Male,
            occupation_class: 2,
            product_reference: "http://example.test/policy".to_string(),
            annual_income: DEFAULT_ANNUAL_INCOME,
            debt: DEFAULT_DEBT,
            dependent_cost: DEFAULT_DEPENDENT_COST,
        }
    }

    fn cashflow_doc() -> ExtractedDocument {
        ExtractedDocument::CashFlow {
            cash_values: vec![
                CashValueEntry {
                    period_index: 1,
                    cash_value: 0,
                },
                CashValueEntry {
                    period_index: 2,
                    cash_value: 1_440_000,
                },
            ],
        }
    }

    fn orchestrator_with(
        extractor: Arc<dyn DocumentExtractor>,
        sink: Arc<InMemoryProfileSink>,
    ) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(extractor, Arc::new(MockNarrator), sink)
    }

    #[tokio::test]
    async fn extraction_failure_short_circuits() {
        let sink = Arc::new(InMemoryProfileSink::new());
        let orchestrator = orchestrator_with(Arc::new(FailingExtractor), sink.clone());

        let outcome = orchestrator
            .run_analysis("user-1", &test_profile(PolicyType::Protection))
            .await
            .unwrap();

        assert_eq!(outcome, AnalysisOutcome::ParseFailed);
        // Nothing was persisted.
        assert!(sink.load("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn coverage_document_produces_summary_and_record() {
        let sink = Arc::new(InMemoryProfileSink::new());
        let orchestrator =
            orchestrator_with(Arc::new(MockExtractor::sample_coverage()), sink.clone());

        let outcome = orchestrator
            .run_analysis("user-1", &test_profile(PolicyType::Protection))
            .await
            .unwrap();

        let AnalysisOutcome::Summary(summary) = outcome else {
            panic!("expected summary");
        };
        assert!(summary.contains("保單解析完成"));
        assert!(summary.contains("安心終身壽險"));
        // Protection policy never gets an IRR line.
        assert!(!summary.contains("IRR"));

        let record = sink.load("user-1").await.unwrap().unwrap();
        assert_eq!(record.document_title, "安心終身壽險");
        assert_eq!(record.irr, None);
        // Coverage table reduced the life gap below the full need.
        assert!(record.gap.life.have > 0);
    }

    #[tokio::test]
    async fn wealth_policy_on_cashflow_document_gets_irr() {
        let sink = Arc::new(InMemoryProfileSink::new());
        let orchestrator =
            orchestrator_with(Arc::new(MockExtractor::new(cashflow_doc())), sink.clone());

        let outcome = orchestrator
            .run_analysis("user-1", &test_profile(PolicyType::Wealth))
            .await
            .unwrap();

        let AnalysisOutcome::Summary(summary) = outcome else {
            panic!("expected summary");
        };
        assert!(summary.contains("估算 IRR"));
        assert!(summary.contains("120000"));

        let record = sink.load("user-1").await.unwrap().unwrap();
        assert!(record.irr.is_some());
        // Cash-flow form runs the gap analyzer with an empty coverage list.
        assert_eq!(record.gap.life.have, 0);
    }

    #[tokio::test]
    async fn non_wealth_policy_skips_irr_even_with_cashflow() {
        let sink = Arc::new(InMemoryProfileSink::new());
        let orchestrator =
            orchestrator_with(Arc::new(MockExtractor::new(cashflow_doc())), sink.clone());

        let outcome = orchestrator
            .run_analysis("user-1", &test_profile(PolicyType::Medical))
            .await
            .unwrap();

        assert!(matches!(outcome, AnalysisOutcome::Summary(_)));
        let record = sink.load("user-1").await.unwrap().unwrap();
        assert_eq!(record.irr, None);
    }

    #[tokio::test]
    async fn narrative_failure_falls_back() {
        let sink = Arc::new(InMemoryProfileSink::new());
        let orchestrator = AnalysisOrchestrator::new(
            Arc::new(MockExtractor::sample_coverage()),
            Arc::new(FailingNarrator),
            sink.clone(),
        );

        let outcome = orchestrator
            .run_analysis("user-1", &test_profile(PolicyType::Protection))
            .await
            .unwrap();

        let AnalysisOutcome::Summary(summary) = outcome else {
            panic!("expected summary");
        };
        // The fallback script is built from the gap advisories.
        assert!(summary.contains("保障"));
        // The record was still persisted.
        assert!(sink.load("user-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn persistence_failure_does_not_change_summary() {
        let orchestrator = AnalysisOrchestrator::new(
            Arc::new(MockExtractor::sample_coverage()),
            Arc::new(MockNarrator),
            Arc::new(FailingSink),
        );

        let outcome = orchestrator
            .run_analysis("user-1", &test_profile(PolicyType::Protection))
            .await
            .unwrap();

        assert!(matches!(outcome, AnalysisOutcome::Summary(_)));
    }
}
