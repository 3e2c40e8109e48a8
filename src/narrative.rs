//! Narrative generation collaborator
//!
//! Turns a structured analysis (profile + gap result + optional IRR)
//! into advisory prose. The Gemini-backed implementation uses a
//! long-lived reqwest::Client for connection pooling; failures are
//! caught at the orchestrator boundary and replaced with a fallback
//! script, never shown raw to the user.

use crate::error::AdvisorError;
use crate::finance::{Convergence, IrrEstimate};
use crate::models::{GapResult, Profile};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Trait for narrative generation (LLM controlled)
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(
        &self,
        profile: &Profile,
        gap: &GapResult,
        title: &str,
        irr: Option<&IrrEstimate>,
    ) -> Result<String>;
}

/// Gemini-backed narrator.
pub struct GeminiNarrator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiNarrator {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".to_string(),
        }
    }
}

#[async_trait]
impl NarrativeGenerator for GeminiNarrator {
    async fn generate(
        &self,
        profile: &Profile,
        gap: &GapResult,
        title: &str,
        irr: Option<&IrrEstimate>,
    ) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AdvisorError::Narrative(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_script_prompt(profile, gap, title, irr)?,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
        };

        info!("Calling Gemini API for advisory script");

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AdvisorError::Narrative(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AdvisorError::Narrative(format!("Gemini parse error: {}", e))
        })?;

        let script = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| AdvisorError::Narrative("Empty response from Gemini".to_string()))?;

        Ok(script)
    }
}

const SYSTEM_PROMPT: &str = "你是一位專業、合規、低壓力的保險顧問，對象是保險經紀人，\
輸出用於向客戶說明商品的話術草稿。重點放在需求對應與風險提醒，而非推銷。用繁體中文輸出。";

fn build_script_prompt(
    profile: &Profile,
    gap: &GapResult,
    title: &str,
    irr: Option<&IrrEstimate>,
) -> Result<String> {
    let irr_line = match irr {
        Some(estimate) => format!("估算 IRR：約 {:.2}%", estimate.rate * 100.0),
        None => "IRR 資料不足或非財富型商品".to_string(),
    };

    Ok(format!(
        "【客戶資料】\n年齡：{}\n性別：{}\n每月預算：{}\n職業等級：{}\n\n\
         【產品名稱】\n{}\n\n\
         【保障缺口分析】\n{}\n\n\
         【財富型資訊（若有）】\n{}\n\n\
         請產生：\n\
         1. 一段約 80~120 字的專業說明話術。\n\
         2. 接著列出 3 句可直接對客戶說的短句話術（每句 25 字內，一行一句）。",
        profile.age,
        profile.gender,
        profile.monthly_budget,
        profile.occupation_class,
        title,
        serde_json::to_string_pretty(gap)?,
        irr_line,
    ))
}

/// Deterministic fallback used when the narrator fails: the gap
/// advisories themselves, joined into a short script.
pub fn fallback_script(gap: &GapResult, title: &str) -> String {
    let mut script = format!("根據「{}」的保障內容，重點整理如下：\n", title);
    for advisory in &gap.advisories {
        script.push_str("・");
        script.push_str(advisory);
        script.push('\n');
    }
    script
}

/// Caveat line appended to summaries when the IRR solver hit its
/// iteration cap without converging.
pub fn irr_caveat(estimate: &IrrEstimate) -> &'static str {
    match estimate.convergence {
        Convergence::Converged => "",
        Convergence::IterationCapReached => "（估算未完全收斂，僅供參考）",
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Mock narrator for development & testing
/// Keeps the pipeline functional without LLM dependency
pub struct MockNarrator;

#[async_trait]
impl NarrativeGenerator for MockNarrator {
    async fn generate(
        &self,
        _profile: &Profile,
        gap: &GapResult,
        title: &str,
        _irr: Option<&IrrEstimate>,
    ) -> Result<String> {
        Ok(fallback_script(gap, title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::analyze_gap;
    use crate::models::{
        Gender, PolicyType, Profile, DEFAULT_ANNUAL_INCOME, DEFAULT_DEBT, DEFAULT_DEPENDENT_COST,
    };

    fn test_profile() -> Profile {
        Profile {
            policy_type: PolicyType::Wealth,
            monthly_budget: 3000,
            age: 30,
            gender: Gender::Female,
            occupation_class: 1,
            product_reference: "http://example.test/policy".to_string(),
            annual_income: DEFAULT_ANNUAL_INCOME,
            debt: DEFAULT_DEBT,
            dependent_cost: DEFAULT_DEPENDENT_COST,
        }
    }

    #[test]
    fn prompt_includes_profile_and_irr() {
        let profile = test_profile();
        let gap = analyze_gap(&profile, &[]);
        let estimate = IrrEstimate {
            rate: 0.0215,
            convergence: Convergence::Converged,
        };

        let prompt = build_script_prompt(&profile, &gap, "安心終身壽險", Some(&estimate)).unwrap();
        assert!(prompt.contains("年齡：30"));
        assert!(prompt.contains("安心終身壽險"));
        assert!(prompt.contains("2.15%"));

        let prompt = build_script_prompt(&profile, &gap, "安心終身壽險", None).unwrap();
        assert!(prompt.contains("IRR 資料不足"));
    }

    #[test]
    fn fallback_script_lists_advisories() {
        let profile = test_profile();
        let gap = analyze_gap(&profile, &[]);

        let script = fallback_script(&gap, "安心終身壽險");
        assert!(script.contains("安心終身壽險"));
        for advisory in &gap.advisories {
            assert!(script.contains(advisory));
        }
    }

    #[test]
    fn caveat_only_when_not_converged() {
        let converged = IrrEstimate {
            rate: 0.02,
            convergence: Convergence::Converged,
        };
        let capped = IrrEstimate {
            rate: 0.02,
            convergence: Convergence::IterationCapReached,
        };
        assert!(irr_caveat(&converged).is_empty());
        assert!(!irr_caveat(&capped).is_empty());
    }

    #[tokio::test]
    async fn missing_api_key_is_an_error() {
        let narrator = GeminiNarrator::new(String::new());
        let profile = test_profile();
        let gap = analyze_gap(&profile, &[]);

        let result = narrator.generate(&profile, &gap, "測試", None).await;
        assert!(result.is_err());
        let message = result.unwrap_err().to_string();
        assert!(message.to_lowercase().contains("api_key") || message.contains("API_KEY"));
    }
}
