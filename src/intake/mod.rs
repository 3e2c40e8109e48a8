//! Intake state machine
//!
//! Per-user finite-state controller that collects the six profile
//! fields in order, validates each, and hands the completed profile to
//! the analysis orchestrator. Processing is serialized per user id so
//! the session read-modify-write is atomic, while distinct users
//! proceed fully in parallel.

use crate::analysis::{AnalysisOrchestrator, AnalysisOutcome};
use crate::models::{Gender, OutboundMessage, PolicyType};
use crate::AdvisorError;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub mod session;
pub use session::{InMemorySessionStore, IntakeStep, Session, SessionStore};

/// Start triggers, matched as case-sensitive substrings. Recognized
/// even mid-flow; a restart always discards the in-progress profile.
const START_TRIGGERS: &[&str] = &["保險經紀人", "保險業務員"];

const TYPE_PROMPT: &str = "您好，我將協助您進行專業保單規劃。\n\
請問您想規劃的保單類型是：\n1️⃣ 財富型\n2️⃣ 保障型\n3️⃣ 醫療型";
const ACTIVATION_PROMPT: &str = "請先輸入「我是保險經紀人」以啟動智能保單規劃助手。";
const TYPE_RETRY: &str = "請回答：財富型 / 保障型 / 醫療型";
const BUDGET_RETRY: &str = "請輸入數字，例如：3000";
const AGE_PROMPT: &str = "請提供客戶保險年齡（例如：30）";
const GENDER_PROMPT: &str = "請問客戶性別？（男 / 女）";
const GENDER_RETRY: &str = "請回答 男 / 女";
const OCCUPATION_PROMPT: &str = "請問職業等級？（1~4）";
const OCCUPATION_RETRY: &str = "請輸入 1~4 之間的數字（職業等級）";
const REFERENCE_PROMPT: &str =
    "最後一步：請貼上可銷售保單的產品頁連結（HTML 或 PDF），我會協助解析與規劃建議。";
const PARSE_FAILED_MSG: &str = "保單連結解析失敗，請確認網址是否正確或改貼文字條款。";
const ANALYSIS_ERROR_MSG: &str = "保單解析或分析時發生錯誤，請稍後重試或改貼文字內容。";
const RESET_NOTICE: &str = "流程狀態異常，已重設流程。請重新輸入「保險經紀人」開始。";
const STORE_ERROR_MSG: &str = "系統暫時無法處理您的請求，請稍後再試。";

/// Full-string integer parse with a closed range check. No leniency
/// toward trailing garbage or empty strings.
fn parse_int_in_range(text: &str, range: RangeInclusive<u32>) -> Option<u32> {
    let value: u32 = text.parse().ok()?;
    range.contains(&value).then_some(value)
}

/// The per-user conversation controller.
pub struct IntakeEngine {
    sessions: Arc<dyn SessionStore>,
    orchestrator: Arc<AnalysisOrchestrator>,
    user_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl IntakeEngine {
    pub fn new(sessions: Arc<dyn SessionStore>, orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self {
            sessions,
            orchestrator,
            user_locks: RwLock::new(HashMap::new()),
        }
    }

    /// Process one inbound message and produce the reply.
    ///
    /// Holds the user's lock for the whole read-modify-write, including
    /// the synchronous analysis run on the final step. Messages from
    /// other users are unaffected.
    pub async fn advance(&self, user_id: &str, raw_text: &str) -> OutboundMessage {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let text = raw_text.trim();

        // Rule 1: a start trigger always wins, even mid-flow.
        if START_TRIGGERS.iter().any(|trigger| text.contains(trigger)) {
            info!(user_id = %user_id, "Intake: flow (re)started");
            if let Err(error) = self.sessions.put(user_id, Session::start()).await {
                return self.store_failure(user_id, error);
            }
            return OutboundMessage::text(TYPE_PROMPT);
        }

        // Rule 2: no session means activation is required; none is created.
        let session = match self.sessions.get(user_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return OutboundMessage::text(ACTIVATION_PROMPT),
            Err(error) => return self.store_failure(user_id, error),
        };

        // Rule 4: an unrecognized step value is flow corruption.
        let Some(step) = IntakeStep::from_step(session.step) else {
            warn!(user_id = %user_id, step = session.step, "Intake: unrecognized step, resetting");
            if let Err(error) = self.sessions.delete(user_id).await {
                warn!(user_id = %user_id, error = %error, "Intake: session delete failed");
            }
            return OutboundMessage::text(RESET_NOTICE);
        };

        debug!(user_id = %user_id, step = ?step, "Intake: dispatching");
        self.dispatch(user_id, session, step, text).await
    }

    async fn dispatch(
        &self,
        user_id: &str,
        mut session: Session,
        step: IntakeStep,
        text: &str,
    ) -> OutboundMessage {
        match step {
            // A lingering idle session behaves like no session at all.
            IntakeStep::Idle => OutboundMessage::text(ACTIVATION_PROMPT),

            IntakeStep::AwaitType => match PolicyType::from_label(text) {
                Some(policy_type) => {
                    session.policy_type = Some(policy_type);
                    session.advance_to(IntakeStep::AwaitBudget);
                    let reply = format!(
                        "了解！客戶需求：{}\n請問每月可負擔的保費預算大約是多少？（例如：3000）",
                        policy_type.label()
                    );
                    self.save_then_reply(user_id, session, reply).await
                }
                None => OutboundMessage::text(TYPE_RETRY),
            },

            IntakeStep::AwaitBudget => match parse_int_in_range(text, 1..=u32::MAX) {
                Some(budget) => {
                    session.monthly_budget = Some(budget);
                    session.advance_to(IntakeStep::AwaitAge);
                    self.save_then_reply(user_id, session, AGE_PROMPT).await
                }
                None => OutboundMessage::text(BUDGET_RETRY),
            },

            // Invalid age gets no reply at all. Asymmetric versus the
            // budget step, preserved as-is from the original flow.
            IntakeStep::AwaitAge => match parse_int_in_range(text, 1..=u32::MAX) {
                Some(age) => {
                    session.age = Some(age);
                    session.advance_to(IntakeStep::AwaitGender);
                    self.save_then_reply(user_id, session, GENDER_PROMPT).await
                }
                None => OutboundMessage::Silent,
            },

            IntakeStep::AwaitGender => match Gender::from_label(text) {
                Some(gender) => {
                    session.gender = Some(gender);
                    session.advance_to(IntakeStep::AwaitOccupation);
                    self.save_then_reply(user_id, session, OCCUPATION_PROMPT)
                        .await
                }
                None => OutboundMessage::text(GENDER_RETRY),
            },

            IntakeStep::AwaitOccupation => match parse_int_in_range(text, 1..=4) {
                Some(class) => {
                    session.occupation_class = Some(class as u8);
                    session.advance_to(IntakeStep::AwaitReference);
                    self.save_then_reply(user_id, session, REFERENCE_PROMPT)
                        .await
                }
                None => OutboundMessage::text(OCCUPATION_RETRY),
            },

            // The reference is accepted unvalidated; the orchestrator
            // runs synchronously before the reply.
            IntakeStep::AwaitReference => self.complete(user_id, &session, text).await,
        }
    }

    /// Terminal action: run the analysis and always reset to idle —
    /// the session must never be left stuck on the final step.
    async fn complete(&self, user_id: &str, session: &Session, reference: &str) -> OutboundMessage {
        let reply = match session.finalize(reference) {
            Some(profile) => match self.orchestrator.run_analysis(user_id, &profile).await {
                Ok(AnalysisOutcome::Summary(summary)) => OutboundMessage::text(summary),
                Ok(AnalysisOutcome::ParseFailed) => OutboundMessage::text(PARSE_FAILED_MSG),
                Err(error) => {
                    // Full detail goes to the operational log only.
                    warn!(user_id = %user_id, error = %error, "Intake: analysis faulted");
                    OutboundMessage::text(ANALYSIS_ERROR_MSG)
                }
            },
            None => {
                warn!(user_id = %user_id, "Intake: incomplete profile at final step, resetting");
                OutboundMessage::text(RESET_NOTICE)
            }
        };

        if let Err(error) = self.sessions.delete(user_id).await {
            warn!(user_id = %user_id, error = %error, "Intake: session reset failed");
        }

        reply
    }

    async fn save_then_reply(
        &self,
        user_id: &str,
        session: Session,
        reply: impl Into<String>,
    ) -> OutboundMessage {
        match self.sessions.put(user_id, session).await {
            Ok(()) => OutboundMessage::text(reply),
            Err(error) => self.store_failure(user_id, error),
        }
    }

    fn store_failure(&self, user_id: &str, error: AdvisorError) -> OutboundMessage {
        warn!(user_id = %user_id, error = %error, "Intake: session store failure");
        OutboundMessage::text(STORE_ERROR_MSG)
    }

    /// Per-user lock, created on first contact. Double-checked so the
    /// common path takes only the read lock.
    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.user_locks.read().await;
            if let Some(lock) = locks.get(user_id) {
                return lock.clone();
            }
        }

        let mut locks = self.user_locks.write().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
