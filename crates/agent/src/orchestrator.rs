//! Drives one chat turn end-to-end: session resolution and sliding expiry,
//! history persistence, the model call, function dispatch, and the follow-up
//! model call that produces the final reply.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use leadline_core::config::AgentConfig;
use leadline_core::domain::message::{ChatMessage, MessageRole};
use leadline_core::domain::session::{Session, SessionStatus};
use leadline_core::errors::AppError;
use leadline_db::repositories::{
    ConversationDataRepository, MessageRepository, SessionRepository,
};

use crate::functions::FunctionDispatcher;
use crate::llm::{FunctionResult, LlmClient};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    pub message: String,
    pub session_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStart {
    pub session_id: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionHistory {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub status: SessionStatus,
}

pub struct Orchestrator {
    sessions: Arc<dyn SessionRepository>,
    messages: Arc<dyn MessageRepository>,
    data: Arc<dyn ConversationDataRepository>,
    llm: Arc<dyn LlmClient>,
    dispatcher: Arc<FunctionDispatcher>,
    session_timeout: Duration,
    message_cap: u32,
    company_name: String,
    product_name: String,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        messages: Arc<dyn MessageRepository>,
        data: Arc<dyn ConversationDataRepository>,
        llm: Arc<dyn LlmClient>,
        dispatcher: Arc<FunctionDispatcher>,
        agent: &AgentConfig,
    ) -> Self {
        Self {
            sessions,
            messages,
            data,
            llm,
            dispatcher,
            session_timeout: Duration::minutes(i64::from(agent.session_timeout_minutes)),
            message_cap: agent.max_messages,
            company_name: agent.company_name.clone(),
            product_name: agent.product_name.clone(),
        }
    }

    /// One inbound message. Creates a session when none resolves; otherwise
    /// checks expiry and slides the window before any other side effect.
    pub async fn handle_turn(
        &self,
        session_id: Option<&str>,
        user_text: &str,
    ) -> Result<TurnReply, AppError> {
        if user_text.trim().is_empty() {
            return Err(AppError::validation("Mensagem não pode estar vazia"));
        }

        let now = Utc::now();
        let session_id = self.resolve_session(session_id, now).await?;

        self.messages
            .append(&session_id, &ChatMessage::new(MessageRole::User, user_text, now))
            .await?;

        let history = self.messages.list_recent(&session_id, self.message_cap).await?;
        let snapshot = self.data.snapshot(&session_id).await?;

        let mut outcome = self.llm.chat(&history, &snapshot).await?;

        if !outcome.function_calls.is_empty() {
            // Sequential on purpose: a later call may depend on state written
            // by an earlier one in the same turn.
            let mut function_results = Vec::with_capacity(outcome.function_calls.len());
            for call in &outcome.function_calls {
                let response =
                    self.dispatcher.execute(&call.name, &call.args, &session_id).await;
                function_results.push(FunctionResult { name: call.name.clone(), response });
            }

            outcome =
                self.llm.chat_with_function_result(&history, &function_results, &snapshot).await?;
        }

        self.messages
            .append(
                &session_id,
                &ChatMessage::new(MessageRole::Assistant, outcome.message.clone(), Utc::now()),
            )
            .await?;

        Ok(TurnReply { message: outcome.message, session_id })
    }

    async fn resolve_session(
        &self,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let existing = match session_id {
            Some(id) => self.sessions.find(id).await?,
            None => None,
        };

        match existing {
            Some(session) => {
                if session.status.is_terminal() {
                    return Err(AppError::validation(
                        "Sessão encerrada. Por favor, inicie uma nova conversa.",
                    ));
                }
                if session.is_expired(now) {
                    self.sessions
                        .update_status(&session.session_id, SessionStatus::Expired)
                        .await?;
                    return Err(AppError::validation(
                        "Sessão expirada. Por favor, inicie uma nova conversa.",
                    ));
                }
                self.sessions.extend(&session.session_id, now + self.session_timeout).await?;
                Ok(session.session_id)
            }
            None => {
                let session_id = Uuid::new_v4().to_string();
                self.sessions
                    .create(Session::new(session_id.clone(), now, self.session_timeout))
                    .await?;
                info!(session_id, "nova sessão de conversa criada");
                Ok(session_id)
            }
        }
    }

    /// Explicit start: creates the session and seeds the persona greeting as
    /// the first assistant message.
    pub async fn start_session(&self) -> Result<SessionStart, AppError> {
        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();
        let session = Session::new(session_id.clone(), now, self.session_timeout);
        let expires_at = session.expires_at;
        self.sessions.create(session).await?;

        let greeting = format!(
            "Olá! Eu sou o assistente virtual da {}. \n\n\
             Estou aqui para ajudá-lo a conhecer nosso {} e entender como podemos atender suas \
             necessidades.\n\nPara começar, como posso te chamar?",
            self.company_name, self.product_name
        );
        self.messages
            .append(&session_id, &ChatMessage::new(MessageRole::Assistant, greeting.clone(), now))
            .await?;

        Ok(SessionStart { session_id, message: greeting, expires_at })
    }

    pub async fn history(&self, session_id: &str) -> Result<SessionHistory, AppError> {
        let session = self
            .sessions
            .find(session_id)
            .await?
            .ok_or_else(|| AppError::not_found("Sessão não encontrada"))?;

        let messages = self.messages.list_recent(session_id, self.message_cap).await?;

        Ok(SessionHistory {
            session_id: session.session_id,
            messages,
            status: session.status,
        })
    }

    pub async fn end_session(&self, session_id: &str) -> Result<(), AppError> {
        self.sessions
            .find(session_id)
            .await?
            .ok_or_else(|| AppError::not_found("Sessão não encontrada"))?;

        self.sessions.update_status(session_id, SessionStatus::Completed).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::json;

    use leadline_core::config::AppConfig;
    use leadline_core::domain::fields::ConversationData;
    use leadline_core::domain::lead::Lead;
    use leadline_core::domain::meeting::Meeting;
    use leadline_core::domain::message::{ChatMessage, MessageRole};
    use leadline_core::domain::session::{Session, SessionStatus};
    use leadline_core::domain::slot::TimeSlot;
    use leadline_core::errors::{AppError, ErrorKind};
    use leadline_db::repositories::{
        ConversationDataRepository, InMemoryConversationDataRepository, InMemoryLeadRepository,
        InMemoryMeetingRepository, InMemoryMessageRepository, InMemorySessionRepository,
        SessionRepository,
    };
    use leadline_integrations::{Attendee, Booking, CalendarClient, CrmClient};

    use crate::functions::FunctionDispatcher;
    use crate::llm::{ChatOutcome, FunctionCall, FunctionResult, LlmClient};
    use crate::slots::SlotCache;

    use super::Orchestrator;

    struct ScriptedLlm {
        chat_outcomes: Mutex<Vec<ChatOutcome>>,
        followup_reply: String,
        seen_results: Mutex<Vec<Vec<FunctionResult>>>,
    }

    impl ScriptedLlm {
        fn plain(reply: &str) -> Self {
            Self {
                chat_outcomes: Mutex::new(vec![ChatOutcome::text(reply)]),
                followup_reply: String::new(),
                seen_results: Mutex::new(Vec::new()),
            }
        }

        fn with_function_call(call: FunctionCall, followup_reply: &str) -> Self {
            Self {
                chat_outcomes: Mutex::new(vec![ChatOutcome {
                    message: String::new(),
                    function_calls: vec![call],
                }]),
                followup_reply: followup_reply.to_string(),
                seen_results: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(
            &self,
            _history: &[ChatMessage],
            _data: &ConversationData,
        ) -> Result<ChatOutcome, AppError> {
            let mut outcomes = self.chat_outcomes.lock().expect("lock");
            Ok(outcomes.pop().unwrap_or_else(|| ChatOutcome::text("ok")))
        }

        async fn chat_with_function_result(
            &self,
            _history: &[ChatMessage],
            function_results: &[FunctionResult],
            _data: &ConversationData,
        ) -> Result<ChatOutcome, AppError> {
            self.seen_results.lock().expect("lock").push(function_results.to_vec());
            Ok(ChatOutcome::text(self.followup_reply.clone()))
        }
    }

    struct NoCalendar;

    #[async_trait]
    impl CalendarClient for NoCalendar {
        async fn list_slots(&self, _days_ahead: u32) -> Result<Vec<TimeSlot>, AppError> {
            Ok(Vec::new())
        }

        async fn book(
            &self,
            _slot: &TimeSlot,
            _attendee: &Attendee,
        ) -> Result<Booking, AppError> {
            Err(AppError::integration("Calendar", "unavailable in tests"))
        }

        async fn cancel(&self, _event_id: &str) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    struct NoCrm;

    #[async_trait]
    impl CrmClient for NoCrm {
        async fn find_card_by_email(&self, _email: &str) -> Result<Option<String>, AppError> {
            Ok(None)
        }

        async fn create_card(
            &self,
            _lead: &Lead,
            _meeting: Option<&Meeting>,
        ) -> Result<String, AppError> {
            Ok("card-1".to_string())
        }

        async fn update_card(
            &self,
            _card_id: &str,
            _lead: &Lead,
            _meeting: Option<&Meeting>,
        ) -> Result<(), AppError> {
            Ok(())
        }

        async fn add_comment(&self, _card_id: &str, _text: &str) -> Result<(), AppError> {
            Ok(())
        }

        async fn move_card(&self, _card_id: &str, _phase_id: &str) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct Harness {
        sessions: Arc<InMemorySessionRepository>,
        messages: Arc<InMemoryMessageRepository>,
        data: Arc<InMemoryConversationDataRepository>,
        llm: Arc<ScriptedLlm>,
        orchestrator: Orchestrator,
    }

    fn harness(llm: ScriptedLlm) -> Harness {
        let sessions = Arc::new(InMemorySessionRepository::default());
        let messages = Arc::new(InMemoryMessageRepository::default());
        let data = Arc::new(InMemoryConversationDataRepository::default());
        let llm = Arc::new(llm);

        let dispatcher = Arc::new(FunctionDispatcher::new(
            sessions.clone(),
            data.clone(),
            Arc::new(InMemoryLeadRepository::default()),
            Arc::new(InMemoryMeetingRepository::default()),
            Arc::new(SlotCache::new(100)),
            Arc::new(NoCalendar),
            Arc::new(NoCrm),
        ));

        let orchestrator = Orchestrator::new(
            sessions.clone(),
            messages.clone(),
            data.clone(),
            llm.clone(),
            dispatcher,
            &AppConfig::default().agent,
        );

        Harness { sessions, messages, data, llm, orchestrator }
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_side_effects() {
        let harness = harness(ScriptedLlm::plain("nunca chega aqui"));

        let error = harness.orchestrator.handle_turn(None, "   ").await.expect_err("must fail");

        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(error.user_message(), "Mensagem não pode estar vazia");
    }

    #[tokio::test]
    async fn first_turn_creates_a_session_and_persists_both_messages() {
        let harness = harness(ScriptedLlm::plain("Olá! Qual o seu nome?"));

        let reply = harness.orchestrator.handle_turn(None, "Oi").await.expect("turn");

        assert_eq!(reply.message, "Olá! Qual o seu nome?");
        let session = harness.sessions.get(&reply.session_id).await.expect("session");
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(harness.messages.count(&reply.session_id).await, 2);

        let history = harness.orchestrator.history(&reply.session_id).await.expect("history");
        assert_eq!(history.messages[0].role, MessageRole::User);
        assert_eq!(history.messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn expired_session_rejects_the_turn_and_appends_nothing() {
        let harness = harness(ScriptedLlm::plain("nunca chega aqui"));
        let stale = Session::new(
            "s-velha".to_string(),
            Utc::now() - Duration::minutes(90),
            Duration::minutes(30),
        );
        harness.sessions.create(stale).await.expect("seed");

        let error = harness
            .orchestrator
            .handle_turn(Some("s-velha"), "ainda aí?")
            .await
            .expect_err("must fail");

        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(error.user_message(), "Sessão expirada. Por favor, inicie uma nova conversa.");

        let session = harness.sessions.get("s-velha").await.expect("session");
        assert_eq!(session.status, SessionStatus::Expired, "status flips to expired");
        assert_eq!(harness.messages.count("s-velha").await, 0, "no message is appended");
    }

    #[tokio::test]
    async fn successful_turn_slides_the_expiry_window() {
        let harness = harness(ScriptedLlm::plain("certo"));
        let session =
            Session::new("s-1".to_string(), Utc::now() - Duration::minutes(20), Duration::minutes(30));
        let old_expiry = session.expires_at;
        harness.sessions.create(session).await.expect("seed");

        let before = Utc::now();
        harness.orchestrator.handle_turn(Some("s-1"), "continuando").await.expect("turn");

        let session = harness.sessions.get("s-1").await.expect("session");
        assert!(session.expires_at > old_expiry);
        assert!(session.expires_at >= before + Duration::minutes(30) - Duration::seconds(5));
    }

    #[tokio::test]
    async fn completed_session_accepts_no_further_turns() {
        let harness = harness(ScriptedLlm::plain("nunca chega aqui"));
        harness
            .sessions
            .create(Session::new("s-1".to_string(), Utc::now(), Duration::minutes(30)))
            .await
            .expect("seed");
        harness.sessions.update_status("s-1", SessionStatus::Completed).await.expect("status");

        let error = harness
            .orchestrator
            .handle_turn(Some("s-1"), "mais uma coisa")
            .await
            .expect_err("must fail");

        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(harness.messages.count("s-1").await, 0);
    }

    #[tokio::test]
    async fn unknown_session_id_starts_a_fresh_session() {
        let harness = harness(ScriptedLlm::plain("olá"));

        let reply =
            harness.orchestrator.handle_turn(Some("s-inexistente"), "Oi").await.expect("turn");

        assert_ne!(reply.session_id, "s-inexistente");
        assert!(harness.sessions.get(&reply.session_id).await.is_some());
    }

    #[tokio::test]
    async fn function_call_result_is_threaded_back_for_the_final_reply() {
        let call = FunctionCall {
            name: "coletar_informacao".to_string(),
            args: json!({"campo": "nome", "valor": "Marina"}),
        };
        let harness = harness(ScriptedLlm::with_function_call(call, "Prazer, Marina!"));

        let reply = harness.orchestrator.handle_turn(None, "Me chamo Marina").await.expect("turn");

        assert_eq!(reply.message, "Prazer, Marina!");
        let snapshot = harness.data.snapshot(&reply.session_id).await.expect("snapshot");
        assert_eq!(snapshot.name.as_deref(), Some("Marina"));

        let seen = harness.llm.seen_results.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0].name, "coletar_informacao");
        assert!(seen[0][0].response.success);
    }

    #[tokio::test]
    async fn failed_function_call_still_produces_a_reply() {
        let call = FunctionCall {
            name: "coletar_informacao".to_string(),
            args: json!({"campo": "email", "valor": "not-an-email"}),
        };
        let harness =
            harness(ScriptedLlm::with_function_call(call, "Esse email parece inválido."));

        let reply =
            harness.orchestrator.handle_turn(None, "meu email é not-an-email").await.expect("turn");

        assert_eq!(reply.message, "Esse email parece inválido.");
        let snapshot = harness.data.snapshot(&reply.session_id).await.expect("snapshot");
        assert!(snapshot.collected_fields.is_empty(), "nothing was recorded");

        let seen = harness.llm.seen_results.lock().expect("lock");
        assert!(!seen[0][0].response.success);
        assert_eq!(
            seen[0][0].response.error.as_deref(),
            Some("Email inválido. Por favor, forneça um email válido.")
        );
    }

    #[tokio::test]
    async fn start_session_seeds_the_greeting() {
        let harness = harness(ScriptedLlm::plain("nunca usado"));

        let start = harness.orchestrator.start_session().await.expect("start");

        assert!(start.message.contains("assistente virtual"));
        assert!(start.expires_at > Utc::now());
        assert_eq!(harness.messages.count(&start.session_id).await, 1);

        let history = harness.orchestrator.history(&start.session_id).await.expect("history");
        assert_eq!(history.messages[0].role, MessageRole::Assistant);
        assert_eq!(history.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn history_of_unknown_session_is_not_found() {
        let harness = harness(ScriptedLlm::plain("nunca usado"));

        let error = harness.orchestrator.history("s-fantasma").await.expect_err("must fail");
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.user_message(), "Sessão não encontrada");
    }

    #[tokio::test]
    async fn end_session_marks_it_completed() {
        let harness = harness(ScriptedLlm::plain("nunca usado"));
        let start = harness.orchestrator.start_session().await.expect("start");

        harness.orchestrator.end_session(&start.session_id).await.expect("end");

        let session = harness.sessions.get(&start.session_id).await.expect("session");
        assert_eq!(session.status, SessionStatus::Completed);
    }
}
