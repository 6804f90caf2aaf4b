use std::sync::Arc;
use std::time::Duration;

use crate::errors::AppError;
use crate::models::{
    AppointmentDraft, BookingResult, BusinessProfile, CallAction, CallSession, CallSummary,
    CallerDetails, DraftStage, EntityKind, IntentName, NluResult, Role, SessionState, SpokenReply,
};
use crate::services::clock::Clock;
use crate::services::dialogue::{self, Reply, HANDLER_FAILURE_REPLY, REPEAT_PROMPT};
use crate::services::escalation::{self, EscalationThresholds};
use crate::services::nlu::NluAdapter;
use crate::services::notify::NotificationSink;
use crate::services::scheduling::Scheduler;
use crate::services::sessions::SessionStore;
use crate::services::speech::SpeechService;
use crate::services::summary::build_summary;

pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(5);

/// One caller turn: recognized text, raw audio, or both (text wins).
#[derive(Debug, Clone, Default)]
pub struct Utterance {
    pub text: Option<String>,
    pub audio: Option<Vec<u8>>,
}

impl Utterance {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            audio: None,
        }
    }

    pub fn audio(audio: Vec<u8>) -> Self {
        Self {
            text: None,
            audio: Some(audio),
        }
    }
}

enum BookingStep {
    Continue(Reply),
    Booked(BookingResult, Reply),
}

/// Drives calls from greeting to summary. Sessions live in the [`SessionStore`];
/// every collaborator call is bounded by `timeout`.
pub struct CallEngine {
    sessions: Arc<dyn SessionStore>,
    nlu: Arc<dyn NluAdapter>,
    speech: Arc<dyn SpeechService>,
    scheduler: Arc<Scheduler>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    thresholds: EscalationThresholds,
    timeout: Duration,
}

impl CallEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        nlu: Arc<dyn NluAdapter>,
        speech: Arc<dyn SpeechService>,
        scheduler: Arc<Scheduler>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            nlu,
            speech,
            scheduler,
            notifier,
            clock,
            thresholds: EscalationThresholds::default(),
            timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        }
    }

    pub fn with_thresholds(mut self, thresholds: EscalationThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn session(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.get(call_id).await
    }

    // ── Lifecycle ──

    pub async fn start(
        &self,
        call_id: &str,
        caller_number: Option<String>,
        profile: Arc<BusinessProfile>,
    ) -> Result<SpokenReply, AppError> {
        let now = self.clock.now();
        let mut session = CallSession::new(call_id, caller_number, profile, now);
        let greeting = session.profile.greeting.clone();
        session.push_turn(Role::Assistant, &greeting, now);

        if !self.sessions.put_if_absent(session.clone()).await {
            return Err(AppError::InvalidRequest(format!(
                "call {call_id} has already started"
            )));
        }
        tracing::info!(
            call_id,
            business_id = %session.business_id,
            state = session.state.as_str(),
            "call started"
        );

        let audio = self.synthesize(call_id, &greeting).await;

        session.state = SessionState::Listening;
        if !self
            .sessions
            .compare_and_put(SessionState::Greeting, session)
            .await
        {
            return Err(AppError::CallEnded(call_id.to_string()));
        }

        Ok(SpokenReply {
            text: greeting,
            audio,
            action: None,
        })
    }

    pub async fn handle_utterance(
        &self,
        call_id: &str,
        utterance: Utterance,
    ) -> Result<SpokenReply, AppError> {
        let mut session = self
            .sessions
            .get(call_id)
            .await
            .ok_or_else(|| AppError::SessionNotFound(call_id.to_string()))?;

        if session.state != SessionState::Listening {
            return Err(AppError::InvalidState {
                call_id: call_id.to_string(),
                state: session.state.as_str().to_string(),
            });
        }

        session.state = SessionState::Responding;
        if !self
            .sessions
            .compare_and_put(SessionState::Listening, session.clone())
            .await
        {
            // Lost a race with another turn or with end().
            return Err(AppError::InvalidState {
                call_id: call_id.to_string(),
                state: SessionState::Responding.as_str().to_string(),
            });
        }

        let Some(text) = self.transcribe(call_id, &utterance).await else {
            let audio = self.synthesize(call_id, REPEAT_PROMPT).await;
            session.state = SessionState::Listening;
            if !self
                .sessions
                .compare_and_put(SessionState::Responding, session)
                .await
            {
                return Err(AppError::CallEnded(call_id.to_string()));
            }
            return Ok(SpokenReply {
                text: REPEAT_PROMPT.to_string(),
                audio,
                action: None,
            });
        };

        session.push_turn(Role::Caller, &text, self.clock.now());

        let nlu = self.classify(call_id, &text).await;
        let verdict = escalation::evaluate(
            &session.transcript,
            &session.profile,
            &nlu,
            &self.thresholds,
        );

        tracing::info!(
            call_id,
            intent = nlu.intent.name.as_str(),
            confidence = nlu.intent.confidence,
            reason = verdict.reason.as_str(),
            "turn classified"
        );

        let transfer_number = session.profile.transfer.transfer_number.clone();
        let reply = match (verdict.should_transfer, transfer_number) {
            (true, Some(number)) => {
                tracing::info!(call_id, reason = verdict.reason.as_str(), detail = %verdict.detail, "transferring call");
                session.transferred = true;
                session.pending_appointment = None;
                dialogue::transfer(&session.profile, &number)
            }
            (true, None) => {
                tracing::warn!(
                    call_id,
                    reason = verdict.reason.as_str(),
                    "transfer warranted but no transfer number configured"
                );
                self.dispatch(&mut session, &nlu).await
            }
            (false, _) => self.dispatch(&mut session, &nlu).await,
        };

        session.push_turn(Role::Assistant, &reply.text, self.clock.now());
        session.state = match reply.action {
            Some(CallAction::Transfer { .. }) => SessionState::Transferring,
            Some(CallAction::EndCall) => SessionState::Ending,
            None => SessionState::Listening,
        };
        let next_state = session.state;

        let audio = self.synthesize(call_id, &reply.text).await;

        if !self
            .sessions
            .compare_and_put(SessionState::Responding, session)
            .await
        {
            tracing::info!(call_id, "call ended mid-turn, reply discarded");
            return Err(AppError::CallEnded(call_id.to_string()));
        }

        tracing::debug!(call_id, state = next_state.as_str(), "turn complete");
        Ok(SpokenReply {
            text: reply.text,
            audio,
            action: reply.action,
        })
    }

    /// Closes the call from any live state. A turn still in flight is discarded.
    pub async fn end(
        &self,
        call_id: &str,
        duration_seconds: u64,
        recording_ref: Option<String>,
    ) -> Result<CallSummary, AppError> {
        let mut session = self
            .sessions
            .delete(call_id)
            .await
            .ok_or_else(|| AppError::SessionNotFound(call_id.to_string()))?;

        let previous = session.state;
        session.state = SessionState::Ended;
        session.pending_appointment = None;

        let summary = build_summary(&session, duration_seconds, recording_ref, self.clock.now());
        tracing::info!(
            call_id,
            business_id = %summary.business_id,
            from_state = previous.as_str(),
            duration_seconds,
            action_required = summary.action_required,
            "call ended"
        );

        let notifier = self.notifier.clone();
        let timeout = self.timeout;
        let outgoing = summary.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, notifier.notify(&outgoing)).await {
                Ok(Ok(())) => {
                    tracing::debug!(call_id = %outgoing.call_id, "call summary delivered");
                }
                Ok(Err(e)) => {
                    tracing::warn!(call_id = %outgoing.call_id, error = %e, "failed to deliver call summary");
                }
                Err(_) => {
                    tracing::warn!(call_id = %outgoing.call_id, "call summary delivery timed out");
                }
            }
        });

        Ok(summary)
    }

    // ── Collaborators ──

    /// Caller text, or `None` when there is nothing usable to respond to.
    async fn transcribe(&self, call_id: &str, utterance: &Utterance) -> Option<String> {
        if let Some(text) = utterance.text.as_deref().map(str::trim) {
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }

        let audio = utterance.audio.as_deref().filter(|a| !a.is_empty())?;
        match tokio::time::timeout(self.timeout, self.speech.speech_to_text(audio)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(Ok(_)) => {
                tracing::info!(call_id, "speech-to-text returned nothing");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(call_id, error = %e, "speech-to-text failed");
                None
            }
            Err(_) => {
                tracing::warn!(call_id, "speech-to-text timed out");
                None
            }
        }
    }

    async fn classify(&self, call_id: &str, text: &str) -> NluResult {
        match tokio::time::timeout(self.timeout, self.nlu.classify(text)).await {
            Ok(Ok(result)) => NluResult {
                text: text.to_string(),
                ..result
            },
            Ok(Err(e)) => {
                tracing::warn!(call_id, error = %e, "NLU failed, using fallback intent");
                NluResult::fallback(text)
            }
            Err(_) => {
                tracing::warn!(call_id, "NLU timed out, using fallback intent");
                NluResult::fallback(text)
            }
        }
    }

    async fn synthesize(&self, call_id: &str, text: &str) -> Option<Vec<u8>> {
        match tokio::time::timeout(self.timeout, self.speech.text_to_speech(text)).await {
            Ok(Ok(audio)) if !audio.is_empty() => Some(audio),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!(call_id, error = %e, "text-to-speech failed, replying with text only");
                None
            }
            Err(_) => {
                tracing::warn!(call_id, "text-to-speech timed out, replying with text only");
                None
            }
        }
    }

    // ── Dispatch ──

    async fn dispatch(&self, session: &mut CallSession, nlu: &NluResult) -> Reply {
        match self.route(session, nlu).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    call_id = %session.call_id,
                    intent = nlu.intent.name.as_str(),
                    error = %e,
                    "handler failed"
                );
                Reply::say(HANDLER_FAILURE_REPLY)
            }
        }
    }

    async fn route(&self, session: &mut CallSession, nlu: &NluResult) -> Result<Reply, AppError> {
        if continues_booking(session, nlu) {
            return self.booking_turn(session, nlu).await;
        }

        let profile = session.profile.clone();
        let reply = match nlu.intent.name {
            IntentName::AppointmentScheduling => return self.booking_turn(session, nlu).await,
            IntentName::Greeting => dialogue::greeting(),
            IntentName::BusinessHours => dialogue::business_hours(&profile),
            IntentName::ServiceInquiry => dialogue::service_inquiry(&profile),
            IntentName::Pricing => dialogue::pricing(),
            IntentName::Complaint => dialogue::complaint(),
            IntentName::UrgentRequest => dialogue::urgent_request(),
            IntentName::GeneralQuestion => dialogue::general_question(&profile, &nlu.text),
            IntentName::ContactRequest => dialogue::contact_request(),
            IntentName::Goodbye => {
                if session.pending_appointment.take().is_some() {
                    tracing::debug!(call_id = %session.call_id, "appointment draft discarded");
                }
                dialogue::goodbye()
            }
            IntentName::Fallback => dialogue::fallback(),
        };
        Ok(reply)
    }

    // ── Booking ──

    async fn booking_turn(
        &self,
        session: &mut CallSession,
        nlu: &NluResult,
    ) -> Result<Reply, AppError> {
        let profile = session.profile.clone();
        if !profile.appointment.enabled {
            session.pending_appointment = None;
            return Ok(dialogue::booking_unavailable());
        }

        let fresh = session.pending_appointment.is_none();
        let mut draft = session
            .pending_appointment
            .take()
            .unwrap_or_else(|| AppointmentDraft::new(profile.appointment.duration_minutes));

        if !fresh && dialogue::is_abandon(&nlu.text) {
            tracing::info!(call_id = %session.call_id, "caller abandoned booking");
            return Ok(dialogue::booking_abandoned());
        }

        let caller_number = session.caller_number.clone();
        match self
            .advance_booking(&profile, &mut draft, nlu, caller_number, fresh)
            .await
        {
            Ok(BookingStep::Continue(reply)) => {
                session.pending_appointment = Some(draft);
                Ok(reply)
            }
            Ok(BookingStep::Booked(booking, reply)) => {
                session.booking = Some(booking);
                Ok(reply)
            }
            Err(e) => {
                session.pending_appointment = Some(draft);
                Err(e)
            }
        }
    }

    async fn advance_booking(
        &self,
        profile: &BusinessProfile,
        draft: &mut AppointmentDraft,
        nlu: &NluResult,
        caller_number: Option<String>,
        fresh: bool,
    ) -> Result<BookingStep, AppError> {
        let date = nlu.first(EntityKind::Date).map(|e| e.text.clone());
        let time = nlu.first(EntityKind::Time).map(|e| e.text.clone());
        let new_search = date.is_some() || time.is_some();
        if date.is_some() {
            draft.date = date;
        }
        if time.is_some() {
            draft.time = time;
        }

        if let Some(email) = nlu.first(EntityKind::Email) {
            draft.customer_email = Some(email.text.clone());
        }
        if let Some(phone) = nlu.first(EntityKind::PhoneNumber) {
            draft.customer_phone = Some(phone.text.clone());
        } else if draft.customer_phone.is_none() {
            draft.customer_phone = caller_number;
        }
        if let Some(person) = nlu.first(EntityKind::Person) {
            draft.customer_name = Some(person.text.clone());
        }
        if draft.service_hint.is_none() {
            let lower = nlu.text.to_lowercase();
            draft.service_hint = profile
                .services
                .iter()
                .find(|s| lower.contains(&s.to_lowercase()))
                .cloned();
        }

        let mut just_chose = false;
        if draft.stage() == DraftStage::ChoosingSlot {
            match dialogue::pick_offered_slot(&nlu.text, &draft.offered) {
                Some(slot) => {
                    draft.chosen = Some(slot);
                    just_chose = true;
                }
                None if !new_search => {
                    return Ok(BookingStep::Continue(dialogue::repeat_offer(&draft.offered)));
                }
                None => {}
            }
        }

        if draft.stage() == DraftStage::NeedName && !just_chose && looks_like_name_answer(&nlu.text) {
            draft.customer_name = dialogue::name_from_reply(&nlu.text);
        }

        match draft.stage() {
            DraftStage::NeedDate | DraftStage::ChoosingSlot => {
                if fresh && !new_search {
                    return Ok(BookingStep::Continue(dialogue::ask_for_day()));
                }

                let slots = self
                    .scheduler
                    .suggest_slots(profile, draft.date.as_deref(), draft.time.as_deref())
                    .await?;
                if slots.is_empty() {
                    let when = draft.date.take().or_else(|| draft.time.take());
                    draft.time = None;
                    draft.offered.clear();
                    return Ok(BookingStep::Continue(dialogue::no_slots(when.as_deref())));
                }

                draft.offered = slots;
                Ok(BookingStep::Continue(dialogue::offer_slots(&draft.offered)))
            }
            DraftStage::NeedName if !just_chose => {
                Ok(BookingStep::Continue(dialogue::ask_for_name_again()))
            }
            DraftStage::NeedName => {
                let slot = draft.chosen.clone().ok_or_else(|| {
                    AppError::InvalidRequest("no appointment time chosen".to_string())
                })?;
                Ok(BookingStep::Continue(dialogue::ask_for_name(&slot)))
            }
            DraftStage::Ready => {
                let (Some(slot), Some(name)) = (draft.chosen.clone(), draft.customer_name.clone())
                else {
                    return Err(AppError::InvalidRequest(
                        "appointment draft is incomplete".to_string(),
                    ));
                };

                let caller = CallerDetails {
                    name: name.clone(),
                    email: draft.customer_email.clone(),
                    phone: draft.customer_phone.clone(),
                    reason: draft.service_hint.clone(),
                };
                let booking = match self
                    .scheduler
                    .schedule_appointment(profile, &slot, &caller)
                    .await
                {
                    Ok(booking) => booking,
                    Err(AppError::SlotUnavailable(reason)) => {
                        tracing::info!(reason = %reason, "chosen slot no longer free, offering others");
                        draft.chosen = None;
                        draft.offered = self
                            .scheduler
                            .suggest_slots(profile, draft.date.as_deref(), draft.time.as_deref())
                            .await?;
                        return Ok(BookingStep::Continue(dialogue::slot_taken(&draft.offered)));
                    }
                    Err(e) => return Err(e),
                };
                draft.confirmed = true;
                Ok(BookingStep::Booked(booking, dialogue::booked(&name, &slot)))
            }
        }
    }
}

/// Whether this turn belongs to an open booking rather than a fresh topic. A turn that
/// answers the pending question (a slot pick or a name) stays in the booking whatever
/// else it was classified as, so "Dana Scully, thanks" is a name and not a goodbye.
fn continues_booking(session: &CallSession, nlu: &NluResult) -> bool {
    let Some(draft) = &session.pending_appointment else {
        return false;
    };

    let answers_prompt = nlu.first(EntityKind::Person).is_some()
        || match draft.stage() {
            DraftStage::ChoosingSlot => {
                dialogue::pick_offered_slot(&nlu.text, &draft.offered).is_some()
            }
            DraftStage::NeedName => {
                looks_like_name_answer(&nlu.text) && dialogue::name_from_reply(&nlu.text).is_some()
            }
            DraftStage::NeedDate | DraftStage::Ready => false,
        };

    match nlu.intent.name {
        IntentName::AppointmentScheduling
        | IntentName::Greeting
        | IntentName::GeneralQuestion
        | IntentName::Fallback => true,
        IntentName::Goodbye
        | IntentName::Complaint
        | IntentName::UrgentRequest
        | IntentName::ContactRequest
        | IntentName::BusinessHours
        | IntentName::ServiceInquiry
        | IntentName::Pricing => answers_prompt,
    }
}

/// Short statements only; "what times do you have?" is not a name.
fn looks_like_name_answer(text: &str) -> bool {
    !text.contains('?') && text.split_whitespace().count() <= 5
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{NaiveDateTime, NaiveTime, Weekday};
    use tokio::sync::{mpsc, Notify};

    use super::*;
    use crate::models::profile::{AppointmentSettings, TransferSettings};
    use crate::models::{BusinessHours, DaySchedule};
    use crate::services::calendar::memory::InMemoryCalendar;
    use crate::services::clock::FixedClock;
    use crate::services::nlu::keyword::KeywordNlu;
    use crate::services::sessions::InMemorySessionStore;
    use crate::services::speech::TextOnlySpeech;

    fn now() -> NaiveDateTime {
        // Sunday; the next day is Monday 2025-06-16.
        NaiveDateTime::parse_from_str("2025-06-15 08:00", "%Y-%m-%d %H:%M").unwrap()
    }

    fn profile() -> BusinessProfile {
        let mut profile = BusinessProfile::minimal("biz-1");
        profile.name = "Bright Smiles".to_string();
        profile.greeting = "Thanks for calling Bright Smiles!".to_string();
        profile.business_hours = BusinessHours::default().with(
            Weekday::Mon,
            DaySchedule::Open {
                open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                close: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            },
        );
        profile.appointment = AppointmentSettings {
            enabled: true,
            calendar_ref: "cal-1".to_string(),
            duration_minutes: 60,
        };
        profile.transfer = TransferSettings {
            keywords: vec!["urgent".to_string()],
            transfer_number: Some("+15550001111".to_string()),
        };
        profile
    }

    struct ChannelNotifier(mpsc::UnboundedSender<CallSummary>);

    #[async_trait]
    impl NotificationSink for ChannelNotifier {
        async fn notify(&self, summary: &CallSummary) -> anyhow::Result<()> {
            self.0.send(summary.clone())?;
            Ok(())
        }
    }

    struct Harness {
        engine: Arc<CallEngine>,
        calendar: Arc<InMemoryCalendar>,
        summaries: mpsc::UnboundedReceiver<CallSummary>,
    }

    fn harness_with_nlu(nlu: Arc<dyn NluAdapter>) -> Harness {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now()));
        let calendar = Arc::new(InMemoryCalendar::new());
        let scheduler = Arc::new(Scheduler::new(
            calendar.clone(),
            clock.clone(),
            Duration::from_secs(1),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = CallEngine::new(
            Arc::new(InMemorySessionStore::new()),
            nlu,
            Arc::new(TextOnlySpeech),
            scheduler,
            Arc::new(ChannelNotifier(tx)),
            clock,
        )
        .with_timeout(Duration::from_millis(200));

        Harness {
            engine: Arc::new(engine),
            calendar,
            summaries: rx,
        }
    }

    fn harness() -> Harness {
        harness_with_nlu(Arc::new(KeywordNlu::new()))
    }

    async fn say(h: &Harness, text: &str) -> SpokenReply {
        h.engine
            .handle_utterance("call-1", Utterance::text(text))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_greets_and_listens() {
        let h = harness();
        let reply = h
            .engine
            .start("call-1", Some("+15551230000".to_string()), Arc::new(profile()))
            .await
            .unwrap();

        assert_eq!(reply.text, "Thanks for calling Bright Smiles!");
        assert!(reply.audio.is_none());
        let session = h.engine.session("call-1").await.unwrap();
        assert_eq!(session.state, SessionState::Listening);
        assert_eq!(session.transcript.len(), 1);
        assert_eq!(session.transcript[0].role, Role::Assistant);

        let again = h.engine.start("call-1", None, Arc::new(profile())).await;
        assert!(matches!(again, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_unusable_audio_reprompts_without_a_turn() {
        let h = harness();
        h.engine.start("call-1", None, Arc::new(profile())).await.unwrap();

        for utterance in [Utterance::audio(vec![]), Utterance::audio(vec![1, 2, 3])] {
            let reply = h.engine.handle_utterance("call-1", utterance).await.unwrap();
            assert_eq!(reply.text, REPEAT_PROMPT);
            assert!(reply.action.is_none());
        }

        let session = h.engine.session("call-1").await.unwrap();
        assert_eq!(session.state, SessionState::Listening);
        assert_eq!(session.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_keyword_transfers_call() {
        let h = harness();
        h.engine.start("call-1", None, Arc::new(profile())).await.unwrap();

        let reply = say(&h, "This is an urgent emergency, call me back immediately").await;
        assert_eq!(
            reply.action,
            Some(CallAction::Transfer {
                number: "+15550001111".to_string()
            })
        );
        assert!(reply.text.contains("Bright Smiles"));

        let session = h.engine.session("call-1").await.unwrap();
        assert_eq!(session.state, SessionState::Transferring);
        assert!(session.transferred);

        let next = h
            .engine
            .handle_utterance("call-1", Utterance::text("hello?"))
            .await;
        assert!(matches!(next, Err(AppError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_transfer_without_number_answers_normally() {
        let h = harness();
        let mut p = profile();
        p.transfer.transfer_number = None;
        h.engine.start("call-1", None, Arc::new(p)).await.unwrap();

        let reply = say(&h, "This is urgent").await;
        assert!(reply.action.is_none());
        assert!(reply.text.starts_with("I understand this is urgent"));
        assert_eq!(
            h.engine.session("call-1").await.unwrap().state,
            SessionState::Listening
        );
    }

    #[tokio::test]
    async fn test_goodbye_moves_to_ending() {
        let h = harness();
        h.engine.start("call-1", None, Arc::new(profile())).await.unwrap();

        let reply = say(&h, "That's all, thanks. Bye!").await;
        assert_eq!(reply.action, Some(CallAction::EndCall));
        assert_eq!(
            h.engine.session("call-1").await.unwrap().state,
            SessionState::Ending
        );
    }

    #[tokio::test]
    async fn test_business_hours_reply() {
        let h = harness();
        h.engine.start("call-1", None, Arc::new(profile())).await.unwrap();

        let reply = say(&h, "What are your hours").await;
        assert_eq!(
            reply.text,
            "Our business hours are: Monday: 9:00 AM - 5:00 PM."
        );
    }

    struct FailingNlu;

    #[async_trait]
    impl NluAdapter for FailingNlu {
        async fn classify(&self, _text: &str) -> anyhow::Result<NluResult> {
            anyhow::bail!("model server unavailable")
        }
    }

    struct SlowNlu;

    #[async_trait]
    impl NluAdapter for SlowNlu {
        async fn classify(&self, text: &str) -> anyhow::Result<NluResult> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(KeywordNlu::new().analyze(text))
        }
    }

    #[tokio::test]
    async fn test_nlu_failure_and_timeout_fall_back() {
        for nlu in [Arc::new(FailingNlu) as Arc<dyn NluAdapter>, Arc::new(SlowNlu)] {
            let h = harness_with_nlu(nlu);
            h.engine.start("call-1", None, Arc::new(profile())).await.unwrap();

            let reply = say(&h, "What are your hours").await;
            assert_eq!(reply.text, dialogue::FALLBACK_REPLY);

            let session = h.engine.session("call-1").await.unwrap();
            assert_eq!(session.state, SessionState::Listening);
            assert_eq!(session.transcript.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_two_fallbacks_escalate() {
        let h = harness_with_nlu(Arc::new(FailingNlu));
        h.engine.start("call-1", None, Arc::new(profile())).await.unwrap();

        say(&h, "mumble").await;
        say(&h, "mumble mumble").await;
        let third = say(&h, "mumble again").await;
        assert!(matches!(third.action, Some(CallAction::Transfer { .. })));
    }

    #[tokio::test]
    async fn test_books_appointment_over_three_turns() {
        let mut h = harness();
        h.engine
            .start("call-1", Some("+15551230000".to_string()), Arc::new(profile()))
            .await
            .unwrap();

        let offer = say(&h, "I'd like to book an appointment on Monday").await;
        assert_eq!(
            offer.text,
            "I have the following times available: Monday, June 16 at 9:00 AM, Monday, June 16 at 10:00 AM, \
             Monday, June 16 at 11:00 AM, Monday, June 16 at 12:00 PM, or Monday, June 16 at 1:00 PM. \
             Which one works best for you?"
        );

        let ask = say(&h, "The first one, please").await;
        assert_eq!(
            ask.text,
            "Great, Monday, June 16 at 9:00 AM it is. May I have your name for the appointment?"
        );

        let done = say(&h, "My name is Dana Scully").await;
        assert!(done.text.starts_with("You're all set, Dana Scully."));

        let events = h.calendar.events("cal-1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "Appointment with Dana Scully");
        assert!(events[0].description.contains("Phone: +15551230000"));

        let session = h.engine.session("call-1").await.unwrap();
        assert!(session.pending_appointment.is_none());
        assert!(session.booking.is_some());

        let summary = h.engine.end("call-1", 120, None).await.unwrap();
        assert!(summary.summary.starts_with("Customer called to schedule an appointment."));
        let delivered = h.summaries.recv().await.unwrap();
        assert_eq!(delivered.call_id, "call-1");
    }

    #[tokio::test]
    async fn test_concurrent_starts_for_one_call() {
        let h = harness();
        let mut tasks = Vec::new();
        for _ in 0..3 {
            let engine = h.engine.clone();
            tasks.push(tokio::spawn(async move {
                engine.start("call-1", None, Arc::new(profile())).await
            }));
        }

        let mut started = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => started += 1,
                Err(e) => assert!(matches!(e, AppError::InvalidRequest(_)), "{e}"),
            }
        }
        assert_eq!(started, 1);
        let session = h.engine.session("call-1").await.unwrap();
        assert_eq!(session.state, SessionState::Listening);
        assert_eq!(session.transcript.len(), 1);
    }

    async fn offer_and_pick_first(h: &Harness) {
        h.engine.start("call-1", None, Arc::new(profile())).await.unwrap();
        say(h, "I'd like to book an appointment on Monday").await;
        let ask = say(h, "The first one, please").await;
        assert!(ask.text.starts_with("Great, Monday, June 16 at 9:00 AM it is."));
    }

    #[tokio::test]
    async fn test_affirmative_is_not_taken_as_name() {
        let h = harness();
        offer_and_pick_first(&h).await;

        let again = say(&h, "Yes please").await;
        assert_eq!(again.text, dialogue::ask_for_name_again().text);
        assert!(h.calendar.events("cal-1").is_empty());
        let draft = h.engine.session("call-1").await.unwrap().pending_appointment.unwrap();
        assert_eq!(draft.stage(), DraftStage::NeedName);

        let done = say(&h, "Dana Scully").await;
        assert!(done.text.starts_with("You're all set, Dana Scully."));
        assert_eq!(h.calendar.events("cal-1")[0].summary, "Appointment with Dana Scully");
    }

    #[tokio::test]
    async fn test_name_with_thanks_still_books() {
        let h = harness();
        offer_and_pick_first(&h).await;

        let done = say(&h, "Dana Scully, thanks").await;
        assert!(done.text.starts_with("You're all set, Dana Scully."), "{}", done.text);
        assert!(done.action.is_none());

        let events = h.calendar.events("cal-1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "Appointment with Dana Scully");
    }

    #[tokio::test]
    async fn test_plain_goodbye_at_name_prompt_ends_call() {
        let h = harness();
        offer_and_pick_first(&h).await;

        let bye = say(&h, "thanks, bye").await;
        assert_eq!(bye.action, Some(CallAction::EndCall));
        assert!(h.calendar.events("cal-1").is_empty());
    }

    #[tokio::test]
    async fn test_slot_taken_before_booking_is_reoffered() {
        use crate::models::CalendarEvent;
        use crate::services::calendar::CalendarProvider;

        let h = harness();
        offer_and_pick_first(&h).await;

        // Someone else takes 9:00 while the caller is giving their name.
        let start = NaiveDateTime::parse_from_str("2025-06-16 09:00", "%Y-%m-%d %H:%M").unwrap();
        let other = CalendarEvent {
            id: None,
            summary: "Walk-in".to_string(),
            description: String::new(),
            start,
            end: start + chrono::Duration::hours(1),
            attendees: vec![],
        };
        h.calendar.create_event("cal-1", &other).await.unwrap();

        let taken = say(&h, "My name is Dana Scully").await;
        assert!(
            taken.text.starts_with("I'm sorry, that time was just taken. I can still offer Monday, June 16 at 10:00 AM"),
            "{}",
            taken.text
        );
        let draft = h.engine.session("call-1").await.unwrap().pending_appointment.unwrap();
        assert_eq!(draft.stage(), DraftStage::ChoosingSlot);
        assert_eq!(draft.customer_name.as_deref(), Some("Dana Scully"));

        let done = say(&h, "the first one").await;
        assert!(done.text.starts_with("You're all set, Dana Scully. Your appointment is booked for Monday, June 16 at 10:00 AM."));
        assert_eq!(h.calendar.events("cal-1").len(), 2);
    }

    #[tokio::test]
    async fn test_booking_can_be_abandoned() {
        let h = harness();
        h.engine.start("call-1", None, Arc::new(profile())).await.unwrap();

        say(&h, "Can I book an appointment").await;
        assert!(h.engine.session("call-1").await.unwrap().pending_appointment.is_some());

        let reply = say(&h, "never mind").await;
        assert!(reply.text.starts_with("No problem"));
        assert!(h.engine.session("call-1").await.unwrap().pending_appointment.is_none());
    }

    #[tokio::test]
    async fn test_booking_disabled_business() {
        let h = harness();
        let mut p = profile();
        p.appointment = AppointmentSettings::default();
        h.engine.start("call-1", None, Arc::new(p)).await.unwrap();

        let reply = say(&h, "I want to book for Monday").await;
        assert_eq!(reply.text, dialogue::booking_unavailable().text);
    }

    struct GatedNlu {
        entered: Arc<Notify>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl NluAdapter for GatedNlu {
        async fn classify(&self, text: &str) -> anyhow::Result<NluResult> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(KeywordNlu::new().analyze(text))
        }
    }

    #[tokio::test]
    async fn test_end_discards_in_flight_turn() {
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let mut h = harness_with_nlu(Arc::new(GatedNlu {
            entered: entered.clone(),
            gate: gate.clone(),
        }));
        h.engine.start("call-1", None, Arc::new(profile())).await.unwrap();

        let engine = h.engine.clone();
        let turn = tokio::spawn(async move {
            engine
                .handle_utterance("call-1", Utterance::text("What are your hours"))
                .await
        });

        entered.notified().await;
        let busy = h
            .engine
            .handle_utterance("call-1", Utterance::text("hello"))
            .await;
        assert!(matches!(busy, Err(AppError::InvalidState { .. })));

        let summary = h.engine.end("call-1", 30, Some("rec-9".to_string())).await.unwrap();
        assert_eq!(summary.transcript, "AI: Thanks for calling Bright Smiles!");
        gate.notify_one();

        let result = turn.await.unwrap();
        assert!(matches!(result, Err(AppError::CallEnded(_))));
        assert!(h.engine.session("call-1").await.is_none());
        assert_eq!(h.summaries.recv().await.unwrap().recording_ref.as_deref(), Some("rec-9"));
    }

    #[tokio::test]
    async fn test_end_unknown_call() {
        let h = harness();
        let result = h.engine.end("nope", 0, None).await;
        assert!(matches!(result, Err(AppError::SessionNotFound(_))));
    }

    struct FailingNotifier;

    #[async_trait]
    impl NotificationSink for FailingNotifier {
        async fn notify(&self, _summary: &CallSummary) -> anyhow::Result<()> {
            anyhow::bail!("smtp down")
        }
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_end() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now()));
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(InMemoryCalendar::new()),
            clock.clone(),
            Duration::from_secs(1),
        ));
        let engine = CallEngine::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(KeywordNlu::new()),
            Arc::new(TextOnlySpeech),
            scheduler,
            Arc::new(FailingNotifier),
            clock,
        );

        engine.start("call-1", None, Arc::new(profile())).await.unwrap();
        let summary = engine.end("call-1", 10, None).await;
        assert!(summary.is_ok());
    }
}
