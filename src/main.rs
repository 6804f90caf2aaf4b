use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use frontdesk::config::{AppConfig, CalendarBackend, NluBackend};
use frontdesk::db::{self, Db};
use frontdesk::handlers;
use frontdesk::services::calendar::http::HttpCalendar;
use frontdesk::services::calendar::sqlite::LocalCalendar;
use frontdesk::services::calendar::CalendarProvider;
use frontdesk::services::clock::{Clock, SystemClock};
use frontdesk::services::conversation::CallEngine;
use frontdesk::services::nlu::keyword::KeywordNlu;
use frontdesk::services::nlu::llm::{ChatBackend, ChatClient, LlmNlu};
use frontdesk::services::nlu::NluAdapter;
use frontdesk::services::notify::archive::SqliteArchive;
use frontdesk::services::notify::twilio::TwilioSmsNotifier;
use frontdesk::services::notify::{FanoutNotifier, LogNotifier, NotificationSink};
use frontdesk::services::profiles::SqliteProfileStore;
use frontdesk::services::scheduling::Scheduler;
use frontdesk::services::sessions::InMemorySessionStore;
use frontdesk::services::speech::{HttpSpeechService, SpeechService, TextOnlySpeech};
use frontdesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let db: Db = Arc::new(Mutex::new(db::init_db(&config.database_url)?));

    let nlu: Arc<dyn NluAdapter> = match config.nlu_provider {
        NluBackend::Llm => {
            let backend = match config.llm_provider.as_str() {
                "groq" => {
                    anyhow::ensure!(
                        !config.groq_api_key.is_empty(),
                        "GROQ_API_KEY must be set when LLM_PROVIDER=groq"
                    );
                    tracing::info!("using Groq NLU (model: {})", config.groq_model);
                    ChatBackend::Groq {
                        api_key: config.groq_api_key.clone(),
                        model: config.groq_model.clone(),
                    }
                }
                _ => {
                    tracing::info!(
                        "using Ollama NLU (url: {}, model: {})",
                        config.ollama_url,
                        config.ollama_model
                    );
                    ChatBackend::Ollama {
                        url: config.ollama_url.clone(),
                        model: config.ollama_model.clone(),
                    }
                }
            };
            Arc::new(LlmNlu::new(Box::new(ChatClient::new(backend))))
        }
        NluBackend::Keyword => {
            tracing::info!("using keyword NLU");
            Arc::new(KeywordNlu::new())
        }
    };

    let calendar: Arc<dyn CalendarProvider> = match config.calendar_backend {
        CalendarBackend::Http => {
            tracing::info!("using calendar service at {}", config.calendar_service_url);
            Arc::new(HttpCalendar::new(config.calendar_service_url.clone()))
        }
        CalendarBackend::Local => Arc::new(LocalCalendar::new(db.clone())),
    };

    let speech: Arc<dyn SpeechService> = if config.speech_url.is_empty() {
        tracing::info!("no SPEECH_URL set, calls are text-only");
        Arc::new(TextOnlySpeech)
    } else {
        Arc::new(HttpSpeechService::new(config.speech_url.clone()))
    };

    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![
        Arc::new(LogNotifier),
        Arc::new(SqliteArchive::new(db.clone())),
    ];
    if config.sms_enabled() {
        sinks.push(Arc::new(TwilioSmsNotifier::new(
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
            config.twilio_phone_number.clone(),
        )));
    } else {
        tracing::warn!("Twilio credentials not set, SMS call summaries disabled");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = Arc::new(Scheduler::new(
        calendar,
        clock.clone(),
        config.collaborator_timeout,
    ));
    let engine = CallEngine::new(
        Arc::new(InMemorySessionStore::new()),
        nlu,
        speech,
        scheduler.clone(),
        Arc::new(FanoutNotifier::new(sinks)),
        clock,
    )
    .with_thresholds(config.escalation.clone())
    .with_timeout(config.collaborator_timeout);

    let state = Arc::new(AppState {
        db: db.clone(),
        config: config.clone(),
        engine,
        scheduler,
        profiles: Box::new(SqliteProfileStore::new(db)),
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
