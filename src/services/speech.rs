use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn speech_to_text(&self, audio: &[u8]) -> anyhow::Result<String>;

    /// Empty output means "no audio"; the reply is sent as text only.
    async fn text_to_speech(&self, text: &str) -> anyhow::Result<Vec<u8>>;
}

/// Speech service reached over HTTP: `POST /stt` with raw audio, `POST /tts` with JSON text.
pub struct HttpSpeechService {
    url: String,
    client: reqwest::Client,
}

impl HttpSpeechService {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl SpeechService for HttpSpeechService {
    async fn speech_to_text(&self, audio: &[u8]) -> anyhow::Result<String> {
        let resp: TranscriptResponse = self
            .client
            .post(format!("{}/stt", self.url))
            .header("Content-Type", "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .context("failed to call speech-to-text service")?
            .error_for_status()
            .context("speech-to-text service returned error")?
            .json()
            .await
            .context("failed to parse transcript")?;

        Ok(resp.text.trim().to_string())
    }

    async fn text_to_speech(&self, text: &str) -> anyhow::Result<Vec<u8>> {
        let bytes = self
            .client
            .post(format!("{}/tts", self.url))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .context("failed to call text-to-speech service")?
            .error_for_status()
            .context("text-to-speech service returned error")?
            .bytes()
            .await
            .context("failed to read synthesized audio")?;

        Ok(bytes.to_vec())
    }
}

/// For telephony front ends that recognize and speak on their own (e.g. Twilio `<Gather>`/`<Say>`).
pub struct TextOnlySpeech;

#[async_trait]
impl SpeechService for TextOnlySpeech {
    async fn speech_to_text(&self, _audio: &[u8]) -> anyhow::Result<String> {
        anyhow::bail!("speech recognition is not available; send text")
    }

    async fn text_to_speech(&self, _text: &str) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
