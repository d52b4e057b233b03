use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::{NarrativeGenerator, NarrativeRequest};
use crate::settings::NarratorSettings;

const SYSTEM_PROMPT: &str = "Sos un analista de datos de ventas. Respondé en español, \
     en forma breve y concreta, sin repetir los números de entrada.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Cliente de un endpoint de chat compatible con OpenAI.
/// Sin API key cada llamada falla y el llamador usa su plantilla.
#[derive(Clone)]
pub struct HttpNarrator {
    client: Client,
    settings: NarratorSettings,
}

impl HttpNarrator {
    pub fn new(settings: NarratorSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("creando cliente HTTP del narrador")?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl NarrativeGenerator for HttpNarrator {
    async fn explain(&self, request: &NarrativeRequest) -> Result<String> {
        if self.settings.api_key.trim().is_empty() {
            bail!("NARRATOR_API_KEY no configurada");
        }

        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: 600,
        };

        debug!("pidiendo narrativa '{}' a {}", request.topic, self.settings.model);

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .context("enviando pedido al narrador")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("narrador respondió {}: {}", status, text);
        }

        let parsed: ChatResponse = resp.json().await.context("respuesta del narrador inválida")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("el narrador no devolvió texto"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sin_api_key_falla_sin_llamar_a_la_red() {
        let narrator = HttpNarrator::new(NarratorSettings {
            api_key: String::new(),
            base_url: "http://127.0.0.1:9".into(),
            model: "m".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        let err = narrator
            .explain(&NarrativeRequest {
                topic: "statistics".into(),
                prompt: "hola".into(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NARRATOR_API_KEY"));
    }

    #[test]
    fn endpoint_no_duplica_barras() {
        let narrator = HttpNarrator::new(NarratorSettings {
            api_key: "k".into(),
            base_url: "https://example.com/v1/".into(),
            model: "m".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(narrator.endpoint(), "https://example.com/v1/chat/completions");
    }
}
