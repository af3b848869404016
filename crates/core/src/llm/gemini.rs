use crate::config::Settings;
use crate::llm::{json, EngineInput, EngineReply, RecommendationEngine};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-05-20";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const PROMPT_HEADER: &str = r#"**Role:** You are a rigorous financial analyst specializing in short-term technical and sentiment analysis. Your task is to provide a BUY, SELL, or HOLD recommendation based EXCLUSIVELY on the limited data provided. Apply critical evaluation within the constraints of available information.

**Available Data Analysis:**
You have access to a JSON string containing:
- Limited daily price data (OHLCV)
- Limited weekly price data (OHLCV)
- Recent news sentiment scores and source analysis (provided in a separate summary)
- User's stated risk appetite
- Key technical indicators like MACD (Moving Average Convergence/Divergence)
- Short interest data

**Analysis Framework (Based on Available Data):**
1. **Price Action Analysis:** Compare recent daily vs weekly trends, volume patterns
2. **Volume Conviction:** Assess if volume supports price movements or suggests weak participation
3. **Technical Indicators:** Analyze MACD values (MACD line, signal line, histogram) for momentum and potential signals
4. **Short Interest:** Evaluate short interest data for signs of bearish sentiment or potential short squeeze scenarios
5. **News Sentiment Quality:** Evaluate sentiment scores, source credibility, and ticker relevance from the separate news summary
6. **Data Limitations:** Acknowledge what you cannot determine from limited data points
7. **Risk Assessment:** Identify risks given the data constraints

**Critical Evaluation Points:**
- Are price movements supported by volume?
- Do sentiment scores align with actual price action and technical indicators?
- How reliable are the news sources and sentiment calculations?
- What key information is missing that could change the analysis (e.g., broader market context, full financial statements)?
- Is the recent price action sustainable based on available evidence (price, volume, MACD, short interest)?"#;

const PROMPT_INSTRUCTIONS: &str = r#"**Instructions:**
- Work only with the provided data points - no external knowledge
- Be explicit about data limitations and their impact on confidence
- Focus on what can be reasonably concluded from limited price history, sentiment, MACD, and short interest
- Avoid overconfident predictions based on insufficient data
- Consider that your analysis is a snapshot with limited historical context"#;

const PROMPT_COMPREHENSIVE: &str = r#"**Comprehensive Analysis Mode:**
Provide additional deep-dive analysis including:
- Historical context and pattern comparison (if data allows)
- Cross-validation of different data points (daily/weekly price, volume, MACD, short interest, news)
- Scenario analysis with best/worst/likely outcomes based on the provided data
- Brief commentary on how short interest and MACD might influence potential price movements"#;

const PROMPT_OUTPUT: &str = r#"Return your answer in JSON format like this:
{
  "recommendation": "BUY|SELL|HOLD",
  "confidence_level": "Low|Medium|High",
  "justification": "2-3 sentence analysis referencing specific data points (price levels, volume changes, MACD signals, short interest levels, sentiment scores)",
  "key_risks": "2-3 main risks given data limitations and market conditions reflected in the data",
  "data_limitations": "What critical information is missing that affects confidence",
  "sentiment_analysis": "Brief assessment of news sentiment quality and reliability based on the news summary provided",
  "technical_snapshot": "Brief summary of MACD and short interest interpretation (e.g., MACD bullish crossover, high short interest indicating bearish sentiment or squeeze potential)"
}

Do not include any other text or comments or formatting, such that it can be parsed as JSON."#;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_gemini_api_key()?.to_string();
        let base_url = settings
            .gemini_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = settings
            .gemini_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout_secs = settings.gemini_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build gemini http client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
        })
    }

    fn prompt(input: &EngineInput) -> String {
        let comprehensive = if input.comprehensive {
            format!("\n{PROMPT_COMPREHENSIVE}\n")
        } else {
            String::new()
        };

        format!(
            "{PROMPT_HEADER}\n\n\
**Input Data:**\n\
- News Summary (separate from stock data): {news}\n\
- Risk Appetite: {risk}\n\
- Stock Data Summary (JSON string): {data}\n\n\
{PROMPT_INSTRUCTIONS}\n{comprehensive}\n{PROMPT_OUTPUT}",
            news = input.news_summary,
            risk = input.risk_appetite,
            data = input.market_data_json,
        )
    }

    async fn generate_content(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let req = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let res = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            anyhow::bail!("Gemini HTTP {status}: {text}");
        }

        let parsed = serde_json::from_str::<GenerateContentResponse>(&text)
            .with_context(|| format!("failed to decode Gemini response: {text}"))?;
        let out = Self::response_text(&parsed);
        anyhow::ensure!(!out.is_empty(), "Gemini response contained no text");
        Ok(out)
    }

    fn response_text(res: &GenerateContentResponse) -> String {
        let mut out = String::new();
        for candidate in res.candidates.iter().take(1) {
            let Some(content) = &candidate.content else {
                continue;
            };
            for part in &content.parts {
                if part.text.is_empty() {
                    continue;
                }
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&part.text);
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl RecommendationEngine for GeminiClient {
    async fn recommend(&self, input: &EngineInput) -> Option<EngineReply> {
        let prompt = Self::prompt(input);

        let text = match self.generate_content(&prompt).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "investment recommendation call failed");
                return None;
            }
        };

        match json::parse_reply(&text) {
            Ok(reply) => Some(reply),
            Err(err) => {
                tracing::error!(error = %err, raw_output = %text, "could not parse recommendation output");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_embeds_inputs_and_comprehensive_block() {
        let input = EngineInput {
            news_summary: "Deliveries beat estimates.".to_string(),
            risk_appetite: "high".to_string(),
            market_data_json: r#"{"daily":[]}"#.to_string(),
            comprehensive: true,
        };
        let prompt = GeminiClient::prompt(&input);

        assert!(prompt.contains("Deliveries beat estimates."));
        assert!(prompt.contains("Risk Appetite: high"));
        assert!(prompt.contains(r#"{"daily":[]}"#));
        assert!(prompt.contains("Comprehensive Analysis Mode"));
    }

    #[test]
    fn prompt_omits_comprehensive_block_when_flag_unset() {
        let input = EngineInput {
            news_summary: "No news summary available.".to_string(),
            risk_appetite: "medium".to_string(),
            market_data_json: "{}".to_string(),
            comprehensive: false,
        };
        let prompt = GeminiClient::prompt(&input);
        assert!(!prompt.contains("Comprehensive Analysis Mode"));
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let res: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "```json"}, {"text": "{}"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(GeminiClient::response_text(&res), "```json\n{}");
    }
}
