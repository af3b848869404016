pub mod cache;
pub mod domain;
pub mod llm;
pub mod market;
pub mod pipeline;
pub mod storage;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub polygon_api_key: Option<String>,
        pub gemini_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub polygon_base_url: Option<String>,
        pub polygon_short_interest_path: Option<String>,
        pub gemini_base_url: Option<String>,
        pub gemini_model: Option<String>,
        pub polygon_timeout_secs: Option<u64>,
        pub gemini_timeout_secs: Option<u64>,
    }

    fn parse_secs(var: &str) -> Option<u64> {
        std::env::var(var).ok().and_then(|s| s.parse().ok())
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                polygon_api_key: std::env::var("POLYGON_API_KEY").ok(),
                gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                polygon_base_url: std::env::var("POLYGON_BASE_URL").ok(),
                polygon_short_interest_path: std::env::var("POLYGON_SHORT_INTEREST_PATH").ok(),
                gemini_base_url: std::env::var("GEMINI_BASE_URL").ok(),
                gemini_model: std::env::var("GEMINI_MODEL").ok(),
                polygon_timeout_secs: parse_secs("POLYGON_TIMEOUT_SECS"),
                gemini_timeout_secs: parse_secs("GEMINI_TIMEOUT_SECS"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_polygon_api_key(&self) -> anyhow::Result<&str> {
            self.polygon_api_key
                .as_deref()
                .context("POLYGON_API_KEY is required")
        }

        pub fn require_gemini_api_key(&self) -> anyhow::Result<&str> {
            self.gemini_api_key
                .as_deref()
                .context("GEMINI_API_KEY is required")
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parse_secs_reads_numeric_values() {
            std::env::set_var("MARKETSAGE_PARSE_SECS_OK", "45");
            assert_eq!(parse_secs("MARKETSAGE_PARSE_SECS_OK"), Some(45));
        }

        #[test]
        fn parse_secs_ignores_garbage_and_absence() {
            std::env::set_var("MARKETSAGE_PARSE_SECS_BAD", "soon");
            assert_eq!(parse_secs("MARKETSAGE_PARSE_SECS_BAD"), None);
            assert_eq!(parse_secs("MARKETSAGE_PARSE_SECS_UNSET"), None);
        }
    }
}
