use serde::Serialize;
use std::env;

/// Immutable application configuration, built once at startup and handed to
/// the router through `AppState`.
#[derive(Clone, Serialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Serialize)]
pub struct DatabaseConfig {
    #[serde(skip)]
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub run_migrations: bool,
}

#[derive(Clone, Serialize)]
pub struct StorageConfig {
    pub account_id: Option<String>,
    #[serde(skip)]
    pub access_key_id: Option<String>,
    #[serde(skip)]
    pub secret_access_key: Option<String>,
    pub bucket: String,
    pub public_url: Option<String>,
    /// Overrides the R2 endpoint derived from `account_id` (any S3-compatible store).
    pub endpoint: Option<String>,
}

#[derive(Clone, Serialize)]
pub struct AuthConfig {
    #[serde(skip)]
    pub bot_api_key: String,
    pub cf_access_team_domain: Option<String>,
    pub cf_access_audience: Option<String>,
    pub dev_bypass: bool,
}

#[derive(Clone, Serialize)]
pub struct SecurityConfig {
    #[serde(skip)]
    pub secret_key: String,
    pub cors_origins: CorsOrigins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

impl StorageConfig {
    /// Base URL that objects are PUT against (bucket is appended as the first path segment).
    pub fn endpoint_url(&self) -> Option<String> {
        if let Some(endpoint) = &self.endpoint {
            return Some(endpoint.trim_end_matches('/').to_string());
        }
        self.account_id
            .as_ref()
            .map(|account| format!("https://{}.r2.cloudflarestorage.com", account))
    }

    pub fn has_credentials(&self) -> bool {
        self.endpoint_url().is_some()
            && self.access_key_id.as_deref().is_some_and(|v| !v.is_empty())
            && self.secret_access_key.as_deref().is_some_and(|v| !v.is_empty())
    }

    /// Public URL for an uploaded object key.
    pub fn public_url_for(&self, key: &str) -> String {
        match &self.public_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!(
                "https://{}.{}.r2.cloudflarestorage.com/{}",
                self.bucket,
                self.account_id.as_deref().unwrap_or_default(),
                key
            ),
        }
    }
}

impl AuthConfig {
    pub fn access_configured(&self) -> bool {
        self.cf_access_team_domain.as_deref().is_some_and(|v| !v.is_empty())
            && self.cf_access_audience.as_deref().is_some_and(|v| !v.is_empty())
    }
}

impl CorsOrigins {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "*" || raw.is_empty() {
            return CorsOrigins::Any;
        }
        CorsOrigins::List(
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup so tests never touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(lookup)
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Server overrides
        if let Some(v) = non_empty("HOST") {
            self.server.host = v;
        }
        if let Some(v) = non_empty("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Database overrides
        if let Some(v) = non_empty("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = non_empty("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Some(v) = non_empty("DATABASE_CONNECT_TIMEOUT_SECS") {
            self.database.connect_timeout_secs = v.parse().unwrap_or(self.database.connect_timeout_secs);
        }
        if let Some(v) = non_empty("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }

        // Storage overrides
        self.storage.account_id = non_empty("R2_ACCOUNT_ID").or(self.storage.account_id);
        self.storage.access_key_id = non_empty("R2_ACCESS_KEY_ID").or(self.storage.access_key_id);
        self.storage.secret_access_key = non_empty("R2_SECRET_ACCESS_KEY").or(self.storage.secret_access_key);
        if let Some(v) = non_empty("R2_BUCKET_NAME") {
            self.storage.bucket = v;
        }
        self.storage.public_url = non_empty("R2_PUBLIC_URL").or(self.storage.public_url);
        self.storage.endpoint = non_empty("R2_ENDPOINT").or(self.storage.endpoint);

        // Auth overrides
        if let Some(v) = non_empty("API_KEY") {
            self.auth.bot_api_key = v;
        }
        self.auth.cf_access_team_domain = non_empty("CF_ACCESS_TEAM_DOMAIN")
            .map(|v| v.trim_start_matches("https://").trim_end_matches('/').to_string())
            .or(self.auth.cf_access_team_domain);
        self.auth.cf_access_audience = non_empty("CF_ACCESS_AUDIENCE").or(self.auth.cf_access_audience);
        if let Some(v) = non_empty("CF_ACCESS_DEV_BYPASS") {
            self.auth.dev_bypass = v.parse().unwrap_or(self.auth.dev_bypass);
        }
        // The bypass only ever applies to local development.
        if self.environment != Environment::Development {
            self.auth.dev_bypass = false;
        }

        // Security overrides
        if let Some(v) = non_empty("SECRET_KEY") {
            self.security.secret_key = v;
        }
        if let Some(v) = lookup("ALLOWED_ORIGINS") {
            self.security.cors_origins = CorsOrigins::parse(&v);
        }

        // Upload overrides
        if let Some(v) = non_empty("UPLOAD_MAX_BYTES") {
            self.upload.max_bytes = v.parse().unwrap_or(self.upload.max_bytes);
        }

        self
    }

    fn base(environment: Environment) -> Self {
        Self {
            environment,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/pr_maker".to_string(),
                max_connections: 10,
                connect_timeout_secs: 30,
                run_migrations: true,
            },
            storage: StorageConfig {
                account_id: None,
                access_key_id: None,
                secret_access_key: None,
                bucket: "pr-maker-images".to_string(),
                public_url: None,
                endpoint: None,
            },
            auth: AuthConfig {
                bot_api_key: String::new(),
                cf_access_team_domain: None,
                cf_access_audience: None,
                dev_bypass: false,
            },
            security: SecurityConfig {
                secret_key: "change-me-in-production".to_string(),
                cors_origins: CorsOrigins::Any,
            },
            upload: UploadConfig {
                max_bytes: 10 * 1024 * 1024, // 10MB
            },
        }
    }

    fn development() -> Self {
        let mut config = Self::base(Environment::Development);
        config.security.cors_origins = CorsOrigins::List(vec![
            "http://localhost:3000".to_string(),
            "http://localhost:5173".to_string(),
        ]);
        config
    }

    fn staging() -> Self {
        let mut config = Self::base(Environment::Staging);
        config.database.max_connections = 20;
        config.database.connect_timeout_secs = 10;
        config
    }

    fn production() -> Self {
        let mut config = Self::base(Environment::Production);
        config.database.max_connections = 30;
        config.database.connect_timeout_secs = 5;
        config
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment, Environment::Development)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets are skipped by the Serialize impl.
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("AppConfig { .. }"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.storage.bucket, "pr-maker-images");
        assert_eq!(config.upload.max_bytes, 10 * 1024 * 1024);
        assert!(!config.auth.access_configured());
        assert!(!config.storage.has_credentials());
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("PORT", "9090"),
            ("API_KEY", "bot-secret"),
            ("CF_ACCESS_TEAM_DOMAIN", "https://acme.cloudflareaccess.com/"),
            ("CF_ACCESS_AUDIENCE", "aud-tag"),
            ("ALLOWED_ORIGINS", "https://admin.example.com, https://preview.example.com"),
            ("R2_ACCOUNT_ID", "acct"),
            ("R2_ACCESS_KEY_ID", "ak"),
            ("R2_SECRET_ACCESS_KEY", "sk"),
        ]));

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.auth.bot_api_key, "bot-secret");
        assert_eq!(config.auth.cf_access_team_domain.as_deref(), Some("acme.cloudflareaccess.com"));
        assert!(config.auth.access_configured());
        assert_eq!(
            config.security.cors_origins,
            CorsOrigins::List(vec![
                "https://admin.example.com".to_string(),
                "https://preview.example.com".to_string()
            ])
        );
        assert!(config.storage.has_credentials());
        assert_eq!(
            config.storage.endpoint_url().as_deref(),
            Some("https://acct.r2.cloudflarestorage.com")
        );
    }

    #[test]
    fn test_dev_bypass_ignored_outside_development() {
        let config = AppConfig::from_lookup(lookup(&[
            ("APP_ENV", "staging"),
            ("CF_ACCESS_DEV_BYPASS", "true"),
        ]));
        assert!(!config.auth.dev_bypass);

        let config = AppConfig::from_lookup(lookup(&[("CF_ACCESS_DEV_BYPASS", "true")]));
        assert!(config.auth.dev_bypass);
    }

    #[test]
    fn test_public_url_for_key() {
        let mut config = AppConfig::from_lookup(lookup(&[("R2_ACCOUNT_ID", "acct")]));
        assert_eq!(
            config.storage.public_url_for("pr_images/a.png"),
            "https://pr-maker-images.acct.r2.cloudflarestorage.com/pr_images/a.png"
        );

        config.storage.public_url = Some("https://cdn.example.com/".to_string());
        assert_eq!(
            config.storage.public_url_for("pr_images/a.png"),
            "https://cdn.example.com/pr_images/a.png"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AppConfig::from_lookup(lookup(&[
            ("API_KEY", "bot-secret"),
            ("SECRET_KEY", "app-secret"),
            ("DATABASE_URL", "postgres://user:hunter2@db/pr"),
        ]));
        let debug = format!("{:?}", config);
        assert!(!debug.contains("bot-secret"));
        assert!(!debug.contains("app-secret"));
        assert!(!debug.contains("hunter2"));
    }
}
