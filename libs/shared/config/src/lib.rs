use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub redis_url: Option<String>,
    pub push_service_url: String,
    pub push_service_token: String,
    pub email_service_url: String,
    pub email_service_api_key: String,
    pub email_from_address: String,
    pub calendar_service_url: String,
    pub side_effect_timeout_secs: u64,
    pub notification_max_attempts: u32,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            push_service_url: env::var("PUSH_SERVICE_URL")
                .unwrap_or_else(|_| {
                    warn!("PUSH_SERVICE_URL not set, push notifications disabled");
                    String::new()
                }),
            push_service_token: env::var("PUSH_SERVICE_TOKEN").unwrap_or_default(),
            email_service_url: env::var("EMAIL_SERVICE_URL")
                .unwrap_or_else(|_| {
                    warn!("EMAIL_SERVICE_URL not set, appointment emails disabled");
                    String::new()
                }),
            email_service_api_key: env::var("EMAIL_SERVICE_API_KEY").unwrap_or_default(),
            email_from_address: env::var("EMAIL_FROM_ADDRESS")
                .unwrap_or_else(|_| "appointments@dietcare.app".to_string()),
            calendar_service_url: env::var("CALENDAR_SERVICE_URL")
                .unwrap_or_else(|_| {
                    warn!("CALENDAR_SERVICE_URL not set, calendar sync disabled");
                    String::new()
                }),
            side_effect_timeout_secs: parse_or("SIDE_EFFECT_TIMEOUT_SECS", 10),
            notification_max_attempts: parse_or("NOTIFICATION_MAX_ATTEMPTS", 3),
            port: parse_or("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_push_configured(&self) -> bool {
        !self.push_service_url.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.email_service_url.is_empty() && !self.email_service_api_key.is_empty()
    }

    pub fn is_calendar_configured(&self) -> bool {
        !self.calendar_service_url.is_empty()
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
