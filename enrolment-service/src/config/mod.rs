use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

/// Enrolment method name stored on enrolment instances handled here.
pub const ENROL_METHOD: &str = "ipaymu";

#[derive(Clone, Debug)]
pub struct EnrolmentConfig {
    pub common: core_config::Config,
    pub database: DatabaseConfig,
    pub ipaymu: IpaymuConfig,
    pub enrol: EnrolConfig,
    pub mail: MailConfig,
    pub smtp: SmtpConfig,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Clone, Debug)]
pub struct IpaymuConfig {
    /// Virtual account number issued by iPaymu.
    pub va: String,
    pub api_key: Secret<String>,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EnrolConfig {
    /// Plugin switch. When off every callback is answered with 503.
    pub enabled: bool,
    pub method: String,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub mail_students: bool,
    pub mail_teachers: bool,
    pub mail_admins: bool,
    /// Custom HTML overrides; `None` renders the built-in templates.
    pub student_email: Option<String>,
    pub teacher_email: Option<String>,
    pub admin_email: Option<String>,
    pub support_name: String,
    pub support_email: String,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

impl EnrolmentConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(EnrolmentConfig {
            common,
            database: DatabaseConfig {
                url: Secret::new(get_env("MONGODB_URI", None, is_prod)?),
                db_name: get_env("MONGODB_DATABASE", Some("enrolment_db"), is_prod)?,
            },
            ipaymu: IpaymuConfig {
                va: get_env("IPAYMU_VA", Some(""), is_prod)?,
                api_key: Secret::new(get_env("IPAYMU_API_KEY", Some(""), is_prod)?),
                api_base_url: get_env(
                    "IPAYMU_API_BASE_URL",
                    Some("https://sandbox.ipaymu.com"),
                    is_prod,
                )?,
                timeout_secs: get_number("IPAYMU_TIMEOUT_SECS", Some("10"), is_prod)?,
            },
            enrol: EnrolConfig {
                enabled: get_flag("ENROL_IPAYMU_ENABLED", true)?,
                method: ENROL_METHOD.to_string(),
            },
            mail: MailConfig {
                mail_students: get_flag("MAIL_STUDENTS", true)?,
                mail_teachers: get_flag("MAIL_TEACHERS", true)?,
                mail_admins: get_flag("MAIL_ADMINS", false)?,
                student_email: get_optional("STUDENT_EMAIL"),
                teacher_email: get_optional("TEACHER_EMAIL"),
                admin_email: get_optional("ADMIN_EMAIL"),
                support_name: get_env("SUPPORT_NAME", Some("Support"), is_prod)?,
                support_email: get_env("SUPPORT_EMAIL", Some("support@example.com"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: get_number("SMTP_PORT", Some("587"), is_prod)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@example.com"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Course Enrolment"), is_prod)?,
                enabled: get_flag("SMTP_ENABLED", false)?,
            },
            service_name: "enrolment-service".to_string(),
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn get_number<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_number(key, &get_env(key, default, is_prod)?)
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}

fn get_flag(key: &str, default: bool) -> Result<bool, AppError> {
    match env::var(key) {
        Ok(raw) => parse_flag(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be a boolean, got '{}'",
            key,
            raw
        ))),
    }
}

fn get_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
