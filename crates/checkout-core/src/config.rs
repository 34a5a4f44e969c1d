//! Checkout Configuration

use std::time::Duration;

use crate::error::{CheckoutError, Result};
use crate::model::normalize_currency;

/// Deployment environment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Anything other than `development` is treated as production
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" | "local" => Environment::Development,
            _ => Environment::Production,
        }
    }
    
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
    
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

/// Settings shared by the guard, the confirmation channel and the adapters
#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    /// Deployment environment
    pub environment: Environment,
    
    /// Currency used when a request omits one
    pub default_currency: String,
    
    /// Upper bound for any single provider call
    pub provider_timeout: Duration,
    
    /// Delay before a synthetic payment resolves
    pub synthetic_delay: Duration,
    
    /// Approval probability for synthetic payments outside development
    pub synthetic_approval_rate: f64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            default_currency: "USD".into(),
            provider_timeout: Duration::from_secs(15),
            synthetic_delay: Duration::from_secs(3),
            synthetic_approval_rate: 0.8,
        }
    }
}

impl CheckoutConfig {
    /// Development defaults
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            ..Default::default()
        }
    }
    
    /// Read overrides from the environment
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        
        let environment = std::env::var("APP_ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or(defaults.environment);
        
        let default_currency = match std::env::var("CHECKOUT_DEFAULT_CURRENCY") {
            Ok(code) => normalize_currency(&code)
                .map_err(|_| CheckoutError::Config(format!("CHECKOUT_DEFAULT_CURRENCY '{}' is invalid", code)))?,
            Err(_) => defaults.default_currency,
        };
        
        let provider_timeout = env_parse::<u64>("CHECKOUT_PROVIDER_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.provider_timeout);
        
        let synthetic_delay = env_parse::<u64>("CHECKOUT_SYNTHETIC_DELAY_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.synthetic_delay);
        
        let synthetic_approval_rate = env_parse::<f64>("CHECKOUT_SYNTHETIC_APPROVAL_RATE")?
            .unwrap_or(defaults.synthetic_approval_rate);
        if !(0.0..=1.0).contains(&synthetic_approval_rate) {
            return Err(CheckoutError::Config(
                "CHECKOUT_SYNTHETIC_APPROVAL_RATE must be between 0 and 1".into(),
            ));
        }
        
        Ok(Self {
            environment,
            default_currency,
            provider_timeout,
            synthetic_delay,
            synthetic_approval_rate,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CheckoutError::Config(format!("{} has an invalid value '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}
