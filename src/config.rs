use std::env;

use anyhow::Context;
use anyhow::Result;
use chrono_tz::Tz;

use crate::models::Defaults;
use crate::validate::validate_timezone;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
  pub bot_token: String,
  /// Without a database the bot keeps preferences in memory only.
  pub database_url: Option<String>,
  pub default_timezone: Tz,
  pub database_max_connections: u32,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    let bot_token = env::var("BOT_TOKEN")
      .or_else(|_| env::var("TELOXIDE_TOKEN"))
      .context("BOT_TOKEN or TELOXIDE_TOKEN must be set")?;
    let database_url = non_empty(env::var("DATABASE_URL").ok());
    let default_timezone = parse_default_timezone(env::var("DEFAULT_TIME_ZONE").ok().as_deref())?;
    let database_max_connections =
      parse_max_connections(env::var("DATABASE_MAX_CONNECTIONS").ok().as_deref())?;
    Ok(Self {
      bot_token,
      database_url,
      default_timezone,
      database_max_connections,
    })
  }

  pub fn defaults(&self) -> Defaults {
    Defaults {
      timezone: self.default_timezone,
    }
  }
}

fn non_empty(raw: Option<String>) -> Option<String> {
  raw.filter(|value| !value.trim().is_empty())
}

fn parse_default_timezone(raw: Option<&str>) -> Result<Tz> {
  match raw.map(str::trim).filter(|value| !value.is_empty()) {
    Some(value) => validate_timezone(value).with_context(|| format!("DEFAULT_TIME_ZONE {value:?} is not a timezone")),
    None => Ok(Defaults::default().timezone),
  }
}

fn parse_max_connections(raw: Option<&str>) -> Result<u32> {
  let Some(value) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
    return Ok(DEFAULT_MAX_CONNECTIONS);
  };
  let parsed = value
    .parse::<u32>()
    .with_context(|| format!("DATABASE_MAX_CONNECTIONS {value:?} is not a number"))?;
  anyhow::ensure!(parsed > 0, "DATABASE_MAX_CONNECTIONS must be positive");
  Ok(parsed)
}
