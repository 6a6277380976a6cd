use anyhow::Result;
use async_trait::async_trait;
use sqlx::Pool;
use sqlx::Postgres;
use sqlx::Row;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;
use tracing::warn;

use crate::models::Defaults;
use crate::models::Field;
use crate::models::FieldKind;
use crate::models::PrefValue;
use crate::models::UserId;
use crate::store::PreferenceStore;
use crate::store::StoreError;
use crate::validate::ValidationError;
use crate::validate::validate;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct PgStore {
  pool: Pool<Postgres>,
  defaults: Defaults,
}

impl PgStore {
  pub async fn connect(database_url: &str, max_connections: u32, defaults: Defaults) -> Result<Self> {
    let pool = PgPoolOptions::new()
      .max_connections(max_connections)
      .connect(database_url)
      .await?;
    MIGRATOR.run(&pool).await?;
    Ok(Self { pool, defaults })
  }

  fn decode(&self, user_id: UserId, field: Field, raw: &str) -> PrefValue {
    match decode_value(field.kind(), raw) {
      Ok(value) => value,
      Err(err) => {
        warn!(user_id, field = %field, stored = raw, error = %err, "discarding undecodable preference");
        self.defaults.value_for(field)
      },
    }
  }
}

/// Inverse of `PrefValue::to_stored`. An empty offset list is a valid stored
/// value even though typed input must name at least one offset.
fn decode_value(kind: FieldKind, raw: &str) -> Result<PrefValue, ValidationError> {
  if kind == FieldKind::MinuteOffsets && raw.trim().is_empty() {
    return Ok(PrefValue::Offsets(Vec::new()));
  }
  validate(kind, raw)
}

#[async_trait]
impl PreferenceStore for PgStore {
  #[instrument(skip(self))]
  async fn get(&self, user_id: UserId, field: Field) -> Result<PrefValue, StoreError> {
    let row = sqlx::query(r#"SELECT value FROM user_preferences WHERE user_id = $1 AND field = $2"#)
      .bind(user_id)
      .bind(field.key())
      .fetch_optional(&self.pool)
      .await?;
    match row {
      Some(row) => {
        let raw: String = row.try_get("value")?;
        Ok(self.decode(user_id, field, &raw))
      },
      None => Ok(self.defaults.value_for(field)),
    }
  }

  #[instrument(skip(self, value))]
  async fn set(&self, user_id: UserId, field: Field, value: PrefValue) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      INSERT INTO user_preferences (user_id, field, value)
      VALUES ($1, $2, $3)
      ON CONFLICT (user_id, field) DO UPDATE SET
        value = EXCLUDED.value,
        updated_at = NOW()
      "#,
    )
    .bind(user_id)
    .bind(field.key())
    .bind(value.to_stored())
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  async fn reset(&self, user_id: UserId, fields: &[Field]) -> Result<(), StoreError> {
    let keys: Vec<String> = fields.iter().map(|field| field.key().to_string()).collect();
    sqlx::query(r#"DELETE FROM user_preferences WHERE user_id = $1 AND field = ANY($2)"#)
      .bind(user_id)
      .bind(keys)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  async fn reset_all(&self, user_id: UserId) -> Result<(), StoreError> {
    sqlx::query(r#"DELETE FROM user_preferences WHERE user_id = $1"#)
      .bind(user_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::decode_value;
  use crate::models::Defaults;
  use crate::models::Field;
  use crate::models::FieldKind;
  use crate::models::PrefValue;
  use crate::models::TimeOfDay;

  fn assert_round_trip(kind: FieldKind, value: PrefValue) {
    let stored = value.to_stored();
    assert_eq!(decode_value(kind, &stored), Ok(value), "stored form {stored:?}");
  }

  #[test]
  fn defaults_survive_storage() {
    let defaults = Defaults::default();
    for field in Field::ALL {
      assert_round_trip(field.kind(), defaults.value_for(field));
    }
  }

  #[test]
  fn edge_values_survive_storage() {
    assert_round_trip(FieldKind::MinuteOffsets, PrefValue::Offsets(Vec::new()));
    assert_round_trip(FieldKind::MinuteOffsets, PrefValue::Offsets(vec![1440, 60, 30, 15, 1]));
    assert_round_trip(FieldKind::TimeOfDay, PrefValue::Time(TimeOfDay { hour: 0, minute: 0 }));
    assert_round_trip(FieldKind::TimeOfDay, PrefValue::Time(TimeOfDay { hour: 23, minute: 59 }));
    assert_round_trip(
      FieldKind::Timezone,
      PrefValue::Zone(chrono_tz::America::Argentina::Buenos_Aires),
    );
    assert_round_trip(FieldKind::Toggle, PrefValue::Toggle(true));
    assert_round_trip(FieldKind::Toggle, PrefValue::Toggle(false));
  }

  #[test]
  fn corrupt_values_are_rejected() {
    assert!(decode_value(FieldKind::TimeOfDay, "").is_err());
    assert!(decode_value(FieldKind::MinuteOffsets, "soon").is_err());
    assert!(decode_value(FieldKind::Timezone, "Atlantis/Capital").is_err());
  }
}
