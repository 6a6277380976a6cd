use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::models::Defaults;
use crate::models::Field;
use crate::models::PrefValue;
use crate::models::UserId;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error(transparent)]
  Database(#[from] sqlx::Error),
}

/// Per-user preference record. Unset fields read back as their defaults.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
  async fn get(&self, user_id: UserId, field: Field) -> Result<PrefValue, StoreError>;

  async fn set(&self, user_id: UserId, field: Field, value: PrefValue) -> Result<(), StoreError>;

  /// Drops the stored values of `fields` so they read back as defaults.
  async fn reset(&self, user_id: UserId, fields: &[Field]) -> Result<(), StoreError>;

  async fn reset_all(&self, user_id: UserId) -> Result<(), StoreError> {
    self.reset(user_id, &Field::ALL).await
  }
}

pub struct MemoryStore {
  defaults: Defaults,
  records: RwLock<HashMap<UserId, HashMap<Field, PrefValue>>>,
}

impl MemoryStore {
  pub fn new(defaults: Defaults) -> Self {
    Self {
      defaults,
      records: RwLock::new(HashMap::new()),
    }
  }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
  async fn get(&self, user_id: UserId, field: Field) -> Result<PrefValue, StoreError> {
    let records = self.records.read().await;
    let value = records
      .get(&user_id)
      .and_then(|record| record.get(&field))
      .cloned()
      .unwrap_or_else(|| self.defaults.value_for(field));
    Ok(value)
  }

  #[instrument(skip(self, value))]
  async fn set(&self, user_id: UserId, field: Field, value: PrefValue) -> Result<(), StoreError> {
    self.records.write().await.entry(user_id).or_default().insert(field, value);
    Ok(())
  }

  #[instrument(skip(self))]
  async fn reset(&self, user_id: UserId, fields: &[Field]) -> Result<(), StoreError> {
    if let Some(record) = self.records.write().await.get_mut(&user_id) {
      record.retain(|field, _| !fields.contains(field));
    }
    Ok(())
  }

  #[instrument(skip(self))]
  async fn reset_all(&self, user_id: UserId) -> Result<(), StoreError> {
    self.records.write().await.remove(&user_id);
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::MemoryStore;
  use super::PreferenceStore;
  use crate::models::Category;
  use crate::models::Defaults;
  use crate::models::Field;
  use crate::models::PrefValue;
  use crate::models::TimeOfDay;

  fn seven_fifteen() -> PrefValue {
    PrefValue::Time(TimeOfDay { hour: 7, minute: 15 })
  }

  #[tokio::test]
  async fn unset_fields_read_as_defaults() {
    let store = MemoryStore::new(Defaults::default());
    let value = store.get(1, Field::Timezone).await.unwrap();
    assert_eq!(value, PrefValue::Zone(chrono_tz::Asia::Jerusalem));
  }

  #[tokio::test]
  async fn set_values_are_scoped_per_user() {
    let store = MemoryStore::new(Defaults::default());
    store.set(1, Field::MorningStart, seven_fifteen()).await.unwrap();

    assert_eq!(store.get(1, Field::MorningStart).await.unwrap(), seven_fifteen());
    assert_eq!(
      store.get(2, Field::MorningStart).await.unwrap(),
      Defaults::default().value_for(Field::MorningStart)
    );
  }

  #[tokio::test]
  async fn reset_only_touches_listed_fields() {
    let store = MemoryStore::new(Defaults::default());
    store.set(1, Field::MorningStart, seven_fifteen()).await.unwrap();
    store.set(1, Field::Timezone, PrefValue::Zone(chrono_tz::Europe::Paris)).await.unwrap();

    store.reset(1, Category::ShiftTimes.fields()).await.unwrap();

    assert_eq!(
      store.get(1, Field::MorningStart).await.unwrap(),
      Defaults::default().value_for(Field::MorningStart)
    );
    assert_eq!(
      store.get(1, Field::Timezone).await.unwrap(),
      PrefValue::Zone(chrono_tz::Europe::Paris)
    );
  }

  #[tokio::test]
  async fn reset_all_restores_every_default() {
    let store = MemoryStore::new(Defaults::default());
    store.set(1, Field::ReminderSound, PrefValue::Toggle(false)).await.unwrap();
    store.set(1, Field::EveningEnd, seven_fifteen()).await.unwrap();

    store.reset_all(1).await.unwrap();

    for field in Field::ALL {
      assert_eq!(store.get(1, field).await.unwrap(), Defaults::default().value_for(field));
    }
  }
}
