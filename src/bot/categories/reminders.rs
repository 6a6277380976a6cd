use async_trait::async_trait;
use tracing::info;

use super::CategoryHandler;
use super::pairs;
use super::token;
use crate::bot::render::Button;
use crate::bot::render::PREFERENCES_MENU_TOKEN;
use crate::bot::render::RenderInstruction;
use crate::bot::render::Reply;
use crate::models::Category;
use crate::models::Field;
use crate::models::PrefValue;
use crate::models::UserId;
use crate::store::PreferenceStore;
use crate::store::StoreError;
use crate::validate::MAX_OFFSET_MINUTES;
use crate::validate::MAX_REMINDER_OFFSETS;

const PRESET_OFFSETS: [u16; 5] = [5, 10, 15, 30, 60];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReminderAction {
  ToggleEnabled,
  ToggleSound,
  AddPicker,
  Add(u16),
  Remove(u16),
}

impl ReminderAction {
  fn parse(action: &str) -> Option<Self> {
    match action {
      "toggle_enabled" => return Some(Self::ToggleEnabled),
      "toggle_sound" => return Some(Self::ToggleSound),
      "add" => return Some(Self::AddPicker),
      _ => {},
    }
    let minutes = |raw: &str| {
      raw
        .parse::<u16>()
        .ok()
        .filter(|minutes| (1 ..= MAX_OFFSET_MINUTES).contains(minutes))
    };
    if let Some(raw) = action.strip_prefix("add_") {
      return minutes(raw).map(Self::Add);
    }
    if let Some(raw) = action.strip_prefix("remove_") {
      return minutes(raw).map(Self::Remove);
    }
    None
  }
}

struct ReminderSettings {
  enabled: bool,
  sound: bool,
  offsets: Vec<u16>,
}

impl ReminderSettings {
  async fn load(store: &dyn PreferenceStore, user_id: UserId) -> Result<Self, StoreError> {
    let enabled = store.get(user_id, Field::RemindersEnabled).await?.as_toggle().unwrap_or(true);
    let sound = store.get(user_id, Field::ReminderSound).await?.as_toggle().unwrap_or(true);
    let offsets = store
      .get(user_id, Field::ReminderOffsets)
      .await?
      .as_offsets()
      .map(<[u16]>::to_vec)
      .unwrap_or_default();
    Ok(Self { enabled, sound, offsets })
  }
}

fn on_off(flag: bool) -> &'static str {
  if flag { "on" } else { "off" }
}

pub struct RemindersHandler;

impl RemindersHandler {
  fn menu(&self, settings: &ReminderSettings) -> RenderInstruction {
    let offsets = PrefValue::Offsets(settings.offsets.clone());
    let text = format!(
      "{}\n\nStatus: {}\nSound: {}\nBefore shift: {offsets}\n\nChoose an action:",
      Category::Reminders.title(),
      on_off(settings.enabled),
      on_off(settings.sound),
    );
    let toggle_label = if settings.enabled {
      "🔕 Turn reminders off"
    } else {
      "🔔 Turn reminders on"
    };
    let sound_label = if settings.sound { "🔇 Mute sound" } else { "🔊 Enable sound" };

    let removals = settings
      .offsets
      .iter()
      .map(|minutes| {
        Button::new(
          format!("🗑️ {minutes} min"),
          token(Category::Reminders, &format!("remove_{minutes}")),
        )
      })
      .collect();

    let mut screen = RenderInstruction::new(text)
      .row(vec![
        Button::new(toggle_label, token(Category::Reminders, "toggle_enabled")),
        Button::new(sound_label, token(Category::Reminders, "toggle_sound")),
      ])
      .row(vec![
        Button::new("➕ Add reminder", token(Category::Reminders, "add")),
        Button::new(
          "✏️ Type reminder times",
          token(Category::Reminders, &format!("edit_{}", Field::ReminderOffsets.key())),
        ),
      ]);
    for row in pairs(removals) {
      screen = screen.row(row);
    }
    screen
      .button("↩️ Reset to defaults", token(Category::Reminders, "reset_defaults"))
      .button("⬅️ Preferences", PREFERENCES_MENU_TOKEN)
  }

  fn add_picker(&self, settings: &ReminderSettings) -> RenderInstruction {
    let presets = PRESET_OFFSETS
      .iter()
      .filter(|minutes| !settings.offsets.contains(minutes))
      .map(|minutes| {
        Button::new(
          format!("{minutes} min"),
          token(Category::Reminders, &format!("add_{minutes}")),
        )
      })
      .collect();

    let mut screen = RenderInstruction::new("⏰ Add a reminder\n\nHow many minutes before the shift?");
    for row in pairs(presets) {
      screen = screen.row(row);
    }
    screen
      .button(
        "✏️ Custom",
        token(Category::Reminders, &format!("edit_{}", Field::ReminderOffsets.key())),
      )
      .button("⬅️ Back", token(Category::Reminders, "show"))
  }

  async fn apply(
    &self,
    store: &dyn PreferenceStore,
    user_id: UserId,
    action: ReminderAction,
  ) -> Result<Reply, StoreError> {
    let mut settings = ReminderSettings::load(store, user_id).await?;
    let notice = match action {
      ReminderAction::AddPicker => return Ok(Reply::screen(self.add_picker(&settings))),
      ReminderAction::ToggleEnabled => {
        settings.enabled = !settings.enabled;
        store
          .set(user_id, Field::RemindersEnabled, PrefValue::Toggle(settings.enabled))
          .await?;
        format!("🔔 Reminders turned {}.", on_off(settings.enabled))
      },
      ReminderAction::ToggleSound => {
        settings.sound = !settings.sound;
        store
          .set(user_id, Field::ReminderSound, PrefValue::Toggle(settings.sound))
          .await?;
        format!("🔊 Reminder sound turned {}.", on_off(settings.sound))
      },
      ReminderAction::Add(minutes) if settings.offsets.contains(&minutes) => {
        format!("ℹ️ A reminder {minutes} min before the shift already exists.")
      },
      ReminderAction::Add(_) if settings.offsets.len() >= MAX_REMINDER_OFFSETS => {
        format!("⚠️ At most {MAX_REMINDER_OFFSETS} reminders are supported.")
      },
      ReminderAction::Add(minutes) => {
        settings.offsets.push(minutes);
        settings.offsets.sort_unstable_by(|a, b| b.cmp(a));
        self.store_offsets(store, user_id, &settings).await?;
        format!("✅ Added a reminder {minutes} min before the shift.")
      },
      ReminderAction::Remove(minutes) if !settings.offsets.contains(&minutes) => {
        format!("❓ No reminder {minutes} min before the shift.")
      },
      ReminderAction::Remove(_) if settings.offsets.len() == 1 => {
        "⚠️ Keep at least one reminder time. Turn reminders off to stop them.".to_string()
      },
      ReminderAction::Remove(minutes) => {
        settings.offsets.retain(|existing| *existing != minutes);
        self.store_offsets(store, user_id, &settings).await?;
        format!("🗑️ Removed the reminder {minutes} min before the shift.")
      },
    };
    info!(user_id, action = ?action, "reminder settings changed");
    Ok(Reply::screen(self.menu(&settings).with_notice(&notice)))
  }

  async fn store_offsets(
    &self,
    store: &dyn PreferenceStore,
    user_id: UserId,
    settings: &ReminderSettings,
  ) -> Result<(), StoreError> {
    store
      .set(user_id, Field::ReminderOffsets, PrefValue::Offsets(settings.offsets.clone()))
      .await
  }
}

#[async_trait]
impl CategoryHandler for RemindersHandler {
  fn category(&self) -> Category {
    Category::Reminders
  }

  async fn render_menu(&self, store: &dyn PreferenceStore, user_id: UserId) -> Result<RenderInstruction, StoreError> {
    let settings = ReminderSettings::load(store, user_id).await?;
    Ok(self.menu(&settings))
  }

  async fn summary(&self, store: &dyn PreferenceStore, user_id: UserId) -> Result<String, StoreError> {
    let settings = ReminderSettings::load(store, user_id).await?;
    if !settings.enabled {
      return Ok(format!("{}: off", Category::Reminders.title()));
    }
    Ok(format!(
      "{}: {} (sound {})",
      Category::Reminders.title(),
      PrefValue::Offsets(settings.offsets),
      on_off(settings.sound)
    ))
  }

  async fn handle_extra(
    &self,
    store: &dyn PreferenceStore,
    user_id: UserId,
    action: &str,
  ) -> Option<Result<Reply, StoreError>> {
    let action = ReminderAction::parse(action)?;
    Some(self.apply(store, user_id, action).await)
  }
}

#[cfg(test)]
mod tests {
  use super::ReminderAction;
  use super::RemindersHandler;
  use crate::bot::categories::CategoryHandler;
  use crate::bot::state::ConversationState;
  use crate::models::Category;
  use crate::models::Defaults;
  use crate::models::Field;
  use crate::models::PrefValue;
  use crate::store::MemoryStore;
  use crate::store::PreferenceStore;

  #[test]
  fn parses_reminder_actions() {
    assert_eq!(ReminderAction::parse("toggle_sound"), Some(ReminderAction::ToggleSound));
    assert_eq!(ReminderAction::parse("add_45"), Some(ReminderAction::Add(45)));
    assert_eq!(ReminderAction::parse("remove_15"), Some(ReminderAction::Remove(15)));
    assert_eq!(ReminderAction::parse("add_0"), None);
    assert_eq!(ReminderAction::parse("remove_x"), None);
    assert_eq!(ReminderAction::parse("snooze"), None);
  }

  #[test]
  fn toggles_are_not_text_editable() {
    assert_eq!(RemindersHandler.editable_field("reminders_enabled"), None);
    assert_eq!(RemindersHandler.editable_field("reminder_offsets"), Some(Field::ReminderOffsets));
  }

  #[tokio::test]
  async fn toggling_flips_stored_flag() {
    let store = MemoryStore::new(Defaults::default());
    let (state, reply) = RemindersHandler
      .handle_callback(&store, 1, "toggle_enabled", ConversationState::idle())
      .await;

    assert_eq!(state, ConversationState::browsing(Category::Reminders));
    assert_eq!(store.get(1, Field::RemindersEnabled).await.unwrap(), PrefValue::Toggle(false));
    let screen = reply.last().unwrap();
    assert!(screen.text.contains("Status: off"));
    assert!(screen.has_button("reminders:toggle_enabled"));
  }

  #[tokio::test]
  async fn adds_and_removes_offsets() {
    let store = MemoryStore::new(Defaults::default());
    RemindersHandler
      .handle_callback(&store, 1, "add_60", ConversationState::idle())
      .await;
    assert_eq!(
      store.get(1, Field::ReminderOffsets).await.unwrap(),
      PrefValue::Offsets(vec![60, 30, 15])
    );

    let (_, reply) = RemindersHandler
      .handle_callback(&store, 1, "remove_30", ConversationState::idle())
      .await;
    assert_eq!(
      store.get(1, Field::ReminderOffsets).await.unwrap(),
      PrefValue::Offsets(vec![60, 15])
    );
    assert!(reply.last().unwrap().has_button("reminders:remove_60"));
  }

  #[tokio::test]
  async fn duplicate_offset_is_reported_not_stored() {
    let store = MemoryStore::new(Defaults::default());
    let (_, reply) = RemindersHandler
      .handle_callback(&store, 1, "add_30", ConversationState::idle())
      .await;
    assert!(reply.last().unwrap().text.contains("already exists"));
    assert_eq!(
      store.get(1, Field::ReminderOffsets).await.unwrap(),
      PrefValue::Offsets(vec![30, 15])
    );
  }

  #[tokio::test]
  async fn last_offset_cannot_be_removed() {
    let store = MemoryStore::new(Defaults::default());
    RemindersHandler
      .handle_callback(&store, 1, "remove_30", ConversationState::idle())
      .await;
    let (state, reply) = RemindersHandler
      .handle_callback(&store, 1, "remove_15", ConversationState::idle())
      .await;

    assert_eq!(state, ConversationState::browsing(Category::Reminders));
    assert_eq!(
      store.get(1, Field::ReminderOffsets).await.unwrap(),
      PrefValue::Offsets(vec![15])
    );
    let screen = reply.last().unwrap();
    assert!(screen.text.contains("at least one"));
    assert!(screen.has_button("reminders:remove_15"));
  }

  #[tokio::test]
  async fn add_picker_hides_existing_offsets() {
    let store = MemoryStore::new(Defaults::default());
    let (_, reply) = RemindersHandler
      .handle_callback(&store, 1, "add", ConversationState::idle())
      .await;
    let picker = reply.last().unwrap();
    assert!(picker.has_button("reminders:add_5"));
    assert!(!picker.has_button("reminders:add_30"));
    assert!(picker.has_button("reminders:edit_reminder_offsets"));
  }
}
