use async_trait::async_trait;
use tracing::info;
use tracing::warn;

use crate::bot::render::Button;
use crate::bot::render::PREFERENCES_MENU_TOKEN;
use crate::bot::render::RenderInstruction;
use crate::bot::render::Reply;
use crate::bot::render::not_understood;
use crate::bot::render::store_failure;
use crate::bot::state::ConversationState;
use crate::models::Category;
use crate::models::Field;
use crate::models::PrefValue;
use crate::models::UserId;
use crate::store::PreferenceStore;
use crate::store::StoreError;
use crate::validate::validate;

pub mod reminders;
pub mod shift_times;
pub mod timezone;

pub use reminders::RemindersHandler;
pub use shift_times::ShiftTimesHandler;
pub use timezone::TimezoneHandler;

/// Actions every category understands.
#[derive(Debug, PartialEq, Eq)]
enum CommonAction<'a> {
  Show,
  Edit(&'a str),
  Cancel,
  ResetDefaults,
  Other(&'a str),
}

impl<'a> CommonAction<'a> {
  fn parse(category: Category, action: &'a str) -> Self {
    if action.is_empty() || action == "show" {
      return Self::Show;
    }
    if action.strip_prefix("show_") == Some(category.namespace()) {
      return Self::Show;
    }
    match action {
      "cancel" => Self::Cancel,
      "reset_defaults" => Self::ResetDefaults,
      _ => match action.strip_prefix("edit_") {
        Some(target) => Self::Edit(target),
        None => Self::Other(action),
      },
    }
  }
}

#[async_trait]
pub trait CategoryHandler: Send + Sync {
  fn category(&self) -> Category;

  async fn render_menu(&self, store: &dyn PreferenceStore, user_id: UserId) -> Result<RenderInstruction, StoreError>;

  /// One or more lines for the preferences overview.
  async fn summary(&self, store: &dyn PreferenceStore, user_id: UserId) -> Result<String, StoreError>;

  /// Field addressed by the part of an `edit_` action after the prefix.
  fn editable_field(&self, target: &str) -> Option<Field> {
    Field::from_key(target).filter(|field| field.category() == self.category() && field.is_text_editable())
  }

  /// Category-specific buttons. `None` means the action is not known here.
  async fn handle_extra(
    &self,
    _store: &dyn PreferenceStore,
    _user_id: UserId,
    _action: &str,
  ) -> Option<Result<Reply, StoreError>> {
    None
  }

  async fn handle_callback(
    &self,
    store: &dyn PreferenceStore,
    user_id: UserId,
    action: &str,
    state: ConversationState,
  ) -> (ConversationState, Reply) {
    let category = self.category();
    match CommonAction::parse(category, action) {
      CommonAction::Show => {
        let next = if state.waiting_field.is_none() {
          ConversationState::browsing(category)
        } else {
          state
        };
        (next, self.menu_reply(store, user_id).await)
      },
      CommonAction::Edit(target) => match self.editable_field(target) {
        Some(field) => {
          if let Some(pending) = state.waiting_field
            && pending != field
          {
            info!(user_id, pending = %pending, field = %field, "replacing pending edit");
          }
          let current = current_value(store, user_id, field).await;
          info!(user_id, field = %field, "waiting for text input");
          (ConversationState::waiting(field), Reply::screen(prompt(field, current.as_ref())))
        },
        None => {
          warn!(user_id, category = category.namespace(), action, "edit target not recognized");
          (state, Reply::screen(not_understood(&token(category, action))))
        },
      },
      CommonAction::Cancel => {
        info!(user_id, category = category.namespace(), "pending edit cancelled");
        (ConversationState::browsing(category), self.menu_reply(store, user_id).await)
      },
      CommonAction::ResetDefaults => match store.reset(user_id, category.fields()).await {
        Ok(()) => {
          info!(user_id, category = category.namespace(), "category reset to defaults");
          let confirmation = RenderInstruction::new(format!("↩️ {} reset to defaults.", category.title()));
          let reply = Reply::screen(confirmation).extend(self.menu_reply(store, user_id).await);
          (ConversationState::browsing(category), reply)
        },
        Err(err) => {
          warn!(user_id, category = category.namespace(), error = %err, "failed to reset category");
          (state, Reply::screen(store_failure(&token(category, "show"))))
        },
      },
      CommonAction::Other(extra) => match self.handle_extra(store, user_id, extra).await {
        Some(Ok(reply)) => (ConversationState::browsing(category), reply),
        Some(Err(err)) => {
          warn!(user_id, category = category.namespace(), action = extra, error = %err, "category action failed");
          (state, Reply::screen(store_failure(&token(category, "show"))))
        },
        None => {
          warn!(user_id, category = category.namespace(), action = extra, "unrecognized category action");
          (state, Reply::screen(not_understood(&token(category, extra))))
        },
      },
    }
  }

  async fn handle_text_input(
    &self,
    store: &dyn PreferenceStore,
    user_id: UserId,
    field: Field,
    text: &str,
    state: ConversationState,
  ) -> (ConversationState, Reply) {
    let category = self.category();
    let text = text.trim();
    if text.eq_ignore_ascii_case("cancel") {
      info!(user_id, field = %field, "pending edit cancelled by text");
      let reply = Reply::screen(RenderInstruction::new("❌ Edit cancelled.")).extend(self.menu_reply(store, user_id).await);
      return (ConversationState::browsing(category), reply);
    }

    let value = match validate(field.kind(), text) {
      Ok(value) => value,
      Err(reason) => {
        info!(user_id, field = %field, reason = %reason, "rejected text input");
        let error = RenderInstruction::new(format!("❌ {reason}.\n\n{}", field.kind().format_hint()));
        let current = current_value(store, user_id, field).await;
        return (state, Reply::screen(error).then(prompt(field, current.as_ref())));
      },
    };

    let shown = value.to_string();
    if let Err(err) = store.set(user_id, field, value).await {
      warn!(user_id, field = %field, error = %err, "failed to persist preference");
      let reply = Reply::screen(store_failure(&token(category, "show"))).then(prompt(field, None));
      return (state, reply);
    }

    info!(user_id, field = %field, value = %shown, "preference updated");
    let confirmation = RenderInstruction::new(format!("✅ {} set to {shown}.", field.label()));
    let reply = Reply::screen(confirmation).extend(self.menu_reply(store, user_id).await);
    (ConversationState::browsing(category), reply)
  }

  async fn menu_reply(&self, store: &dyn PreferenceStore, user_id: UserId) -> Reply {
    match self.render_menu(store, user_id).await {
      Ok(menu) => Reply::screen(menu),
      Err(err) => {
        warn!(user_id, category = self.category().namespace(), error = %err, "failed to render category menu");
        Reply::screen(store_failure(PREFERENCES_MENU_TOKEN))
      },
    }
  }
}

pub fn token(category: Category, action: &str) -> String {
  format!("{}:{action}", category.namespace())
}

/// Request for a new value of `field`, with a way out.
pub fn prompt(field: Field, current: Option<&PrefValue>) -> RenderInstruction {
  let mut text = format!("✏️ {}\n\n", field.label());
  if let Some(current) = current {
    text.push_str(&format!("Current value: {current}\n\n"));
  }
  text.push_str(field.kind().format_hint());
  text.push_str("\nType cancel to stop.");
  RenderInstruction::new(text).button("❌ Cancel", token(field.category(), "cancel"))
}

async fn current_value(store: &dyn PreferenceStore, user_id: UserId, field: Field) -> Option<PrefValue> {
  match store.get(user_id, field).await {
    Ok(value) => Some(value),
    Err(err) => {
      warn!(user_id, field = %field, error = %err, "could not load current value for prompt");
      None
    },
  }
}

/// Lays buttons out two per row.
pub fn pairs(buttons: Vec<Button>) -> Vec<Vec<Button>> {
  let mut rows = Vec::new();
  let mut iter = buttons.into_iter();
  while let Some(first) = iter.next() {
    let mut row = vec![first];
    row.extend(iter.next());
    rows.push(row);
  }
  rows
}
