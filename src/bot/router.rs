use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bot::categories::CategoryHandler;
use crate::bot::categories::RemindersHandler;
use crate::bot::categories::ShiftTimesHandler;
use crate::bot::categories::TimezoneHandler;
use crate::bot::render;
use crate::bot::render::Reply;
use crate::bot::state::ConversationState;
use crate::models::Category;
use crate::models::UserId;
use crate::store::PreferenceStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
  pub user_id: UserId,
  pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEvent {
  pub user_id: UserId,
  pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Navigation {
  MainMenu,
  Preferences,
  Availability,
  Docs,
  Help,
  ResetAll,
}

impl Navigation {
  fn from_token(token: &str) -> Option<Self> {
    match token {
      render::MAIN_MENU_TOKEN => Some(Self::MainMenu),
      render::PREFERENCES_MENU_TOKEN => Some(Self::Preferences),
      render::AVAILABILITY_MENU_TOKEN => Some(Self::Availability),
      render::DOCS_MENU_TOKEN => Some(Self::Docs),
      render::HELP_TOKEN => Some(Self::Help),
      render::RESET_ALL_TOKEN => Some(Self::ResetAll),
      _ => None,
    }
  }
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
  Category(Category, &'a str),
  Navigation(Navigation),
  Unknown,
}

/// Category namespaces win over top-level tokens.
fn route(data: &str) -> Route<'_> {
  let data = data.trim();
  if let Some((namespace, action)) = data.split_once(':') {
    return match Category::from_namespace(namespace) {
      Some(category) => Route::Category(category, action),
      None => Route::Unknown,
    };
  }
  for category in Category::ALL {
    let Some(rest) = data.strip_prefix(category.namespace()) else {
      continue;
    };
    if rest.is_empty() {
      return Route::Category(category, "");
    }
    if let Some(action) = rest.strip_prefix('_') {
      return Route::Category(category, action);
    }
  }
  Navigation::from_token(data).map_or(Route::Unknown, Route::Navigation)
}

type Session = Arc<Mutex<ConversationState>>;

/// Owns every user's conversation state and funnels all mutation through
/// `handle_callback` and `handle_text`. Events for one user are serialized
/// by that user's session lock; different users never contend.
pub struct Router {
  store: Arc<dyn PreferenceStore>,
  sessions: Mutex<HashMap<UserId, Session>>,
  shift_times: ShiftTimesHandler,
  reminders: RemindersHandler,
  timezone: TimezoneHandler,
}

impl Router {
  pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
    Self {
      store,
      sessions: Mutex::new(HashMap::new()),
      shift_times: ShiftTimesHandler,
      reminders: RemindersHandler,
      timezone: TimezoneHandler,
    }
  }

  fn handler(&self, category: Category) -> &dyn CategoryHandler {
    match category {
      Category::ShiftTimes => &self.shift_times,
      Category::Reminders => &self.reminders,
      Category::Timezone => &self.timezone,
    }
  }

  async fn session(&self, user_id: UserId) -> Session {
    let mut sessions = self.sessions.lock().await;
    sessions.entry(user_id).or_default().clone()
  }

  /// Snapshot of a user's state; users never seen are idle.
  pub async fn state_of(&self, user_id: UserId) -> ConversationState {
    let session = self.sessions.lock().await.get(&user_id).cloned();
    match session {
      Some(session) => *session.lock().await,
      None => ConversationState::idle(),
    }
  }

  #[instrument(skip(self, event), fields(user_id = event.user_id, callback = %event.data))]
  pub async fn handle_callback(&self, event: CallbackEvent) -> Reply {
    let session = self.session(event.user_id).await;
    let reply = {
      let mut state = session.lock().await;
      ensure_consistent(event.user_id, &mut state);
      self.dispatch_callback(&event, &mut state).await
    };
    self.release_if_idle(event.user_id, session).await;
    reply
  }

  #[instrument(skip(self, event), fields(user_id = event.user_id))]
  pub async fn handle_text(&self, event: TextEvent) -> Reply {
    let session = self.session(event.user_id).await;
    let reply = {
      let mut state = session.lock().await;
      ensure_consistent(event.user_id, &mut state);
      self.dispatch_text(&event, &mut state).await
    };
    self.release_if_idle(event.user_id, session).await;
    reply
  }

  async fn dispatch_callback(&self, event: &CallbackEvent, state: &mut ConversationState) -> Reply {
    match route(&event.data) {
      Route::Category(category, action) => {
        let (next, reply) = self
          .handler(category)
          .handle_callback(self.store.as_ref(), event.user_id, action, *state)
          .await;
        debug_assert!(next.is_consistent(), "handler produced inconsistent state {next:?}");
        *state = next;
        reply
      },
      Route::Navigation(target) => {
        state.waiting_field = None;
        self.navigate(event.user_id, target, state).await
      },
      Route::Unknown => {
        warn!(user_id = event.user_id, callback = %event.data, "unrecognized callback");
        Reply::screen(render::not_understood(&event.data))
      },
    }
  }

  async fn dispatch_text(&self, event: &TextEvent, state: &mut ConversationState) -> Reply {
    let (Some(category), Some(field)) = (state.active_category, state.waiting_field) else {
      info!(user_id = event.user_id, "text received with no pending field");
      return Reply::screen(render::unrecognized_text());
    };

    let (next, reply) = self
      .handler(category)
      .handle_text_input(self.store.as_ref(), event.user_id, field, &event.text, *state)
      .await;
    debug_assert!(next.is_consistent(), "handler produced inconsistent state {next:?}");
    *state = next;
    reply
  }

  /// Forgets an idle user's session unless another event already holds it.
  async fn release_if_idle(&self, user_id: UserId, session: Session) {
    let mut sessions = self.sessions.lock().await;
    let Some(current) = sessions.get(&user_id) else {
      return;
    };
    // New clones are only handed out under the map lock held here.
    if !Arc::ptr_eq(current, &session) || Arc::strong_count(&session) > 2 {
      return;
    }
    let idle = session
      .try_lock()
      .is_ok_and(|state| *state == ConversationState::idle());
    if idle {
      sessions.remove(&user_id);
    }
  }

  async fn navigate(&self, user_id: UserId, target: Navigation, state: &mut ConversationState) -> Reply {
    info!(user_id, target = ?target, "navigating");
    match target {
      Navigation::MainMenu => Reply::screen(render::main_menu()),
      Navigation::Preferences => Reply::screen(render::preferences_menu(self.summary(user_id).await.as_deref())),
      Navigation::Availability => Reply::screen(render::availability_menu()),
      Navigation::Docs => Reply::screen(render::docs_menu()),
      Navigation::Help => Reply::screen(render::help()),
      Navigation::ResetAll => match self.store.reset_all(user_id).await {
        Ok(()) => {
          info!(user_id, "all preferences reset to defaults");
          *state = ConversationState::idle();
          Reply::screen(render::RenderInstruction::new("↩️ All preferences were reset to their defaults.")).then(
            render::preferences_menu(self.summary(user_id).await.as_deref()),
          )
        },
        Err(err) => {
          warn!(user_id, error = %err, "failed to reset preferences");
          Reply::screen(render::store_failure(render::PREFERENCES_MENU_TOKEN))
        },
      },
    }
  }

  /// Overview of every category; `None` when the store cannot be read.
  async fn summary(&self, user_id: UserId) -> Option<String> {
    let mut parts = Vec::with_capacity(Category::ALL.len());
    for category in Category::ALL {
      match self.handler(category).summary(self.store.as_ref(), user_id).await {
        Ok(part) => parts.push(part),
        Err(err) => {
          warn!(user_id, category = category.namespace(), error = %err, "failed to load summary");
          return None;
        },
      }
    }
    Some(parts.join("\n\n"))
  }
}

/// A pending field without its owning category is a defect: panic in debug
/// builds, log and fall back to idle otherwise.
fn ensure_consistent(user_id: UserId, state: &mut ConversationState) {
  if state.is_consistent() {
    return;
  }
  error!(user_id, state = ?*state, "conversation state invariant violated");
  if cfg!(debug_assertions) {
    panic!("conversation state invariant violated for user {user_id}: {state:?}");
  }
  *state = ConversationState::idle();
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::CallbackEvent;
  use super::Navigation;
  use super::Route;
  use super::Router;
  use super::TextEvent;
  use super::route;
  use crate::bot::render::Reply;
  use crate::bot::state::ConversationState;
  use crate::models::Category;
  use crate::models::Defaults;
  use crate::models::Field;
  use crate::models::PrefValue;
  use crate::models::TimeOfDay;
  use crate::store::MemoryStore;
  use crate::store::PreferenceStore;
  use crate::store::testing::CountingStore;
  use crate::store::testing::FailingStore;

  const USER: i64 = 42;

  fn router() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(Defaults::default()));
    (Router::new(store.clone()), store)
  }

  async fn press(router: &Router, data: &str) -> Reply {
    router
      .handle_callback(CallbackEvent {
        user_id: USER,
        data: data.to_string(),
      })
      .await
  }

  async fn send(router: &Router, text: &str) -> Reply {
    router
      .handle_text(TextEvent {
        user_id: USER,
        text: text.to_string(),
      })
      .await
  }

  #[test]
  fn routes_tokens_by_namespace() {
    assert_eq!(
      route("shift_times:edit_start_morning"),
      Route::Category(Category::ShiftTimes, "edit_start_morning")
    );
    assert_eq!(
      route("reminders_toggle_sound"),
      Route::Category(Category::Reminders, "toggle_sound")
    );
    assert_eq!(route("timezone"), Route::Category(Category::Timezone, ""));
    assert_eq!(route("menu_main"), Route::Navigation(Navigation::MainMenu));
    assert_eq!(route("preferences_menu"), Route::Navigation(Navigation::Preferences));
    assert_eq!(route("reset_all_preferences"), Route::Navigation(Navigation::ResetAll));
    assert_eq!(route("weather:today"), Route::Unknown);
    assert_eq!(route("timezones"), Route::Unknown);
    assert_eq!(route(""), Route::Unknown);
  }

  #[tokio::test]
  async fn successful_edit_persists_and_returns_to_menu() {
    let (router, store) = router();
    press(&router, "shift_times:edit_start_morning").await;
    assert_eq!(router.state_of(USER).await, ConversationState::waiting(Field::MorningStart));

    let reply = send(&router, "07:15").await;

    assert_eq!(
      store.get(USER, Field::MorningStart).await.unwrap(),
      PrefValue::Time(TimeOfDay { hour: 7, minute: 15 })
    );
    assert_eq!(router.state_of(USER).await, ConversationState::browsing(Category::ShiftTimes));
    assert_eq!(reply.screens.len(), 2);
    assert!(reply.screens[0].text.contains("07:15"));
    assert!(reply.screens[1].has_button("shift_times:edit_morning_start"));
  }

  #[tokio::test]
  async fn invalid_text_keeps_waiting_and_reprompts() {
    let (router, store) = router();
    press(&router, "shift_times:edit_start_morning").await;

    let reply = send(&router, "7am").await;

    assert_eq!(router.state_of(USER).await, ConversationState::waiting(Field::MorningStart));
    assert_eq!(
      store.get(USER, Field::MorningStart).await.unwrap(),
      Defaults::default().value_for(Field::MorningStart)
    );
    assert!(reply.screens[0].text.contains("HH:MM"));
    assert!(reply.last().unwrap().has_button("shift_times:cancel"));

    // No retry limit.
    for _ in 0 .. 5 {
      send(&router, "25:00").await;
    }
    assert_eq!(router.state_of(USER).await, ConversationState::waiting(Field::MorningStart));
    send(&router, "06:45").await;
    assert_eq!(router.state_of(USER).await, ConversationState::browsing(Category::ShiftTimes));
  }

  #[tokio::test]
  async fn last_edit_request_wins() {
    let (router, _) = router();
    press(&router, "shift_times:edit_morning_start").await;
    press(&router, "shift_times:edit_afternoon_start").await;
    assert_eq!(router.state_of(USER).await.waiting_field, Some(Field::NoonStart));

    press(&router, "timezone:edit_timezone").await;
    assert_eq!(router.state_of(USER).await, ConversationState::waiting(Field::Timezone));

    send(&router, "Europe/London").await;
    assert_eq!(router.state_of(USER).await, ConversationState::browsing(Category::Timezone));
  }

  #[tokio::test]
  async fn free_text_without_prompt_is_inert() {
    let store = Arc::new(CountingStore::new());
    let router = Router::new(store.clone());

    let reply = send(&router, "hello there").await;

    assert_eq!(store.calls(), 0);
    assert_eq!(router.state_of(USER).await, ConversationState::idle());
    assert!(reply.screens[0].has_button("menu_main"));
  }

  #[tokio::test]
  async fn unknown_callback_leaves_state_alone() {
    let (router, _) = router();
    press(&router, "reminders:edit_reminder_offsets").await;
    let before = router.state_of(USER).await;

    let reply = press(&router, "weather:today").await;
    press(&router, "reminders:snooze").await;
    press(&router, "shift_times:edit_lunch_start").await;

    assert_eq!(router.state_of(USER).await, before);
    assert!(reply.screens[0].text.contains("weather:today"));
  }

  #[tokio::test]
  async fn reset_defaults_restores_category_and_clears_prompt() {
    let (router, store) = router();
    press(&router, "shift_times:edit_evening_end").await;
    send(&router, "23:30").await;
    store
      .set(USER, Field::Timezone, PrefValue::Zone(chrono_tz::Asia::Tokyo))
      .await
      .unwrap();
    press(&router, "shift_times:edit_noon_end").await;

    let reply = press(&router, "shift_times:reset_defaults").await;

    for field in Category::ShiftTimes.fields() {
      assert_eq!(
        store.get(USER, *field).await.unwrap(),
        Defaults::default().value_for(*field)
      );
    }
    assert_eq!(
      store.get(USER, Field::Timezone).await.unwrap(),
      PrefValue::Zone(chrono_tz::Asia::Tokyo)
    );
    assert_eq!(router.state_of(USER).await, ConversationState::browsing(Category::ShiftTimes));
    assert_eq!(reply.screens.len(), 2);
  }

  #[tokio::test]
  async fn navigation_clears_pending_field() {
    let (router, _) = router();
    press(&router, "timezone:edit_timezone").await;

    let reply = press(&router, "preferences_menu").await;

    let state = router.state_of(USER).await;
    assert_eq!(state.waiting_field, None);
    assert!(state.is_consistent());
    assert!(reply.screens[0].text.contains("Jerusalem"));
  }

  #[tokio::test]
  async fn show_keeps_pending_field() {
    let (router, _) = router();
    press(&router, "reminders:edit_reminder_offsets").await;
    press(&router, "reminders:show").await;
    assert_eq!(router.state_of(USER).await, ConversationState::waiting(Field::ReminderOffsets));

    let reply = send(&router, "cancel").await;
    assert_eq!(router.state_of(USER).await, ConversationState::browsing(Category::Reminders));
    assert!(reply.screens[0].text.contains("cancelled"));
  }

  #[tokio::test]
  async fn store_failure_keeps_field_pending() {
    let router = Router::new(Arc::new(FailingStore));
    press(&router, "shift_times:edit_morning_start").await;

    let reply = send(&router, "07:15").await;

    assert_eq!(router.state_of(USER).await, ConversationState::waiting(Field::MorningStart));
    assert!(reply.screens[0].text.contains("Could not reach"));
    assert!(reply.last().unwrap().has_button("shift_times:cancel"));
  }

  #[tokio::test]
  async fn unreadable_store_is_reported_on_preferences_menu() {
    let router = Router::new(Arc::new(FailingStore));

    let reply = press(&router, "preferences_menu").await;

    assert!(reply.screens[0].text.contains("Could not load"));
    assert!(reply.screens[0].has_button("reset_all_preferences"));
  }

  #[tokio::test]
  async fn idle_sessions_are_dropped() {
    let (router, _) = router();
    send(&router, "hello").await;
    press(&router, "weather:today").await;
    assert!(router.sessions.lock().await.is_empty());

    press(&router, "timezone:edit_timezone").await;
    assert_eq!(router.sessions.lock().await.len(), 1);

    press(&router, "reset_all_preferences").await;
    assert!(router.sessions.lock().await.is_empty());
    assert_eq!(router.state_of(USER).await, ConversationState::idle());
  }

  #[tokio::test]
  async fn reset_all_returns_to_idle() {
    let (router, store) = router();
    press(&router, "reminders:toggle_sound").await;
    press(&router, "timezone:edit_timezone").await;

    press(&router, "reset_all_preferences").await;

    assert_eq!(router.state_of(USER).await, ConversationState::idle());
    assert_eq!(store.get(USER, Field::ReminderSound).await.unwrap(), PrefValue::Toggle(true));
  }

  #[tokio::test]
  async fn users_do_not_share_state() {
    let (router, _) = router();
    press(&router, "timezone:edit_timezone").await;

    let other = router
      .handle_text(TextEvent {
        user_id: USER + 1,
        text: "Europe/Paris".to_string(),
      })
      .await;

    assert_eq!(router.state_of(USER + 1).await, ConversationState::idle());
    assert_eq!(router.state_of(USER).await, ConversationState::waiting(Field::Timezone));
    assert!(other.screens[0].text.contains("did not understand"));
  }

  #[tokio::test]
  async fn invariant_holds_across_mixed_events() {
    let (router, _) = router();
    let script: [(&str, bool); 16] = [
      ("shift_times:edit_morning_start", true),
      ("bogus", false),
      ("reminders:edit_reminder_offsets", true),
      ("45, 10", false),
      ("timezone:page_3", true),
      ("timezone:edit_timezone", true),
      ("Not/AZone", false),
      ("menu_docs", true),
      ("stray text", false),
      ("shift_times_edit_end_noon", true),
      ("reminders:show", true),
      ("18:00", false),
      ("reminders:reset_defaults", true),
      ("timezone:set_Europe/Paris", true),
      ("reset_all_preferences", true),
      ("cancel", false),
    ];

    for (input, is_callback) in script {
      if is_callback {
        press(&router, input).await;
      } else {
        send(&router, input).await;
      }
      let state = router.state_of(USER).await;
      assert!(state.is_consistent(), "inconsistent after {input}: {state:?}");
    }
  }

  #[tokio::test]
  async fn concurrent_events_for_one_user_are_serialized() {
    let (router, store) = router();
    let router = Arc::new(router);
    press(&router, "reminders:edit_reminder_offsets").await;

    let tasks: Vec<_> = (0 .. 8)
      .map(|i| {
        let router = router.clone();
        tokio::spawn(async move {
          router
            .handle_callback(CallbackEvent {
              user_id: USER,
              data: format!("reminders:add_{}", 100 + i),
            })
            .await
        })
      })
      .collect();
    for task in tasks {
      task.await.unwrap();
    }

    let offsets = store.get(USER, Field::ReminderOffsets).await.unwrap();
    assert_eq!(offsets.as_offsets().unwrap().len(), 5);
    assert!(router.state_of(USER).await.is_consistent());
  }

  #[cfg(debug_assertions)]
  #[tokio::test]
  #[should_panic(expected = "invariant violated")]
  async fn orphaned_pending_field_fails_loudly() {
    let (router, _) = router();
    router.sessions.lock().await.insert(
      USER,
      Arc::new(tokio::sync::Mutex::new(ConversationState {
        active_category: None,
        waiting_field: Some(Field::Timezone),
      })),
    );
    send(&router, "Europe/Paris").await;
  }
}
