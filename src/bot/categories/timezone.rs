use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::America;
use chrono_tz::Asia;
use chrono_tz::Europe;
use chrono_tz::TZ_VARIANTS;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
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
use crate::validate::validate_timezone;

pub const ZONES_PER_PAGE: usize = 8;

const COMMON_ZONES: [(Tz, &str); 7] = [
  (Asia::Jerusalem, "Jerusalem (Israel)"),
  (Europe::London, "London (GMT)"),
  (Europe::Paris, "Paris (CET)"),
  (America::New_York, "New York (EST)"),
  (America::Los_Angeles, "Los Angeles (PST)"),
  (Asia::Dubai, "Dubai (GST)"),
  (Asia::Tokyo, "Tokyo (JST)"),
];

static SORTED_ZONES: Lazy<Vec<Tz>> = Lazy::new(|| {
  let mut zones = TZ_VARIANTS.to_vec();
  zones.sort_by_key(|tz| tz.name());
  zones
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimezoneAction {
  Common,
  Page(usize),
  Set(Tz),
}

impl TimezoneAction {
  fn parse(action: &str) -> Option<Self> {
    if action == "common" {
      return Some(Self::Common);
    }
    if let Some(page) = action.strip_prefix("page_") {
      return page.parse().ok().map(Self::Page);
    }
    let zone = action.strip_prefix("set_")?;
    validate_timezone(zone).ok().map(Self::Set)
  }
}

fn display_name(tz: Tz) -> &'static str {
  COMMON_ZONES
    .iter()
    .find(|(zone, _)| *zone == tz)
    .map(|(_, label)| *label)
    .unwrap_or_else(|| tz.name())
}

fn zone_button(tz: Tz, label: &str, current: Tz) -> Button {
  let mark = if tz == current { "✅ " } else { "" };
  Button::new(
    format!("{mark}{label}"),
    token(Category::Timezone, &format!("set_{}", tz.name())),
  )
}

pub fn page_count() -> usize {
  SORTED_ZONES.len().div_ceil(ZONES_PER_PAGE)
}

pub struct TimezoneHandler;

impl TimezoneHandler {
  async fn current(&self, store: &dyn PreferenceStore, user_id: UserId) -> Result<Tz, StoreError> {
    let value = store.get(user_id, Field::Timezone).await?;
    Ok(value.as_zone().unwrap_or(Tz::UTC))
  }

  fn menu(&self, current: Tz) -> RenderInstruction {
    let local_time = Utc::now().with_timezone(&current).format("%H:%M");
    let text = format!(
      "{}\n\nCurrent timezone: {}\nLocal time: {local_time}\n\nPick a zone or type one, for example America/New_York.",
      Category::Timezone.title(),
      display_name(current),
    );
    RenderInstruction::new(text)
      .row(vec![
        Button::new("🌍 Common zones", token(Category::Timezone, "common")),
        Button::new("🗺️ All zones", token(Category::Timezone, "page_0")),
      ])
      .button(
        "✏️ Type a zone",
        token(Category::Timezone, &format!("edit_{}", Field::Timezone.key())),
      )
      .button("↩️ Reset to defaults", token(Category::Timezone, "reset_defaults"))
      .button("⬅️ Preferences", PREFERENCES_MENU_TOKEN)
  }

  fn common_list(&self, current: Tz) -> RenderInstruction {
    let buttons = COMMON_ZONES
      .iter()
      .map(|(tz, label)| zone_button(*tz, label, current))
      .collect();
    let mut screen = RenderInstruction::new("🌍 Common timezones\n\nPick a zone:");
    for row in pairs(buttons) {
      screen = screen.row(row);
    }
    screen.button("⬅️ Back", token(Category::Timezone, "show"))
  }

  fn page(&self, page: usize, current: Tz) -> RenderInstruction {
    let pages = page_count();
    let page = page.min(pages.saturating_sub(1));
    let buttons = SORTED_ZONES
      .iter()
      .skip(page * ZONES_PER_PAGE)
      .take(ZONES_PER_PAGE)
      .map(|tz| zone_button(*tz, &tz.name().replace('_', " "), current))
      .collect();

    let mut screen = RenderInstruction::new(format!(
      "🗺️ All timezones\n\nPage {} of {pages}. Pick a zone:",
      page + 1
    ));
    for row in pairs(buttons) {
      screen = screen.row(row);
    }

    let mut navigation = Vec::new();
    if page > 0 {
      navigation.push(Button::new(
        "⬅️ Previous",
        token(Category::Timezone, &format!("page_{}", page - 1)),
      ));
    }
    if page + 1 < pages {
      navigation.push(Button::new(
        "Next ➡️",
        token(Category::Timezone, &format!("page_{}", page + 1)),
      ));
    }
    screen
      .row(navigation)
      .button("⬅️ Back", token(Category::Timezone, "show"))
  }

  async fn apply(
    &self,
    store: &dyn PreferenceStore,
    user_id: UserId,
    action: TimezoneAction,
  ) -> Result<Reply, StoreError> {
    match action {
      TimezoneAction::Common => {
        let current = self.current(store, user_id).await?;
        Ok(Reply::screen(self.common_list(current)))
      },
      TimezoneAction::Page(page) => {
        let current = self.current(store, user_id).await?;
        Ok(Reply::screen(self.page(page, current)))
      },
      TimezoneAction::Set(tz) => {
        store.set(user_id, Field::Timezone, PrefValue::Zone(tz)).await?;
        info!(user_id, timezone = tz.name(), "timezone picked");
        let notice = format!("✅ Timezone set to {}.", display_name(tz));
        Ok(Reply::screen(self.menu(tz).with_notice(&notice)))
      },
    }
  }
}

#[async_trait]
impl CategoryHandler for TimezoneHandler {
  fn category(&self) -> Category {
    Category::Timezone
  }

  async fn render_menu(&self, store: &dyn PreferenceStore, user_id: UserId) -> Result<RenderInstruction, StoreError> {
    let current = self.current(store, user_id).await?;
    Ok(self.menu(current))
  }

  async fn summary(&self, store: &dyn PreferenceStore, user_id: UserId) -> Result<String, StoreError> {
    let current = self.current(store, user_id).await?;
    Ok(format!("{}: {}", Category::Timezone.title(), display_name(current)))
  }

  async fn handle_extra(
    &self,
    store: &dyn PreferenceStore,
    user_id: UserId,
    action: &str,
  ) -> Option<Result<Reply, StoreError>> {
    let action = TimezoneAction::parse(action)?;
    Some(self.apply(store, user_id, action).await)
  }
}
