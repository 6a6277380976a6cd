use async_trait::async_trait;
use chrono::TimeDelta;

use super::CategoryHandler;
use super::token;
use crate::bot::render::Button;
use crate::bot::render::PREFERENCES_MENU_TOKEN;
use crate::bot::render::RenderInstruction;
use crate::models::Category;
use crate::models::Field;
use crate::models::Shift;
use crate::models::TimeOfDay;
use crate::models::UserId;
use crate::models::shift_length;
use crate::store::PreferenceStore;
use crate::store::StoreError;

pub struct ShiftTimesHandler;

impl ShiftTimesHandler {
  async fn window(
    &self,
    store: &dyn PreferenceStore,
    user_id: UserId,
    shift: Shift,
  ) -> Result<(TimeOfDay, TimeOfDay), StoreError> {
    let start = store.get(user_id, shift.start_field()).await?;
    let end = store.get(user_id, shift.end_field()).await?;
    Ok((start.as_time().unwrap_or_default(), end.as_time().unwrap_or_default()))
  }

  async fn lines(&self, store: &dyn PreferenceStore, user_id: UserId) -> Result<Vec<String>, StoreError> {
    let mut lines = Vec::with_capacity(Shift::ALL.len());
    for shift in Shift::ALL {
      let (start, end) = self.window(store, user_id, shift).await?;
      lines.push(format!(
        "• {} {}: {start}-{end} ({})",
        shift.emoji(),
        shift.label(),
        format_length(shift_length(start, end))
      ));
    }
    Ok(lines)
  }
}

#[async_trait]
impl CategoryHandler for ShiftTimesHandler {
  fn category(&self) -> Category {
    Category::ShiftTimes
  }

  async fn render_menu(&self, store: &dyn PreferenceStore, user_id: UserId) -> Result<RenderInstruction, StoreError> {
    let lines = self.lines(store, user_id).await?;
    let text = format!(
      "{}\n\n{}\n\nPick a time to change:",
      Category::ShiftTimes.title(),
      lines.join("\n")
    );

    let mut screen = RenderInstruction::new(text);
    for shift in Shift::ALL {
      screen = screen.row(vec![
        Button::new(
          format!("{} {} start", shift.emoji(), shift.label()),
          token(Category::ShiftTimes, &format!("edit_{}", shift.start_field().key())),
        ),
        Button::new(
          format!("{} {} end", shift.emoji(), shift.label()),
          token(Category::ShiftTimes, &format!("edit_{}", shift.end_field().key())),
        ),
      ]);
    }
    Ok(
      screen
        .button("↩️ Reset to defaults", token(Category::ShiftTimes, "reset_defaults"))
        .button("⬅️ Preferences", PREFERENCES_MENU_TOKEN),
    )
  }

  async fn summary(&self, store: &dyn PreferenceStore, user_id: UserId) -> Result<String, StoreError> {
    let lines = self.lines(store, user_id).await?;
    Ok(format!("{}\n{}", Category::ShiftTimes.title(), lines.join("\n")))
  }

  /// Accepts `morning_start` as well as the older `start_morning` order.
  /// `afternoon` is an alias for the noon shift.
  fn editable_field(&self, target: &str) -> Option<Field> {
    let target = target.replace("afternoon", "noon");
    if let Some(field) = Field::from_key(&target).filter(|field| field.category() == Category::ShiftTimes) {
      return Some(field);
    }
    let (bound, shift) = target.split_once('_')?;
    let shift = Shift::ALL.into_iter().find(|candidate| candidate.key() == shift)?;
    match bound {
      "start" => Some(shift.start_field()),
      "end" => Some(shift.end_field()),
      _ => None,
    }
  }
}

fn format_length(length: TimeDelta) -> String {
  let hours = length.num_hours();
  let minutes = length.num_minutes() % 60;
  if minutes == 0 {
    format!("{hours}h")
  } else {
    format!("{hours}h {minutes}m")
  }
}
