use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
  pub label: String,
  pub data: String,
}

impl Button {
  pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
    Self {
      label: label.into(),
      data: data.into(),
    }
  }
}

/// One screen: message text plus rows of inline buttons.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderInstruction {
  pub text: String,
  pub buttons: Vec<Vec<Button>>,
}

impl RenderInstruction {
  pub fn new(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      buttons: Vec::new(),
    }
  }

  pub fn row(mut self, row: Vec<Button>) -> Self {
    if !row.is_empty() {
      self.buttons.push(row);
    }
    self
  }

  pub fn button(self, label: impl Into<String>, data: impl Into<String>) -> Self {
    self.row(vec![Button::new(label, data)])
  }

  pub fn keyboard(&self) -> Option<InlineKeyboardMarkup> {
    if self.buttons.is_empty() {
      return None;
    }
    let rows = self.buttons.iter().map(|row| {
      row
        .iter()
        .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.data.clone()))
        .collect::<Vec<_>>()
    });
    Some(InlineKeyboardMarkup::new(rows))
  }

  /// Puts a short status line above the screen text.
  pub fn with_notice(mut self, notice: &str) -> Self {
    self.text = format!("{notice}\n\n{}", self.text);
    self
  }

  pub fn has_button(&self, data: &str) -> bool {
    self.buttons.iter().flatten().any(|button| button.data == data)
  }
}

/// Screens produced for one event, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
  pub screens: Vec<RenderInstruction>,
}

impl Reply {
  pub fn screen(screen: RenderInstruction) -> Self {
    Self { screens: vec![screen] }
  }

  pub fn then(mut self, screen: RenderInstruction) -> Self {
    self.screens.push(screen);
    self
  }

  pub fn extend(mut self, other: Reply) -> Self {
    self.screens.extend(other.screens);
    self
  }

  pub fn last(&self) -> Option<&RenderInstruction> {
    self.screens.last()
  }
}

pub const MAIN_MENU_TOKEN: &str = "menu_main";
pub const PREFERENCES_MENU_TOKEN: &str = "preferences_menu";
pub const AVAILABILITY_MENU_TOKEN: &str = "menu_availability";
pub const DOCS_MENU_TOKEN: &str = "menu_docs";
pub const HELP_TOKEN: &str = "menu_help";
pub const RESET_ALL_TOKEN: &str = "reset_all_preferences";

pub fn main_menu() -> RenderInstruction {
  RenderInstruction::new("🤖 Shifts bot\n\nChoose an option:")
    .row(vec![
      Button::new("⚙️ Preferences", PREFERENCES_MENU_TOKEN),
      Button::new("📅 Availability", AVAILABILITY_MENU_TOKEN),
    ])
    .row(vec![
      Button::new("📝 Shift log", DOCS_MENU_TOKEN),
      Button::new("❓ Help", HELP_TOKEN),
    ])
}

pub fn preferences_menu(summary: Option<&str>) -> RenderInstruction {
  let mut text = String::from("⚙️ Preferences\n\nChoose what to change:\n\n");
  match summary {
    Some(summary) => text.push_str(summary),
    None => text.push_str("⚠️ Could not load your current settings right now."),
  }
  RenderInstruction::new(text)
    .row(vec![
      Button::new("⏰ Shift times", "shift_times:show"),
      Button::new("🔔 Reminders", "reminders:show"),
    ])
    .row(vec![
      Button::new("🌍 Timezone", "timezone:show"),
      Button::new("↩️ Reset everything", RESET_ALL_TOKEN),
    ])
    .button("⬅️ Main menu", MAIN_MENU_TOKEN)
}

pub fn availability_menu() -> RenderInstruction {
  RenderInstruction::new("📅 Availability\n\nAvailability checks are not available in this bot yet.")
    .button("⬅️ Main menu", MAIN_MENU_TOKEN)
}

pub fn docs_menu() -> RenderInstruction {
  RenderInstruction::new("📝 Shift log\n\nShift logging is not available in this bot yet.")
    .button("⬅️ Main menu", MAIN_MENU_TOKEN)
}

pub fn help() -> RenderInstruction {
  RenderInstruction::new(
    "❓ Help\n\n\
     • Preferences: shift times, reminders and timezone\n\
     • Press an edit button, then reply with the new value\n\
     • Type cancel to abandon a pending edit\n\n\
     Use /start to return to the main menu.",
  )
  .button("⬅️ Main menu", MAIN_MENU_TOKEN)
}

pub fn not_understood(data: &str) -> RenderInstruction {
  RenderInstruction::new(format!("❓ I did not understand the action '{data}'."))
    .button("⬅️ Main menu", MAIN_MENU_TOKEN)
}

pub fn unrecognized_text() -> RenderInstruction {
  RenderInstruction::new("💬 I did not understand that. Use the menu buttons or /start.")
    .button("🏠 Main menu", MAIN_MENU_TOKEN)
}

pub fn store_failure(back_to: &str) -> RenderInstruction {
  RenderInstruction::new("⚠️ Could not reach your saved preferences. Please try again in a moment.")
    .button("⬅️ Back", back_to)
}
