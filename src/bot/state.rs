use crate::models::Category;
use crate::models::Field;

/// What the bot expects next from one user.
///
/// Transitions:
///
/// | event                                   | next state                    |
/// |-----------------------------------------|-------------------------------|
/// | `<category>:show`, idle                 | `(category, None)`            |
/// | `<category>:show`, waiting              | unchanged                     |
/// | `<category>:edit_<field>`               | `(category, field)`           |
/// | `<category>:cancel` / `reset_defaults`  | `(category, None)`            |
/// | `<category>` extra button               | `(category, None)`            |
/// | valid text while waiting                | `(category, None)`            |
/// | invalid text or store failure           | unchanged                     |
/// | top-level navigation                    | waiting field cleared         |
/// | `reset_all_preferences`                 | `(None, None)`                |
/// | unrecognized callback or idle text      | unchanged                     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversationState {
  pub active_category: Option<Category>,
  pub waiting_field: Option<Field>,
}

impl ConversationState {
  pub fn idle() -> Self {
    Self::default()
  }

  pub fn browsing(category: Category) -> Self {
    Self {
      active_category: Some(category),
      waiting_field: None,
    }
  }

  pub fn waiting(field: Field) -> Self {
    Self {
      active_category: Some(field.category()),
      waiting_field: Some(field),
    }
  }

  /// A pending field must belong to the active category.
  pub fn is_consistent(&self) -> bool {
    match (self.active_category, self.waiting_field) {
      (_, None) => true,
      (Some(category), Some(field)) => field.category() == category,
      (None, Some(_)) => false,
    }
  }
}
