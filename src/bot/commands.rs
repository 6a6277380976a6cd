use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
  /// Open the main menu
  Start,
  /// Open your preferences
  Preferences,
  /// Show the help text
  Help,
}
