use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::types::ChatId;
use teloxide::types::Message;
use teloxide::types::MessageId;
use teloxide::utils::command::BotCommands;
use tracing::info;
use tracing::instrument;

use crate::bot::Command;
use crate::bot::HandlerResult;
use crate::bot::context::AppContext;
use crate::bot::render::MAIN_MENU_TOKEN;
use crate::bot::render::PREFERENCES_MENU_TOKEN;
use crate::bot::render::RenderInstruction;
use crate::bot::render::Reply;
use crate::bot::router::CallbackEvent;
use crate::bot::router::TextEvent;

type SharedContext = Arc<AppContext>;

pub fn build_schema() -> UpdateHandler<anyhow::Error> {
  let message_handler = Update::filter_message()
    .branch(command_branch())
    .branch(dptree::endpoint(handle_text_message));

  let callback_handler = Update::filter_callback_query().endpoint(handle_callback_query);

  dptree::entry().branch(message_handler).branch(callback_handler)
}

fn command_branch() -> UpdateHandler<anyhow::Error> {
  dptree::entry()
    .filter_command::<Command>()
    .branch(dptree::case![Command::Start].endpoint(handle_start))
    .branch(dptree::case![Command::Preferences].endpoint(handle_preferences))
    .branch(dptree::case![Command::Help].endpoint(handle_help))
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_start(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  let username = user.username.as_deref().unwrap_or("-");
  info!(user_id = user.id.0, chat_id = %msg.chat.id, username, "received /start command");
  open_menu(&bot, &ctx, &msg, MAIN_MENU_TOKEN).await
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_preferences(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  info!(chat_id = %msg.chat.id, "received /preferences command");
  open_menu(&bot, &ctx, &msg, PREFERENCES_MENU_TOKEN).await
}

#[instrument(skip(bot, msg))]
async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
  info!(chat_id = %msg.chat.id, "received /help command");
  let mut text = Command::descriptions().to_string();
  text.push_str(
    "\n\nPress an edit button in the preferences menu, then reply with the new value. Type cancel to stop editing.",
  );
  bot.send_message(msg.chat.id, text).await?;
  Ok(())
}

/// Commands open menus the same way their buttons do.
async fn open_menu(bot: &Bot, ctx: &SharedContext, msg: &Message, token: &str) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  let event = CallbackEvent {
    user_id: user.id.0 as i64,
    data: token.to_string(),
  };
  let reply = ctx.router().handle_callback(event).await;
  send_reply(bot, msg.chat.id, &reply).await
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_text_message(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  let Some(text) = msg.text() else {
    info!(chat_id = %msg.chat.id, "ignoring non-text message");
    return Ok(());
  };
  let user = msg.from.as_ref().context("message missing sender")?;
  let event = TextEvent {
    user_id: user.id.0 as i64,
    text: text.to_string(),
  };
  let reply = ctx.router().handle_text(event).await;
  send_reply(&bot, msg.chat.id, &reply).await
}

#[instrument(skip(bot, ctx, query))]
async fn handle_callback_query(bot: Bot, ctx: SharedContext, query: CallbackQuery) -> HandlerResult {
  let user_id = query.from.id.0 as i64;
  let message_ctx = query.message.as_ref().map(|message| (message.chat().id, message.id()));

  let Some(data) = query.data.clone() else {
    info!(user_id, "callback query without data");
    bot.answer_callback_query(query.id).await?;
    return Ok(());
  };

  if let Some((chat_id, _)) = message_ctx {
    info!(user_id, chat_id = %chat_id, callback = data.as_str(), "handling callback query");
  } else {
    info!(
      user_id,
      callback = data.as_str(),
      "handling callback query without message context"
    );
  }

  let reply = ctx.router().handle_callback(CallbackEvent { user_id, data }).await;

  let delivered = match message_ctx {
    Some((chat_id, message_id)) => replace_with_reply(&bot, chat_id, message_id, &reply).await,
    None => Ok(()),
  };
  answered(delivered, async {
    bot.answer_callback_query(query.id).await?;
    Ok::<_, anyhow::Error>(())
  })
  .await
}

/// Runs `answer` whatever became of the delivery, then reports the delivery.
async fn answered(delivery: HandlerResult, answer: impl Future<Output = HandlerResult>) -> HandlerResult {
  answer.await?;
  delivery
}

async fn send_reply(bot: &Bot, chat: ChatId, reply: &Reply) -> HandlerResult {
  for screen in &reply.screens {
    send_screen(bot, chat, screen).await?;
  }
  Ok(())
}

/// First screen takes over the message whose button was pressed.
async fn replace_with_reply(bot: &Bot, chat: ChatId, message_id: MessageId, reply: &Reply) -> HandlerResult {
  let mut screens = reply.screens.iter();
  if let Some(first) = screens.next() {
    edit_screen(bot, chat, message_id, first).await?;
  }
  for screen in screens {
    send_screen(bot, chat, screen).await?;
  }
  Ok(())
}

async fn send_screen(bot: &Bot, chat: ChatId, screen: &RenderInstruction) -> HandlerResult {
  let request = bot.send_message(chat, screen.text.clone());
  match screen.keyboard() {
    Some(keyboard) => request.reply_markup(keyboard).await?,
    None => request.await?,
  };
  Ok(())
}

async fn edit_screen(bot: &Bot, chat: ChatId, message_id: MessageId, screen: &RenderInstruction) -> HandlerResult {
  let request = bot.edit_message_text(chat, message_id, screen.text.clone());
  let result = match screen.keyboard() {
    Some(keyboard) => request.reply_markup(keyboard).await,
    None => request.await,
  };
  match result {
    Ok(_) => info!(chat_id = %chat, message_id = %message_id, "updated menu message"),
    Err(RequestError::Api(ApiError::MessageNotModified)) => {
      info!(chat_id = %chat, message_id = %message_id, "menu message already current");
    },
    Err(err) => return Err(err.into()),
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicBool;
  use std::sync::atomic::Ordering;

  use super::answered;

  #[tokio::test]
  async fn query_is_answered_when_delivery_fails() {
    let answer_sent = AtomicBool::new(false);
    let result = answered(Err(anyhow::anyhow!("edit failed")), async {
      answer_sent.store(true, Ordering::SeqCst);
      Ok::<_, anyhow::Error>(())
    })
    .await;

    assert!(answer_sent.load(Ordering::SeqCst));
    assert_eq!(result.unwrap_err().to_string(), "edit failed");
  }

  #[tokio::test]
  async fn failed_answer_is_reported() {
    let result = answered(Ok(()), async { Err::<(), _>(anyhow::anyhow!("answer failed")) }).await;
    assert!(result.is_err());
  }
}
