use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, Me, PhotoSize};
use tracing::{error, info, warn};

use crate::event::{IncomingEvent, Sender};
use crate::relay::Relay;

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Run the Telegram long-polling dispatcher until shutdown.
pub async fn run(relay: Arc<Relay>, bot_token: &str, allowed_user_ids: Vec<u64>) -> Result<()> {
    let bot = Bot::new(bot_token);

    info!("Starting Telegram platform...");

    let handler = Update::filter_message()
        .filter_map(move |msg: Message| {
            let user = msg.from.as_ref()?;
            if allowed_user_ids.is_empty() || allowed_user_ids.contains(&user.id.0) {
                Some(msg)
            } else {
                None
            }
        })
        .endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

/// Content of a message this bot can act on.
#[derive(Debug, Clone, PartialEq)]
enum Classified<'a> {
    Text(&'a str),
    /// Highest-resolution variant of the photo.
    Photo(&'a PhotoSize),
}

/// Anything that is neither text nor a photo yields `None`.
fn classify(msg: &Message) -> Option<Classified<'_>> {
    if let Some(text) = msg.text() {
        return Some(Classified::Text(text));
    }
    // Telegram lists photo sizes smallest first
    msg.photo()
        .and_then(|sizes| sizes.last())
        .map(Classified::Photo)
}

/// `Me` is injected by the dispatcher after its startup `get_me` call.
async fn handle_message(
    bot: Bot,
    msg: Message,
    me: Me,
    relay: Arc<Relay>,
) -> ResponseResult<()> {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return Ok(()),
    };

    let sender = Sender::new(
        user.id.0,
        Some(
            user.username
                .clone()
                .unwrap_or_else(|| user.first_name.clone()),
        ),
    );

    let event = match classify(&msg) {
        Some(Classified::Text(text)) => {
            info!(
                "Telegram message from {} ({}): {}",
                sender.display_name(),
                sender.id,
                text
            );
            let Some(event) = IncomingEvent::from_text(sender, text, me.user.username.as_deref())
            else {
                return Ok(());
            };
            if matches!(event, IncomingEvent::Text { .. }) {
                send_typing(&bot, msg.chat.id).await;
            }
            event
        }
        Some(Classified::Photo(photo)) => {
            info!(
                "Telegram photo from {} ({})",
                sender.display_name(),
                sender.id
            );
            send_typing(&bot, msg.chat.id).await;
            match download_photo(&bot, photo).await {
                Ok(image) => IncomingEvent::Photo { sender, image },
                Err(e) => {
                    error!("Failed to download photo: {:#}", e);
                    bot.send_message(msg.chat.id, relay.image_fallback())
                        .await?;
                    return Ok(());
                }
            }
        }
        None => return Ok(()),
    };

    if let Some(reply) = relay.handle(event).await {
        for chunk in split_message(&reply, 4000) {
            bot.send_message(msg.chat.id, chunk).await?;
        }
    }

    Ok(())
}

async fn send_typing(bot: &Bot, chat_id: ChatId) {
    bot.send_chat_action(chat_id, ChatAction::Typing).await.ok();
}

async fn download_photo(bot: &Bot, photo: &PhotoSize) -> Result<Vec<u8>> {
    let file = bot
        .get_file(photo.file.id.clone())
        .await
        .context("Failed to resolve photo file")?;

    let mut image = Vec::with_capacity(file.size as usize);
    bot.download_file(&file.path, &mut image)
        .await
        .context("Failed to download photo")?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn message(content: Value) -> Message {
        let mut raw = json!({
            "message_id": 7,
            "date": 1_700_000_000,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": { "id": 42, "is_bot": false, "first_name": "Alice" }
        });
        if let (Some(raw), Some(content)) = (raw.as_object_mut(), content.as_object()) {
            raw.extend(content.clone());
        }
        serde_json::from_value(raw).unwrap()
    }

    fn photo_size(id: &str, side: u32) -> Value {
        json!({
            "file_id": id,
            "file_unique_id": format!("u-{id}"),
            "width": side,
            "height": side,
            "file_size": side * 10
        })
    }

    #[test]
    fn test_classify_text() {
        let msg = message(json!({ "text": "Merhaba" }));
        assert_eq!(classify(&msg), Some(Classified::Text("Merhaba")));
    }

    #[test]
    fn test_classify_picks_largest_photo() {
        let msg = message(json!({
            "photo": [
                photo_size("small", 90),
                photo_size("medium", 320),
                photo_size("large", 1280)
            ]
        }));
        match classify(&msg) {
            Some(Classified::Photo(photo)) => {
                assert_eq!(photo.file.id.0, "large");
                assert_eq!(photo.width, 1280);
            }
            other => panic!("expected a photo, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_ignores_stickers() {
        let msg = message(json!({
            "sticker": {
                "file_id": "sticker-1",
                "file_unique_id": "u-sticker-1",
                "type": "regular",
                "width": 512,
                "height": 512,
                "is_animated": false,
                "is_video": false,
                "emoji": "😀"
            }
        }));
        assert_eq!(classify(&msg), None);
    }

    #[test]
    fn test_classify_ignores_voice() {
        let msg = message(json!({
            "voice": {
                "file_id": "voice-1",
                "file_unique_id": "u-voice-1",
                "duration": 3
            }
        }));
        assert_eq!(classify(&msg), None);
    }

    #[test]
    fn test_short_message_is_single_chunk() {
        assert_eq!(split_message("hello", 4000), vec!["hello".to_string()]);
    }

    #[test]
    fn test_split_prefers_newlines() {
        let chunks = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc"]);
    }

    #[test]
    fn test_split_falls_back_to_spaces() {
        let chunks = split_message("aaa bbb ccc", 8);
        assert_eq!(chunks, vec!["aaa bbb ", "ccc"]);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let text = "ğ".repeat(10);
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }
}
