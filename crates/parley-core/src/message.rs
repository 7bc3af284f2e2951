use crate::error::CoreError;
use crate::room::RoomBinding;
use crate::AppState;
use parley_db::messages::MessageRow;
use parley_models::message::{ChatMessage, MessageType};
use parley_models::protocol::GatewayEvent;
use parley_util::sanitize::clean_text;
use parley_util::validation::validate_message_content;

pub const MAX_HISTORY_PAGE: i64 = 100;

pub fn to_chat_message(row: MessageRow) -> ChatMessage {
    ChatMessage {
        id: row.id.to_string(),
        room_id: row.room_id.to_string(),
        username: row.username,
        user_id: row.user_id.map(|id| id.to_string()),
        content: row.content,
        message_type: MessageType::parse(&row.message_type).unwrap_or(MessageType::Text),
        created_at: row.created_at,
    }
}

/// Sanitize, persist, then broadcast to the whole room including the sender.
/// Nothing is broadcast unless the insert succeeded.
pub async fn send_message(
    state: &AppState,
    binding: &RoomBinding,
    content: &str,
    message_type: Option<&str>,
) -> Result<ChatMessage, CoreError> {
    let content = clean_text(content);
    validate_message_content(&content, state.config.max_message_chars).map_err(|_| {
        CoreError::validation(format!(
            "Message must be between 1 and {} characters",
            state.config.max_message_chars
        ))
    })?;
    let message_type = match message_type.map(str::trim).filter(|t| !t.is_empty()) {
        None => MessageType::Text,
        Some(raw) => MessageType::parse(raw)
            .ok_or_else(|| CoreError::validation("Message type must be 'text' or 'code'"))?,
    };

    let row = parley_db::messages::create_message(
        &state.db,
        crate::next_id(),
        binding.room_id,
        &binding.username,
        binding.user_id,
        &content,
        message_type.as_str(),
    )
    .await
    .map_err(|err| {
        tracing::error!(room_id = binding.room_id, error = %err, "message: persist failed");
        CoreError::Database(err)
    })?;

    let message = to_chat_message(row);
    state
        .event_bus
        .to_room(binding.room_id, GatewayEvent::NewMessage(message.clone()));
    Ok(message)
}

/// Room history, newest first.
pub async fn list_messages(
    state: &AppState,
    room_id: i64,
    before: Option<i64>,
    limit: Option<i64>,
) -> Result<Vec<ChatMessage>, CoreError> {
    let limit = limit.unwrap_or(50).clamp(1, MAX_HISTORY_PAGE);
    let rows = parley_db::messages::get_room_messages(&state.db, room_id, before, limit).await?;
    Ok(rows.into_iter().map(to_chat_message).collect())
}
