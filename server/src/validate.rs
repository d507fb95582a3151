//! Boundary checks applied to raw event payloads before they touch lobby state

use crate::error::GameError;
use shared::{
    Settings, Ticket, LOBBY_CODE_LEN, MAX_BOSS_NAME_LEN, MAX_LOBBY_NAME_LEN,
    MAX_PLAYER_NAME_LEN, MAX_SCALE_VALUES, MAX_TICKET_ID_LEN, MAX_URL_LEN,
};

pub fn lobby_name(raw: &str) -> Result<String, GameError> {
    bounded_name(raw, "Lobby name", MAX_LOBBY_NAME_LEN)
}

pub fn player_name(raw: &str) -> Result<String, GameError> {
    bounded_name(raw, "Player name", MAX_PLAYER_NAME_LEN)
}

pub fn boss_name(raw: &str) -> Result<String, GameError> {
    bounded_name(raw, "Boss name", MAX_BOSS_NAME_LEN)
}

/// Trims the name and checks its length in characters, not bytes.
fn bounded_name(raw: &str, field: &'static str, max: usize) -> Result<String, GameError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > max {
        return Err(GameError::InvalidName { field, max });
    }
    Ok(trimmed.to_string())
}

/// Normalizes a lobby code to upper case. Lookups are case-insensitive.
pub fn lobby_code(raw: &str) -> Result<String, GameError> {
    let code = raw.trim();
    if code.chars().count() != LOBBY_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(GameError::InvalidLobbyCode);
    }
    Ok(code.to_ascii_uppercase())
}

/// Scores and story points must be finite and non-negative.
pub fn score(value: f64, what: &str) -> Result<f64, GameError> {
    if !value.is_finite() || value < 0.0 {
        return Err(GameError::InvalidPayload(format!(
            "{} must be a non-negative number",
            what
        )));
    }
    Ok(value)
}

pub fn ticket(ticket: &Ticket) -> Result<(), GameError> {
    if ticket.id.trim().is_empty() {
        return Err(GameError::InvalidPayload("ticket id is empty".to_string()));
    }
    if ticket.id.chars().count() > MAX_TICKET_ID_LEN {
        return Err(GameError::InvalidPayload(format!(
            "ticket id is longer than {} characters",
            MAX_TICKET_ID_LEN
        )));
    }
    if let Some(points) = ticket.story_points {
        score(points, "story points")?;
    }
    Ok(())
}

pub fn settings(settings: &Settings) -> Result<(), GameError> {
    if settings.timer_seconds == 0 {
        return Err(GameError::InvalidPayload(
            "timer must be at least one second".to_string(),
        ));
    }
    if settings.estimation_scale.is_empty() {
        return Err(GameError::InvalidPayload(
            "estimation scale is empty".to_string(),
        ));
    }
    if settings.estimation_scale.len() > MAX_SCALE_VALUES {
        return Err(GameError::InvalidPayload(format!(
            "estimation scale has more than {} values",
            MAX_SCALE_VALUES
        )));
    }
    for value in &settings.estimation_scale {
        score(*value, "estimation scale values")?;
    }
    if let Some(url) = &settings.jira_base_url {
        if url.chars().count() > MAX_URL_LEN {
            return Err(GameError::InvalidPayload(format!(
                "Jira URL is longer than {} characters",
                MAX_URL_LEN
            )));
        }
    }
    Ok(())
}
