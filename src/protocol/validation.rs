use crate::config::ProtocolConfig;

pub fn validate_room_id_with_config(room_id: &str, config: &ProtocolConfig) -> Result<(), String> {
    if room_id.trim().is_empty() {
        return Err("Room id cannot be empty".to_string());
    }
    if room_id.len() > config.max_room_id_length {
        return Err(format!(
            "Room id too long (max {} bytes)",
            config.max_room_id_length
        ));
    }
    if room_id.chars().any(char::is_control) {
        return Err("Room id contains control characters".to_string());
    }
    Ok(())
}

/// Robot labels are display-only, so they only get a length cap.
pub fn normalize_robot_label(label: Option<String>, config: &ProtocolConfig) -> Option<String> {
    let limit = config.max_room_id_length;
    label
        .map(|raw| {
            raw.trim()
                .char_indices()
                .take_while(|(idx, ch)| idx + ch.len_utf8() <= limit)
                .map(|(_, ch)| ch)
                .collect::<String>()
        })
        .filter(|normalized| !normalized.is_empty())
}
