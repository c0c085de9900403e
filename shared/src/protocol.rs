/// Topic prefix; the full base topic is `adsb/<client id>`
pub const TOPIC_PREFIX: &str = "adsb";

/// Subtopics published under the base topic
pub const ALIVE_SUBTOPIC: &str = "alive";
pub const TRACKING_SUBTOPIC: &str = "tracking";
pub const ALERTS_SUBTOPIC: &str = "alerts";
pub const NOVEL_ALERT_SUBTOPIC: &str = "tracking/alert";

/// Command words accepted on the base topic
pub const CMD_WATCH_ADD: &str = "watch_add";
pub const CMD_WATCH_REMOVE: &str = "watch_remove";
pub const CMD_WATCH_ADD_MARK: &str = "watch_add_mark";
pub const CMD_WATCH_REMOVE_MARK: &str = "watch_remove_mark";
pub const CMD_DB_UPDATE: &str = "db_update";
pub const CMD_PING: &str = "ping";

/// Reserved emergency squawks and their meaning
pub const SPECIAL_SQUAWKS: [(&str, &str); 3] = [
    ("7500", "hijack"),
    ("7600", "radio failure"),
    ("7700", "general emergency"),
];

/// Canonical 4-digit form of a squawk, or None if it is not up to four digits.
pub fn canonical_squawk(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{:0>4}", raw))
}

/// Meaning of a special squawk, compared in canonical form.
pub fn special_squawk(raw: &str) -> Option<&'static str> {
    let code = canonical_squawk(raw)?;
    SPECIAL_SQUAWKS
        .iter()
        .find(|(special, _)| *special == code)
        .map(|(_, meaning)| *meaning)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_squawks() {
        assert_eq!(special_squawk("7500"), Some("hijack"));
        assert_eq!(special_squawk("7600"), Some("radio failure"));
        assert_eq!(special_squawk(" 7700 "), Some("general emergency"));
        assert_eq!(special_squawk("1200"), None);
        assert_eq!(special_squawk("77000"), None);
        assert_eq!(special_squawk(""), None);
    }

    #[test]
    fn test_canonical_squawk_pads_short_codes() {
        assert_eq!(canonical_squawk("21").as_deref(), Some("0021"));
        assert_eq!(canonical_squawk("abcd"), None);
    }
}
