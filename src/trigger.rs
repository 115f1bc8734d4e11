// src/trigger.rs

/// Activation key used until the user configures one.
pub const DEFAULT_TRIGGER_KEY: &str = "Enter";

// Canonical form for key comparison: trimmed, ASCII-lowercased, with the
// bare space character unified with the word "Space" so a field reading
// "Space" matches the space bar.
fn canonical(key: &str) -> String {
    if key == " " {
        return "space".to_owned();
    }
    key.trim().to_ascii_lowercase()
}

/// True when `pressed` (a key name as reported by the UI toolkit) should
/// fire the trigger configured as `configured`. A blank configuration
/// matches nothing.
pub fn matches(configured: &str, pressed: &str) -> bool {
    let configured = canonical(configured);
    !configured.is_empty() && configured == canonical(pressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_is_case_insensitive() {
        assert!(matches("A", "a"));
        assert!(matches("a", "A"));
        assert!(matches("enter", "Enter"));
    }

    #[test]
    fn non_matching_keys_do_not_trigger() {
        assert!(!matches("A", "B"));
        assert!(!matches("Enter", "Escape"));
    }

    #[test]
    fn space_word_matches_space_bar() {
        assert!(matches("Space", "Space"));
        assert!(matches("space", "Space"));
        assert!(matches(" ", "Space"));
    }

    #[test]
    fn blank_configuration_never_triggers() {
        assert!(!matches("", "Enter"));
        assert!(!matches("   ", "Enter"));
    }

    #[test]
    fn default_key_is_enter() {
        assert!(matches(DEFAULT_TRIGGER_KEY, "Enter"));
        assert!(!matches(DEFAULT_TRIGGER_KEY, "Space"));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert!(matches(" f5 ", "F5"));
    }
}
