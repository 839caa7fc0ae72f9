//! Trigger-condition evaluation (§4.6): `always`, `wake_word`, `regex`.

use chronicle_domain::config::PluginCondition;

/// Outcome of evaluating a plugin's trigger condition against one input
/// string (e.g. `data.transcript` for `transcript.streaming`).
pub struct Trigger {
    pub matched: bool,
    /// For `wake_word` matches: the command text after the wake word,
    /// stripped of leading whitespace.
    pub command: Option<String>,
}

pub fn evaluate(condition: &PluginCondition, input: &str) -> Trigger {
    match condition {
        PluginCondition::Always => Trigger {
            matched: true,
            command: None,
        },
        PluginCondition::WakeWord { word, strip_prefix } => {
            let lower_input = input.to_ascii_lowercase();
            let lower_word = word.to_ascii_lowercase();
            match lower_input.find(&lower_word) {
                Some(pos) => {
                    let command = if *strip_prefix {
                        let after = &input[pos + word.len()..];
                        Some(after.trim_start().to_string())
                    } else {
                        None
                    };
                    Trigger {
                        matched: true,
                        command,
                    }
                }
                None => Trigger {
                    matched: false,
                    command: None,
                },
            }
        }
        PluginCondition::Regex(pattern) => {
            let matched = regex::Regex::new(pattern)
                .map(|re| re.is_match(input))
                .unwrap_or(false);
            Trigger {
                matched,
                command: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_condition_always_matches() {
        let t = evaluate(&PluginCondition::Always, "anything");
        assert!(t.matched);
    }

    #[test]
    fn wake_word_matches_case_insensitively_and_strips_prefix() {
        let cond = PluginCondition::WakeWord {
            word: "hey chronicle".into(),
            strip_prefix: true,
        };
        let t = evaluate(&cond, "Hey Chronicle, set a timer");
        assert!(t.matched);
        assert_eq!(t.command.as_deref(), Some(", set a timer".trim_start()));
    }

    #[test]
    fn wake_word_no_match_is_not_triggered() {
        let cond = PluginCondition::WakeWord {
            word: "hey chronicle".into(),
            strip_prefix: true,
        };
        let t = evaluate(&cond, "good morning");
        assert!(!t.matched);
    }

    #[test]
    fn regex_condition_matches_pattern() {
        let t = evaluate(&PluginCondition::Regex(r"^\d+$".into()), "12345");
        assert!(t.matched);
        let t2 = evaluate(&PluginCondition::Regex(r"^\d+$".into()), "abc");
        assert!(!t2.matched);
    }

    #[test]
    fn invalid_regex_never_matches() {
        let t = evaluate(&PluginCondition::Regex("(".into()), "anything");
        assert!(!t.matched);
    }
}
