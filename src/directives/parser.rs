//! Tag grammar parsing.
//!
//! Wire format embedded in model output:
//! - `[ACTION: <type> | KEY: value | KEY: value]`
//! - `[REMEMBER: <fact text>]`
//! - `[GOAL: <goal text> | DEADLINE: <date text>]`
//! - `[DONE: <search text>]`
//!
//! Keywords match case-insensitively; types and keys are lowercased after
//! extraction; each field splits on its first colon only. Anything that does
//! not match the exact grammar (no closing bracket, unknown keyword, empty
//! body) is left untouched in the text.

use regex::Regex;

use super::{ActionDirective, MemoryDirective};

/// Result of scanning one response text for action tags.
#[derive(Clone, Debug)]
pub struct ParsedActions {
    pub cleaned_text: String,
    pub actions: Vec<ActionDirective>,
}

/// Extract all action directives, left to right, removing each matched tag
/// from the text.
pub fn extract_actions(text: &str) -> ParsedActions {
    let re = match Regex::new(r"(?i)\[ACTION:\s*([^\]]+)\]") {
        Ok(r) => r,
        Err(_) => {
            return ParsedActions {
                cleaned_text: text.to_string(),
                actions: Vec::new(),
            }
        }
    };

    let mut actions = Vec::new();
    let cleaned = strip_matches(text, &re, |body| {
        parse_action_body(body).map(|d| actions.push(d))
    });

    ParsedActions {
        cleaned_text: cleaned,
        actions,
    }
}

/// Extract remember/goal/done directives, removing each matched tag.
/// Returns the stripped text and the directives grouped by kind, remember
/// first, then goals, then done markers.
pub fn extract_memory_directives(text: &str) -> (String, Vec<MemoryDirective>) {
    let mut directives = Vec::new();
    let mut current = text.to_string();

    if let Ok(re) = Regex::new(r"(?i)\[REMEMBER:\s*([^\]]+)\]") {
        current = strip_matches(&current, &re, |body| {
            let fact = body.trim();
            if fact.is_empty() {
                return None;
            }
            directives.push(MemoryDirective::Remember(fact.to_string()));
            Some(())
        });
    }

    if let Ok(re) = Regex::new(r"(?i)\[GOAL:\s*([^\]]+)\]") {
        current = strip_matches(&current, &re, |body| {
            let directive = parse_goal_body(body)?;
            directives.push(directive);
            Some(())
        });
    }

    if let Ok(re) = Regex::new(r"(?i)\[DONE:\s*([^\]]+)\]") {
        current = strip_matches(&current, &re, |body| {
            let search = body.trim();
            if search.is_empty() {
                return None;
            }
            directives.push(MemoryDirective::Done(search.to_string()));
            Some(())
        });
    }

    (current, directives)
}

/// Remove every match the consumer accepts, leaving rejected matches (and
/// everything between) in place. Whitespace is adjusted only at each splice
/// point; text away from a removed tag stays byte-identical, and tag-free
/// input passes through untouched.
fn strip_matches<F>(text: &str, re: &Regex, mut consume: F) -> String
where
    F: FnMut(&str) -> Option<()>,
{
    let mut cleaned = String::with_capacity(text.len());
    let mut last = 0;
    let mut removed = false;

    for caps in re.captures_iter(text) {
        let whole = caps.get(0).expect("match group 0");
        let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");

        if consume(body).is_some() {
            cleaned.push_str(&text[last..whole.start()]);
            last = whole.end();
            // Removal joins the tag's neighbors; if the kept side already
            // ends in whitespace (or is empty), absorb the spaces and tabs
            // that followed the tag so no doubled gap is left behind.
            if cleaned.chars().last().map_or(true, char::is_whitespace) {
                last += text[last..]
                    .bytes()
                    .take_while(|b| *b == b' ' || *b == b'\t')
                    .count();
            }
            removed = true;
        }
    }
    cleaned.push_str(&text[last..]);

    if removed {
        cleaned.trim().to_string()
    } else {
        cleaned
    }
}

/// Parse the inside of an `[ACTION: ...]` tag. Returns None for an empty
/// type, in which case the tag is treated as malformed and kept.
fn parse_action_body(body: &str) -> Option<ActionDirective> {
    let mut segments = body.split('|');

    let kind = segments.next()?.trim().to_lowercase();
    if kind.is_empty() {
        return None;
    }

    let mut fields = Vec::new();
    for segment in segments {
        // First colon only: values keep their internal colons.
        let Some((key, value)) = segment.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        fields.push((key, value.trim().to_string()));
    }

    Some(ActionDirective { kind, fields })
}

fn parse_goal_body(body: &str) -> Option<MemoryDirective> {
    let mut segments = body.split('|');

    let text = segments.next()?.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let mut deadline = None;
    for segment in segments {
        if let Some((key, value)) = segment.split_once(':') {
            if key.trim().eq_ignore_ascii_case("deadline") {
                deadline = Some(value.trim().to_string());
            }
        }
    }

    Some(MemoryDirective::Goal { text, deadline })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn extracts_action_with_fields() {
        let parsed =
            extract_actions("Sure! [ACTION: create_task | TITLE: Buy milk | DUE: tomorrow] Done.");
        assert_eq!(parsed.cleaned_text, "Sure! Done.");
        assert_eq!(parsed.actions.len(), 1);
        let action = &parsed.actions[0];
        assert_eq!(action.kind, "create_task");
        assert_eq!(action.field("title"), Some("Buy milk"));
        assert_eq!(action.field("due"), Some("tomorrow"));
    }

    #[test]
    fn keyword_and_keys_are_case_insensitive() {
        let parsed = extract_actions("[action: Send_Email | To: a@b.com]");
        assert_eq!(parsed.actions[0].kind, "send_email");
        assert_eq!(parsed.actions[0].field("to"), Some("a@b.com"));
    }

    #[test]
    fn field_order_does_not_change_the_mapping() {
        let a = extract_actions("[ACTION: send_email | SUBJECT: hi | TO: a@b.com]");
        let b = extract_actions("[ACTION: send_email | TO: a@b.com | SUBJECT: hi]");
        let map = |p: &ParsedActions| -> HashMap<String, String> {
            p.actions[0].fields.iter().cloned().collect()
        };
        assert_eq!(map(&a), map(&b));
    }

    #[test]
    fn values_keep_internal_colons() {
        let parsed = extract_actions("[ACTION: add_calendar_event | TIME: 14:30 | TITLE: standup]");
        assert_eq!(parsed.actions[0].field("time"), Some("14:30"));
    }

    #[test]
    fn action_with_no_fields_is_valid() {
        let parsed = extract_actions("ok [ACTION: ping] done");
        assert_eq!(parsed.actions.len(), 1);
        assert!(parsed.actions[0].fields.is_empty());
        assert_eq!(parsed.cleaned_text, "ok done");
    }

    #[test]
    fn multiple_actions_extracted_in_order() {
        let parsed = extract_actions("[ACTION: a] middle [ACTION: b | X: 1]");
        assert_eq!(parsed.actions.len(), 2);
        assert_eq!(parsed.actions[0].kind, "a");
        assert_eq!(parsed.actions[1].kind, "b");
        assert_eq!(parsed.cleaned_text, "middle");
    }

    #[test]
    fn malformed_tags_are_left_untouched() {
        let unclosed = extract_actions("text [ACTION: send_email | TO: a@b.com");
        assert!(unclosed.actions.is_empty());
        assert_eq!(
            unclosed.cleaned_text,
            "text [ACTION: send_email | TO: a@b.com"
        );

        let unknown = extract_actions("text [FROBNICATE: whatever]");
        assert!(unknown.actions.is_empty());
        assert_eq!(unknown.cleaned_text, "text [FROBNICATE: whatever]");
    }

    #[test]
    fn stripping_is_idempotent() {
        let input = "a [ACTION: x | K: v] b [REMEMBER: tea] c [GOAL: ship | DEADLINE: fri] d";
        let pass1 = extract_actions(input);
        let (pass1_text, memories) = extract_memory_directives(&pass1.cleaned_text);
        assert!(!pass1.actions.is_empty());
        assert_eq!(memories.len(), 2);
        assert!(!pass1_text.contains('['));

        let pass2 = extract_actions(&pass1_text);
        let (pass2_text, memories2) = extract_memory_directives(&pass2.cleaned_text);
        assert!(pass2.actions.is_empty());
        assert!(memories2.is_empty());
        assert_eq!(pass2_text, pass1_text);
    }

    #[test]
    fn memory_tags_extract_and_strip() {
        let (text, directives) = extract_memory_directives(
            "Noted. [REMEMBER: likes tea][GOAL: finish report | DEADLINE: friday] Anything else?",
        );
        assert_eq!(text, "Noted. Anything else?");
        assert_eq!(directives.len(), 2);
        assert_eq!(
            directives[0],
            MemoryDirective::Remember("likes tea".to_string())
        );
        assert_eq!(
            directives[1],
            MemoryDirective::Goal {
                text: "finish report".to_string(),
                deadline: Some("friday".to_string()),
            }
        );
    }

    #[test]
    fn goal_without_deadline_and_done_marker() {
        let (text, directives) = extract_memory_directives("[GOAL: run a 10k] [DONE: report]");
        assert_eq!(text, "");
        assert_eq!(
            directives[0],
            MemoryDirective::Goal {
                text: "run a 10k".to_string(),
                deadline: None,
            }
        );
        assert_eq!(directives[1], MemoryDirective::Done("report".to_string()));
    }

    #[test]
    fn tag_free_text_passes_through_unchanged() {
        let input = "plain  text with  double spaces";
        assert_eq!(extract_actions(input).cleaned_text, input);
    }

    #[test]
    fn removal_leaves_distant_whitespace_intact() {
        let input = "Here is the loop:\n    for i in 0..3 {\n        println!(\"{}\", i);\n    }\n[REMEMBER: user codes in rust]";
        let (text, directives) = extract_memory_directives(input);
        assert_eq!(directives.len(), 1);
        assert_eq!(
            text,
            "Here is the loop:\n    for i in 0..3 {\n        println!(\"{}\", i);\n    }"
        );

        // Doubled spaces away from the tag are the author's, not ours.
        let parsed = extract_actions("left  alone [ACTION: ping] and  here");
        assert_eq!(parsed.cleaned_text, "left  alone and  here");
    }
}
