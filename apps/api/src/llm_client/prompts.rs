// Cross-cutting prompt fragments.
// Each gateway operation defines its own template in gateway/prompts.rs.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// System prompt for free-text coaching replies.
pub const COACH_SYSTEM: &str = "You are an experienced, supportive interview coach. \
    Reply with plain prose only. No headings, no lists, no markdown.";

/// Appended to every prompt whose output is shown to the candidate.
pub fn language_instruction(language: &str) -> String {
    format!("Write your entire response in {language}.")
}

/// Fills `{name}` placeholders in a template.
///
/// Single pass: substituted values are never rescanned. Braces that do not
/// name a known variable are copied through.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let known = tail[1..].find('}').and_then(|close| {
            let name = &tail[1..=close];
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| (close + 2, *value))
        });
        match known {
            Some((consumed, value)) => {
                out.push_str(value);
                rest = &tail[consumed..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_replaces_every_occurrence() {
        let out = fill("{role} at {company}; again {role}", &[("role", "SRE"), ("company", "Acme")]);
        assert_eq!(out, "SRE at Acme; again SRE");
    }

    #[test]
    fn test_fill_leaves_unknown_placeholders() {
        assert_eq!(fill("{missing}", &[("role", "x")]), "{missing}");
    }

    #[test]
    fn test_fill_does_not_expand_placeholders_inside_values() {
        let out = fill(
            "Response: {response}\n{language_instruction}",
            &[
                ("response", "My answer mentions {language_instruction} literally"),
                ("language_instruction", "Write in Japanese."),
            ],
        );
        assert_eq!(
            out,
            "Response: My answer mentions {language_instruction} literally\nWrite in Japanese."
        );
    }

    #[test]
    fn test_fill_copies_json_braces_through() {
        let out = fill(r#"Return {"score": 1-5} for {role}."#, &[("role", "SRE")]);
        assert_eq!(out, r#"Return {"score": 1-5} for SRE."#);
    }
}
