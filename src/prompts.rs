//! Prompt templates for narration and polishing.
//!
//! Every prompt lives here so prompt changes never touch stage logic, and so
//! unit tests can inspect the templates without a live model. Callers
//! override the defaults through
//! [`crate::config::PipelineConfig::narration_prompt`] and
//! [`crate::config::PipelineConfig::polish_prompt`].
//!
//! Templates use `{name}` placeholders substituted by [`render_template`].
//! Unknown placeholders are left as-is, and substituted values are never
//! scanned again.

use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").unwrap());

/// Default narration prompt sent with each slide image.
///
/// Placeholders: `{slide_number}`, `{total_slides}`.
pub const DEFAULT_NARRATION_PROMPT: &str = r#"Describe this slide for a presentation voiceover. Be clear, concise, and engaging.

This is slide {slide_number} of {total_slides}.

Rules:
- Write the words the presenter would speak, in plain sentences.
- Explain what the slide shows: its key message, data, and diagrams.
- Do not read out slide numbers, footers, or logos.
- Do NOT use Markdown, bullet points, headings, or emphasis markers.
- Do NOT add stage directions, greetings for every slide, or commentary about the task.
- Output ONLY the narration text."#;

/// Default polishing prompt.
///
/// Placeholders: `{previous_content}`, `{current_content}`, `{next_content}`.
pub const DEFAULT_POLISH_PROMPT: &str = r#"You are editing the voiceover script of a slide presentation so that it flows naturally from one slide to the next.

Previous slide narration:
"""{previous_content}"""

Current slide narration (rewrite this one):
"""{current_content}"""

Next slide narration:
"""{next_content}"""

Rewrite ONLY the current slide narration:
- Keep every fact it contains; add none.
- Add a short transition from the previous slide when one exists.
- Avoid repeating what the previous slide already said.
- Do not anticipate the next slide's content beyond a brief lead-in.
- If there is no previous slide, open the presentation with a brief introduction.
- Output plain spoken text only, without Markdown or commentary."#;

/// Substituted for `{previous_content}` on the first slide.
pub const NO_PREVIOUS_SLIDE: &str = "[This is the first slide]";

/// Substituted for `{next_content}` on the last slide.
pub const NO_NEXT_SLIDE: &str = "[This is the last slide]";

/// Replace each `{key}` in `template` with its value, in a single pass.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            vars.iter()
                .find(|(key, _)| *key == &caps[1])
                .map_or_else(|| caps[0].to_string(), |(_, value)| value.to_string())
        })
        .into_owned()
}

/// Narration prompt for one slide.
pub fn narration_prompt(template: &str, slide_number: usize, total_slides: usize) -> String {
    render_template(
        template,
        &[
            ("slide_number", &slide_number.to_string()),
            ("total_slides", &total_slides.to_string()),
        ],
    )
}

/// Polishing prompt for one slide; `None` neighbours become placeholders.
pub fn polish_prompt(
    template: &str,
    previous: Option<&str>,
    current: &str,
    next: Option<&str>,
) -> String {
    render_template(
        template,
        &[
            ("previous_content", previous.unwrap_or(NO_PREVIOUS_SLIDE)),
            ("current_content", current),
            ("next_content", next.unwrap_or(NO_NEXT_SLIDE)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narration_prompt_interpolates_position() {
        let p = narration_prompt(DEFAULT_NARRATION_PROMPT, 3, 12);
        assert!(p.contains("slide 3 of 12"));
        assert!(!p.contains("{slide_number}"));
        assert!(!p.contains("{total_slides}"));
    }

    #[test]
    fn polish_prompt_substitutes_placeholders_at_edges() {
        let first = polish_prompt(DEFAULT_POLISH_PROMPT, None, "intro", Some("agenda"));
        assert!(first.contains(NO_PREVIOUS_SLIDE));
        assert!(first.contains("agenda"));
        assert!(!first.contains(NO_NEXT_SLIDE));

        let last = polish_prompt(DEFAULT_POLISH_PROMPT, Some("summary"), "thanks", None);
        assert!(last.contains("summary"));
        assert!(last.contains(NO_NEXT_SLIDE));
        assert!(!last.contains(NO_PREVIOUS_SLIDE));
    }

    #[test]
    fn default_polish_prompt_has_all_placeholders() {
        for key in ["{previous_content}", "{current_content}", "{next_content}"] {
            assert!(DEFAULT_POLISH_PROMPT.contains(key), "missing {key}");
        }
    }

    #[test]
    fn unknown_placeholders_survive() {
        assert_eq!(
            render_template("{a} {b}", &[("a", "x")]),
            "x {b}"
        );
    }

    #[test]
    fn braces_inside_transcripts_are_not_substituted() {
        let p = polish_prompt(
            "<{previous_content}|{current_content}|{next_content}>",
            None,
            "fill in {next_content} and {previous_content} here",
            Some("last"),
        );
        assert_eq!(
            p,
            format!("<{NO_PREVIOUS_SLIDE}|fill in {{next_content}} and {{previous_content}} here|last>")
        );
    }
}
