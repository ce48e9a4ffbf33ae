//! Parsing of generated storyboards.
//!
//! The script model answers in a loose text format:
//!
//! ```text
//! SCRIPT: <script text, possibly continued on following lines>
//!
//! SCENES:
//! 1. <description> | Duration: <int> seconds | Prompt: <visual prompt>
//! 2. ...
//! ```

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use crate::models::{SceneDescriptor, Script};
use crate::utils::chunk_text;

const SCRIPT_MARKER: &str = "SCRIPT:";
const SCENES_MARKER: &str = "SCENES:";

static SCENE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\d+\s*[.)]\s*(?P<desc>.+?)\s*\|\s*duration:\s*(?P<dur>\d+)\s*(?:seconds?|secs?|s)?\s*\|\s*prompt:\s*(?P<prompt>.+?)\s*$",
    )
    .unwrap()
});

static TEMPLATE_SLOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^}]*\}").unwrap());

/// Scene used when nothing parseable came back.
pub fn generic_scene() -> SceneDescriptor {
    SceneDescriptor::new(
        "Opening scene",
        3,
        "Beautiful opening scene with dramatic lighting",
    )
}

/// Parse one numbered storyboard line.
pub fn parse_scene_line(line: &str) -> Option<SceneDescriptor> {
    let caps = SCENE_LINE.captures(line.trim())?;
    let duration: u32 = caps["dur"].parse().ok()?;
    if duration == 0 {
        return None;
    }
    Some(SceneDescriptor {
        description: caps["desc"].to_string(),
        duration,
        prompt: caps["prompt"].to_string(),
    })
}

/// Parse a `SCRIPT:` / `SCENES:` response.
///
/// Malformed numbered lines are skipped. If no scene survives, a single
/// generic scene is appended so the result is never empty.
pub fn parse_script_response(content: &str) -> Script {
    let mut text = String::new();
    let mut scenes = Vec::new();
    let mut in_script = false;
    let mut in_scenes = false;

    for line in content.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(SCRIPT_MARKER) {
            in_script = true;
            in_scenes = false;
            text = rest.trim().to_string();
            continue;
        }
        if line.starts_with(SCENES_MARKER) {
            in_script = false;
            in_scenes = true;
            continue;
        }
        if line.is_empty() {
            continue;
        }
        if in_script {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(line);
        } else if in_scenes && line.starts_with(|c: char| c.is_ascii_digit()) {
            match parse_scene_line(line) {
                Some(scene) => scenes.push(scene),
                None => warn!("Skipping malformed scene line: {}", line),
            }
        }
    }

    if scenes.is_empty() {
        warn!("No usable scenes in script response; using a generic scene");
        scenes.push(generic_scene());
    }

    Script { text, scenes }
}

/// Parse a caption-lines response: one caption per non-empty line, with list
/// markers and surrounding quotes stripped.
pub fn parse_caption_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')', '-', '*'])
                .trim()
                .trim_matches('"')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

/// Deterministic trend captions for when generation is unavailable.
pub fn fallback_caption_lines(prompt: &str, template: &str) -> Vec<String> {
    let lines = chunk_text(prompt.trim(), 60);
    let lines: Vec<String> = lines.into_iter().filter(|l| !l.trim().is_empty()).collect();
    if !lines.is_empty() {
        return lines;
    }
    let filled = TEMPLATE_SLOT.replace_all(template, "...").trim().to_string();
    if filled.is_empty() {
        vec!["...".to_string()]
    } else {
        vec![filled]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_scene() {
        let content = "SCRIPT: Hello world\nSCENES:\n1. A dog runs | Duration: 3 seconds | Prompt: dog running in park";
        let script = parse_script_response(content);
        assert_eq!(script.text, "Hello world");
        assert_eq!(
            script.scenes,
            vec![SceneDescriptor {
                description: "A dog runs".to_string(),
                duration: 3,
                prompt: "dog running in park".to_string(),
            }]
        );
    }

    #[test]
    fn test_script_continuation_lines() {
        let content = "SCRIPT: First sentence.\nSecond sentence.\n\nSCENES:\n\
                       1. Open | Duration: 4 seconds | Prompt: wide shot\n\
                       2. Close | Duration: 5 seconds | Prompt: close up";
        let script = parse_script_response(content);
        assert_eq!(script.text, "First sentence. Second sentence.");
        assert_eq!(script.scenes.len(), 2);
        assert_eq!(script.scenes[1].duration, 5);
    }

    #[test]
    fn test_malformed_line_skipped() {
        let content = "SCRIPT: x\nSCENES:\n\
                       1. Good | Duration: 3 seconds | Prompt: fine\n\
                       2. Missing the rest\n\
                       3. Bad | Duration: soon | Prompt: nope\n\
                       4. Zero | Duration: 0 seconds | Prompt: nope";
        let script = parse_script_response(content);
        assert_eq!(script.scenes.len(), 1);
        assert_eq!(script.scenes[0].description, "Good");
    }

    #[test]
    fn test_all_malformed_yields_generic_scene() {
        let script = parse_script_response("SCRIPT: x\nSCENES:\n1. nothing useful here");
        assert_eq!(script.scenes, vec![generic_scene()]);

        let script = parse_script_response("");
        assert!(script.text.is_empty());
        assert_eq!(script.scenes.len(), 1);
    }

    #[test]
    fn test_scene_line_variants() {
        let scene = parse_scene_line("2) Sunset | duration: 5s | prompt: golden hour").unwrap();
        assert_eq!(scene.description, "Sunset");
        assert_eq!(scene.duration, 5);
        assert_eq!(scene.prompt, "golden hour");
    }

    #[test]
    fn test_parse_caption_lines() {
        let lines = parse_caption_lines("1. \"I'm a cat\"\n\n2) of course I knock things over\n- nap time");
        assert_eq!(lines, vec!["I'm a cat", "of course I knock things over", "nap time"]);
    }

    #[test]
    fn test_fallback_caption_lines() {
        let lines = fallback_caption_lines("I'm a cat. Of course I knock things over.", "");
        assert_eq!(lines.len(), 1);

        let lines = fallback_caption_lines("  ", "When you {situation} but {twist}.");
        assert_eq!(lines, vec!["When you ... but ...."]);
    }
}
