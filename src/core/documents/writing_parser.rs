// Writing tarea 1 segmentation.
//
// Documents are free-form: some carry explicit headings ("Situación:",
// "Tarea", "Solución", "Recuerde"), some are just paragraphs. Headings win
// when at least two kinds are present; otherwise a long document is split
// 30/30/40 into situation / task / solution. Metadata and the audio link are
// scanned over the whole text independently of the sections.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::document_models::{ParsedWritingTarea, SectionKind, SegmentationMode};

/// Minimum body lines before the proportional split is used.
const PROPORTIONAL_MIN_LINES: usize = 6;
/// Longer lines only count as headings when they carry a colon.
const HEADING_MAX_CHARS: usize = 80;
const REGISTER_MAX_CHARS: usize = 50;
const TITLE_MIN_CHARS: usize = 5;
const TITLE_MAX_CHARS: usize = 100;

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[\s\d.)\-–•*#]*(situaci[oó]n|tarea|instrucciones|soluci[oó]n|modelo de respuesta|modelo|recuerde|recordatorio)\b",
    )
    .expect("heading pattern is valid")
});

static WORD_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d{2,4}\s*(?:-|–|—|a|y|hasta)\s*\d{2,4}\s*palabras")
        .expect("word range pattern is valid")
});

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("url pattern is valid"));

/// Hosts and extensions that mark a link as the task's audio.
const AUDIO_PATTERNS: &[&str] = &[
    "drive.google.com",
    "docs.google.com",
    "storage.googleapis.com",
    "storage.cloud.google.com",
    "dropbox.com",
    "1drv.ms",
    "onedrive.live.com",
    "soundcloud.com",
    "youtube.com",
    "youtu.be",
    ".mp3",
    ".wav",
    ".m4a",
    ".ogg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metadata {
    WordLimit,
    TextType,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role<'a> {
    Heading {
        kind: SectionKind,
        inline: Option<&'a str>,
    },
    Metadata,
    Body,
}

/// Segments the lines of a writing tarea 1 document into its fields.
pub fn parse_writing_tarea1_lines(lines: &[String]) -> ParsedWritingTarea {
    let lines: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    let mut parsed = ParsedWritingTarea {
        full_raw_text: lines.join("\n"),
        ..Default::default()
    };

    let roles: Vec<Role> = lines.iter().map(|line| classify_line(line)).collect();

    scan_metadata(&lines, &mut parsed);
    parsed.audio_url = find_audio_reference(&lines);

    let title_idx = find_title(&lines, &roles);
    parsed.title = title_idx.map(|idx| lines[idx].to_string());

    let entries: Vec<(&str, Role)> = lines
        .iter()
        .zip(roles.iter())
        .enumerate()
        .filter(|(idx, (_, role))| Some(*idx) != title_idx && **role != Role::Metadata)
        .map(|(_, (line, role))| (*line, *role))
        .collect();

    let categories: HashSet<SectionKind> = entries
        .iter()
        .filter_map(|(_, role)| match role {
            Role::Heading { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();

    if categories.len() < 2 && entries.len() >= PROPORTIONAL_MIN_LINES {
        split_proportionally(&entries, &mut parsed);
        parsed.mode = SegmentationMode::Proportional;
    } else {
        segment_by_headings(&entries, &mut parsed);
        parsed.mode = SegmentationMode::Headings;
    }

    if parsed.situation.is_none() && parsed.task_instructions.is_none() {
        if !parsed.full_raw_text.is_empty() {
            parsed.situation = Some(parsed.full_raw_text.clone());
        }
        parsed.mode = SegmentationMode::RawText;
    }

    parsed
}

fn classify_line(line: &str) -> Role<'_> {
    if let Some(kind) = heading_kind(line) {
        let inline = line
            .split_once(':')
            .map(|(_, rest)| rest.trim())
            .filter(|rest| !rest.is_empty());
        return Role::Heading { kind, inline };
    }

    if classify_metadata(line).is_some() {
        Role::Metadata
    } else {
        Role::Body
    }
}

fn heading_kind(line: &str) -> Option<SectionKind> {
    if line.chars().count() >= HEADING_MAX_CHARS && !line.contains(':') {
        return None;
    }

    let marker = HEADING.captures(line)?.get(1)?.as_str().to_lowercase();
    let kind = if marker.starts_with("situaci") {
        SectionKind::Situation
    } else if marker == "tarea" || marker == "instrucciones" {
        SectionKind::Task
    } else if marker.starts_with("soluci") || marker.starts_with("modelo") {
        SectionKind::Solution
    } else {
        SectionKind::Reminder
    };
    Some(kind)
}

fn classify_metadata(line: &str) -> Option<Metadata> {
    let lower = line.to_lowercase();

    let mentions_limit = lower.contains("palabras")
        && ["150", "180", "límite", "limite"]
            .iter()
            .any(|needle| lower.contains(needle));
    if WORD_RANGE.is_match(line) || mentions_limit {
        return Some(Metadata::WordLimit);
    }

    if lower.contains("tipo de texto") || lower.contains("tipo:") {
        return Some(Metadata::TextType);
    }

    if lower.contains("registro") && line.chars().count() < REGISTER_MAX_CHARS {
        return Some(Metadata::Register);
    }

    None
}

/// "Tipo: informe formal" -> "informe formal". Lines without a value are kept whole.
fn metadata_value(line: &str) -> String {
    line.split_once(':')
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(line)
        .to_string()
}

fn scan_metadata(lines: &[&str], parsed: &mut ParsedWritingTarea) {
    for line in lines {
        match classify_metadata(line) {
            Some(Metadata::WordLimit) if parsed.word_limit.is_none() => {
                parsed.word_limit = Some(line.to_string());
            }
            Some(Metadata::TextType) if parsed.text_type.is_none() => {
                parsed.text_type = Some(metadata_value(line));
            }
            Some(Metadata::Register) if parsed.register.is_none() => {
                parsed.register = Some(metadata_value(line));
            }
            _ => {}
        }
    }
}

fn find_audio_reference(lines: &[&str]) -> Option<String> {
    lines.iter().find_map(|line| {
        URL.find_iter(line).find_map(|m| {
            let url = m.as_str().trim_end_matches(&['.', ',', ';', ':'][..]);
            let lower = url.to_lowercase();
            AUDIO_PATTERNS
                .iter()
                .any(|pattern| lower.contains(pattern))
                .then(|| url.to_string())
        })
    })
}

/// The first line, or an upper-case second/third line, ahead of any heading.
fn find_title(lines: &[&str], roles: &[Role]) -> Option<usize> {
    for (idx, line) in lines.iter().enumerate().take(3) {
        match roles[idx] {
            Role::Heading { .. } => return None,
            Role::Metadata => continue,
            Role::Body => {}
        }

        let len = line.chars().count();
        if len <= TITLE_MIN_CHARS || len >= TITLE_MAX_CHARS {
            continue;
        }
        if idx == 0 || is_upper_case(line) {
            return Some(idx);
        }
    }
    None
}

fn is_upper_case(line: &str) -> bool {
    line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase)
}

fn segment_by_headings(entries: &[(&str, Role)], parsed: &mut ParsedWritingTarea) {
    let mut current: Option<(SectionKind, Vec<&str>)> = None;

    for (line, role) in entries {
        match role {
            Role::Heading { kind, inline } => {
                if let Some((kind, body)) = current.take() {
                    append_section(parsed, kind, &body);
                }
                current = Some((*kind, inline.iter().copied().collect()));
            }
            Role::Body => {
                if let Some((_, body)) = current.as_mut() {
                    body.push(*line);
                }
            }
            Role::Metadata => {}
        }
    }

    if let Some((kind, body)) = current {
        append_section(parsed, kind, &body);
    }
}

fn split_proportionally(entries: &[(&str, Role)], parsed: &mut ParsedWritingTarea) {
    let lines: Vec<&str> = entries.iter().map(|(line, _)| *line).collect();
    let share = lines.len() * 3 / 10;
    let (situation, rest) = lines.split_at(share);
    let (task, solution) = rest.split_at(share);

    append_section(parsed, SectionKind::Situation, situation);
    append_section(parsed, SectionKind::Task, task);
    append_section(parsed, SectionKind::Solution, solution);
}

/// A category seen twice keeps both spans.
fn append_section(parsed: &mut ParsedWritingTarea, kind: SectionKind, body: &[&str]) {
    let text = body.join("\n").trim().to_string();
    if text.is_empty() {
        return;
    }

    let slot = parsed.section_mut(kind);
    match slot {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(&text);
        }
        None => *slot = Some(text),
    }
}
