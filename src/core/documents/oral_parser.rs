use super::document_models::{DocumentError, ParsedOralTarea};

/// Instructions stored on every oral tarea 2 set.
pub const DEFAULT_ORAL_INSTRUCTIONS: &str = "Observa la imagen y describe lo que ves durante 1-2 minutos:\n\
En tu descripción debes:\n\
Describir las personas, objetos y el lugar que aparecen\n\
Explicar qué están haciendo las personas\n\
Dar tu opinión sobre la situación representada\n\
Relacionar la imagen con experiencias personales si es posible";

const IMAGE_LABEL: &str = "image_url";
const AUDIO_LABEL: &str = "audio_url";
const SOLUTION_LABEL: &str = "solution";

/// Parses the labelled layout of an oral tarea 2 document:
///
/// ```text
/// Image_url
/// https://...
/// Audio_url
/// https://...
/// Solution
/// <solution text, any number of lines>
/// ```
pub fn parse_oral_tarea2_lines(lines: &[String], file: &str) -> Result<ParsedOralTarea, DocumentError> {
    let lines: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    let missing = |field: &'static str| DocumentError::MissingField {
        field,
        file: file.to_string(),
    };

    let image_url = labelled_value(&lines, IMAGE_LABEL).ok_or_else(|| missing(IMAGE_LABEL))?;
    let audio_url = labelled_value(&lines, AUDIO_LABEL).ok_or_else(|| missing(AUDIO_LABEL))?;

    let solution_text = lines
        .iter()
        .position(|line| line.eq_ignore_ascii_case(SOLUTION_LABEL))
        .map(|idx| lines[idx + 1..].join("\n"))
        .filter(|text| !text.is_empty())
        .ok_or_else(|| missing("solution text"))?;

    Ok(ParsedOralTarea {
        image_url,
        audio_url,
        solution_text,
    })
}

fn labelled_value(lines: &[&str], label: &str) -> Option<String> {
    let idx = lines.iter().position(|line| line.eq_ignore_ascii_case(label))?;
    lines.get(idx + 1).map(|value| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parses_labelled_document() {
        let doc = lines(&[
            "Image_url",
            "https://example.com/foto.jpg",
            "",
            "AUDIO_URL",
            "https://drive.google.com/file/d/abc123/view",
            "Solution",
            "En la imagen se ve una familia.",
            "Están comiendo en un parque.",
        ]);

        let parsed = parse_oral_tarea2_lines(&doc, "tarea.docx").unwrap();

        assert_eq!(parsed.image_url, "https://example.com/foto.jpg");
        assert_eq!(parsed.audio_url, "https://drive.google.com/file/d/abc123/view");
        assert_eq!(
            parsed.solution_text,
            "En la imagen se ve una familia.\nEstán comiendo en un parque."
        );
    }

    #[test]
    fn test_missing_fields_name_the_file() {
        let no_image = lines(&["Audio_url", "https://a", "Solution", "texto"]);
        let err = parse_oral_tarea2_lines(&no_image, "uno.docx").unwrap_err();
        assert_eq!(err.to_string(), "Missing image_url in uno.docx");

        let no_audio = lines(&["Image_url", "https://i", "Solution", "texto"]);
        let err = parse_oral_tarea2_lines(&no_audio, "dos.docx").unwrap_err();
        assert_eq!(err.to_string(), "Missing audio_url in dos.docx");

        let empty_solution = lines(&["Image_url", "https://i", "Audio_url", "https://a", "Solution"]);
        let err = parse_oral_tarea2_lines(&empty_solution, "tres.docx").unwrap_err();
        assert_eq!(err.to_string(), "Missing solution text in tres.docx");
    }

    #[test]
    fn test_instructions_text_is_fixed() {
        assert!(DEFAULT_ORAL_INSTRUCTIONS.starts_with("Observa la imagen"));
        assert_eq!(DEFAULT_ORAL_INSTRUCTIONS.lines().count(), 6);
    }
}
