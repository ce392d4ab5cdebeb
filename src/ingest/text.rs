//! Markdown clean-up before chunking

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FRONT_MATTER: Regex = Regex::new(r"(?s)\A\s*---.*?---").unwrap();
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref EXTRA_NEWLINES: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref EXTRA_SPACES: Regex = Regex::new(r"[ \t]{2,}").unwrap();
    static ref LIST_BULLET: Regex = Regex::new(r"(?m)^-+\s+").unwrap();
}

/// Remove a leading YAML front-matter block
pub fn strip_front_matter(text: &str) -> String {
    FRONT_MATTER.replace(text, "").trim().to_string()
}

/// Normalise raw markdown for embedding: invisible characters, HTML
/// entities and tags, runs of blank lines and spaces, list bullets and
/// per-line whitespace.
pub fn prepare_text(text: &str) -> String {
    let text = text.replace(['\u{200b}', '\u{feff}'], "");
    let text = html_escape::decode_html_entities(&text);
    let text = HTML_TAG.replace_all(&text, " ");
    let text = EXTRA_NEWLINES.replace_all(&text, "\n\n");
    let text = EXTRA_SPACES.replace_all(&text, " ");
    let text = LIST_BULLET.replace_all(&text, "- ");

    let text = text.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    let text = EXTRA_NEWLINES.replace_all(&text, "\n\n");

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_front_matter() {
        let raw = "---\ntitle: Inverter\ntags: [a]\n---\n\n# Inverter\n\nBody";
        assert_eq!(strip_front_matter(raw), "# Inverter\n\nBody");
    }

    #[test]
    fn test_front_matter_only_at_start() {
        let raw = "# Title\n\n---\n\nSection\n\n---\nEnd";
        assert_eq!(strip_front_matter(raw), raw);
    }

    #[test]
    fn test_html_is_decoded_and_stripped() {
        // Entities are decoded first, so an escaped tag is stripped as well
        let raw = "<p>Power &amp; torque&#33;</p> &lt;b&gt;&bogus; &#x41;";
        assert_eq!(prepare_text(raw), "Power & torque! &bogus; A");
    }

    #[test]
    fn test_accented_and_typographic_entities() {
        let raw = "INSTALA&Ccedil;&Atilde;O &Eacute; &ldquo;segura&rdquo; &rsquo; 1&ordm; &Oacute;leo";
        assert_eq!(prepare_text(raw), "INSTALAÇÃO É “segura” ’ 1º Óleo");
    }

    #[test]
    fn test_whitespace_and_bullets() {
        let raw = "\u{feff}Intro\u{200b}\n\n\n\n-   first    item\n--  second\n   indented   \n";
        assert_eq!(
            prepare_text(raw),
            "Intro\n\n- first item\n- second\nindented"
        );
    }

    #[test]
    fn test_blank_lines_after_trimming() {
        // Lines holding only spaces become empty and collapse
        let raw = "a\n   \n \t \n   \nb";
        assert_eq!(prepare_text(raw), "a\n\nb");
    }
}
