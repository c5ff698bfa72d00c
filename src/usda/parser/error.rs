use std::ops::Range;

/// Location of the token the parser last consumed, with the surrounding
/// line so diagnostics can point a caret at the offending column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
    /// The full text of the line, without its terminator.
    pub line_text: String,
}

impl SourceContext {
    /// Resolve a byte span against the source text.
    pub fn from_span(source: &str, span: Range<usize>) -> Option<Self> {
        if source.is_empty() {
            return None;
        }

        // Clamp to the last byte so an end-of-input span still lands on
        // the final line.
        let mut offset = span.start.min(source.len());
        if offset == source.len() {
            offset -= 1;
        }

        let line_start = source[..offset].rfind('\n').map(|p| p + 1).unwrap_or(0);
        let line = source[..line_start].bytes().filter(|b| *b == b'\n').count() + 1;
        let line_end = source[line_start..]
            .find('\n')
            .map(|p| line_start + p)
            .unwrap_or(source.len());

        let line_text = source[line_start..line_end].trim_end_matches('\r').to_string();
        let column = source[line_start..offset].chars().count() + 1;

        Some(SourceContext {
            line,
            column,
            line_text,
        })
    }

    /// Render the line with a caret under the offending column. Tabs in the
    /// line are mirrored into the caret line so the caret stays aligned.
    pub fn render(&self) -> String {
        let mut caret = String::new();
        for ch in self.line_text.chars().take(self.column.saturating_sub(1)) {
            caret.push(if ch == '\t' { '\t' } else { ' ' });
        }
        caret.push('^');
        format!(
            "at line {}, column {}:\n{}\n{}",
            self.line, self.column, self.line_text, caret
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_on_second_line() {
        let source = "#usda 1.0\ndef Xform \"A\" {\n";
        let ctx = SourceContext::from_span(source, 10..13).unwrap();
        assert_eq!(ctx.line, 2);
        assert_eq!(ctx.column, 1);
        assert_eq!(ctx.line_text, "def Xform \"A\" {");
    }

    #[test]
    fn caret_lands_under_column() {
        let ctx = SourceContext::from_span("abc def\n", 4..7).unwrap();
        let rendered = ctx.render();
        let caret_line = rendered.lines().last().unwrap();
        assert_eq!(caret_line, "    ^");
    }

    #[test]
    fn span_at_end_of_input_clamps_to_last_line() {
        let source = "#usda 1.0\nx";
        let ctx = SourceContext::from_span(source, source.len()..source.len()).unwrap();
        assert_eq!(ctx.line, 2);
    }

    #[test]
    fn empty_source_has_no_context() {
        assert!(SourceContext::from_span("", 0..0).is_none());
    }
}
