//! Help and usage text layout.

const DEFAULT_MAX_WIDTH: usize = 80;
const COL_MAX: usize = 30;
const COL_SPACING: usize = 2;

/// Greedy word wrap. Blank lines in `text` separate paragraphs, which are
/// wrapped independently.
pub fn wrap_text(text: &str, width: usize, initial_indent: &str, subsequent_indent: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut first = true;
    for paragraph in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
        if !out.is_empty() {
            out.push(String::new());
        }
        let mut line = if first { initial_indent } else { subsequent_indent }.to_string();
        first = false;
        let mut has_word = false;
        for word in paragraph.split_whitespace() {
            if has_word && line.chars().count() + 1 + word.chars().count() > width {
                out.push(std::mem::replace(&mut line, subsequent_indent.to_string()));
                has_word = false;
            }
            if has_word {
                line.push(' ');
            }
            line.push_str(word);
            has_word = true;
        }
        out.push(line);
    }
    if out.is_empty() {
        return initial_indent.trim_end().to_string();
    }
    out.iter()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone)]
pub struct HelpFormatter {
    indent_increment: usize,
    width: usize,
    current_indent: usize,
    buffer: String,
}

impl Default for HelpFormatter {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl HelpFormatter {
    /// An explicit `width` is used as is; otherwise the text is laid out for
    /// `max_width` (80 by default) minus a margin, but never below 50.
    pub fn new(width: Option<usize>, max_width: Option<usize>) -> Self {
        let width = width.unwrap_or_else(|| {
            max_width
                .unwrap_or(DEFAULT_MAX_WIDTH)
                .saturating_sub(2)
                .max(50)
        });
        Self {
            indent_increment: 2,
            width,
            current_indent: 0,
            buffer: String::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn indent(&mut self) {
        self.current_indent += self.indent_increment;
    }

    pub fn dedent(&mut self) {
        self.current_indent = self.current_indent.saturating_sub(self.indent_increment);
    }

    pub fn write_usage(&mut self, prog: &str, args: &str) {
        let usage_prefix = format!("{:indent$}Usage: {prog} ", "", indent = self.current_indent);
        let text_width = self.width.saturating_sub(self.current_indent);
        let prefix_len = usage_prefix.chars().count();
        if text_width >= prefix_len + 20 {
            let indent = " ".repeat(prefix_len);
            let text = wrap_text(args, text_width, &usage_prefix, &indent);
            self.write(&text);
        } else {
            self.write(usage_prefix.trim_end());
            self.write("\n");
            let indent = " ".repeat(self.current_indent.max(prefix_len) + 4);
            let text = wrap_text(args, text_width, &indent, &indent);
            self.write(&text);
        }
        self.write("\n");
    }

    pub fn write_heading(&mut self, heading: &str) {
        let line = format!("{:indent$}{heading}:\n", "", indent = self.current_indent);
        self.write(&line);
    }

    /// Start a new paragraph unless nothing has been written yet.
    pub fn write_paragraph(&mut self) {
        if !self.buffer.is_empty() {
            self.write("\n");
        }
    }

    pub fn write_text(&mut self, text: &str) {
        let text_width = self.width.saturating_sub(self.current_indent).max(11);
        let indent = " ".repeat(self.current_indent);
        let wrapped = wrap_text(text, text_width, &indent, &indent);
        self.write(&wrapped);
        self.write("\n");
    }

    /// Two-column definition list; long first columns push the second onto
    /// the next line.
    pub fn write_dl(&mut self, rows: &[(String, String)]) {
        let widest = rows.iter().map(|(first, _)| first.chars().count()).max().unwrap_or(0);
        let first_col = widest.min(COL_MAX) + COL_SPACING;
        for (first, second) in rows {
            let line = format!("{:indent$}{first}", "", indent = self.current_indent);
            self.write(&line);
            if second.is_empty() {
                self.write("\n");
                continue;
            }
            let first_len = first.chars().count();
            if first_len <= first_col - COL_SPACING {
                self.write(&" ".repeat(first_col - first_len));
            } else {
                self.write("\n");
                self.write(&" ".repeat(first_col + self.current_indent));
            }
            let text_width = self.width.saturating_sub(first_col + 2).max(10);
            let wrapped = wrap_text(second, text_width, "", "");
            let mut lines = wrapped.lines();
            if let Some(head) = lines.next() {
                self.write(head);
            }
            self.write("\n");
            for line in lines {
                let line = format!("{:indent$}{line}\n", "", indent = first_col + self.current_indent);
                self.write(&line);
            }
        }
    }

    /// Heading plus indented body, separated from what came before.
    pub fn section(&mut self, name: &str, body: impl FnOnce(&mut Self)) {
        self.write_paragraph();
        self.write_heading(name);
        self.indented(body);
    }

    pub fn indented(&mut self, body: impl FnOnce(&mut Self)) {
        self.indent();
        body(self);
        self.dedent();
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_word_boundaries() {
        let text = wrap_text("one two three four", 9, "", "  ");
        assert_eq!(text, "one two\n  three\n  four");
        assert_eq!(wrap_text("a\n\nb", 10, "> ", "> "), "> a\n\n> b");
    }

    #[test]
    fn usage_and_definition_list() {
        let mut f = HelpFormatter::new(Some(60), None);
        f.write_usage("tool sub", "[OPTIONS] SRC... DST");
        f.section("Options", |f| {
            f.write_dl(&[
                ("-c, --count INTEGER".to_string(), "How many.".to_string()),
                ("--help".to_string(), "Show this message and exit.".to_string()),
            ]);
        });
        assert_eq!(
            f.finish(),
            "Usage: tool sub [OPTIONS] SRC... DST\n\
             \n\
             Options:\n  \
             -c, --count INTEGER  How many.\n  \
             --help               Show this message and exit.\n"
        );
    }

    #[test]
    fn long_terms_move_help_to_next_line() {
        let mut f = HelpFormatter::new(Some(60), None);
        let term = "--a-very-long-option-name-indeed TEXT".to_string();
        f.write_dl(&[(term.clone(), "Help.".to_string())]);
        let out = f.finish();
        assert_eq!(out, format!("{term}\n{}Help.\n", " ".repeat(32)));
    }

    #[test]
    fn width_defaults() {
        assert_eq!(HelpFormatter::new(None, None).width(), 78);
        assert_eq!(HelpFormatter::new(None, Some(40)).width(), 50);
        assert_eq!(HelpFormatter::new(Some(100), None).width(), 100);
    }
}
