use std::io::{self, Write};

/// Writes the typed output to a terminal as it grows.
///
/// The typing view only ever extends its output while one response is
/// shown, so only the newly revealed suffix is written. Any other change
/// (a new turn, a clear) starts a fresh line.
pub struct TerminalRenderer<W: Write> {
    out: W,
    printed: String,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: String::new(),
        }
    }

    pub fn printed(&self) -> &str {
        &self.printed
    }

    pub fn render(&mut self, rendered: &str) -> io::Result<()> {
        if rendered == self.printed {
            return Ok(());
        }

        match rendered.strip_prefix(self.printed.as_str()) {
            Some(suffix) => self.out.write_all(suffix.as_bytes())?,
            None => {
                if !self.printed.is_empty() {
                    self.out.write_all(b"\n")?;
                }
                self.out.write_all(rendered.as_bytes())?;
            }
        }

        self.printed.clear();
        self.printed.push_str(rendered);
        self.out.flush()
    }

    /// Ends the current response line.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.printed.is_empty() {
            self.out.write_all(b"\n")?;
            self.printed.clear();
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(renderer: TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn growing_output_writes_only_suffixes() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        for rendered in ["H", "He", "He", "Hello"] {
            renderer.render(rendered).unwrap();
        }
        renderer.finish().unwrap();

        assert_eq!(output(renderer), "Hello\n");
    }

    #[test]
    fn diverging_output_starts_a_new_line() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.render("first").unwrap();
        renderer.render("sec").unwrap();
        assert_eq!(renderer.printed(), "sec");
        renderer.render("second").unwrap();

        assert_eq!(output(renderer), "first\nsecond");
    }

    #[test]
    fn finish_without_output_writes_nothing() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.finish().unwrap();
        renderer.render("").unwrap();

        assert_eq!(output(renderer), "");
    }
}
