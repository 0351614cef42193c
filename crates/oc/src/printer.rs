use std::io::Write;

use crate::message::{DisplayMessage, Status};

/// Prints successive response views as a continuous stream of text.
///
/// Views carry the full text so far, so only the part not printed yet is
/// written. A view that doesn't extend what was already printed, such as an
/// error ending the stream, starts on a new line.
pub struct LivePrinter<W: Write> {
    out: W,
    thinking: Option<String>,
    thinking_done: bool,
    answer: Option<String>,
}

impl<W: Write> LivePrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            thinking: None,
            thinking_done: false,
            answer: None,
        }
    }

    /// Writes whatever `view` adds to the previous views.
    pub fn print(&mut self, view: &[DisplayMessage]) -> std::io::Result<()> {
        for message in view {
            match &message.metadata {
                Some(metadata) => {
                    if self.thinking.is_none() {
                        writeln!(self.out, "{}", metadata.title)?;
                    }
                    let printed = self.thinking.get_or_insert_with(String::new);
                    write_delta(&mut self.out, printed, &message.content)?;

                    if metadata.status == Status::Done && !self.thinking_done {
                        self.thinking_done = true;
                        match metadata.time {
                            Some(time) => writeln!(self.out, "\n(thought for {time:.1}s)\n")?,
                            None => writeln!(self.out, "\n")?,
                        }
                    }
                }
                None => {
                    if self.answer.is_none() && self.thinking.is_some() && !self.thinking_done {
                        writeln!(self.out, "\n")?;
                    }
                    let printed = self.answer.get_or_insert_with(String::new);
                    write_delta(&mut self.out, printed, &message.content)?;
                }
            }
        }

        self.out.flush()
    }

    /// Ends the output on a new line.
    pub fn finish(mut self) -> std::io::Result<W> {
        if self.answer.is_some() {
            writeln!(self.out)?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

fn write_delta(out: &mut impl Write, printed: &mut String, content: &str) -> std::io::Result<()> {
    match content.strip_prefix(printed.as_str()) {
        Some(delta) => {
            write!(out, "{delta}")?;
            printed.push_str(delta);
        }
        None => {
            tracing::event!(
                tracing::Level::DEBUG,
                "View doesn't extend the printed text, printing it whole"
            );
            write!(out, "\n{content}")?;
            *printed = content.to_string();
        }
    }
    Ok(())
}

/// Renders a final view as plain text.
pub fn render(view: &[DisplayMessage]) -> String {
    view.iter()
        .map(|message| match &message.metadata {
            Some(metadata) => match metadata.time {
                Some(time) => format!(
                    "{}\n{}\n(thought for {time:.1}s)",
                    metadata.title, message.content
                ),
                None => format!("{}\n{}", metadata.title, message.content),
            },
            None => message.content.clone(),
        })
        .collect::<Vec<String>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::StreamSegmenter;
    use pretty_assertions::assert_eq;

    fn printed(chunks: &[&str]) -> String {
        let mut segmenter = StreamSegmenter::new();
        let mut printer = LivePrinter::new(Vec::new());

        for chunk in chunks {
            printer.print(&segmenter.ingest(chunk)).unwrap();
        }
        printer.print(&segmenter.finalize()).unwrap();

        String::from_utf8(printer.finish().unwrap()).unwrap()
    }

    #[test]
    fn prints_plain_answers_once() {
        assert_eq!(printed(&["Hello", ", ", "world!"]), "Hello, world!\n");
    }

    #[test]
    fn prints_thinking_before_the_answer() {
        let output = printed(&["<think>", "step one", "</think>", "Done."]);

        assert!(output.starts_with("Thinking...\nstep one\n(thought for "));
        assert!(output.ends_with("s)\n\nDone.\n"));
        assert_eq!(output.matches("step one").count(), 1);
    }

    #[test]
    fn prints_errors_that_replace_a_partial_answer() {
        let mut printer = LivePrinter::new(Vec::new());

        printer.print(&[DisplayMessage::answer("hello")]).unwrap();
        printer
            .print(&[DisplayMessage::error("no data received for 30s")])
            .unwrap();

        let output = String::from_utf8(printer.finish().unwrap()).unwrap();
        assert_eq!(output, "hello\nError: no data received for 30s\n");
    }

    #[test]
    fn prints_errors_after_an_open_thinking_span() {
        let mut segmenter = StreamSegmenter::new();
        let mut printer = LivePrinter::new(Vec::new());

        printer.print(&segmenter.ingest("<think>step one")).unwrap();
        printer
            .print(&[DisplayMessage::error("connection reset")])
            .unwrap();

        let output = String::from_utf8(printer.finish().unwrap()).unwrap();
        assert_eq!(output, "Thinking...\nstep one\n\nError: connection reset\n");
    }

    #[test]
    fn renders_final_views() {
        let view = vec![DisplayMessage::answer("42")];

        assert_eq!(render(&view), "42");
    }
}
