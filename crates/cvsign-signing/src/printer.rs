//! Progress output of signing runs.

/// Receives one line per processing step.
pub trait Printer {
    fn print_line(&mut self, line: &str);
}

/// Collects output lines in memory.
#[derive(Debug, Default, Clone)]
pub struct StringPrinter {
    buf: String,
}

impl StringPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> &str {
        &self.buf
    }
}

impl Printer for StringPrinter {
    fn print_line(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');
    }
}

/// Writes output lines to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutPrinter;

impl Printer for StdoutPrinter {
    fn print_line(&mut self, line: &str) {
        println!("{line}");
    }
}
