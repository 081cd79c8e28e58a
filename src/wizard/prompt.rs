use std::io::{self, BufRead, Write};

/// Line based conversation with the operator.
pub trait Prompter {
    /// Shows `question` and returns the answer without the line ending.
    fn ask(&mut self, question: &str) -> io::Result<String>;

    /// Shows `message` on its own line.
    fn say(&mut self, message: &str);
}

/// Talks over standard input and output.
#[derive(Debug, Default)]
pub struct StdioPrompter;

impl Prompter for StdioPrompter {
    fn ask(&mut self, question: &str) -> io::Result<String> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{question} ")?;
        stdout.flush()?;

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "standard input closed",
            ));
        }

        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }

    fn say(&mut self, message: &str) {
        println!("{message}");
    }
}
