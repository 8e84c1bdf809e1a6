//! Line tokenizer.
//!
//! Splits on unquoted whitespace. Single and double quotes group text and
//! are dropped. A backslash always takes the next character literally,
//! inside or outside quotes. Malformed input never errors: an unterminated
//! quote simply runs to the end of the line.

/// One tokenized command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// The line exactly as received.
    pub raw: String,
    /// First token.
    pub name: String,
    /// Remaining tokens, in order.
    pub args: Vec<String>,
    /// Byte offset in `raw` just past the name token.
    name_end: usize,
}

impl ParsedCommand {
    /// Raw text following the command name, trimmed.
    ///
    /// Unlike `args`, this keeps quoting and internal spacing intact, so
    /// commands that take free-form bodies (macro definitions, statements
    /// split over lines) can see exactly what was typed.
    pub fn tail(&self) -> &str {
        self.raw.get(self.name_end..).map_or("", str::trim)
    }

    /// Argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Tokenize `input` into its words.
pub fn tokenize(input: &str) -> Vec<String> {
    spans(input).into_iter().map(|(token, _)| token).collect()
}

/// Tokens paired with the byte offset in `input` where each one ends.
fn spans(input: &str) -> Vec<(String, usize)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = input.char_indices();

    while let Some((index, ch)) = chars.next() {
        if ch == '\\' {
            if let Some((_, next)) = chars.next() {
                current.push(next);
            }
            in_token = true;
            continue;
        }
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_token = true;
                },
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push((std::mem::take(&mut current), index));
                        in_token = false;
                    }
                },
                _ => {
                    current.push(ch);
                    in_token = true;
                },
            },
        }
    }

    if in_token {
        tokens.push((current, input.len()));
    }
    tokens
}

/// Parse a line into a command. Blank input yields `None`.
pub fn parse_line(line: &str) -> Option<ParsedCommand> {
    if line.trim().is_empty() {
        return None;
    }
    let mut tokens = spans(line).into_iter();
    let (name, name_end) = tokens.next()?;
    Some(ParsedCommand {
        raw: line.to_string(),
        name,
        args: tokens.map(|(token, _)| token).collect(),
        name_end,
    })
}
