//! Syntax check for Python sources.
//!
//! The source is parsed with `rustpython-parser`, so no interpreter is
//! needed. When the parse fails, a structural pass over brackets, strings,
//! `:` and indentation runs first, because its messages name the usual
//! learner mistakes more plainly than a parser's unexpected-token error.

use std::collections::HashSet;

use rustpython_parser::{parse, Mode};

/// Keywords that open a compound statement and therefore need a `:`.
const COMPOUND_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "def", "class", "try", "except", "finally", "with",
    "async",
];

const TAB_SIZE: usize = 8;

/// One logical line: physical lines joined by brackets or `\` continuations.
#[derive(Debug)]
struct LogicalLine {
    number: usize,
    indent: usize,
    first_word: String,
    /// A `:` outside brackets and strings.
    has_colon: bool,
    /// Last significant character is `:` (block opener).
    ends_with_colon: bool,
}

struct Tokenizer<'a> {
    chars: &'a [char],
    pos: usize,
    line: usize,
    brackets: Vec<(char, usize)>,
}

impl Tokenizer<'_> {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Measure leading whitespace. Returns `None` for blank or comment-only lines.
    fn indentation(&mut self) -> Option<usize> {
        let mut width = 0;
        loop {
            match self.peek(0) {
                Some(' ') => width += 1,
                Some('\t') => width = (width / TAB_SIZE + 1) * TAB_SIZE,
                Some('\r' | '\x0c') => {}
                Some('\n') => {
                    self.bump();
                    return None;
                }
                Some('#') => {
                    self.skip_comment();
                    self.bump();
                    return None;
                }
                None => return None,
                Some(_) => return Some(width),
            }
            self.pos += 1;
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn string(&mut self, quote: char) -> Result<(), String> {
        let start = self.line;
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => {
                    if !triple {
                        return Ok(());
                    }
                    if self.peek(0) == Some(quote) && self.peek(1) == Some(quote) {
                        self.pos += 2;
                        return Ok(());
                    }
                }
                Some('\n') if !triple => {
                    return Err(format!("unterminated string literal (line {start})"));
                }
                Some(_) => {}
                None if triple => {
                    return Err(format!(
                        "unterminated triple-quoted string literal (line {start})"
                    ));
                }
                None => return Err(format!("unterminated string literal (line {start})")),
            }
        }
    }

    /// Read one logical line starting at the first non-blank character.
    fn logical_line(&mut self, indent: usize) -> Result<LogicalLine, String> {
        let number = self.line;
        let mut first_word = String::new();
        let mut word_done = false;
        let mut has_colon = false;
        let mut last = ' ';

        while let Some(c) = self.peek(0) {
            if !word_done {
                if c.is_alphanumeric() || c == '_' {
                    first_word.push(c);
                } else {
                    word_done = true;
                }
            }

            match c {
                '#' => self.skip_comment(),
                '\n' => {
                    self.bump();
                    if self.brackets.is_empty() {
                        break;
                    }
                }
                '\\' if matches!(self.peek(1), Some('\n')) => {
                    self.pos += 1;
                    self.bump();
                }
                '\\' if matches!((self.peek(1), self.peek(2)), (Some('\r'), Some('\n'))) => {
                    self.pos += 2;
                    self.bump();
                }
                '"' | '\'' => {
                    self.string(c)?;
                    last = c;
                }
                '(' | '[' | '{' => {
                    self.brackets.push((c, self.line));
                    self.pos += 1;
                    last = c;
                }
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match self.brackets.pop() {
                        Some((open, _)) if open == expected => {}
                        Some((open, opened)) => {
                            return Err(format!(
                                "closing parenthesis '{c}' does not match opening parenthesis '{open}' on line {opened} (line {})",
                                self.line
                            ));
                        }
                        None => return Err(format!("unmatched '{c}' (line {})", self.line)),
                    }
                    self.pos += 1;
                    last = c;
                }
                ':' => {
                    if self.brackets.is_empty() && self.peek(1) != Some('=') {
                        has_colon = true;
                    }
                    self.pos += 1;
                    last = c;
                }
                c if c.is_whitespace() => self.pos += 1,
                _ => {
                    self.pos += 1;
                    last = c;
                }
            }
        }

        if let Some((open, opened)) = self.brackets.first() {
            return Err(format!("'{open}' was never closed (line {opened})"));
        }

        Ok(LogicalLine {
            number,
            indent,
            first_word,
            has_colon,
            ends_with_colon: last == ':',
        })
    }
}

fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokenizer = Tokenizer {
        chars: &chars,
        pos: 0,
        line: 1,
        brackets: Vec::new(),
    };

    let mut lines = Vec::new();
    while tokenizer.peek(0).is_some() {
        if let Some(indent) = tokenizer.indentation() {
            lines.push(tokenizer.logical_line(indent)?);
        }
    }
    Ok(lines)
}

fn block_context(opener: &LogicalLine) -> String {
    if COMPOUND_KEYWORDS.contains(&opener.first_word.as_str()) {
        format!("'{}' statement on line {}", opener.first_word, opener.number)
    } else {
        format!("line {}", opener.number)
    }
}

/// Return the first syntax problem found, if any.
pub(super) fn check_syntax(source: &str) -> Result<(), String> {
    let Err(err) = parse(source, Mode::Module, "<string>") else {
        return Ok(());
    };
    check_structure(source)?;
    Err(format!(
        "{} (line {})",
        err.error,
        line_at(source, usize::from(err.offset))
    ))
}

/// 1-based line containing byte `offset`.
fn line_at(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

fn check_structure(source: &str) -> Result<(), String> {
    let lines = logical_lines(source)?;

    let mut indents = vec![0usize];
    let mut pending: Option<&LogicalLine> = None;

    for line in &lines {
        if COMPOUND_KEYWORDS.contains(&line.first_word.as_str()) && !line.has_colon {
            return Err(format!("expected ':' (line {})", line.number));
        }

        let top = *indents.last().unwrap_or(&0);
        if let Some(opener) = pending.take() {
            if line.indent <= top {
                return Err(format!(
                    "expected an indented block after {} (line {})",
                    block_context(opener),
                    line.number
                ));
            }
            indents.push(line.indent);
        } else if line.indent > top {
            return Err(format!("unexpected indent (line {})", line.number));
        } else if line.indent < top {
            while indents.last().is_some_and(|&i| i > line.indent) {
                indents.pop();
            }
            if indents.last() != Some(&line.indent) {
                return Err(format!(
                    "unindent does not match any outer indentation level (line {})",
                    line.number
                ));
            }
        }

        if line.ends_with_colon {
            pending = Some(line);
        }
    }

    if let Some(opener) = pending {
        return Err(format!(
            "expected an indented block after {}",
            block_context(opener)
        ));
    }
    Ok(())
}

/// Top-level module names brought in by `import` / `from ... import`.
pub(super) fn imported_modules(source: &str) -> HashSet<String> {
    let mut modules = HashSet::new();
    let top_level = |name: &str| name.split('.').next().unwrap_or_default().trim().to_owned();

    for line in source.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("import ") {
            for item in rest.split('#').next().unwrap_or_default().split(',') {
                let name = item.split_whitespace().next().unwrap_or_default();
                if !name.is_empty() {
                    modules.insert(top_level(name));
                }
            }
        } else if let Some(rest) = line.strip_prefix("from ") {
            if let Some(name) = rest.split_whitespace().next() {
                if !name.starts_with('.') {
                    modules.insert(top_level(name));
                }
            }
        }
    }
    modules
}
