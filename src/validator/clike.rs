//! Lexer for C-family sources (C++, Java, C#, JavaScript).
//!
//! Not a parser: it blanks out comments and literals so later checks can
//! pattern-match on real code, and verifies that brackets balance.

/// Literal syntax differences that matter to the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Dialect {
    JavaScript,
    Cpp,
    Java,
    CSharp,
}

/// Source with comments and literal contents replaced by spaces.
/// Newlines are kept so line numbers still line up.
pub(super) struct Scan {
    pub code: String,
    pub error: Option<String>,
}

struct Lexer<'a> {
    chars: &'a [char],
    pos: usize,
    line: usize,
    code: String,
    error: Option<String>,
}

impl Lexer<'_> {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Emit a blank in place of `c`, keeping newlines.
    fn blank(&mut self, c: char) {
        if c == '\n' {
            self.line += 1;
            self.code.push('\n');
        } else {
            self.code.push(' ');
        }
        self.pos += 1;
    }

    fn fail(&mut self, message: String) {
        self.error.get_or_insert(message);
    }

    fn line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.blank(c);
        }
    }

    fn block_comment(&mut self) {
        let start = self.line;
        self.blank('/');
        self.blank('*');
        loop {
            match (self.peek(0), self.peek(1)) {
                (Some('*'), Some('/')) => {
                    self.blank('*');
                    self.blank('/');
                    return;
                }
                (Some(c), _) => self.blank(c),
                (None, _) => {
                    self.fail(format!("unterminated comment (line {start})"));
                    return;
                }
            }
        }
    }

    /// Ordinary quoted literal; may not span lines unless the newline is escaped.
    fn quoted(&mut self, quote: char) {
        let start = self.line;
        self.code.push(quote);
        self.pos += 1;
        loop {
            match self.peek(0) {
                Some('\\') => {
                    self.blank('\\');
                    if let Some(c) = self.peek(0) {
                        self.blank(c);
                    }
                }
                Some(c) if c == quote => {
                    self.code.push(quote);
                    self.pos += 1;
                    return;
                }
                Some('\n') | None => {
                    self.fail(format!("unterminated string literal (line {start})"));
                    return;
                }
                Some(c) => self.blank(c),
            }
        }
    }

    /// JavaScript template literal. `${...}` bodies are treated as text.
    fn template(&mut self) {
        let start = self.line;
        self.code.push('`');
        self.pos += 1;
        loop {
            match self.peek(0) {
                Some('\\') => {
                    self.blank('\\');
                    if let Some(c) = self.peek(0) {
                        self.blank(c);
                    }
                }
                Some('`') => {
                    self.code.push('`');
                    self.pos += 1;
                    return;
                }
                Some(c) => self.blank(c),
                None => {
                    self.fail(format!("unterminated template literal (line {start})"));
                    return;
                }
            }
        }
    }

    /// C# `@"..."`: no escapes, `""` is a literal quote, may span lines.
    fn verbatim(&mut self) {
        let start = self.line;
        self.blank('@');
        self.code.push('"');
        self.pos += 1;
        loop {
            match (self.peek(0), self.peek(1)) {
                (Some('"'), Some('"')) => {
                    self.blank('"');
                    self.blank('"');
                }
                (Some('"'), _) => {
                    self.code.push('"');
                    self.pos += 1;
                    return;
                }
                (Some(c), _) => self.blank(c),
                (None, _) => {
                    self.fail(format!("unterminated verbatim string (line {start})"));
                    return;
                }
            }
        }
    }

    /// C++ `R"delim( ... )delim"`.
    fn raw(&mut self) {
        let start = self.line;
        self.blank('R');
        self.code.push('"');
        self.pos += 1;

        let mut delimiter = String::new();
        while let Some(c) = self.peek(0) {
            if c == '(' {
                break;
            }
            if c == '\n' || c == '"' || delimiter.len() > 16 {
                self.fail(format!("invalid raw string delimiter (line {start})"));
                return;
            }
            delimiter.push(c);
            self.blank(c);
        }
        let closing: Vec<char> = format!("){delimiter}\"").chars().collect();

        while self.pos < self.chars.len() {
            if self.chars[self.pos..].starts_with(&closing) {
                for _ in 0..closing.len() - 1 {
                    self.blank(' ');
                }
                self.code.push('"');
                self.pos += 1;
                return;
            }
            let c = self.chars[self.pos];
            self.blank(c);
        }
        self.fail(format!("unterminated raw string literal (line {start})"));
    }

    /// Java text block or C# raw string: three or more quotes open, the same
    /// run closes. Only Java text blocks honour escapes.
    fn text_block(&mut self, dialect: Dialect) {
        let start = self.line;
        let mut fence = 0;
        while self.peek(0) == Some('"') && (dialect == Dialect::CSharp || fence < 3) {
            self.code.push('"');
            self.pos += 1;
            fence += 1;
        }
        loop {
            match self.peek(0) {
                Some('\\') if dialect == Dialect::Java => {
                    self.blank('\\');
                    if let Some(c) = self.peek(0) {
                        self.blank(c);
                    }
                }
                Some('"') if (0..fence).all(|i| self.peek(i) == Some('"')) => {
                    for _ in 0..fence {
                        self.code.push('"');
                        self.pos += 1;
                    }
                    return;
                }
                Some(c) => self.blank(c),
                None => {
                    self.fail(format!("unterminated text block (line {start})"));
                    return;
                }
            }
        }
    }

    /// JavaScript `/pattern/flags`. A `/` inside a `[...]` class does not close.
    fn regex(&mut self) {
        let start = self.line;
        self.code.push('/');
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.peek(0) {
                Some('\\') => {
                    self.blank('\\');
                    if let Some(c) = self.peek(0).filter(|&c| c != '\n') {
                        self.blank(c);
                    }
                }
                Some('[') => {
                    in_class = true;
                    self.blank('[');
                }
                Some(']') => {
                    in_class = false;
                    self.blank(']');
                }
                Some('/') if !in_class => {
                    self.code.push('/');
                    self.pos += 1;
                    return;
                }
                Some('\n') | None => {
                    self.fail(format!("unterminated regular expression (line {start})"));
                    return;
                }
                Some(c) => self.blank(c),
            }
        }
    }

    /// Whether a `/` here starts a regex rather than dividing, judged from the
    /// last significant code emitted so far.
    fn regex_allowed(&self) -> bool {
        const KEYWORDS: &[&str] = &[
            "return", "typeof", "case", "do", "else", "in", "of", "void", "yield", "await",
            "delete", "instanceof", "new", "throw",
        ];
        let code = self.code.trim_end();
        let Some(last) = code.chars().next_back() else {
            return true;
        };
        let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
        if is_word(last) {
            let word = &code[code.trim_end_matches(is_word).len()..];
            return KEYWORDS.contains(&word);
        }
        !matches!(last, ')' | ']' | '"' | '\'' | '`' | '/')
    }

    /// C++14 digit separator: `'` inside a numeric literal such as `1'000`.
    fn in_number(&self) -> bool {
        let before = &self.chars[..self.pos];
        let run = before
            .iter()
            .rev()
            .take_while(|&&c| c.is_ascii_alphanumeric() || matches!(c, '\'' | '.'))
            .count();
        run > 0
            && before[self.pos - run].is_ascii_digit()
            && self.peek(1).is_some_and(|c| c.is_ascii_alphanumeric())
    }

    fn prev_is_ident(&self) -> bool {
        self.pos > 0 && {
            let c = self.chars[self.pos - 1];
            c.is_alphanumeric() || c == '_'
        }
    }
}

pub(super) fn scan(source: &str, dialect: Dialect) -> Scan {
    let chars: Vec<char> = source.chars().collect();
    let mut lx = Lexer {
        chars: &chars,
        pos: 0,
        line: 1,
        code: String::with_capacity(source.len()),
        error: None,
    };

    while let Some(c) = lx.peek(0) {
        if lx.error.is_some() {
            break;
        }
        match (c, lx.peek(1)) {
            ('/', Some('/')) => lx.line_comment(),
            ('/', Some('*')) => lx.block_comment(),
            ('/', _) if dialect == Dialect::JavaScript && lx.regex_allowed() => lx.regex(),
            ('"', Some('"'))
                if matches!(dialect, Dialect::Java | Dialect::CSharp) && lx.peek(2) == Some('"') =>
            {
                lx.text_block(dialect);
            }
            ('\'', _) if dialect == Dialect::Cpp && lx.in_number() => {
                lx.code.push(' ');
                lx.pos += 1;
            }
            ('"' | '\'', _) => lx.quoted(c),
            ('`', _) if dialect == Dialect::JavaScript => lx.template(),
            ('@', Some('"')) if dialect == Dialect::CSharp => lx.verbatim(),
            ('R', Some('"')) if dialect == Dialect::Cpp && !lx.prev_is_ident() => lx.raw(),
            ('\n', _) => {
                lx.line += 1;
                lx.code.push('\n');
                lx.pos += 1;
            }
            _ => {
                lx.code.push(c);
                lx.pos += 1;
            }
        }
    }

    Scan {
        code: lx.code,
        error: lx.error,
    }
}

/// Check `()`, `[]` and `{}` nesting on already-scanned code.
pub(super) fn check_balance(code: &str) -> Option<String> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1;

    for c in code.chars() {
        match c {
            '\n' => line += 1,
            '(' | '[' | '{' => stack.push((c, line)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, opened)) => {
                        return Some(format!(
                            "closing '{c}' does not match '{open}' opened on line {opened} (line {line})"
                        ));
                    }
                    None => return Some(format!("unmatched '{c}' (line {line})")),
                }
            }
            _ => {}
        }
    }

    stack
        .first()
        .map(|(open, opened)| format!("'{open}' opened on line {opened} was never closed"))
}
