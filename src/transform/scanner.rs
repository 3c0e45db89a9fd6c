//! Minimal JavaScript token scanner
//!
//! Only knows enough to skip comments, string/template/regex literals and to
//! report identifiers and punctuation with byte offsets. Not a parser.
//!
//! Whether `/` starts a regex is decided from the previous token. After `)`
//! that means regex only when the parens belonged to `if`, `while`, `for` or
//! `with`. A `}` always counts as the end of an expression, so a regex
//! literal opening a statement right after a block is read as division.

/// Kind of a significant token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    /// Single or double quoted string
    Str,
    /// A template literal chunk (head, middle or tail)
    Template,
    Regex,
    Punct(u8),
}

/// A token with its byte span in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Keywords after which a `/` starts a regular expression
const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

/// Keywords whose parenthesised head is followed by a statement
const CONTROL_KEYWORDS: &[&str] = &["if", "while", "for", "with"];

/// Iterator over the significant tokens of a script
pub struct Scanner<'a> {
    text: &'a str,
    src: &'a [u8],
    pos: usize,
    prev: Option<Token>,
    brace_depth: usize,
    /// Brace depths at which a `${` substitution was opened
    template_stack: Vec<usize>,
    /// One entry per open `(`: whether it is a control statement head
    parens: Vec<bool>,
    /// The last `)` closed a control statement head
    closed_control_head: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            src: text.as_bytes(),
            pos: 0,
            prev: None,
            brace_depth: 0,
            template_stack: Vec::new(),
            parens: Vec::new(),
            closed_control_head: false,
        }
    }

    /// Source text of a token
    pub fn slice(&self, token: &Token) -> &'a str {
        &self.text[token.start..token.end]
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    /// Skip whitespace and comments; false at end of input
    fn skip_trivia(&mut self) -> bool {
        while let Some(c) = self.peek_at(0) {
            match c {
                b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek_at(0) {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    loop {
                        match self.peek_at(0) {
                            None => break,
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                }
                // non-breaking space and other unicode whitespace
                _ if c >= 0x80 && self.text[self.pos..].starts_with(char::is_whitespace) => {
                    self.pos += self.text[self.pos..]
                        .chars()
                        .next()
                        .map(char::len_utf8)
                        .unwrap_or(1);
                }
                _ => return true,
            }
        }
        false
    }

    fn scan_string(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(c) = self.peek_at(0) {
            self.pos += 1;
            match c {
                b'\\' => self.pos += 1,
                b'\n' => break,
                _ if c == quote => break,
                _ => {}
            }
        }
        self.pos = self.pos.min(self.src.len());
    }

    /// Scan template characters up to the closing backtick or a `${`
    fn scan_template_chunk(&mut self) {
        while let Some(c) = self.peek_at(0) {
            match c {
                b'\\' => self.pos += 2,
                b'`' => {
                    self.pos += 1;
                    return;
                }
                b'$' if self.peek_at(1) == Some(b'{') => {
                    self.pos += 2;
                    self.template_stack.push(self.brace_depth);
                    self.brace_depth += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.src.len());
    }

    fn scan_regex(&mut self) {
        self.pos += 1;
        let mut in_class = false;
        while let Some(c) = self.peek_at(0) {
            match c {
                b'\\' => self.pos += 1,
                b'\n' => break,
                b'[' => in_class = true,
                b']' => in_class = false,
                b'/' if !in_class => {
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            self.pos += 1;
        }
        self.pos = self.pos.min(self.src.len());
        while self.peek_at(0).is_some_and(is_ident_byte) {
            self.pos += 1;
        }
    }

    fn regex_allowed(&self) -> bool {
        match self.prev {
            None => true,
            Some(Token {
                kind: TokenKind::Punct(c),
                ..
            }) if c == b')' => self.closed_control_head,
            Some(Token {
                kind: TokenKind::Punct(c),
                ..
            }) => !matches!(c, b']' | b'}'),
            Some(token @ Token {
                kind: TokenKind::Ident,
                ..
            }) => REGEX_PRECEDING_KEYWORDS.contains(&self.slice(&token)),
            Some(_) => false,
        }
    }

    fn scan_token(&mut self) -> TokenKind {
        let c = self.src[self.pos];

        match c {
            b'\'' | b'"' => {
                self.scan_string(c);
                TokenKind::Str
            }
            b'`' => {
                self.pos += 1;
                self.scan_template_chunk();
                TokenKind::Template
            }
            b'}' if self.brace_depth > 0
                && self.template_stack.last() == Some(&(self.brace_depth - 1)) =>
            {
                self.brace_depth -= 1;
                self.template_stack.pop();
                self.pos += 1;
                self.scan_template_chunk();
                TokenKind::Template
            }
            b'/' if self.regex_allowed() => {
                self.scan_regex();
                TokenKind::Regex
            }
            _ if is_ident_start(c) => {
                while self.peek_at(0).is_some_and(is_ident_byte) {
                    self.pos += 1;
                }
                TokenKind::Ident
            }
            b'0'..=b'9' => {
                while self
                    .peek_at(0)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'.' || c == b'_')
                {
                    self.pos += 1;
                }
                TokenKind::Number
            }
            _ => {
                match c {
                    b'(' => {
                        let control = self.prev.is_some_and(|token| {
                            token.kind == TokenKind::Ident
                                && CONTROL_KEYWORDS.contains(&self.slice(&token))
                        });
                        self.parens.push(control);
                    }
                    b')' => self.closed_control_head = self.parens.pop().unwrap_or(false),
                    b'{' => self.brace_depth += 1,
                    b'}' => self.brace_depth = self.brace_depth.saturating_sub(1),
                    _ => {}
                }
                self.pos += 1;
                TokenKind::Punct(c)
            }
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if !self.skip_trivia() {
            return None;
        }

        let start = self.pos;
        let kind = self.scan_token();
        let token = Token {
            kind,
            start,
            end: self.pos,
        };
        self.prev = Some(token);

        Some(token)
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$' || c >= 0x80
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idents(source: &str) -> Vec<&str> {
        let mut scanner = Scanner::new(source);
        let mut out = Vec::new();
        while let Some(token) = scanner.next() {
            if token.kind == TokenKind::Ident {
                out.push(scanner.slice(&token));
            }
        }
        out
    }

    #[test]
    fn test_comments_and_strings_are_skipped() {
        let source = r#"
            // define(function () {})
            /* define([]) */
            var s = "define(", t = 'it\'s define(';
            go();
        "#;
        assert_eq!(idents(source), vec!["var", "s", "t", "go"]);
    }

    #[test]
    fn test_regex_vs_division() {
        assert_eq!(idents("var r = /define(/g; x = a / b / c;"), vec!["var", "r", "x", "a", "b", "c"]);
        assert_eq!(idents("return /[/]define/.test(s)"), vec!["return", "test", "s"]);
    }

    #[test]
    fn test_regex_after_control_statement_head() {
        assert_eq!(idents("if (ok) /'/.test(s); go()"), vec!["if", "ok", "test", "s", "go"]);
        assert_eq!(idents("while (a(b)) /x/g.exec(c)"), vec!["while", "a", "b", "exec", "c"]);
        assert_eq!(idents("y = (a + b) / 2 / c"), vec!["y", "a", "b", "c"]);
        assert_eq!(idents("f(x) / y"), vec!["f", "x", "y"]);
    }

    #[test]
    fn test_regex_after_block_is_read_as_division() {
        // known limitation: `}` is taken as the end of an expression
        let mut scanner = Scanner::new("{}\n/a/.test(s)");
        let kinds: Vec<_> = scanner.by_ref().map(|t| t.kind).collect();
        assert_eq!(kinds[2], TokenKind::Punct(b'/'));
    }

    #[test]
    fn test_template_substitutions_are_code() {
        let source = "var t = `define( ${ call({a: 1}) } text ${x}`; done()";
        assert_eq!(idents(source), vec!["var", "t", "call", "a", "x", "done"]);
    }

    #[test]
    fn test_unterminated_literals_do_not_panic() {
        assert_eq!(idents("var s = 'open"), vec!["var", "s"]);
        assert_eq!(idents("x = `open ${"), vec!["x"]);
        assert_eq!(idents("/* open"), Vec::<&str>::new());
        assert_eq!(idents("r = /open"), vec!["r"]);
    }

    #[test]
    fn test_token_spans() {
        let mut scanner = Scanner::new("define ( 'a' )");
        let tokens: Vec<_> = scanner.by_ref().collect();
        assert_eq!(tokens[0], Token { kind: TokenKind::Ident, start: 0, end: 6 });
        assert_eq!(tokens[1].kind, TokenKind::Punct(b'('));
        assert_eq!(tokens[2], Token { kind: TokenKind::Str, start: 9, end: 12 });
    }
}
