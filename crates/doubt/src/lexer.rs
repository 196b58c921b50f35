//! Indentation-aware tokenizer.
//!
//! Lines are measured in whole indent units against a stack of open levels;
//! level changes emit one INDENT or DEDENT per step and line ends emit END
//! unless suppressed by `:=` (which introduces an indented block) or by a
//! trailing comment. Classification rules fire in a fixed order, first
//! match wins. Lexing never aborts: malformed input records a diagnostic
//! and continues.

use crate::{
    errors::{CodeLoc, Diagnostic},
    token::{Keyword, Token, TokenKind},
};

/// Lexes `source`, producing the token stream and any diagnostics.
///
/// `indent_unit` is the whitespace prefix counting as one level (four
/// spaces by default). At end of input every open level emits a DEDENT,
/// followed by one final END.
pub(crate) fn lex(source: &str, indent_unit: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    Lexer::new(source, indent_unit).run()
}

struct Lexer<'s> {
    source: &'s str,
    indent_unit: &'s str,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
    /// Open indentation levels; the length is the current level.
    indent_stack: Vec<u32>,
    /// Set by `:=` and by trailing comments: the current line emits no END.
    suppress_end: bool,
    line: u32,
}

impl<'s> Lexer<'s> {
    fn new(source: &'s str, indent_unit: &'s str) -> Self {
        Self {
            source,
            indent_unit,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
            indent_stack: Vec::new(),
            suppress_end: false,
            line: 0,
        }
    }

    fn run(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut offset = 0;
        for line in self.source.split('\n') {
            self.line += 1;
            self.lex_line(line, offset);
            offset += line.len() + 1;
        }
        // Close every open level, then emit the final END.
        let eof = self.source.len();
        while self.indent_stack.pop().is_some() {
            self.push(TokenKind::Dedent, eof, eof, 1);
        }
        self.push(TokenKind::End, eof, eof, 1);
        (self.tokens, self.diagnostics)
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize, column: u32) {
        self.tokens.push(Token::new(kind, start, end, self.line, column));
    }

    fn error(&mut self, message: impl Into<String>, column: u32) {
        self.diagnostics
            .push(Diagnostic::lex(message, CodeLoc::new(self.line, column)));
    }

    fn lex_line(&mut self, line: &str, offset: usize) {
        let bytes = line.as_bytes();
        let mut spaces = 0;
        while spaces < bytes.len() && bytes[spaces] == b' ' {
            spaces += 1;
        }
        if spaces < bytes.len() && bytes[spaces] == b'\t' {
            self.error("tabs are not allowed in indentation", spaces as u32 + 1);
            return;
        }
        let rest = &line[spaces..];
        // Blank and comment-only lines do not move the indent stack and
        // emit no END.
        if rest.is_empty() {
            return;
        }
        if let Some(doc) = rest.strip_prefix("///") {
            let start = offset + spaces + 3;
            self.push(TokenKind::DocComment, start, start + doc.len(), spaces as u32 + 1);
            return;
        }
        if rest.starts_with("//") {
            return;
        }

        self.handle_indent(spaces, offset);
        self.lex_content(line, spaces, offset);

        if self.suppress_end {
            self.suppress_end = false;
        } else {
            let eol = offset + line.len();
            self.push(TokenKind::End, eol, eol, line.len() as u32 + 1);
        }
    }

    fn handle_indent(&mut self, spaces: usize, offset: usize) {
        let unit = self.indent_unit.len().max(1);
        if spaces % unit != 0 {
            self.error(
                format!("indentation of {spaces} spaces is not a whole number of {unit}-space units"),
                1,
            );
        }
        let level = (spaces / unit) as u32;
        while level > self.indent_stack.len() as u32 {
            self.indent_stack.push(self.indent_stack.len() as u32 + 1);
            self.push(TokenKind::Indent, offset, offset, 1);
        }
        while level < self.indent_stack.len() as u32 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, offset, offset, 1);
        }
    }

    fn lex_content(&mut self, line: &str, content_start: usize, offset: usize) {
        let bytes = line.as_bytes();
        let mut i = content_start;
        while i < bytes.len() {
            let column = i as u32 + 1;
            let start = offset + i;
            let b = bytes[i];
            match b {
                b' ' => {
                    i += 1;
                }
                b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                    // Trailing comment: consumes to end of line and
                    // suppresses the END.
                    self.suppress_end = true;
                    return;
                }
                b'#' if i + 1 < bytes.len() && is_word_byte(bytes[i + 1]) => {
                    let end = scan_word(bytes, i + 1);
                    self.push(TokenKind::Tag, start + 1, offset + end, column);
                    i = end;
                }
                _ if b.is_ascii_alphabetic() || b == b'_' => {
                    let end = scan_word(bytes, i);
                    let word = &line[i..end];
                    if word.starts_with(|c: char| c.is_ascii_uppercase()) {
                        self.push(TokenKind::Type, start, offset + end, column);
                        i = end;
                    } else if word == "mut" && end < bytes.len() && bytes[end] == b'*' {
                        self.push(TokenKind::Keyword(Keyword::MutStar), start, offset + end + 1, column);
                        i = end + 1;
                    } else if let Some(keyword) = Keyword::lookup(word) {
                        self.push(TokenKind::Keyword(keyword), start, offset + end, column);
                        i = end;
                    } else {
                        self.push(TokenKind::Ident, start, offset + end, column);
                        i = end;
                    }
                }
                _ if b.is_ascii_digit() => {
                    i = self.lex_number(bytes, i, offset, column);
                }
                b'{' | b'(' | b'[' => {
                    self.push(TokenKind::BraOpen, start, start + 1, column);
                    i += 1;
                }
                b'}' | b')' | b']' => {
                    self.push(TokenKind::BraClose, start, start + 1, column);
                    i += 1;
                }
                b';' => {
                    self.push(TokenKind::Discard, start, start + 1, column);
                    i += 1;
                }
                b'\'' | b'"' => {
                    i = self.lex_string(bytes, i, offset, column);
                }
                b':' => {
                    if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                        // `:=` introduces an indented block: no END for
                        // this line.
                        self.push(TokenKind::Assign, start, start + 2, column);
                        self.suppress_end = true;
                        i += 2;
                    } else {
                        self.push(TokenKind::Sep, start, start + 1, column);
                        i += 1;
                    }
                }
                b'<' => {
                    if i + 1 < bytes.len() && bytes[i + 1] == b'-' {
                        self.push(TokenKind::Assign, start, start + 2, column);
                        i += 2;
                    } else {
                        i = self.lex_op(bytes, i, offset, column);
                    }
                }
                b'-' => {
                    if i + 2 < bytes.len() && bytes[i + 1] == b'-' && bytes[i + 2] == b'-' {
                        self.push(TokenKind::Ignore, start, start + 3, column);
                        i += 3;
                    } else if i + 1 < bytes.len() && bytes[i + 1] == b'>' {
                        self.push(TokenKind::Assign, start, start + 2, column);
                        i += 2;
                    } else {
                        self.push(TokenKind::Op, start, start + 1, column);
                        i += 1;
                    }
                }
                b'=' => {
                    if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                        self.push(TokenKind::Op, start, start + 2, column);
                        i += 2;
                    } else {
                        self.push(TokenKind::Assign, start, start + 1, column);
                        i += 1;
                    }
                }
                b'>' | b'!' => {
                    i = self.lex_op(bytes, i, offset, column);
                }
                b'+' | b'*' | b'/' | b'%' | b'&' | b'|' => {
                    self.push(TokenKind::Op, start, start + 1, column);
                    i += 1;
                }
                b'.' => {
                    self.push(TokenKind::Deref, start, start + 1, column);
                    i += 1;
                }
                b',' => {
                    self.push(TokenKind::Sep, start, start + 1, column);
                    i += 1;
                }
                b'\t' => {
                    self.error("tab character outside indentation", column);
                    i += 1;
                }
                _ => {
                    let ch_len = line[i..].chars().next().map_or(1, char::len_utf8);
                    self.error(format!("unexpected character {:?}", &line[i..i + ch_len]), column);
                    i += ch_len;
                }
            }
        }
    }

    /// `< > !` optionally followed by `=`.
    fn lex_op(&mut self, bytes: &[u8], i: usize, offset: usize, column: u32) -> usize {
        let start = offset + i;
        if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
            self.push(TokenKind::Op, start, start + 2, column);
            i + 2
        } else {
            self.push(TokenKind::Op, start, start + 1, column);
            i + 1
        }
    }

    fn lex_number(&mut self, bytes: &[u8], i: usize, offset: usize, column: u32) -> usize {
        let start = offset + i;
        let mut end = i;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        let mut fractional = false;
        if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
            fractional = true;
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        if end < bytes.len() && bytes[end] == b'f' {
            // The span excludes the suffix; the kind carries it.
            self.push(TokenKind::Float, start, offset + end, column);
            return end + 1;
        }
        let kind = if fractional { TokenKind::Double } else { TokenKind::Int };
        self.push(kind, start, offset + end, column);
        end
    }

    fn lex_string(&mut self, bytes: &[u8], i: usize, offset: usize, column: u32) -> usize {
        let quote = bytes[i];
        let mut end = i + 1;
        while end < bytes.len() && bytes[end] != quote {
            end += 1;
        }
        if end >= bytes.len() {
            self.error("unterminated string literal", column);
            self.push(TokenKind::Str, offset + i + 1, offset + end, column);
            return end;
        }
        // Span excludes the delimiters.
        self.push(TokenKind::Str, offset + i + 1, offset + end, column);
        end + 1
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn scan_word(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind as K;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, diagnostics) = lex(source, "    ");
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        tokens.iter().map(|t| t.kind).collect()
    }

    fn texts(source: &str) -> Vec<String> {
        let (tokens, _) = lex(source, "    ");
        tokens.iter().map(|t| t.text(source).to_owned()).collect()
    }

    #[test]
    fn hello_world_token_stream() {
        let source = "const msg = \"hi\"\nfn main() :=\n    log(msg)\n";
        assert_eq!(
            kinds(source),
            vec![
                K::Keyword(Keyword::Const),
                K::Ident,
                K::Assign,
                K::Str,
                K::End,
                K::Keyword(Keyword::Fn),
                K::Ident,
                K::BraOpen,
                K::BraClose,
                K::Assign,
                K::Indent,
                K::Ident,
                K::BraOpen,
                K::Ident,
                K::BraClose,
                K::End,
                K::Dedent,
                K::End,
            ]
        );
    }

    #[test]
    fn indent_balance_holds_at_eof() {
        let source = "fn f() :=\n    if x :=\n        log(x)\n";
        let (tokens, diagnostics) = lex(source, "    ");
        assert!(diagnostics.is_empty());
        let indents = tokens.iter().filter(|t| t.kind == K::Indent).count();
        let dedents = tokens.iter().filter(|t| t.kind == K::Dedent).count();
        assert_eq!(indents, dedents);
        assert_eq!(indents, 2);
    }

    #[test]
    fn one_token_per_indent_step() {
        // A two-level jump in a single line emits two INDENTs.
        let source = "a\n        b\n";
        let stream = kinds(source);
        assert_eq!(
            stream,
            vec![K::Ident, K::End, K::Indent, K::Indent, K::Ident, K::End, K::Dedent, K::Dedent, K::End]
        );
    }

    #[test]
    fn string_spans_exclude_delimiters() {
        let source = "log('hello')\n";
        let texts = texts(source);
        assert!(texts.contains(&"hello".to_owned()));
    }

    #[test]
    fn comment_only_lines_vanish() {
        let source = "// nothing here\n// more\n";
        assert_eq!(kinds(source), vec![K::End]);
    }

    #[test]
    fn trailing_comment_suppresses_end() {
        let source = "x // note\ny\n";
        assert_eq!(kinds(source), vec![K::Ident, K::Ident, K::End, K::End]);
    }

    #[test]
    fn doc_comment_token() {
        let source = "/// the docs\nx\n";
        let (tokens, diagnostics) = lex(source, "    ");
        assert!(diagnostics.is_empty());
        assert_eq!(tokens[0].kind, K::DocComment);
        assert_eq!(tokens[0].text(source), " the docs");
    }

    #[test]
    fn numbers_classify_int_double_float() {
        let source = "1 2.5 3f 4.25f\n";
        let stream = kinds(source);
        assert_eq!(stream, vec![K::Int, K::Double, K::Float, K::Float, K::End]);
        let texts = texts(source);
        assert_eq!(&texts[..4], &["1", "2.5", "3", "4.25"]);
    }

    #[test]
    fn operators_and_assigns() {
        let source = "a == b <= c <- d -> e := f = g\n";
        let (tokens, diagnostics) = lex(source, "    ");
        assert!(diagnostics.is_empty());
        let pairs: Vec<(TokenKind, &str)> = tokens.iter().map(|t| (t.kind, t.text(source))).collect();
        assert!(pairs.contains(&(K::Op, "==")));
        assert!(pairs.contains(&(K::Op, "<=")));
        assert!(pairs.contains(&(K::Assign, "<-")));
        assert!(pairs.contains(&(K::Assign, "->")));
        assert!(pairs.contains(&(K::Assign, ":=")));
        assert!(pairs.contains(&(K::Assign, "=")));
    }

    #[test]
    fn tag_and_type_and_mut_star() {
        let source = "#MCMC Point mut* x\n";
        let (tokens, _) = lex(source, "    ");
        assert_eq!(tokens[0].kind, K::Tag);
        assert_eq!(tokens[0].text(source), "MCMC");
        assert_eq!(tokens[1].kind, K::Type);
        assert_eq!(tokens[2].kind, K::Keyword(Keyword::MutStar));
        assert_eq!(tokens[3].kind, K::Ident);
    }

    #[test]
    fn tabs_in_indentation_are_rejected() {
        let source = "\tx\n";
        let (_, diagnostics) = lex(source, "    ");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("tab"));
    }

    #[test]
    fn ragged_indent_is_rejected() {
        let source = "fn f() :=\n   x\n";
        let (_, diagnostics) = lex(source, "    ");
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        let source = "log('oops\n";
        let (_, diagnostics) = lex(source, "    ");
        assert!(diagnostics.iter().any(|d| d.message.contains("unterminated")));
    }

    #[test]
    fn empty_source_is_one_end() {
        assert_eq!(kinds(""), vec![K::End]);
    }

    /// Re-renders a token stream to canonical text: one space between
    /// tokens, indentation reconstructed from INDENT/DEDENT, a newline per
    /// END. Comments are gone by construction.
    fn render(tokens: &[Token], source: &str) -> String {
        let mut out = String::new();
        let mut level = 0usize;
        let mut line = String::new();
        let mut flush = |line: &mut String, level: usize, out: &mut String| {
            if !line.is_empty() {
                for _ in 0..level {
                    out.push_str("    ");
                }
                out.push_str(line);
                out.push('\n');
                line.clear();
            }
        };
        for token in tokens {
            match token.kind {
                K::Indent => {
                    flush(&mut line, level, &mut out);
                    level += 1;
                }
                K::Dedent => {
                    flush(&mut line, level, &mut out);
                    level -= 1;
                }
                K::End => flush(&mut line, level, &mut out),
                K::DocComment => {}
                _ => {
                    if !line.is_empty() {
                        line.push(' ');
                    }
                    match token.kind {
                        K::Tag => {
                            line.push('#');
                            line.push_str(token.text(source));
                        }
                        K::Str => {
                            line.push('\'');
                            line.push_str(token.text(source));
                            line.push('\'');
                        }
                        K::Float => {
                            line.push_str(token.text(source));
                            line.push('f');
                        }
                        _ => line.push_str(token.text(source)),
                    }
                }
            }
        }
        flush(&mut line, level, &mut out);
        out
    }

    #[test]
    fn lexing_then_rerendering_preserves_the_token_stream() {
        let programs = [
            "const msg = \"hi\"\nfn main() :=\n    log(msg)\n",
            "struct Point :=\n    x : Int = 1\n    y\nfn main() :=\n    const p = Point {x = 10, y = 20}\n    log(p.x, p.y)\n",
            "fn main() :=\n    match 2\n        if 1 -> log(\"one\")\n        else -> log(#OTHER)\n",
            "fn f(a) = a * 2.5 + 1.5f\n",
        ];
        for program in programs {
            let (first, diagnostics) = lex(program, "    ");
            assert!(diagnostics.is_empty(), "{program:?}: {diagnostics:?}");
            let rendered = render(&first, program);
            let (second, diagnostics) = lex(&rendered, "    ");
            assert!(diagnostics.is_empty(), "{rendered:?}: {diagnostics:?}");
            let one: Vec<(TokenKind, String)> = first
                .iter()
                .map(|t| (t.kind, t.text(program).to_owned()))
                .collect();
            let two: Vec<(TokenKind, String)> = second
                .iter()
                .map(|t| (t.kind, t.text(&rendered).to_owned()))
                .collect();
            assert_eq!(one, two, "round trip diverged for {program:?}");
        }
    }

    #[test]
    fn configurable_indent_unit() {
        let source = "fn f() :=\n  x\n";
        let (tokens, diagnostics) = lex(source, "  ");
        assert!(diagnostics.is_empty());
        assert!(tokens.iter().any(|t| t.kind == K::Indent));
    }
}
