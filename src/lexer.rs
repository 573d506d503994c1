use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Num(i64),

    LBrace,   // {
    RBrace,   // }
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Colon,    // :
    Eq,       // =
    At,       // @
    Star,     // *
    Dot,      // .
    Arrow,    // ->
    Dash,     // --
    DotDot,   // ..

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier `{}`", s),
            Token::Str(s) => write!(f, "string \"{}\"", s),
            Token::Num(n) => write!(f, "number {}", n),
            Token::LBrace => f.write_str("`{`"),
            Token::RBrace => f.write_str("`}`"),
            Token::LParen => f.write_str("`(`"),
            Token::RParen => f.write_str("`)`"),
            Token::LBracket => f.write_str("`[`"),
            Token::RBracket => f.write_str("`]`"),
            Token::Comma => f.write_str("`,`"),
            Token::Colon => f.write_str("`:`"),
            Token::Eq => f.write_str("`=`"),
            Token::At => f.write_str("`@`"),
            Token::Star => f.write_str("`*`"),
            Token::Dot => f.write_str("`.`"),
            Token::Arrow => f.write_str("`->`"),
            Token::Dash => f.write_str("`--`"),
            Token::DotDot => f.write_str("`..`"),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("Unexpected character {ch:?} on line {line}")]
    UnexpectedChar { ch: char, line: usize },
    #[error("Unterminated string starting on line {0}")]
    UnterminatedString(usize),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
        }
    }

    /// Current 1-based line number.
    pub fn line(&self) -> usize {
        self.line
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn read_ident(&mut self, first: char) -> String {
        let mut s = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn read_string(&mut self) -> Result<String, LexError> {
        let start = self.line;
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(s),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(c) => s.push(c),
                    None => return Err(LexError::UnterminatedString(start)),
                },
                Some(c) => s.push(c),
                None => return Err(LexError::UnterminatedString(start)),
            }
        }
    }

    fn read_number(&mut self, first: char) -> Result<i64, LexError> {
        let mut s = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s.parse().map_err(|_| LexError::InvalidNumber(s))
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        let c = match self.bump() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        let tok = match c {
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            ':' => Token::Colon,
            '=' => Token::Eq,
            '@' => Token::At,
            '*' => Token::Star,
            '.' => {
                if self.chars.peek() == Some(&'.') {
                    self.bump();
                    Token::DotDot
                } else {
                    Token::Dot
                }
            }
            '-' => match self.chars.peek() {
                Some('-') => {
                    self.bump();
                    Token::Dash
                }
                Some('>') => {
                    self.bump();
                    Token::Arrow
                }
                _ => return Err(LexError::UnexpectedChar { ch: c, line: self.line }),
            },
            '"' => Token::Str(self.read_string()?),
            c if c.is_ascii_digit() => Token::Num(self.read_number(c)?),
            c if c.is_alphabetic() || c == '_' => Token::Ident(self.read_ident(c)),
            _ => return Err(LexError::UnexpectedChar { ch: c, line: self.line }),
        };

        Ok(tok)
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_tokens() {
        let tokens = Lexer::new("user_id int fk -> User.id").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("user_id".into()),
                Token::Ident("int".into()),
                Token::Ident("fk".into()),
                Token::Arrow,
                Token::Ident("User".into()),
                Token::Dot,
                Token::Ident("id".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unicode_ident() {
        let tokens = Lexer::new("entity ユーザー { 名前 string }").tokenize().unwrap();
        assert_eq!(tokens[1], Token::Ident("ユーザー".into()));
        assert_eq!(tokens[3], Token::Ident("名前".into()));
    }

    #[test]
    fn test_comments_and_line_tracking() {
        let mut lexer = Lexer::new("# comment\nentity User { # inline\n}");
        assert_eq!(lexer.next_token().unwrap(), Token::Ident("entity".into()));
        assert_eq!(lexer.line(), 2);
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        assert_eq!(lexer.next_token().unwrap(), Token::RBrace);
        assert_eq!(lexer.line(), 3);
    }

    #[test]
    fn test_cardinality_tokens() {
        let tokens = Lexer::new("1 0..1 * 1..*").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Num(1),
                Token::Num(0),
                Token::DotDot,
                Token::Num(1),
                Token::Star,
                Token::Num(1),
                Token::DotDot,
                Token::Star,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_char_reports_line() {
        let err = Lexer::new("entity A {\n  id int ?\n}").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnexpectedChar { ch: '?', line: 2 }));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("rel { A 1 -- * B : \"oops }").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString(1)));
    }
}
