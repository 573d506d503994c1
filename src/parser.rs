use crate::ast::*;
use crate::lexer::{LexError, Lexer, Token};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),
    #[error("Unexpected {0}, expected {1}")]
    Unexpected(Token, &'static str),
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Parse a single column definition such as `user_id int not null fk -> User.id`.
pub fn parse_column_definition(input: &str) -> Result<Column, ParseError> {
    let mut parser = Parser::new(input)?;
    let column = parser.parse_column()?;
    parser.finish()?;
    Ok(column)
}

/// Parse a single block-level constraint such as `index(email) [name = user_email_idx]`.
pub fn parse_constraint_definition(input: &str) -> Result<Constraint, ParseError> {
    let mut parser = Parser::new(input)?;
    let constraint = parser.parse_constraint()?;
    parser.finish()?;
    Ok(constraint)
}

/// Parse a single relationship line such as `User 1 -- * Order : "places"`.
pub fn parse_relationship_definition(input: &str) -> Result<Relationship, ParseError> {
    let mut parser = Parser::new(input)?;
    let rel = parser.parse_relationship()?;
    parser.finish()?;
    Ok(rel)
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    pub(crate) fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    pub(crate) fn advance(&mut self) -> &Token {
        let tok = self.tokens.get(self.pos).unwrap_or(&Token::Eof);
        self.pos += 1;
        tok
    }

    pub(crate) fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.advance().clone() {
            Token::Ident(s) => Ok(s),
            tok => Err(ParseError::Unexpected(tok, "identifier")),
        }
    }

    pub(crate) fn expect_num(&mut self) -> Result<i64, ParseError> {
        match self.advance().clone() {
            Token::Num(n) => Ok(n),
            tok => Err(ParseError::Unexpected(tok, "number")),
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), ParseError> {
        let tok = self.advance().clone();
        if tok == expected {
            Ok(())
        } else {
            Err(ParseError::Unexpected(tok, what))
        }
    }

    pub(crate) fn check_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == name)
    }

    /// Fails unless all input has been consumed.
    pub(crate) fn finish(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Token::Eof => Ok(()),
            tok => Err(ParseError::Unexpected(tok.clone(), "end of input")),
        }
    }

    /// Parse `TABLE.NAME` into its two parts.
    pub(crate) fn parse_qualified(&mut self) -> Result<(String, String), ParseError> {
        let table = self.expect_ident()?;
        self.expect(Token::Dot, "`.`")?;
        let name = self.expect_ident()?;
        Ok((table, name))
    }

    pub fn parse(&mut self) -> Result<Schema, ParseError> {
        let mut schema = Schema::default();

        while *self.peek() != Token::Eof {
            if self.check_ident("entity") {
                self.advance();
                schema.entities.push(self.parse_entity()?);
            } else if self.check_ident("rel") {
                self.advance();
                schema.relationships.extend(self.parse_rel_block()?);
            } else if self.check_ident("view") {
                self.advance();
                schema.views.push(self.parse_view()?);
            } else {
                return Err(ParseError::Unexpected(
                    self.peek().clone(),
                    "entity, rel, or view",
                ));
            }
        }

        Ok(schema)
    }

    fn parse_entity(&mut self) -> Result<Entity, ParseError> {
        let name = self.expect_ident()?;
        self.expect(Token::LBrace, "`{`")?;

        let mut entity = Entity {
            name,
            ..Entity::default()
        };

        while *self.peek() != Token::RBrace {
            if *self.peek() == Token::At {
                entity.hints.push(self.parse_hint()?);
            } else if self.is_constraint_start() {
                entity.constraints.push(self.parse_constraint()?);
            } else if *self.peek() == Token::Eof {
                return Err(ParseError::Unexpected(Token::Eof, "`}`"));
            } else {
                entity.columns.push(self.parse_column()?);
            }
        }

        self.expect(Token::RBrace, "`}`")?;
        Ok(entity)
    }

    fn is_constraint_start(&self) -> bool {
        self.check_ident("primary_key") || self.check_ident("foreign_key") || self.check_ident("index")
    }

    pub(crate) fn parse_column(&mut self) -> Result<Column, ParseError> {
        let name = self.expect_ident()?;
        self.parse_column_named(name)
    }

    /// Type and modifiers of a column whose name has already been read.
    pub(crate) fn parse_column_named(&mut self, name: String) -> Result<Column, ParseError> {
        let typ = self.expect_ident()?;
        let mut modifiers = Vec::new();

        loop {
            if self.check_ident("pk") {
                self.advance();
                modifiers.push(ColumnModifier::Pk);
            } else if self.check_ident("not") {
                self.advance();
                if !self.check_ident("null") {
                    return Err(ParseError::Unexpected(self.peek().clone(), "null"));
                }
                self.advance();
                modifiers.push(ColumnModifier::NotNull);
            } else if self.check_ident("unique") {
                self.advance();
                modifiers.push(ColumnModifier::Unique);
            } else if self.check_ident("default") {
                self.advance();
                let val = self.parse_default_value()?;
                modifiers.push(ColumnModifier::Default(val));
            } else if self.check_ident("fk") {
                self.advance();
                self.expect(Token::Arrow, "`->`")?;
                let (target, column) = self.parse_qualified()?;
                modifiers.push(ColumnModifier::Fk { target, column });
            } else {
                break;
            }
        }

        Ok(Column {
            name,
            typ,
            modifiers,
        })
    }

    fn parse_default_value(&mut self) -> Result<String, ParseError> {
        match self.advance().clone() {
            Token::Ident(s) if *self.peek() == Token::LParen => {
                self.advance();
                let mut args = Vec::new();
                loop {
                    match self.advance().clone() {
                        Token::RParen => break,
                        Token::Ident(a) => args.push(a),
                        Token::Num(n) => args.push(n.to_string()),
                        Token::Str(st) => args.push(format!("\"{}\"", st)),
                        Token::Comma => {}
                        tok => return Err(ParseError::Unexpected(tok, "function argument")),
                    }
                }
                Ok(format!("{}({})", s, args.join(", ")))
            }
            Token::Ident(s) => Ok(s),
            Token::Str(s) => Ok(format!("\"{}\"", s)),
            Token::Num(n) => Ok(n.to_string()),
            tok => Err(ParseError::Unexpected(tok, "default value")),
        }
    }

    fn parse_hint(&mut self) -> Result<Hint, ParseError> {
        self.expect(Token::At, "`@`")?;
        let mut key = self.expect_ident()?;

        while *self.peek() == Token::Dot {
            self.advance();
            key.push('.');
            key.push_str(&self.expect_ident()?);
        }

        self.expect(Token::Eq, "`=`")?;

        let value = match self.advance().clone() {
            Token::Num(n) => HintValue::Int(n),
            Token::Str(s) => HintValue::Str(s),
            Token::Ident(s) => HintValue::Ident(s),
            tok => return Err(ParseError::Unexpected(tok, "hint value")),
        };

        Ok(Hint { key, value })
    }

    pub(crate) fn parse_constraint(&mut self) -> Result<Constraint, ParseError> {
        let keyword = self.expect_ident()?;
        match keyword.as_str() {
            "primary_key" => Ok(Constraint::PrimaryKey(self.parse_paren_list()?)),
            "foreign_key" => self.parse_foreign_key(),
            "index" => self.parse_index(),
            _ => Err(ParseError::Unexpected(
                Token::Ident(keyword),
                "primary_key, foreign_key, or index",
            )),
        }
    }

    fn parse_foreign_key(&mut self) -> Result<Constraint, ParseError> {
        let columns = self.parse_paren_list()?;

        if !self.check_ident("references") {
            return Err(ParseError::Unexpected(self.peek().clone(), "references"));
        }
        self.advance();

        let target = self.expect_ident()?;
        let target_columns = self.parse_paren_list()?;

        let mut on_delete = None;
        let mut on_update = None;

        while self.check_ident("on") {
            self.advance();
            if self.check_ident("delete") {
                self.advance();
                on_delete = Some(self.expect_ident()?);
            } else if self.check_ident("update") {
                self.advance();
                on_update = Some(self.expect_ident()?);
            } else {
                return Err(ParseError::Unexpected(self.peek().clone(), "delete or update"));
            }
        }

        Ok(Constraint::ForeignKey {
            columns,
            target,
            target_columns,
            on_delete,
            on_update,
        })
    }

    fn parse_index(&mut self) -> Result<Constraint, ParseError> {
        let columns = self.parse_paren_list()?;

        let mut name = None;
        if *self.peek() == Token::LBracket {
            self.advance();
            if !self.check_ident("name") {
                return Err(ParseError::Unexpected(self.peek().clone(), "name"));
            }
            self.advance();
            self.expect(Token::Eq, "`=`")?;
            name = Some(self.expect_ident()?);
            self.expect(Token::RBracket, "`]`")?;
        }

        Ok(Constraint::Index { columns, name })
    }

    fn parse_paren_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(Token::LParen, "`(`")?;
        let list = self.parse_ident_list()?;
        self.expect(Token::RParen, "`)`")?;
        Ok(list)
    }

    pub(crate) fn parse_ident_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut list = vec![self.expect_ident()?];
        while *self.peek() == Token::Comma {
            self.advance();
            list.push(self.expect_ident()?);
        }
        Ok(list)
    }

    fn parse_rel_block(&mut self) -> Result<Vec<Relationship>, ParseError> {
        self.expect(Token::LBrace, "`{`")?;
        let mut rels = Vec::new();

        while *self.peek() != Token::RBrace {
            rels.push(self.parse_relationship()?);
        }

        self.expect(Token::RBrace, "`}`")?;
        Ok(rels)
    }

    pub(crate) fn parse_relationship(&mut self) -> Result<Relationship, ParseError> {
        let left = self.expect_ident()?;
        let left_cardinality = self.parse_cardinality()?;
        self.expect(Token::Dash, "`--`")?;
        let right_cardinality = self.parse_cardinality()?;
        let right = self.expect_ident()?;

        let mut label = None;
        let mut role = None;

        if *self.peek() == Token::Colon {
            self.advance();
            match self.advance().clone() {
                Token::Str(s) => label = Some(s),
                tok => return Err(ParseError::Unexpected(tok, "string label")),
            }
        }

        if self.check_ident("as") {
            self.advance();
            role = Some(self.expect_ident()?);
        }

        Ok(Relationship {
            left,
            left_cardinality,
            right,
            right_cardinality,
            label,
            role,
        })
    }

    fn parse_cardinality(&mut self) -> Result<Cardinality, ParseError> {
        match self.advance().clone() {
            Token::Star => Ok(Cardinality::Many),
            Token::Num(0) => {
                self.expect(Token::DotDot, "`..`")?;
                match self.advance().clone() {
                    Token::Num(1) => Ok(Cardinality::ZeroOrOne),
                    tok => Err(ParseError::Unexpected(tok, "1 after 0..")),
                }
            }
            Token::Num(1) => {
                if *self.peek() == Token::DotDot {
                    self.advance();
                    self.expect(Token::Star, "`*`")?;
                    Ok(Cardinality::OneOrMore)
                } else {
                    Ok(Cardinality::One)
                }
            }
            tok => Err(ParseError::Unexpected(tok, "cardinality (1, 0..1, *, 1..*)")),
        }
    }

    pub(crate) fn parse_view_body(&mut self) -> Result<Vec<String>, ParseError> {
        let mut includes = Vec::new();
        while self.check_ident("include") {
            self.advance();
            includes.extend(self.parse_ident_list()?);
        }
        Ok(includes)
    }

    fn parse_view(&mut self) -> Result<View, ParseError> {
        let name = self.expect_ident()?;
        self.expect(Token::LBrace, "`{`")?;
        let includes = self.parse_view_body()?;
        self.expect(Token::RBrace, "`}`")?;
        Ok(View { name, includes })
    }
}
