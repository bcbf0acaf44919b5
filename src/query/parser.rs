use crate::error::{IndexError, Result};

/// Parsed query representation
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub root: QueryNode,
    text: String,
}

impl Query {
    /// The query string this was parsed from
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Query AST node
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Single value; `field: None` searches every field
    Term { field: Option<String>, value: String },
    /// Quoted value whose terms must appear consecutively
    Phrase { field: Option<String>, value: String },
    /// Value ending in `*`
    Prefix { field: Option<String>, prefix: String },
    /// `*:*`
    MatchAll,
    Boolean(BooleanQuery),
}

/// Clauses grouped by how they take part in the match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BooleanQuery {
    /// All must match; when present, `should` no longer filters
    pub must: Vec<QueryNode>,
    /// Any may match
    pub should: Vec<QueryNode>,
    /// None may match
    pub must_not: Vec<QueryNode>,
}

/// Parse a query string into a Query structure
pub fn parse_query(input: &str) -> Result<Query> {
    let tokens = Lexer::new(input).tokenize()?;
    if tokens.is_empty() {
        return Err(syntax_error(input, 0, "empty query"));
    }

    let mut parser = QueryParser {
        input,
        tokens,
        pos: 0,
    };
    let root = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        return Err(syntax_error(input, token.pos, "unexpected ')'"));
    }

    Ok(Query {
        root,
        text: input.to_string(),
    })
}

fn syntax_error(query: &str, position: usize, message: impl Into<String>) -> IndexError {
    IndexError::QuerySyntax {
        query: query.to_string(),
        position,
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    LParen,
    RParen,
    And,
    Or,
    /// `NOT` or `!`
    Not,
    /// `-`
    Prohibit,
    /// `+`
    Require,
    MatchAll,
    Clause {
        field: Option<String>,
        value: String,
        quoted: bool,
        prefix: bool,
    },
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    /// Byte offset in the query string
    pos: usize,
}

impl Token {
    fn describe(&self) -> &'static str {
        match self.kind {
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::Prohibit => "-",
            TokenKind::Require => "+",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::MatchAll | TokenKind::Clause { .. } => "clause",
        }
    }
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let Some(ch) = self.peek_char() else {
                break;
            };
            let start = self.pos;

            let kind = match ch {
                '(' => {
                    self.advance();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance();
                    TokenKind::RParen
                }
                '"' => TokenKind::Clause {
                    field: None,
                    value: self.read_quoted()?,
                    quoted: true,
                    prefix: false,
                },
                '!' => {
                    self.advance();
                    TokenKind::Not
                }
                '-' => {
                    self.advance();
                    TokenKind::Prohibit
                }
                '+' => {
                    self.advance();
                    TokenKind::Require
                }
                '&' if self.remaining().starts_with("&&") => {
                    self.pos += 2;
                    TokenKind::And
                }
                '|' if self.remaining().starts_with("||") => {
                    self.pos += 2;
                    TokenKind::Or
                }
                _ => self.read_word()?,
            };

            tokens.push(Token { kind, pos: start });
        }

        Ok(tokens)
    }

    /// Read a bare word, optionally `field:`-prefixed
    fn read_word(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        let mut field: Option<String> = None;
        let mut value = String::new();
        let mut escaped_any = false;
        let mut last_escaped = false;

        while let Some(ch) = self.peek_char() {
            if ch == '\\' {
                let escape_pos = self.pos;
                self.advance();
                let Some(next) = self.peek_char() else {
                    return Err(syntax_error(self.input, escape_pos, "dangling escape"));
                };
                self.advance();
                value.push(next);
                escaped_any = true;
                last_escaped = true;
                continue;
            }

            if ch.is_whitespace() || matches!(ch, '(' | ')' | '"') {
                break;
            }

            if ch == ':' && field.is_none() && !value.is_empty() {
                self.advance();
                field = Some(std::mem::take(&mut value));
                last_escaped = false;

                match self.peek_char() {
                    Some('"') => {
                        let phrase = self.read_quoted()?;
                        return Ok(TokenKind::Clause {
                            field: normalize_field(field),
                            value: phrase,
                            quoted: true,
                            prefix: false,
                        });
                    }
                    Some(c) if !c.is_whitespace() && !matches!(c, '(' | ')') => continue,
                    _ => {
                        return Err(syntax_error(
                            self.input,
                            start,
                            format!("missing value after '{}:'", field.unwrap_or_default()),
                        ));
                    }
                }
            }

            value.push(ch);
            last_escaped = false;
            self.advance();
        }

        if field.is_none() && !escaped_any {
            match value.as_str() {
                "AND" => return Ok(TokenKind::And),
                "OR" => return Ok(TokenKind::Or),
                "NOT" => return Ok(TokenKind::Not),
                _ => {}
            }
        }

        let prefix = value.ends_with('*') && !last_escaped;
        if prefix {
            value.pop();
        }

        if prefix && value.is_empty() && field.as_deref() == Some("*") {
            return Ok(TokenKind::MatchAll);
        }

        Ok(TokenKind::Clause {
            field: normalize_field(field),
            value,
            quoted: false,
            prefix,
        })
    }

    /// Read a `"..."` literal, honoring `\` escapes
    fn read_quoted(&mut self) -> Result<String> {
        let open = self.pos;
        self.advance();

        let mut value = String::new();
        loop {
            match self.peek_char() {
                None => return Err(syntax_error(self.input, open, "unterminated quote")),
                Some('"') => {
                    self.advance();
                    return Ok(value);
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some(next) => {
                            value.push(next);
                            self.advance();
                        }
                        None => return Err(syntax_error(self.input, open, "unterminated quote")),
                    }
                }
                Some(ch) => {
                    value.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn remaining(&self) -> &str {
        &self.input[self.pos..]
    }
}

/// `*:` means every field
fn normalize_field(field: Option<String>) -> Option<String> {
    field.filter(|f| f != "*")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    None,
    Require,
    Prohibit,
}

/// Recursive-descent parser over lexed tokens.
///
/// Precedence from tightest: unary (`NOT`, `!`, `-`, `+`), `AND`, then `OR`
/// (explicit or implied by adjacency).
struct QueryParser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl QueryParser<'_> {
    fn parse_or(&mut self) -> Result<QueryNode> {
        let mut clauses: Vec<(Modifier, QueryNode)> = Vec::new();

        loop {
            let group = self.parse_and()?;
            clauses.push(fold_group(group));

            match self.peek().map(|t| &t.kind) {
                None | Some(TokenKind::RParen) => break,
                Some(TokenKind::Or) => {
                    let pos = self.tokens[self.pos].pos;
                    self.pos += 1;
                    if !self.starts_clause() {
                        return Err(syntax_error(self.input, pos, "'OR' needs a clause after it"));
                    }
                }
                // Adjacent clauses are implicitly OR'ed
                Some(_) => {}
            }
        }

        Ok(combine(clauses))
    }

    fn parse_and(&mut self) -> Result<Vec<(Modifier, QueryNode)>> {
        let mut group = vec![self.parse_unary()?];

        while let Some(token) = self.peek() {
            if token.kind != TokenKind::And {
                break;
            }
            let pos = token.pos;
            self.pos += 1;
            if !self.starts_clause() {
                return Err(syntax_error(self.input, pos, "'AND' needs a clause after it"));
            }
            group.push(self.parse_unary()?);
        }

        Ok(group)
    }

    fn parse_unary(&mut self) -> Result<(Modifier, QueryNode)> {
        let modifier = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Not | TokenKind::Prohibit) => Modifier::Prohibit,
            Some(TokenKind::Require) => Modifier::Require,
            _ => return Ok((Modifier::None, self.parse_primary()?)),
        };

        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        if !self.starts_clause() {
            return Err(syntax_error(
                self.input,
                token.pos,
                format!("'{}' needs a clause after it", token.describe()),
            ));
        }

        let inner = self.parse_unary()?;
        Ok((modifier, combine(vec![inner])))
    }

    fn parse_primary(&mut self) -> Result<QueryNode> {
        let Some(token) = self.tokens.get(self.pos).cloned() else {
            return Err(syntax_error(self.input, self.input.len(), "expected a clause"));
        };
        self.pos += 1;

        match token.kind {
            TokenKind::LParen => {
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
                    return Err(syntax_error(self.input, token.pos, "empty group"));
                }
                let node = self.parse_or()?;
                match self.peek() {
                    Some(t) if t.kind == TokenKind::RParen => {
                        self.pos += 1;
                        Ok(node)
                    }
                    _ => Err(syntax_error(self.input, token.pos, "unclosed '('")),
                }
            }
            TokenKind::MatchAll => Ok(QueryNode::MatchAll),
            TokenKind::Clause {
                field,
                value,
                quoted,
                prefix,
            } => Ok(if quoted {
                QueryNode::Phrase { field, value }
            } else if prefix {
                QueryNode::Prefix { field, prefix: value }
            } else {
                QueryNode::Term { field, value }
            }),
            TokenKind::RParen => Err(syntax_error(self.input, token.pos, "unexpected ')'")),
            TokenKind::And | TokenKind::Or => Err(syntax_error(
                self.input,
                token.pos,
                format!("'{}' needs a clause before it", token.describe()),
            )),
            TokenKind::Not | TokenKind::Prohibit | TokenKind::Require => {
                Err(syntax_error(self.input, token.pos, "expected a clause"))
            }
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn starts_clause(&self) -> bool {
        matches!(
            self.peek().map(|t| &t.kind),
            Some(
                TokenKind::LParen
                    | TokenKind::MatchAll
                    | TokenKind::Clause { .. }
                    | TokenKind::Not
                    | TokenKind::Prohibit
                    | TokenKind::Require
            )
        )
    }
}

/// Collapse an AND group into one OR-level clause
fn fold_group(mut group: Vec<(Modifier, QueryNode)>) -> (Modifier, QueryNode) {
    if group.len() == 1 {
        return group.pop().unwrap_or((Modifier::None, QueryNode::MatchAll));
    }

    let mut boolean = BooleanQuery::default();
    for (modifier, node) in group {
        match modifier {
            Modifier::Prohibit => boolean.must_not.push(node),
            Modifier::None | Modifier::Require => boolean.must.push(node),
        }
    }
    (Modifier::None, QueryNode::Boolean(boolean))
}

/// Build the node for one OR level
fn combine(mut clauses: Vec<(Modifier, QueryNode)>) -> QueryNode {
    if clauses.len() == 1 && clauses[0].0 == Modifier::None {
        if let Some((_, node)) = clauses.pop() {
            return node;
        }
    }

    let mut boolean = BooleanQuery::default();
    for (modifier, node) in clauses {
        match modifier {
            Modifier::None => boolean.should.push(node),
            Modifier::Require => boolean.must.push(node),
            Modifier::Prohibit => boolean.must_not.push(node),
        }
    }
    QueryNode::Boolean(boolean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(field: &str, value: &str) -> QueryNode {
        QueryNode::Term {
            field: Some(field.to_string()),
            value: value.to_string(),
        }
    }

    fn any(value: &str) -> QueryNode {
        QueryNode::Term {
            field: None,
            value: value.to_string(),
        }
    }

    fn syntax_position(input: &str) -> usize {
        match parse_query(input).unwrap_err() {
            IndexError::QuerySyntax { position, .. } => position,
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_query() {
        let q = parse_query("hello").unwrap();
        assert_eq!(q.root, any("hello"));
        assert_eq!(q.text(), "hello");
    }

    #[test]
    fn test_field_term() {
        let q = parse_query("name:alice").unwrap();
        assert_eq!(q.root, term("name", "alice"));
    }

    #[test]
    fn test_value_keeps_inner_punctuation() {
        let q = parse_query("id:A-1:x").unwrap();
        assert_eq!(q.root, term("id", "A-1:x"));
    }

    #[test]
    fn test_field_phrase() {
        let q = parse_query("city:\"new york\"").unwrap();
        assert_eq!(
            q.root,
            QueryNode::Phrase {
                field: Some("city".to_string()),
                value: "new york".to_string()
            }
        );
    }

    #[test]
    fn test_prefix() {
        let q = parse_query("name:ali*").unwrap();
        assert_eq!(
            q.root,
            QueryNode::Prefix {
                field: Some("name".to_string()),
                prefix: "ali".to_string()
            }
        );
    }

    #[test]
    fn test_escaped_star_is_literal() {
        let q = parse_query("name:ali\\*").unwrap();
        assert_eq!(q.root, term("name", "ali*"));
    }

    #[test]
    fn test_match_all() {
        assert_eq!(parse_query("*:*").unwrap().root, QueryNode::MatchAll);
        assert_eq!(parse_query("*:bob").unwrap().root, any("bob"));
    }

    #[test]
    fn test_and_query() {
        let q = parse_query("name:alice AND city:paris").unwrap();
        assert_eq!(
            q.root,
            QueryNode::Boolean(BooleanQuery {
                must: vec![term("name", "alice"), term("city", "paris")],
                ..Default::default()
            })
        );
        assert_eq!(parse_query("name:alice && city:paris").unwrap().root, q.root);
    }

    #[test]
    fn test_or_query() {
        let expected = QueryNode::Boolean(BooleanQuery {
            should: vec![any("a"), any("b")],
            ..Default::default()
        });
        assert_eq!(parse_query("a OR b").unwrap().root, expected);
        assert_eq!(parse_query("a || b").unwrap().root, expected);
        assert_eq!(parse_query("a b").unwrap().root, expected);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let q = parse_query("a AND b OR c").unwrap();
        assert_eq!(
            q.root,
            QueryNode::Boolean(BooleanQuery {
                should: vec![
                    QueryNode::Boolean(BooleanQuery {
                        must: vec![any("a"), any("b")],
                        ..Default::default()
                    }),
                    any("c"),
                ],
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_not_query() {
        let q = parse_query("a -b NOT c !d").unwrap();
        assert_eq!(
            q.root,
            QueryNode::Boolean(BooleanQuery {
                should: vec![any("a")],
                must_not: vec![any("b"), any("c"), any("d")],
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_required_clause() {
        let q = parse_query("+name:alice city:paris").unwrap();
        assert_eq!(
            q.root,
            QueryNode::Boolean(BooleanQuery {
                must: vec![term("name", "alice")],
                should: vec![term("city", "paris")],
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_pure_negative() {
        let q = parse_query("-name:alice").unwrap();
        assert_eq!(
            q.root,
            QueryNode::Boolean(BooleanQuery {
                must_not: vec![term("name", "alice")],
                ..BooleanQuery::default()
            })
        );
    }

    #[test]
    fn test_grouping() {
        let q = parse_query("(a OR b) AND c").unwrap();
        assert_eq!(
            q.root,
            QueryNode::Boolean(BooleanQuery {
                must: vec![
                    QueryNode::Boolean(BooleanQuery {
                        should: vec![any("a"), any("b")],
                        ..Default::default()
                    }),
                    any("c"),
                ],
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_lowercase_keywords_are_terms() {
        let q = parse_query("this and that").unwrap();
        assert_eq!(
            q.root,
            QueryNode::Boolean(BooleanQuery {
                should: vec![any("this"), any("and"), any("that")],
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_escaped_keyword_is_term() {
        assert_eq!(parse_query("\\AND").unwrap().root, any("AND"));
    }

    #[test]
    fn test_hyphen_inside_word() {
        assert_eq!(parse_query("A-1").unwrap().root, any("A-1"));
    }

    #[test]
    fn test_quoted_escape() {
        let q = parse_query(r#"note:"say \"hi\"""#).unwrap();
        assert_eq!(
            q.root,
            QueryNode::Phrase {
                field: Some("note".to_string()),
                value: "say \"hi\"".to_string()
            }
        );
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(syntax_position(""), 0);
        assert_eq!(syntax_position("   "), 0);
    }

    #[test]
    fn test_unbalanced_parens() {
        assert_eq!(syntax_position("(a OR b"), 0);
        assert_eq!(syntax_position("a OR b)"), 6);
        assert_eq!(syntax_position("()"), 0);
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(syntax_position("name:\"open"), 5);
    }

    #[test]
    fn test_dangling_operators() {
        assert_eq!(syntax_position("a AND"), 2);
        assert_eq!(syntax_position("AND a"), 0);
        assert_eq!(syntax_position("a OR"), 2);
        assert_eq!(syntax_position("a -"), 2);
        assert_eq!(syntax_position("a AND OR b"), 2);
    }

    #[test]
    fn test_missing_field_value() {
        assert_eq!(syntax_position("name:"), 0);
        assert_eq!(syntax_position("a name: b"), 2);
    }

    #[test]
    fn test_dangling_escape() {
        assert_eq!(syntax_position("abc\\"), 3);
    }

    #[test]
    fn test_error_message_mentions_query() {
        let err = parse_query("name:").unwrap_err();
        assert!(err.to_string().contains("'name:'"));
    }
}
