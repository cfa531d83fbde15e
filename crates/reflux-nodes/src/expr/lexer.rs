//! Tokenizer for the expression grammar

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    // Operators
    EqStrict,  // ===
    NeStrict,  // !==
    Eq,        // ==
    Ne,        // !=
    Ge,        // >=
    Le,        // <=
    Gt,        // >
    Lt,        // <
    AndAnd,    // &&
    OrOr,      // ||
    Bang,      // !
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    Assign,    // =
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    Dot,       // .
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(ExprError::Parse("single '&' is not an operator".into()));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(ExprError::Parse("single '|' is not an operator".into()));
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    if chars.get(i + 2) == Some(&'=') {
                        tokens.push(Token::EqStrict);
                        i += 3;
                    } else {
                        tokens.push(Token::Eq);
                        i += 2;
                    }
                } else {
                    tokens.push(Token::Assign);
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    if chars.get(i + 2) == Some(&'=') {
                        tokens.push(Token::NeStrict);
                        i += 3;
                    } else {
                        tokens.push(Token::Ne);
                        i += 2;
                    }
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ExprError::Parse("unterminated string literal".into()))
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('n') => value.push('\n'),
                                Some('t') => value.push('\t'),
                                Some(&esc) => value.push(esc),
                                None => {
                                    return Err(ExprError::Parse(
                                        "unterminated escape sequence".into(),
                                    ))
                                }
                            }
                            i += 2;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    // A dot followed by a non-digit belongs to a path, not a number
                    if chars[i] == '.' && !chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
                        break;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::Parse(format!("invalid number: {text}")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(ExprError::Parse(format!("unexpected character: {other:?}")));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_comparison() {
        let tokens = tokenize("b.y > 4").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("b".into()),
                Token::Dot,
                Token::Ident("y".into()),
                Token::Gt,
                Token::Number(4.0),
            ]
        );
    }

    #[test]
    fn distinguishes_strict_and_loose_equality() {
        assert_eq!(tokenize("===").unwrap(), vec![Token::EqStrict]);
        assert_eq!(tokenize("==").unwrap(), vec![Token::Eq]);
        assert_eq!(tokenize("!==").unwrap(), vec![Token::NeStrict]);
        assert_eq!(tokenize("!=").unwrap(), vec![Token::Ne]);
        assert_eq!(tokenize("=").unwrap(), vec![Token::Assign]);
        assert_eq!(tokenize("!").unwrap(), vec![Token::Bang]);
    }

    #[test]
    fn string_literals_support_both_quotes_and_escapes() {
        assert_eq!(
            tokenize(r#""a\"b" 'c'"#).unwrap(),
            vec![Token::Str("a\"b".into()), Token::Str("c".into())]
        );
    }

    #[test]
    fn decimal_numbers_and_path_dots_are_separated() {
        let tokens = tokenize("a.b 1.5").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::Dot,
                Token::Ident("b".into()),
                Token::Number(1.5),
            ]
        );
    }

    #[test]
    fn rejects_stray_characters() {
        assert!(tokenize("a ; b").is_err());
        assert!(tokenize("a & b").is_err());
        assert!(tokenize("\"open").is_err());
    }
}
