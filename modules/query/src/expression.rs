use crate::filter::{DepthFilter, Filter, NameFilter, PurlFilter};
use crate::Error;

/// A parsed filter expression: an ordered filter pipeline.
pub struct Expression {
    filters: Vec<Box<dyn Filter>>,
}

impl Expression {
    /// Parse an expression of whitespace-separated `<keyword>:<arg>`
    /// tokens. Arguments may be quoted to include spaces.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut filters: Vec<Box<dyn Filter>> = Vec::new();

        for token in tokenize(text) {
            let Some((keyword, arg)) = token.split_once(':') else {
                return Err(Error::Parse(format!("token has no keyword: {token}")));
            };
            match keyword {
                "depth" => {
                    let depth: u32 = arg
                        .parse()
                        .map_err(|_| Error::Parse(format!("invalid depth: {arg}")))?;
                    filters.push(Box::new(DepthFilter { target_depth: depth }));
                }
                "name" => filters.push(Box::new(NameFilter {
                    pattern: arg.to_string(),
                })),
                "purl" => filters.push(Box::new(PurlFilter {
                    pattern: arg.to_string(),
                })),
                other => return Err(Error::Parse(format!("unknown filter: {other}"))),
            }
        }

        Ok(Self { filters })
    }

    pub fn filters(&self) -> &[Box<dyn Filter>] {
        &self.filters
    }
}

/// Split an expression on whitespace, honoring double quotes. Quotes are
/// stripped; whitespace inside them survives.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in text.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tokenizes_with_quotes() {
        assert_eq!(2, tokenize("Hello Friend").len());
        assert_eq!(1, tokenize("\"Hello Friend\"").len());
        assert_eq!(2, tokenize(r#"depth:1 name:"Hola Mano""#).len());
    }

    #[test]
    fn parses_filter_pipeline() {
        let expression = Expression::parse(r#"depth:1 name:"Hola Mano""#).unwrap();
        assert_eq!(2, expression.filters().len());
        assert_eq!("depth", expression.filters()[0].keyword());
        assert_eq!("name", expression.filters()[1].keyword());
    }

    #[test]
    fn rejects_unknown_keywords() {
        assert!(Expression::parse("frobnicate:yes").is_err());
        assert!(Expression::parse("depth:notanumber").is_err());
        assert!(Expression::parse("lonetoken").is_err());
    }
}
