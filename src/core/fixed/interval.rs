use crate::error::{Result, ShelfError};

/// End of an id interval before `min`/`max` are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Id(u64),
    Min,
    Max,
}

/// Id interval such as `"[3,max]"` or `"(1,10)"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdInterval {
    pub lower: Endpoint,
    pub lower_inclusive: bool,
    pub upper: Endpoint,
    pub upper_inclusive: bool,
}

impl IdInterval {
    /// Parses `"[a,b]"`, `"(a,b)"`, `"[a,b)"`, `"(a,b]"` or a single `"a"`.
    ///
    /// Endpoints are decimal ids or the words `min` and `max`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (lower_inclusive, rest) = match text.as_bytes().first() {
            Some(b'[') => (true, &text[1..]),
            Some(b'(') => (false, &text[1..]),
            Some(_) => {
                let point = parse_endpoint(text)?;
                return Ok(Self {
                    lower: point,
                    lower_inclusive: true,
                    upper: point,
                    upper_inclusive: true,
                });
            }
            None => return Err(ShelfError::Invalid("empty interval")),
        };
        let (upper_inclusive, body) = match rest.as_bytes().last() {
            Some(b']') => (true, &rest[..rest.len() - 1]),
            Some(b')') => (false, &rest[..rest.len() - 1]),
            _ => return Err(ShelfError::Invalid("interval is not closed")),
        };
        let (lower, upper) = body
            .split_once(',')
            .ok_or(ShelfError::Invalid("interval needs two endpoints"))?;
        Ok(Self {
            lower: parse_endpoint(lower)?,
            lower_inclusive,
            upper: parse_endpoint(upper)?,
            upper_inclusive,
        })
    }
}

fn parse_endpoint(text: &str) -> Result<Endpoint> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("min") {
        return Ok(Endpoint::Min);
    }
    if text.eq_ignore_ascii_case("max") {
        return Ok(Endpoint::Max);
    }
    text.parse::<u64>()
        .map(Endpoint::Id)
        .map_err(|_| ShelfError::Invalid("interval endpoint is not an id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bracket_forms() {
        let iv = IdInterval::parse("[3, max)").unwrap();
        assert_eq!(iv.lower, Endpoint::Id(3));
        assert!(iv.lower_inclusive);
        assert_eq!(iv.upper, Endpoint::Max);
        assert!(!iv.upper_inclusive);

        let point = IdInterval::parse("7").unwrap();
        assert_eq!((point.lower, point.upper), (Endpoint::Id(7), Endpoint::Id(7)));
    }

    #[test]
    fn rejects_malformed() {
        assert!(IdInterval::parse("").is_err());
        assert!(IdInterval::parse("[1,2").is_err());
        assert!(IdInterval::parse("[1;2]").is_err());
        assert!(IdInterval::parse("[a,2]").is_err());
    }
}
