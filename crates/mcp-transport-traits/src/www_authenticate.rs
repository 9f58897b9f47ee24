//! `WWW-Authenticate` header parsing (RFC 7235 §4.1, RFC 6750 §3).
//!
//! A header value is a comma-separated list of challenges, each a scheme
//! name followed either by a `token68` credential or by a comma-separated
//! list of `name=value` auth-params (value optionally quoted). Multiple
//! challenges may share one header, which is what makes this ambiguous to
//! tokenize: a comma can separate two auth-params of the same challenge, or
//! it can separate two challenges entirely. This parser resolves it the way
//! the grammar intends: after a comma, if what follows parses as `token "="`
//! it's another auth-param of the current challenge; otherwise it's the
//! start of a new challenge.

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while parsing a `WWW-Authenticate` header value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WwwAuthenticateError {
    /// The header was empty or contained no recognizable scheme token.
    #[error("empty or unparseable WWW-Authenticate header")]
    Empty,
    /// A quoted-string value was never closed.
    #[error("unterminated quoted string in WWW-Authenticate header")]
    UnterminatedQuotedString,
}

/// One authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// The scheme name, e.g. `"Bearer"`. Comparisons should be
    /// case-insensitive per RFC 7235; use [`Challenge::scheme_is`].
    pub scheme: String,
    /// The token68 credential, for schemes that use it (e.g. legacy
    /// `Basic realm=...` servers sometimes send raw tokens instead).
    pub token68: Option<String>,
    /// Parsed `name=value` auth-params, keyed by parameter name as sent.
    pub params: BTreeMap<String, String>,
}

impl Challenge {
    /// Case-insensitive scheme comparison.
    pub fn scheme_is(&self, scheme: &str) -> bool {
        self.scheme.eq_ignore_ascii_case(scheme)
    }

    /// Case-insensitive auth-param lookup.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `realm` auth-param, if present.
    pub fn realm(&self) -> Option<&str> {
        self.param("realm")
    }

    /// The `error` auth-param (RFC 6750 §3.1), if present.
    pub fn error(&self) -> Option<&str> {
        self.param("error")
    }

    /// The `scope` auth-param (RFC 6750 §3), if present.
    pub fn scope(&self) -> Option<&str> {
        self.param("scope")
    }

    /// The `resource_metadata` auth-param (RFC 9728 §5.1), if present.
    pub fn resource_metadata(&self) -> Option<&str> {
        self.param("resource_metadata")
    }
}

/// Parse a full `WWW-Authenticate` header value into its list of challenges.
pub fn parse(header: &str) -> Result<Vec<Challenge>, WwwAuthenticateError> {
    let chars: Vec<char> = header.chars().collect();
    let len = chars.len();
    let mut pos = 0usize;
    let mut challenges = Vec::new();

    skip_ws(&chars, &mut pos);
    if pos >= len {
        return Err(WwwAuthenticateError::Empty);
    }

    while pos < len {
        skip_ws(&chars, &mut pos);
        if pos >= len {
            break;
        }

        let scheme = match parse_token(&chars, &mut pos) {
            Some(t) => t,
            None => break,
        };
        skip_ws(&chars, &mut pos);

        let mut token68 = None;
        let mut params = BTreeMap::new();

        let checkpoint = pos;
        match try_parse_auth_param(&chars, &mut pos)? {
            Some((name, value)) => {
                params.insert(name, value);
                loop {
                    let before_comma = pos;
                    skip_ws(&chars, &mut pos);
                    if pos < len && chars[pos] == ',' {
                        pos += 1;
                        skip_ws(&chars, &mut pos);
                        match try_parse_auth_param(&chars, &mut pos)? {
                            Some((name, value)) => {
                                params.insert(name, value);
                            }
                            None => {
                                pos = before_comma;
                                break;
                            }
                        }
                    } else {
                        pos = before_comma;
                        break;
                    }
                }
            }
            None => {
                pos = checkpoint;
                token68 = parse_token68(&chars, &mut pos);
            }
        }

        challenges.push(Challenge {
            scheme,
            token68,
            params,
        });

        skip_ws(&chars, &mut pos);
        if pos < len && chars[pos] == ',' {
            pos += 1;
        } else {
            break;
        }
    }

    if challenges.is_empty() {
        return Err(WwwAuthenticateError::Empty);
    }

    Ok(challenges)
}

/// Find the first `Bearer` challenge in a parsed header, case-insensitively.
pub fn find_bearer<'a>(challenges: &'a [Challenge]) -> Option<&'a Challenge> {
    challenges.iter().find(|c| c.scheme_is("Bearer"))
}

fn skip_ws(chars: &[char], pos: &mut usize) {
    while *pos < chars.len() && (chars[*pos] == ' ' || chars[*pos] == '\t') {
        *pos += 1;
    }
}

fn is_tchar(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|' | '~'
        )
}

fn is_token68_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '+' | '/')
}

fn parse_token(chars: &[char], pos: &mut usize) -> Option<String> {
    let start = *pos;
    while *pos < chars.len() && is_tchar(chars[*pos]) {
        *pos += 1;
    }
    if *pos == start {
        None
    } else {
        Some(chars[start..*pos].iter().collect())
    }
}

fn parse_token68(chars: &[char], pos: &mut usize) -> Option<String> {
    let start = *pos;
    while *pos < chars.len() && is_token68_char(chars[*pos]) {
        *pos += 1;
    }
    while *pos < chars.len() && chars[*pos] == '=' {
        *pos += 1;
    }
    if *pos == start {
        None
    } else {
        Some(chars[start..*pos].iter().collect())
    }
}

fn parse_quoted_string(
    chars: &[char],
    pos: &mut usize,
) -> Result<String, WwwAuthenticateError> {
    if *pos >= chars.len() || chars[*pos] != '"' {
        return Err(WwwAuthenticateError::UnterminatedQuotedString);
    }
    *pos += 1;
    let mut out = String::new();
    loop {
        if *pos >= chars.len() {
            return Err(WwwAuthenticateError::UnterminatedQuotedString);
        }
        let c = chars[*pos];
        if c == '\\' {
            *pos += 1;
            if *pos >= chars.len() {
                return Err(WwwAuthenticateError::UnterminatedQuotedString);
            }
            out.push(chars[*pos]);
            *pos += 1;
        } else if c == '"' {
            *pos += 1;
            return Ok(out);
        } else {
            out.push(c);
            *pos += 1;
        }
    }
}

/// Try to parse `token BWS "=" BWS (token / quoted-string)` at `pos`.
/// Returns `Ok(None)` (restoring `pos`) if the input at `pos` doesn't match,
/// rather than treating a non-match as an error.
fn try_parse_auth_param(
    chars: &[char],
    pos: &mut usize,
) -> Result<Option<(String, String)>, WwwAuthenticateError> {
    let save = *pos;
    let name = match parse_token(chars, pos) {
        Some(n) => n,
        None => {
            *pos = save;
            return Ok(None);
        }
    };

    let mut probe = *pos;
    skip_ws(chars, &mut probe);
    if probe >= chars.len() || chars[probe] != '=' {
        *pos = save;
        return Ok(None);
    }
    probe += 1;
    skip_ws(chars, &mut probe);
    *pos = probe;

    let value = if *pos < chars.len() && chars[*pos] == '"' {
        parse_quoted_string(chars, pos)?
    } else {
        match parse_token(chars, pos) {
            Some(v) => v,
            None => {
                *pos = save;
                return Ok(None);
            }
        }
    };

    Ok(Some((name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_bearer_challenge() {
        let challenges =
            parse(r#"Bearer realm="example", error="invalid_token""#).unwrap();
        assert_eq!(challenges.len(), 1);
        let c = &challenges[0];
        assert!(c.scheme_is("bearer"));
        assert_eq!(c.realm(), Some("example"));
        assert_eq!(c.error(), Some("invalid_token"));
    }

    #[test]
    fn parses_resource_metadata_param() {
        let challenges = parse(
            r#"Bearer resource_metadata="https://example.com/.well-known/oauth-protected-resource""#,
        )
        .unwrap();
        assert_eq!(
            find_bearer(&challenges).unwrap().resource_metadata(),
            Some("https://example.com/.well-known/oauth-protected-resource")
        );
    }

    #[test]
    fn parses_multiple_challenges_in_one_header() {
        let challenges = parse(r#"Basic realm="a", Bearer realm="b", error="invalid_request""#)
            .unwrap();
        assert_eq!(challenges.len(), 2);
        assert!(challenges[0].scheme_is("Basic"));
        assert!(challenges[1].scheme_is("Bearer"));
        assert_eq!(challenges[1].error(), Some("invalid_request"));
    }

    #[test]
    fn parses_token68_credential() {
        let challenges = parse("Negotiate a87421000492aa874209af8bc028").unwrap();
        assert_eq!(challenges[0].token68.as_deref(), Some("a87421000492aa874209af8bc028"));
    }

    #[test]
    fn handles_escaped_quotes_in_quoted_string() {
        let challenges = parse(r#"Bearer realm="a \"quoted\" value""#).unwrap();
        assert_eq!(challenges[0].realm(), Some("a \"quoted\" value"));
    }

    #[test]
    fn rejects_empty_header() {
        assert_eq!(parse("").unwrap_err(), WwwAuthenticateError::Empty);
        assert_eq!(parse("   ").unwrap_err(), WwwAuthenticateError::Empty);
    }

    #[test]
    fn scheme_matching_is_case_insensitive() {
        let challenges = parse(r#"bearer realm="x""#).unwrap();
        assert!(find_bearer(&challenges).is_some());
    }

    #[test]
    fn param_lookup_is_case_insensitive() {
        let challenges = parse(r#"Bearer Realm="x""#).unwrap();
        assert_eq!(challenges[0].param("realm"), Some("x"));
    }
}
