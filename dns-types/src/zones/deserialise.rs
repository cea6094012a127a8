use std::iter::Peekable;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::protocol::types::*;
use crate::zones::types::*;

impl Zone {
    /// Parse a zone file.
    ///
    /// Supports `$ORIGIN`, exactly one `SOA` record, and `A`/`CNAME`/
    /// `MX`/`TXT`/`NS` records for the zone.  Does not support
    /// `$INCLUDE`, wildcard owners, multiple `SOA` records, or record
    /// types outside the five above.
    ///
    /// # Errors
    ///
    /// If the string cannot be parsed.
    pub fn deserialise(data: &str) -> Result<Self, Error> {
        let mut rrs = Vec::new();
        let mut origin_and_soa = None;
        let mut origin = None;
        let mut previous_domain = None;
        let mut previous_ttl = None;
        let mut stream = data.chars().peekable();

        while let Some(entry) = parse_entry(&origin, &previous_domain, previous_ttl, &mut stream)? {
            match entry {
                Entry::Origin { name } => origin = Some(name),
                Entry::RR { rr } => {
                    previous_domain = Some(rr.name.clone());
                    previous_ttl = Some(rr.ttl);

                    if let RecordTypeWithData::SOA { minimum, .. } = rr.rtype_with_data {
                        if origin_and_soa.is_some() {
                            return Err(Error::MultipleSOA);
                        }
                        origin_and_soa = Some((rr.name, minimum));
                    } else {
                        rrs.push(rr);
                    }
                }
            }
        }

        let (apex, default_ttl) = origin_and_soa.ok_or(Error::MissingSOA)?;

        for rr in &rrs {
            if !rr.name.is_subdomain_of(&apex) {
                return Err(Error::NotSubdomainOfApex {
                    apex: apex.clone(),
                    name: rr.name.clone(),
                });
            }
        }

        Ok(Zone::new(apex, default_ttl, rrs))
    }
}

/// Parse a single entry, skipping comments and whitespace. Returns
/// `None` if the stream is empty.
///
/// # Errors
///
/// If the string cannot be parsed.
fn parse_entry<I: Iterator<Item = char>>(
    origin: &Option<DomainName>,
    previous_domain: &Option<DomainName>,
    previous_ttl: Option<u32>,
    stream: &mut Peekable<I>,
) -> Result<Option<Entry>, Error> {
    loop {
        let tokens = tokenise_entry(stream)?;
        if tokens.is_empty() {
            if stream.peek().is_none() {
                return Ok(None);
            }
        } else if tokens[0].0 == "$ORIGIN" {
            return Ok(Some(parse_origin(origin, tokens)?));
        } else if tokens[0].0 == "$INCLUDE" {
            return Err(Error::IncludeNotSupported);
        } else {
            return Ok(Some(parse_rr(origin, previous_domain, previous_ttl, tokens)?));
        }
    }
}

/// ```text
/// $ORIGIN <domain-name>
/// ```
fn parse_origin(origin: &Option<DomainName>, tokens: Vec<(String, Vec<u8>)>) -> Result<Entry, Error> {
    if tokens.len() != 2 {
        return Err(Error::MalformedOrigin);
    }
    let name = parse_domain(origin, &tokens[1].0)?;
    Ok(Entry::Origin { name })
}

/// ```text
/// <domain-name> <ttl>   <class> <type> <rdata>
/// <domain-name> <class> <ttl>   <type> <rdata>
/// <domain-name> <ttl>           <type> <rdata>
/// <domain-name>         <class> <type> <rdata>
/// <domain-name>                 <type> <rdata>
///               <ttl>   <class> <type> <rdata>
///               <class> <ttl>   <type> <rdata>
///               <ttl>           <type> <rdata>
///                       <class> <type> <rdata>
///                               <type> <rdata>
/// ```
///
/// If the `<domain-name>`, `<ttl>`, or `<class>` are missing, the
/// previous value is used (it's an error to omit a domain on the
/// first RR). Only the `IN` class is supported.
fn parse_rr(
    origin: &Option<DomainName>,
    previous_domain: &Option<DomainName>,
    previous_ttl: Option<u32>,
    mut tokens: Vec<(String, Vec<u8>)>,
) -> Result<Entry, Error> {
    let looks_like_ttl_or_class = tokens[0].0.chars().all(|c| c.is_ascii_digit())
        || tokens[0].0.eq_ignore_ascii_case("in");
    let name = if !looks_like_ttl_or_class {
        if let Ok(name) = parse_domain(origin, &tokens[0].0) {
            tokens.remove(0);
            name
        } else {
            previous_domain.clone().ok_or(Error::ExpectedDomainName {
                dotted_string: tokens[0].0.clone(),
            })?
        }
    } else {
        previous_domain.clone().ok_or(Error::ExpectedDomainName {
            dotted_string: tokens[0].0.clone(),
        })?
    };

    if !tokens.is_empty() && tokens[0].0.eq_ignore_ascii_case("in") {
        tokens.remove(0);
    }

    let ttl = if !tokens.is_empty() {
        if let Ok(ttl) = u32::from_str(&tokens[0].0) {
            tokens.remove(0);
            Some(ttl)
        } else {
            None
        }
    } else {
        None
    };

    if !tokens.is_empty() && tokens[0].0.eq_ignore_ascii_case("in") {
        tokens.remove(0);
    }

    let ttl = ttl.or(previous_ttl).ok_or(Error::ExpectedTTL)?;

    let rtype_with_data =
        try_parse_rtype_with_data(origin, &tokens).ok_or_else(|| Error::MalformedRData {
            tokens: tokens.iter().map(|(s, _)| s.clone()).collect(),
        })?;

    Ok(Entry::RR {
        rr: ResourceRecord {
            name,
            rtype_with_data,
            rclass: RecordClass::IN,
            ttl,
        },
    })
}

fn try_parse_rtype_with_data(
    origin: &Option<DomainName>,
    tokens: &[(String, Vec<u8>)],
) -> Option<RecordTypeWithData> {
    if tokens.is_empty() {
        return None;
    }

    match tokens[0].0.to_ascii_uppercase().as_str() {
        "A" if tokens.len() == 2 => match Ipv4Addr::from_str(&tokens[1].0) {
            Ok(address) => Some(RecordTypeWithData::A { address }),
            _ => None,
        },
        "NS" if tokens.len() == 2 => match parse_domain(origin, &tokens[1].0) {
            Ok(nsdname) => Some(RecordTypeWithData::NS { nsdname }),
            _ => None,
        },
        "CNAME" if tokens.len() == 2 => match parse_domain(origin, &tokens[1].0) {
            Ok(cname) => Some(RecordTypeWithData::CNAME { cname }),
            _ => None,
        },
        "SOA" if tokens.len() == 8 => match (
            parse_domain(origin, &tokens[1].0),
            parse_domain(origin, &tokens[2].0),
            u32::from_str(&tokens[3].0),
            u32::from_str(&tokens[4].0),
            u32::from_str(&tokens[5].0),
            u32::from_str(&tokens[6].0),
            u32::from_str(&tokens[7].0),
        ) {
            (Ok(mname), Ok(rname), Ok(serial), Ok(refresh), Ok(retry), Ok(expire), Ok(minimum)) => {
                Some(RecordTypeWithData::SOA {
                    mname,
                    rname,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                })
            }
            _ => None,
        },
        "MX" if tokens.len() == 3 => match (
            u16::from_str(&tokens[1].0),
            parse_domain(origin, &tokens[2].0),
        ) {
            (Ok(preference), Ok(exchange)) => Some(RecordTypeWithData::MX {
                preference,
                exchange,
            }),
            _ => None,
        },
        "TXT" if tokens.len() == 2 => Some(RecordTypeWithData::TXT {
            octets: tokens[1].1.clone(),
        }),
        _ => None,
    }
}

/// Parse a domain name, appending the origin if it's not absolute.
/// `@` means "the current origin".
///
/// # Errors
///
/// If the string cannot be parsed.
fn parse_domain(origin: &Option<DomainName>, dotted_string: &str) -> Result<DomainName, Error> {
    if dotted_string.is_empty() {
        return Err(Error::ExpectedDomainName {
            dotted_string: dotted_string.to_string(),
        });
    }

    if dotted_string == "@" {
        return origin.clone().ok_or(Error::ExpectedOrigin);
    }

    if dotted_string.ends_with('.') {
        DomainName::from_dotted_string(dotted_string).ok_or_else(|| Error::ExpectedDomainName {
            dotted_string: dotted_string.to_string(),
        })
    } else {
        let origin = origin.as_ref().ok_or(Error::ExpectedOrigin)?;
        DomainName::from_relative_dotted_string(origin, dotted_string).ok_or_else(|| {
            Error::ExpectedDomainName {
                dotted_string: dotted_string.to_string(),
            }
        })
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Origin { name: DomainName },
    RR { rr: ResourceRecord },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
    Initial,
    UnquotedString,
    QuotedString,
    SkipToEndOfComment,
}

/// Tokenise a single entry (up to an unescaped, non-parenthesised
/// newline), skipping comments. Each token pairs its textual form
/// with its raw octets (the two differ only for escape sequences).
fn tokenise_entry<I: Iterator<Item = char>>(
    stream: &mut Peekable<I>,
) -> Result<Vec<(String, Vec<u8>)>, Error> {
    let mut tokens = Vec::new();
    let mut token_string = String::new();
    let mut token_octets = Vec::new();
    let mut state = State::Initial;
    let mut line_continuation = false;

    while let Some(c) = stream.next() {
        state = match (state, c) {
            (State::Initial, '\n') => {
                if line_continuation {
                    State::Initial
                } else {
                    break;
                }
            }
            (State::Initial, ';') => State::SkipToEndOfComment,
            (State::Initial, '(') => {
                line_continuation = true;
                State::Initial
            }
            (State::Initial, ')') => {
                line_continuation = false;
                State::Initial
            }
            (State::Initial, '"') => State::QuotedString,
            (State::Initial, c) => {
                if c.is_whitespace() {
                    State::Initial
                } else if c.is_ascii() {
                    token_string.push(c);
                    token_octets.push(c as u8);
                    State::UnquotedString
                } else {
                    return Err(Error::TokeniserUnexpected { unexpected: c });
                }
            }

            (State::UnquotedString, '\n') => {
                if !token_string.is_empty() {
                    tokens.push((token_string, token_octets));
                    token_string = String::new();
                    token_octets = Vec::new();
                }
                if line_continuation {
                    State::Initial
                } else {
                    break;
                }
            }
            (State::UnquotedString, ';') => {
                if !token_string.is_empty() {
                    tokens.push((token_string, token_octets));
                    token_string = String::new();
                    token_octets = Vec::new();
                }
                State::SkipToEndOfComment
            }
            (State::UnquotedString, c) => {
                if c.is_whitespace() {
                    if !token_string.is_empty() {
                        tokens.push((token_string, token_octets));
                        token_string = String::new();
                        token_octets = Vec::new();
                    }
                    State::Initial
                } else if c.is_ascii() {
                    token_string.push(c);
                    token_octets.push(c as u8);
                    State::UnquotedString
                } else {
                    return Err(Error::TokeniserUnexpected { unexpected: c });
                }
            }

            (State::SkipToEndOfComment, '\n') => {
                if line_continuation {
                    State::Initial
                } else {
                    break;
                }
            }
            (State::SkipToEndOfComment, _) => State::SkipToEndOfComment,

            (State::QuotedString, '"') => {
                tokens.push((token_string, token_octets));
                token_string = String::new();
                token_octets = Vec::new();
                State::Initial
            }
            (State::QuotedString, c) => {
                if c.is_ascii() {
                    token_string.push(c);
                    token_octets.push(c as u8);
                } else {
                    return Err(Error::TokeniserUnexpected { unexpected: c });
                }
                State::QuotedString
            }
        }
    }

    if !token_string.is_empty() {
        tokens.push((token_string, token_octets));
    }

    Ok(tokens)
}

/// Errors encountered when parsing a zone file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    ExpectedDomainName { dotted_string: String },
    ExpectedOrigin,
    ExpectedTTL,
    MalformedOrigin,
    MalformedRData { tokens: Vec<String> },
    MultipleSOA,
    MissingSOA,
    NotSubdomainOfApex { apex: DomainName, name: DomainName },
    IncludeNotSupported,
    TokeniserUnexpected { unexpected: char },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_worked_example_zone() {
        let data = "
$ORIGIN foo.
@    3600 IN SOA ns.foo. hostmaster.foo. 1 3600 600 86400 300
@    IN MX 20 mail.foo.
www  IN A 89.2.33.1
mail IN CNAME server.foo.
server IN CNAME other.foo.
other IN A 1.2.3.4
txt  IN TXT \"this is text\"
";
        let zone = Zone::deserialise(data).unwrap();
        assert_eq!(zone.origin, DomainName::from_dotted_string("foo.").unwrap());
        assert_eq!(zone.default_ttl, 300);
        assert_eq!(zone.records.len(), 6);
    }

    #[test]
    fn rejects_multiple_soa() {
        let data = "
$ORIGIN foo.
@ 3600 IN SOA ns.foo. hostmaster.foo. 1 3600 600 86400 300
@ 3600 IN SOA ns.foo. hostmaster.foo. 2 3600 600 86400 300
";
        assert_eq!(Zone::deserialise(data), Err(Error::MultipleSOA));
    }

    #[test]
    fn rejects_records_outside_the_apex() {
        let data = "
$ORIGIN foo.
@ 3600 IN SOA ns.foo. hostmaster.foo. 1 3600 600 86400 300
www IN A 1.2.3.4
www.bar. IN A 1.2.3.4
";
        assert!(matches!(
            Zone::deserialise(data),
            Err(Error::NotSubdomainOfApex { .. })
        ));
    }

    #[test]
    fn strips_quotes_from_txt_rdata() {
        let data = "
$ORIGIN foo.
@ 3600 IN SOA ns.foo. hostmaster.foo. 1 3600 600 86400 300
txt IN TXT \"hello world\"
";
        let zone = Zone::deserialise(data).unwrap();
        let rr = &zone.records[0];
        assert_eq!(
            rr.rtype_with_data,
            RecordTypeWithData::TXT {
                octets: b"hello world".to_vec()
            }
        );
    }
}
